use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub mod search;
pub mod youtube;

pub use search::YtDlpSearch;
pub use youtube::YtDlpExtractor;

use crate::utils::last_error_line;
use crate::Result;

/// What the caller wants to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Container the local extractor normalizes downloads to
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,

    /// Display duration ("3:33", "1:02:03"); `None` for live streams
    pub duration: Option<String>,

    /// Thumbnail URLs, best first, without query strings
    pub thumbnails: Vec<String>,

    pub id: String,

    /// Canonical watch link
    pub link: String,
}

/// Metadata from a flat (metadata-only) extractor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    pub id: String,
    pub title: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

impl ExtractedInfo {
    /// Read extractor JSON; containers (search results, playlists) yield their first entry
    pub fn from_json(value: &Value) -> Option<Self> {
        let info = match value.get("entries").and_then(Value::as_array) {
            Some(entries) => entries.first()?,
            None => value,
        };

        let id = info["id"].as_str().filter(|id| !id.is_empty())?.to_string();

        let thumbnail = info["thumbnail"]
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                info["thumbnails"]
                    .as_array()
                    .and_then(|thumbs| thumbs.last())
                    .and_then(|thumb| thumb["url"].as_str())
                    .map(str::to_string)
            });

        Some(Self {
            id,
            title: info["title"].as_str().map(str::to_string),
            duration: info["duration"].as_f64().filter(|d| *d >= 0.0),
            thumbnail,
        })
    }
}

/// A downloadable format as listed by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format: String,
    pub format_id: String,
    pub ext: String,
    pub format_note: Option<String>,
    pub filesize: Option<u64>,
}

/// Everything the local extractor needs for one download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Link or synthesized search query
    pub target: String,
    pub kind: MediaKind,
    pub output_dir: PathBuf,
    pub cookies: Option<PathBuf>,
    pub player_client: String,
    pub timeout: Duration,
}

impl DownloadRequest {
    /// Where the extractor will leave the file for a given video id
    pub fn predicted_path(&self, video_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", video_id, self.kind.extension()))
    }
}

/// Result of a completed local download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub id: String,
    pub path: PathBuf,
}

/// Capability to rank videos for a query
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked results for `query`, at most `limit` of them
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Trait for the bulk media extraction backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Metadata-only lookup of a link or search target
    async fn flat_lookup(&self, target: &str, cookies: Option<PathBuf>) -> Result<ExtractedInfo>;

    /// Downloadable formats of a link
    async fn list_formats(&self, target: &str, cookies: Option<PathBuf>) -> Result<Vec<FormatInfo>>;

    /// Direct media URL for a link, without downloading
    async fn stream_url(&self, target: &str, cookies: Option<PathBuf>) -> Result<String>;

    /// Download to disk. Blocks the calling thread; run it on the blocking pool.
    fn download(&self, request: &DownloadRequest) -> Result<DownloadedMedia>;
}

/// Run yt-dlp with a per-call timeout and return its stdout
pub(crate) async fn run_yt_dlp(binary: &str, args: &[String], timeout: Duration) -> Result<Vec<u8>> {
    tracing::debug!("Running {} {}", binary, args.join(" "));

    let child = Command::new(binary)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {}s", binary, timeout.as_secs()))??;

    if !output.status.success() {
        anyhow::bail!("{} failed: {}", binary, last_error_line(&output.stderr));
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracted_info_from_single_video() {
        let value = json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "duration": 213.0,
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
        });

        let info = ExtractedInfo::from_json(&value).unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(info.duration, Some(213.0));
    }

    #[test]
    fn test_extracted_info_takes_first_entry() {
        let value = json!({
            "_type": "playlist",
            "entries": [
                {"id": "first", "title": "First", "duration": null,
                 "thumbnails": [{"url": "https://i.ytimg.com/vi/first/default.jpg"},
                                {"url": "https://i.ytimg.com/vi/first/hqdefault.jpg"}]},
                {"id": "second", "title": "Second"}
            ]
        });

        let info = ExtractedInfo::from_json(&value).unwrap();
        assert_eq!(info.id, "first");
        assert_eq!(info.duration, None);
        assert_eq!(
            info.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/first/hqdefault.jpg")
        );
    }

    #[test]
    fn test_extracted_info_rejects_empty_results() {
        assert_eq!(ExtractedInfo::from_json(&json!({"entries": []})), None);
        assert_eq!(ExtractedInfo::from_json(&json!({"title": "no id"})), None);
    }

    #[test]
    fn test_predicted_path_uses_kind_extension() {
        let request = DownloadRequest {
            target: "https://www.youtube.com/watch?v=abc".into(),
            kind: MediaKind::Video,
            output_dir: PathBuf::from("downloads"),
            cookies: None,
            player_client: "ios".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(request.predicted_path("abc"), PathBuf::from("downloads/abc.mp4"));
    }

    #[tokio::test]
    async fn test_run_yt_dlp_reports_missing_binary() {
        let result = run_yt_dlp(
            "definitely-not-a-real-yt-dlp-binary",
            &["--version".to_string()],
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
    }
}
