use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{run_yt_dlp, SearchHit, SearchProvider};
use crate::config::ExtractorConfig;
use crate::utils::format_duration;
use crate::Result;

/// Ranked YouTube search through yt-dlp's `ytsearchN:` pseudo-URLs
pub struct YtDlpSearch {
    yt_dlp_path: String,
    watch_base: String,
    timeout: Duration,
}

impl YtDlpSearch {
    pub fn new(config: &ExtractorConfig, watch_base: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            watch_base: watch_base.into(),
            timeout: config.lookup_timeout(),
        }
    }

    fn parse_results(&self, json: &Value) -> Vec<SearchHit> {
        let empty = vec![];
        json["entries"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect()
    }

    fn parse_entry(&self, entry: &Value) -> Option<SearchHit> {
        let id = entry["id"].as_str().filter(|id| !id.is_empty())?.to_string();
        let title = entry["title"].as_str()?.to_string();

        let duration = entry["duration"]
            .as_f64()
            .filter(|d| *d >= 0.0)
            .map(|d| format_duration(d as u64));

        // yt-dlp lists thumbnails smallest first
        let thumbnails = entry["thumbnails"]
            .as_array()
            .map(|thumbs| {
                thumbs
                    .iter()
                    .rev()
                    .filter_map(|t| t["url"].as_str())
                    .map(strip_query)
                    .collect()
            })
            .unwrap_or_default();

        let link = entry["url"]
            .as_str()
            .filter(|url| url.starts_with("http"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}", self.watch_base, id));

        Some(SearchHit {
            title,
            duration,
            thumbnails,
            id,
            link,
        })
    }
}

fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

#[async_trait]
impl SearchProvider for YtDlpSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        tracing::debug!("Searching for: {} (limit {})", query, limit);

        let args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            format!("ytsearch{}:{}", limit.max(1), query),
        ];

        let stdout = run_yt_dlp(&self.yt_dlp_path, &args, self.timeout).await?;
        let json: Value = serde_json::from_slice(&stdout)?;

        let mut hits = self.parse_results(&json);
        hits.truncate(limit.max(1));
        Ok(hits)
    }
}
