use async_trait::async_trait;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{run_yt_dlp, DownloadRequest, DownloadedMedia, ExtractedInfo, FormatInfo, MediaExtractor, MediaKind};
use crate::config::ExtractorConfig;
use crate::utils::last_error_line;
use crate::Result;

/// YouTube extractor backed by the yt-dlp binary
pub struct YtDlpExtractor {
    yt_dlp_path: String,
    lookup_timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self::from_config(&ExtractorConfig::default())
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            lookup_timeout: config.lookup_timeout(),
        }
    }

    fn with_cookies(mut args: Vec<String>, cookies: Option<PathBuf>, target: &str) -> Vec<String> {
        if let Some(path) = cookies {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args.push(target.to_string());
        args
    }

    /// Arguments for a metadata-only lookup
    pub fn flat_lookup_args(target: &str, cookies: Option<PathBuf>) -> Vec<String> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
        ];
        Self::with_cookies(args, cookies, target)
    }

    /// Arguments for a direct download with the predicted `<dir>/<id>.<ext>` layout
    pub fn download_args(request: &DownloadRequest) -> Vec<String> {
        let template = request.output_dir.join("%(id)s.%(ext)s");

        let mut args = vec![
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--geo-bypass".to_string(),
            "--no-check-certificates".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--no-playlist".to_string(),
            "--no-simulate".to_string(),
            // Reports the id once post-processing has moved the file in place
            "--print".to_string(),
            "after_move:id".to_string(),
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", request.player_client),
        ];

        match request.kind {
            MediaKind::Audio => args.extend(
                ["--format", "bestaudio/best", "--extract-audio", "--audio-format", "mp3"]
                    .map(String::from),
            ),
            MediaKind::Video => args.extend(
                [
                    "--format",
                    "bestvideo+bestaudio/best",
                    "--merge-output-format",
                    "mp4",
                    "--remux-video",
                    "mp4",
                ]
                .map(String::from),
            ),
        }

        Self::with_cookies(args, request.cookies.clone(), &request.target)
    }

    fn parse_formats(json: &Value) -> Vec<FormatInfo> {
        let empty = vec![];
        json["formats"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .filter_map(|f| {
                let format = f["format"].as_str()?.to_string();
                if format.to_lowercase().contains("dash") {
                    return None;
                }
                Some(FormatInfo {
                    format,
                    format_id: f["format_id"].as_str()?.to_string(),
                    ext: f["ext"].as_str().unwrap_or("unknown").to_string(),
                    format_note: f["format_note"].as_str().map(str::to_string),
                    filesize: f["filesize"].as_u64(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn flat_lookup(&self, target: &str, cookies: Option<PathBuf>) -> Result<ExtractedInfo> {
        tracing::debug!("Flat lookup for: {}", target);

        let args = Self::flat_lookup_args(target, cookies);
        let stdout = run_yt_dlp(&self.yt_dlp_path, &args, self.lookup_timeout).await?;
        let info: Value = serde_json::from_slice(&stdout)?;

        ExtractedInfo::from_json(&info)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp returned no entry for {}", target))
    }

    async fn list_formats(&self, target: &str, cookies: Option<PathBuf>) -> Result<Vec<FormatInfo>> {
        let args = Self::with_cookies(
            vec!["--dump-single-json".to_string(), "--no-warnings".to_string()],
            cookies,
            target,
        );
        let stdout = run_yt_dlp(&self.yt_dlp_path, &args, self.lookup_timeout).await?;
        let info: Value = serde_json::from_slice(&stdout)?;

        Ok(Self::parse_formats(&info))
    }

    async fn stream_url(&self, target: &str, cookies: Option<PathBuf>) -> Result<String> {
        let args = Self::with_cookies(
            vec![
                "--get-url".to_string(),
                "--format".to_string(),
                "best[height<=?720]".to_string(),
                "--no-warnings".to_string(),
            ],
            cookies,
            target,
        );
        let stdout = run_yt_dlp(&self.yt_dlp_path, &args, self.lookup_timeout).await?;

        String::from_utf8(stdout)?
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp printed no stream URL for {}", target))
    }

    fn download(&self, request: &DownloadRequest) -> Result<DownloadedMedia> {
        tracing::debug!("Downloading {} as {}", request.target, request.kind);

        fs_err::create_dir_all(&request.output_dir)?;

        let child = Command::new(&self.yt_dlp_path)
            .args(Self::download_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let output = wait_with_output_timeout(child, request.timeout)?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp download failed: {}", last_error_line(&output.stderr));
        }

        let id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("yt-dlp did not report a video id"))?;

        Ok(DownloadedMedia {
            path: request.predicted_path(&id),
            id,
        })
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a child process with a timeout, killing it when the deadline passes.
///
/// Both pipes are drained on their own threads while waiting; a child blocked on a
/// full pipe would otherwise never exit.
fn wait_with_output_timeout(mut child: std::process::Child, timeout: Duration) -> Result<std::process::Output> {
    let deadline = Instant::now() + timeout;
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    loop {
        match child.try_wait()? {
            Some(status) => {
                return Ok(std::process::Output {
                    status,
                    stdout: collect(stdout_reader)?,
                    stderr: collect(stderr_reader)?,
                });
            }
            None if Instant::now() >= deadline => {
                tracing::error!("yt-dlp download timed out after {}s, killing", timeout.as_secs());
                let _ = child.kill();
                let _ = child.wait();
                // Readers are left detached: post-processors may still hold the pipes open
                anyhow::bail!("yt-dlp download timed out after {}s", timeout.as_secs());
            }
            None => std::thread::sleep(Duration::from_millis(250)),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(reader: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let bytes = reader
        .join()
        .map_err(|_| anyhow::anyhow!("pipe reader thread panicked"))??;
    Ok(bytes)
}
