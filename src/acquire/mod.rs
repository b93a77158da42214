//! Media acquisition: remote download API first, local extraction second.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod remote;

pub use remote::RemoteApiClient;

use crate::config::Config;
use crate::credentials::CredentialSelector;
use crate::extractors::{DownloadRequest, MediaExtractor, MediaKind};
use crate::link::VideoRef;
use crate::utils::format_file_size;
use crate::{StageError, StageFailure};

pub const REMOTE_STAGE: &str = "remote-api";
pub const LOCAL_STAGE: &str = "local-extractor";

/// Who asked for the media. Forwarded to the remote API, never required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub chat_id: i64,
    pub chat_title: String,
    pub requester_name: String,
}

impl RequestContext {
    pub fn new(chat_id: i64, chat_title: Option<&str>, requester_name: Option<&str>) -> Self {
        Self {
            chat_id,
            chat_title: non_blank(chat_title).unwrap_or("Private").to_string(),
            requester_name: non_blank(requester_name).unwrap_or("Unknown").to_string(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Where playable media ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum MediaSource {
    RemoteStream(String),
    LocalFile(PathBuf),
    None,
}

/// Outcome of [`MediaAcquirer::acquire`]; failed stages are kept for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionResult {
    pub source: MediaSource,
    pub failures: Vec<StageFailure>,
}

impl AcquisitionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self.source, MediaSource::None)
    }

    /// Stream URL or file path as a string, empty on failure
    pub fn location(&self) -> String {
        match &self.source {
            MediaSource::RemoteStream(url) => url.clone(),
            MediaSource::LocalFile(path) => path.display().to_string(),
            MediaSource::None => String::new(),
        }
    }
}

impl Serialize for AcquisitionResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("AcquisitionResult", 3)?;
        state.serialize_field("success", &self.is_success())?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("failures", &self.failures)?;
        state.end()
    }
}

pub struct MediaAcquirer {
    remote: RemoteApiClient,
    extractor: Arc<dyn MediaExtractor>,
    credentials: Arc<CredentialSelector>,
    download_dir: PathBuf,
    player_client: String,
    download_timeout: Duration,
}

impl MediaAcquirer {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn MediaExtractor>,
        credentials: Arc<CredentialSelector>,
    ) -> Self {
        Self {
            remote: RemoteApiClient::new(config.api.clone()),
            extractor,
            credentials,
            download_dir: config.extractor.download_dir.clone(),
            player_client: config.extractor.player_client.clone(),
            download_timeout: config.extractor.download_timeout(),
        }
    }

    pub fn remote(&self) -> &RemoteApiClient {
        &self.remote
    }

    /// Obtain a playable source. Never fails; a failed ladder yields [`MediaSource::None`].
    pub async fn acquire(
        &self,
        video: &VideoRef,
        kind: MediaKind,
        context: Option<&RequestContext>,
    ) -> AcquisitionResult {
        let mut failures = Vec::new();

        let link = video.link().unwrap_or(&video.raw_input);
        match self.remote.download(link, kind, context).await {
            Ok(url) => {
                return AcquisitionResult {
                    source: MediaSource::RemoteStream(url),
                    failures,
                }
            }
            Err(e) => {
                tracing::warn!("Remote API failed for {}: {}", video.raw_input, e);
                failures.push(StageFailure::new(REMOTE_STAGE, e));
            }
        }

        match self.download_locally(video, kind).await {
            Ok(path) => {
                return AcquisitionResult {
                    source: MediaSource::LocalFile(path),
                    failures,
                }
            }
            Err(e) => {
                tracing::warn!("Local extraction failed for {}: {}", video.raw_input, e);
                failures.push(StageFailure::new(LOCAL_STAGE, e));
            }
        }

        tracing::error!("No source could be acquired for {}", video.raw_input);
        AcquisitionResult {
            source: MediaSource::None,
            failures,
        }
    }

    async fn download_locally(&self, video: &VideoRef, kind: MediaKind) -> Result<PathBuf, StageError> {
        let request = DownloadRequest {
            target: video.extractor_target(),
            kind,
            output_dir: self.download_dir.clone(),
            cookies: self.credentials.pick().map(|file| file.path().to_path_buf()),
            player_client: self.player_client.clone(),
            timeout: self.download_timeout,
        };

        tracing::info!(
            "Local download | {} | {} | cookies: {}",
            kind,
            request.target,
            request
                .cookies
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        let started = Instant::now();
        let extractor = Arc::clone(&self.extractor);
        let downloaded = tokio::task::spawn_blocking(move || extractor.download(&request))
            .await
            .map_err(|e| StageError::Extractor(format!("download task failed: {}", e)))?
            .map_err(|e| StageError::Extractor(e.to_string()))?;

        let size = tokio::fs::metadata(&downloaded.path)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
            .ok_or_else(|| {
                StageError::Extractor(format!(
                    "expected file not found: {}",
                    downloaded.path.display()
                ))
            })?;

        tracing::info!(
            "Local success | {} | {} | {:.2}s",
            downloaded.path.display(),
            format_file_size(size),
            started.elapsed().as_secs_f64()
        );

        Ok(downloaded.path)
    }

    /// Direct stream URL: remote API first, then the extractor's `-g` output
    pub async fn stream_url(&self, video: &VideoRef, kind: MediaKind) -> AcquisitionResult {
        let mut failures = Vec::new();

        let link = video.link().unwrap_or(&video.raw_input);
        match self.remote.download(link, kind, None).await {
            Ok(url) => {
                return AcquisitionResult {
                    source: MediaSource::RemoteStream(url),
                    failures,
                }
            }
            Err(e) => failures.push(StageFailure::new(REMOTE_STAGE, e)),
        }

        let cookies = self.credentials.pick().map(|file| file.path().to_path_buf());
        match self.extractor.stream_url(&video.extractor_target(), cookies).await {
            Ok(url) => AcquisitionResult {
                source: MediaSource::RemoteStream(url),
                failures,
            },
            Err(e) => {
                failures.push(StageFailure::new(LOCAL_STAGE, StageError::Extractor(e.to_string())));
                tracing::error!("No stream URL for {}", video.raw_input);
                AcquisitionResult {
                    source: MediaSource::None,
                    failures,
                }
            }
        }
    }
}
