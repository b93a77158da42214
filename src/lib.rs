//! Music Resolver - turn a chat request into something a music bot can play
//!
//! This library resolves a URL or free-text search phrase to track metadata and a
//! playable source. Every lookup walks a fallback ladder (remote download API, local
//! yt-dlp extraction, page scraping) and always ends in a well-formed value.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod extractors;
pub mod link;
pub mod metadata;
pub mod output;
pub mod resolver;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

use std::time::Duration;

pub use acquire::{AcquisitionResult, MediaAcquirer, MediaSource, RemoteApiClient, RequestContext};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use credentials::{CredentialFile, CredentialSelector, SelectionPolicy};
pub use extractors::{MediaExtractor, MediaKind, SearchProvider};
pub use link::VideoRef;
pub use metadata::{MetadataFetcher, TrackMetadata};
pub use resolver::Resolver;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the resolver
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Extractor unavailable: {0}")]
    ExtractorUnavailable(String),
}

/// Why a single stage of a fallback ladder did not produce a result.
///
/// Stages never propagate these past the [`Resolver`]; they are logged and
/// collected so callers can see why a degraded answer was returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rejected by upstream (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("extractor error: {0}")]
    Extractor(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("stage unavailable: {0}")]
    Unavailable(String),
}

impl StageError {
    /// Whether another attempt of the same stage could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StageError::Transport(_) | StageError::Timeout(_) | StageError::UnexpectedResponse(_)
        )
    }
}

/// A stage that failed, kept for logs and reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: StageError,
}

impl StageFailure {
    pub fn new(stage: &'static str, error: StageError) -> Self {
        Self { stage, error }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

impl serde::Serialize for StageFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("StageFailure", 2)?;
        state.serialize_field("stage", self.stage)?;
        state.serialize_field("reason", &self.error.to_string())?;
        state.end()
    }
}
