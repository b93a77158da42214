//! The public face of the crate: normalize once, then fetch metadata and
//! acquire media. Every operation here returns a value; stage failures are
//! logged and reported, never raised.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::acquire::{AcquisitionResult, MediaAcquirer, RequestContext};
use crate::config::Config;
use crate::credentials::CredentialSelector;
use crate::extractors::{FormatInfo, MediaExtractor, MediaKind, SearchProvider, YtDlpExtractor, YtDlpSearch};
use crate::link::{is_link_shaped, LinkNormalizer, VideoRef};
use crate::metadata::{MetadataFetcher, MetadataOutcome, PageScraper, TrackCard, TrackMetadata};
use crate::{Result, ResolverError};

/// Metadata and media for one request, gathered concurrently
#[derive(Debug, Clone, Serialize)]
pub struct PlayOutcome {
    pub video: VideoRef,
    pub metadata: MetadataOutcome,
    pub acquisition: AcquisitionResult,
}

pub struct Resolver {
    normalizer: LinkNormalizer,
    metadata: MetadataFetcher,
    acquirer: MediaAcquirer,
    extractor: Arc<dyn MediaExtractor>,
    credentials: Arc<CredentialSelector>,
}

impl Resolver {
    /// Resolver backed by yt-dlp for search and extraction
    pub fn new(config: &Config) -> Self {
        let search = Arc::new(YtDlpSearch::new(&config.extractor, &config.links.watch_base));
        let extractor = Arc::new(YtDlpExtractor::from_config(&config.extractor));
        let credentials = Arc::new(CredentialSelector::from_config(&config.credentials));

        Self::with_components(config, search, extractor, credentials)
    }

    pub fn with_components(
        config: &Config,
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn MediaExtractor>,
        credentials: Arc<CredentialSelector>,
    ) -> Self {
        Self {
            normalizer: LinkNormalizer::new(&config.links.watch_base),
            metadata: MetadataFetcher::new(
                Arc::clone(&search),
                Arc::clone(&extractor),
                Arc::clone(&credentials),
                PageScraper::new(&config.scrape),
            ),
            acquirer: MediaAcquirer::new(config, Arc::clone(&extractor), Arc::clone(&credentials)),
            extractor,
            credentials,
        }
    }

    pub fn normalize(&self, input: &str) -> VideoRef {
        self.normalizer.normalize(input)
    }

    pub fn normalize_id(&self, video_id: &str) -> VideoRef {
        self.normalizer.normalize_id(video_id)
    }

    /// Whether `input` points at the supported platform
    pub fn exists(&self, input: &str) -> bool {
        is_link_shaped(input)
    }

    /// Metadata through the full ladder, with the stage report
    #[tracing::instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn details(&self, input: &str) -> MetadataOutcome {
        let video = self.normalize(input);
        self.metadata.fetch_with_report(&video).await
    }

    /// Metadata for an already-normalized reference
    pub async fn fetch(&self, video: &VideoRef) -> TrackMetadata {
        self.metadata.fetch(video).await
    }

    #[tracing::instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn track(&self, input: &str) -> TrackCard {
        let video = self.normalize(input);
        self.metadata.track(&video).await
    }

    #[tracing::instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn slider(&self, query: &str, index: usize) -> Option<TrackCard> {
        self.metadata.slider(query, index).await
    }

    /// Non-DASH formats of a link; needs a credential file
    #[tracing::instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn formats(&self, input: &str) -> Result<Vec<FormatInfo>> {
        let video = self.normalize(input);
        let link = video
            .link()
            .ok_or_else(|| ResolverError::UnsupportedInput(format!("not a link: {}", input)))?;

        let credential = self.credentials.pick().ok_or_else(|| {
            ResolverError::ExtractorUnavailable(format!(
                "no credential files in {}",
                self.credentials.dir().display()
            ))
        })?;

        self.extractor
            .list_formats(link, Some(credential.path().to_path_buf()))
            .await
    }

    /// Playable source for `input`. Free text is first resolved to a link by search.
    #[tracing::instrument(skip(self, context), fields(request_id = %Uuid::new_v4()))]
    pub async fn acquire(
        &self,
        input: &str,
        kind: MediaKind,
        context: Option<&RequestContext>,
    ) -> AcquisitionResult {
        let video = self.normalize(input);
        self.acquire_ref(&video, kind, context).await
    }

    /// Acquire an already-normalized reference
    pub async fn acquire_ref(
        &self,
        video: &VideoRef,
        kind: MediaKind,
        context: Option<&RequestContext>,
    ) -> AcquisitionResult {
        match self.resolve_ghost_link(video).await {
            Some(resolved) => self.acquirer.acquire(&resolved, kind, context).await,
            None => self.acquirer.acquire(video, kind, context).await,
        }
    }

    /// Direct stream URL without downloading on this machine
    #[tracing::instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn stream_url(&self, input: &str, kind: MediaKind) -> AcquisitionResult {
        let video = self.normalize(input);
        match self.resolve_ghost_link(&video).await {
            Some(resolved) => self.acquirer.stream_url(&resolved, kind).await,
            None => self.acquirer.stream_url(&video, kind).await,
        }
    }

    /// Metadata and acquisition for the same request, run concurrently
    #[tracing::instrument(skip(self, context), fields(request_id = %Uuid::new_v4()))]
    pub async fn play(
        &self,
        input: &str,
        kind: MediaKind,
        context: Option<&RequestContext>,
    ) -> PlayOutcome {
        let video = self.normalize(input);

        let (metadata, acquisition) = tokio::join!(
            self.metadata.fetch_with_report(&video),
            self.acquire_ref(&video, kind, context)
        );

        PlayOutcome {
            video,
            metadata,
            acquisition,
        }
    }

    /// A fresh reference for the first search hit of free text; `None` for links
    async fn resolve_ghost_link(&self, video: &VideoRef) -> Option<VideoRef> {
        if video.link().is_some() {
            return None;
        }

        let link = self.metadata.resolve_link(&video.raw_input).await?;
        tracing::info!("Resolved '{}' to {}", video.raw_input, link);
        Some(self.normalize(&link))
    }
}
