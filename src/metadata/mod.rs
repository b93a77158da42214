//! Track metadata with a short-circuiting fallback ladder:
//! search, extractor lookup with a credential, anonymous extractor lookup,
//! watch-page scrape, then placeholders.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod scrape;

pub use scrape::{parse_watch_page, PageScraper, ScrapedPage};

use crate::credentials::CredentialSelector;
use crate::extractors::{ExtractedInfo, MediaExtractor, SearchHit, SearchProvider};
use crate::link::VideoRef;
use crate::utils::{format_duration, parse_duration};
use crate::{StageError, StageFailure};

pub const UNKNOWN_TITLE: &str = "Unknown Song";

/// Number of results offered by the result slider
pub const SLIDER_RESULTS: usize = 10;

pub const SEARCH_STAGE: &str = "search";
pub const CREDENTIAL_LOOKUP_STAGE: &str = "extractor-credentials";
pub const ANONYMOUS_LOOKUP_STAGE: &str = "extractor-anonymous";
pub const SCRAPE_STAGE: &str = "page-scrape";
pub const BLIND_STAGE: &str = "blind";
pub const DEFAULT_STAGE: &str = "default";

/// Thumbnail location derivable from the id alone
pub fn thumbnail_for(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub duration_display: String,
    pub duration_seconds: u64,
    /// Empty when unknown
    pub thumbnail_url: String,
    /// Empty when unknown
    pub video_id: String,
}

impl TrackMetadata {
    /// Answer when nothing at all is known
    pub fn placeholder() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            duration_display: format_duration(0),
            duration_seconds: 0,
            thumbnail_url: String::new(),
            video_id: String::new(),
        }
    }

    /// Placeholder that still carries a known id
    pub fn blind(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            ..Self::placeholder()
        }
    }

    fn from_search_hit(hit: &SearchHit) -> Self {
        let seconds = hit.duration.as_deref().map(parse_duration).unwrap_or(0);
        Self {
            title: non_empty_title(Some(&hit.title)),
            duration_display: format_duration(seconds),
            duration_seconds: seconds,
            thumbnail_url: hit.thumbnails.first().cloned().unwrap_or_default(),
            video_id: hit.id.clone(),
        }
    }

    fn from_extracted(info: &ExtractedInfo) -> Self {
        let seconds = info.duration.map(|d| d as u64).unwrap_or(0);
        Self {
            title: non_empty_title(info.title.as_deref()),
            duration_display: format_duration(seconds),
            duration_seconds: seconds,
            thumbnail_url: info
                .thumbnail
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| thumbnail_for(&info.id)),
            video_id: info.id.clone(),
        }
    }
}

fn non_empty_title(title: Option<&str>) -> String {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string()
}

/// Metadata plus which stage produced it
#[derive(Debug, Clone, Serialize)]
pub struct MetadataOutcome {
    pub metadata: TrackMetadata,
    pub stage: &'static str,
    pub failures: Vec<StageFailure>,
}

/// A search-backed card: metadata plus the canonical link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackCard {
    pub title: String,
    pub link: String,
    pub video_id: String,
    pub duration_display: String,
    pub thumbnail_url: String,
}

impl TrackCard {
    fn from_hit(hit: &SearchHit) -> Self {
        let metadata = TrackMetadata::from_search_hit(hit);
        Self {
            title: metadata.title,
            link: hit.link.clone(),
            video_id: metadata.video_id,
            duration_display: metadata.duration_display,
            thumbnail_url: metadata.thumbnail_url,
        }
    }

    fn placeholder(link: &str) -> Self {
        let metadata = TrackMetadata::placeholder();
        Self {
            title: metadata.title,
            link: link.to_string(),
            video_id: metadata.video_id,
            duration_display: metadata.duration_display,
            thumbnail_url: metadata.thumbnail_url,
        }
    }
}

pub struct MetadataFetcher {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn MediaExtractor>,
    credentials: Arc<CredentialSelector>,
    scraper: PageScraper,
}

impl MetadataFetcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn MediaExtractor>,
        credentials: Arc<CredentialSelector>,
        scraper: PageScraper,
    ) -> Self {
        Self {
            search,
            extractor,
            credentials,
            scraper,
        }
    }

    /// Metadata for `video`. Never fails.
    pub async fn fetch(&self, video: &VideoRef) -> TrackMetadata {
        self.fetch_with_report(video).await.metadata
    }

    /// Like [`fetch`](Self::fetch), also reporting the winning stage and the failures before it
    pub async fn fetch_with_report(&self, video: &VideoRef) -> MetadataOutcome {
        let mut failures = Vec::new();

        match self.search_first(video.search_query()).await {
            Ok(hit) => return success(SEARCH_STAGE, TrackMetadata::from_search_hit(&hit), failures),
            Err(e) => fail(&mut failures, SEARCH_STAGE, e),
        }

        let target = video.extractor_target();

        match self.credential_lookup(&target).await {
            Ok(info) => {
                return success(CREDENTIAL_LOOKUP_STAGE, TrackMetadata::from_extracted(&info), failures)
            }
            Err(e) => fail(&mut failures, CREDENTIAL_LOOKUP_STAGE, e),
        }

        match self.extractor.flat_lookup(&target, None).await {
            Ok(info) => {
                return success(ANONYMOUS_LOOKUP_STAGE, TrackMetadata::from_extracted(&info), failures)
            }
            Err(e) => fail(
                &mut failures,
                ANONYMOUS_LOOKUP_STAGE,
                StageError::Extractor(e.to_string()),
            ),
        }

        let Some(video_id) = video.canonical_id.as_deref() else {
            tracing::error!("Every metadata stage failed for {}", video.raw_input);
            return MetadataOutcome {
                metadata: TrackMetadata::placeholder(),
                stage: DEFAULT_STAGE,
                failures,
            };
        };

        match self.scraper.scrape(video_id).await {
            Ok(ScrapedPage {
                title: Some(title),
                duration_seconds,
            }) => {
                let metadata = TrackMetadata {
                    title,
                    duration_display: format_duration(duration_seconds),
                    duration_seconds,
                    thumbnail_url: thumbnail_for(video_id),
                    video_id: video_id.to_string(),
                };
                return success(SCRAPE_STAGE, metadata, failures);
            }
            Ok(_) => fail(
                &mut failures,
                SCRAPE_STAGE,
                StageError::UnexpectedResponse("no og:title on the watch page".to_string()),
            ),
            Err(e) => fail(&mut failures, SCRAPE_STAGE, e),
        }

        tracing::warn!("Blind mode for {}", video_id);
        MetadataOutcome {
            metadata: TrackMetadata::blind(video_id),
            stage: BLIND_STAGE,
            failures,
        }
    }

    async fn search_first(&self, query: &str) -> Result<SearchHit, StageError> {
        self.search
            .search(query, 1)
            .await
            .map_err(|e| StageError::Extractor(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| StageError::UnexpectedResponse(format!("no search results for '{}'", query)))
    }

    async fn credential_lookup(&self, target: &str) -> Result<ExtractedInfo, StageError> {
        let credential = self
            .credentials
            .pick()
            .ok_or_else(|| StageError::Unavailable("no credential files".to_string()))?;

        self.extractor
            .flat_lookup(target, Some(credential.path().to_path_buf()))
            .await
            .map_err(|e| StageError::Extractor(format!("{} (with {})", e, credential.name())))
    }

    /// Search-backed card for the first result, placeholder when search fails
    pub async fn track(&self, video: &VideoRef) -> TrackCard {
        match self.search_first(video.search_query()).await {
            Ok(hit) => TrackCard::from_hit(&hit),
            Err(e) => {
                tracing::warn!("Track lookup failed for {}: {}", video.raw_input, e);
                TrackCard::placeholder(video.link().unwrap_or(&video.raw_input))
            }
        }
    }

    /// The `index`-th of the top results for `query`, `None` when out of range or search fails
    pub async fn slider(&self, query: &str, index: usize) -> Option<TrackCard> {
        match self.search.search(query, SLIDER_RESULTS).await {
            Ok(hits) => hits.get(index).map(TrackCard::from_hit),
            Err(e) => {
                tracing::warn!("Slider search failed for '{}': {}", query, e);
                None
            }
        }
    }

    /// First search hit's canonical link, used to turn free text into a link
    pub async fn resolve_link(&self, query: &str) -> Option<String> {
        match self.search_first(query).await {
            Ok(hit) => Some(hit.link),
            Err(e) => {
                tracing::debug!("Could not resolve '{}' to a link: {}", query, e);
                None
            }
        }
    }
}

fn success(stage: &'static str, metadata: TrackMetadata, failures: Vec<StageFailure>) -> MetadataOutcome {
    tracing::info!("Metadata via {}: {} ({})", stage, metadata.title, metadata.duration_display);
    MetadataOutcome {
        metadata,
        stage,
        failures,
    }
}

fn fail(failures: &mut Vec<StageFailure>, stage: &'static str, error: StageError) {
    tracing::warn!("Metadata stage {} failed: {}", stage, error);
    failures.push(StageFailure::new(stage, error));
}
