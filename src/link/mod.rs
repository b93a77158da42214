//! Link normalization.
//!
//! Turns whatever the user typed (watch link, short link, bare search text)
//! into a [`VideoRef`]. Normalization never fails: input that carries no
//! recognizable identifier simply stays free text and is searched later.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PLATFORM_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:youtube\.com|youtu\.be)").expect("valid platform pattern")
});

/// Markers after which a path segment is the video id
const PATH_MARKERS: &[&str] = &["/shorts/", "/embed/", "/live/", "/v/"];

/// Prefix understood by yt-dlp as "search and take the first hit"
pub const SEARCH_PREFIX: &str = "ytsearch1:";

/// A single user request after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    /// Exactly what the user supplied (trimmed)
    pub raw_input: String,

    /// Platform video id, when one could be extracted
    pub canonical_id: Option<String>,

    /// `<watch base><id>`, set together with `canonical_id`
    pub canonical_url: Option<String>,
}

impl VideoRef {
    /// Whether the raw input points at the platform rather than being search text
    pub fn is_link(&self) -> bool {
        is_link_shaped(&self.raw_input)
    }

    /// Text handed to a search backend: the canonical link if known, else the raw input
    pub fn search_query(&self) -> &str {
        self.canonical_url.as_deref().unwrap_or(&self.raw_input)
    }

    /// Link usable for a download request, if the input was a link at all
    pub fn link(&self) -> Option<&str> {
        match &self.canonical_url {
            Some(url) => Some(url),
            None if self.is_link() => Some(&self.raw_input),
            None => None,
        }
    }

    /// Target for yt-dlp: a link, or a synthesized single-result search
    pub fn extractor_target(&self) -> String {
        match self.link() {
            Some(link) => link.to_string(),
            None => format!("{}{}", SEARCH_PREFIX, self.raw_input),
        }
    }
}

/// Builds [`VideoRef`]s against a configurable watch-page base
#[derive(Debug, Clone)]
pub struct LinkNormalizer {
    watch_base: String,
}

impl LinkNormalizer {
    pub fn new(watch_base: impl Into<String>) -> Self {
        Self {
            watch_base: watch_base.into(),
        }
    }

    /// Normalize arbitrary input into a fresh [`VideoRef`]
    pub fn normalize(&self, input: &str) -> VideoRef {
        let raw_input = input.trim().to_string();

        let canonical_id = if is_link_shaped(&raw_input) {
            extract_video_id(&raw_input)
        } else {
            None
        };

        let canonical_url = canonical_id
            .as_ref()
            .map(|id| format!("{}{}", self.watch_base, id));

        VideoRef {
            raw_input,
            canonical_id,
            canonical_url,
        }
    }

    /// Build a reference straight from a known video id
    pub fn normalize_id(&self, video_id: &str) -> VideoRef {
        let id = video_id.trim();
        let url = format!("{}{}", self.watch_base, id);
        VideoRef {
            raw_input: url.clone(),
            canonical_id: Some(id.to_string()).filter(|id| !id.is_empty()),
            canonical_url: Some(url).filter(|_| !id.is_empty()),
        }
    }

    pub fn watch_base(&self) -> &str {
        &self.watch_base
    }
}

impl Default for LinkNormalizer {
    fn default() -> Self {
        Self::new("https://www.youtube.com/watch?v=")
    }
}

/// Check if input mentions the supported platform at all
pub fn is_link_shaped(input: &str) -> bool {
    PLATFORM_LINK.is_match(input)
}

/// Pull the video id out of a watch link, short link, or shorts/embed link
pub fn extract_video_id(link: &str) -> Option<String> {
    // Markers match in any case; ids are case-sensitive and sliced from the original
    let lowered = link.to_ascii_lowercase();
    let after = |marker: &str| lowered.find(marker).map(|pos| &link[pos + marker.len()..]);

    let id = if let Some(rest) = after("watch?v=") {
        cut_at(rest, &['&', '?', '#'])
    } else if let Some(rest) = after("youtu.be/") {
        let path = cut_at(rest, &['?', '#', '&']);
        path.rsplit('/').next().unwrap_or_default()
    } else {
        PATH_MARKERS
            .iter()
            .find_map(|marker| after(*marker))
            .map(|rest| cut_at(rest, &['?', '#', '&', '/']))?
    };

    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn cut_at<'a>(text: &'a str, delimiters: &[char]) -> &'a str {
    match text.find(delimiters) {
        Some(end) => &text[..end],
        None => text,
    }
}

/// Kind of a rich-text entity attached to a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    /// A bare URL written in the message text
    Url,
    /// Text whose hyperlink target is carried out of band
    TextLink { url: String },
    Other,
}

/// Rich-text entity; offsets and lengths are UTF-16 code units
#[derive(Debug, Clone)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

/// The slice of a chat message the resolver needs to find an embedded link
#[derive(Debug, Clone, Default)]
pub struct ChatMessage {
    pub text: Option<String>,
    pub caption: Option<String>,
    pub entities: Vec<MessageEntity>,
    pub caption_entities: Vec<MessageEntity>,
    pub reply_to: Option<Box<ChatMessage>>,
}

/// Find the link a user shared, looking at the message and then the message it replies to
pub fn extract_link(message: &ChatMessage) -> Option<String> {
    let candidates = std::iter::once(message).chain(message.reply_to.as_deref());

    for msg in candidates {
        if !msg.entities.is_empty() {
            let url_entity = msg.entities.iter().find(|e| e.kind == EntityKind::Url);
            if let Some(entity) = url_entity {
                let body = msg.text.as_deref().or(msg.caption.as_deref())?;
                return utf16_slice(body, entity.offset, entity.length);
            }
        } else {
            let text_link = msg.caption_entities.iter().find_map(|e| match &e.kind {
                EntityKind::TextLink { url } => Some(url.clone()),
                _ => None,
            });
            if text_link.is_some() {
                return text_link;
            }
        }
    }

    None
}

fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    units
        .get(offset..end)
        .map(String::from_utf16_lossy)
        .filter(|s| !s.is_empty())
}
