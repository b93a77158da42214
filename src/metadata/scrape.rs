//! Last-resort metadata from the public watch page.
//!
//! Crawler user agents get a small server-rendered page that still carries the
//! open-graph title and the player's `lengthSeconds`.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

use crate::config::ScrapeConfig;
use crate::StageError;

static OG_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]*)""#).expect("valid og:title pattern")
});

static LENGTH_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""lengthSeconds"\s*:\s*"(\d+)""#).expect("valid lengthSeconds pattern"));

/// What could be read off a watch page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: Option<String>,
    pub duration_seconds: u64,
}

pub struct PageScraper {
    client: Client,
    page_base: String,
    user_agent: String,
    timeout: Duration,
}

impl PageScraper {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            client: Client::new(),
            page_base: config.page_base.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn page_url(&self, video_id: &str) -> String {
        format!("{}{}", self.page_base, video_id)
    }

    /// Fetch and parse the watch page of `video_id`
    pub async fn scrape(&self, video_id: &str) -> Result<ScrapedPage, StageError> {
        let url = self.page_url(video_id);
        tracing::debug!("Scraping {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StageError::Timeout(self.timeout)
                } else {
                    StageError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageError::Rejected {
                status: status.as_u16(),
                message: format!("watch page for {}", video_id),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;

        // Pages run to several hundred KB; keep the regex scan off the scheduler
        tokio::task::spawn_blocking(move || parse_watch_page(&html))
            .await
            .map_err(|e| StageError::UnexpectedResponse(format!("page parse task failed: {}", e)))
    }
}

/// Pull the title and length out of watch-page HTML
pub fn parse_watch_page(html: &str) -> ScrapedPage {
    let title = OG_TITLE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_html(m.as_str()).trim().to_string())
        .filter(|title| !title.is_empty());

    let duration_seconds = LENGTH_SECONDS
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    ScrapedPage {
        title,
        duration_seconds,
    }
}

fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
