//! Client for the remote download API.
//!
//! `POST <base>/download` with an `x-api-key` header. The API either answers
//! with a finished file (`success`/`done`), asks to be polled again
//! (`downloading`/`processing`), or refuses. Finished files are served from
//! `<base>/stream/<file name>`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use url::Url;

use super::RequestContext;
use crate::config::ApiConfig;
use crate::extractors::MediaKind;
use crate::StageError;

#[derive(Debug, Serialize)]
struct DownloadPayload<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: MediaKind,
    quality: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requester_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DownloadReply {
    #[serde(default)]
    status: String,
    file: Option<String>,
    message: Option<String>,
}

/// Outcome of one POST that did not fail
#[derive(Debug)]
enum Reply {
    Ready(String),
    Pending(String),
}

pub struct RemoteApiClient {
    client: Client,
    config: ApiConfig,
}

impl RemoteApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Ask the API for `link` and return the stream URL of the produced file
    pub async fn download(
        &self,
        link: &str,
        kind: MediaKind,
        context: Option<&RequestContext>,
    ) -> Result<String, StageError> {
        let link = Self::clean_link(link)?;
        let started = Instant::now();

        let payload = DownloadPayload {
            url: &link,
            kind,
            quality: "best",
            chat_id: context.map(|c| c.chat_id),
            chat_title: context.map(|c| c.chat_title.as_str()),
            requester_name: context.map(|c| c.requester_name.as_str()),
        };

        tracing::info!(
            "API request | {} | {} | {} | {}",
            context.map(|c| c.requester_name.as_str()).unwrap_or("Unknown"),
            context.map(|c| c.chat_title.as_str()).unwrap_or("Private"),
            kind,
            link
        );

        let mut attempts = 0u32;
        let mut polls = 0u32;
        let mut last_error = StageError::Unavailable("no attempt made".to_string());

        while attempts < self.config.max_attempts {
            match self.post_once(&payload).await {
                Ok(Reply::Ready(file)) => {
                    let name = Self::file_name(&file)?;
                    let stream_url = self.config.stream_url(name);
                    tracing::info!(
                        "API success | {} | {:.2}s",
                        name,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(stream_url);
                }
                Ok(Reply::Pending(status)) => {
                    polls += 1;
                    if polls > self.config.max_processing_polls {
                        return Err(StageError::Timeout(started.elapsed()));
                    }
                    tracing::debug!("API reports {} (poll {}), waiting", status, polls);
                    tokio::time::sleep(self.config.processing_delay()).await;
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!("API refused {}: {}", link, e);
                    return Err(e);
                }
                Err(e) => {
                    attempts += 1;
                    tracing::warn!("API attempt {}/{} failed: {}", attempts, self.config.max_attempts, e);
                    last_error = e;
                    if attempts < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn post_once(&self, payload: &DownloadPayload<'_>) -> Result<Reply, StageError> {
        let timeout = self.config.timeout();

        let response = self
            .client
            .post(self.config.download_endpoint())
            .header("x-api-key", &self.config.api_key)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StageError::Timeout(timeout)
                } else {
                    StageError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if self.config.reject_statuses.contains(&status) {
            let message = response.text().await.unwrap_or_default();
            return Err(StageError::Rejected {
                status,
                message: truncate(&message, 200),
            });
        }

        if !self.config.accept_statuses.contains(&status) {
            return Err(StageError::UnexpectedResponse(format!("HTTP {}", status)));
        }

        let reply: DownloadReply = response
            .json()
            .await
            .map_err(|e| StageError::UnexpectedResponse(format!("invalid JSON body: {}", e)))?;

        match reply.status.to_lowercase().as_str() {
            "success" | "done" => reply
                .file
                .filter(|file| !file.trim().is_empty())
                .map(Reply::Ready)
                .ok_or_else(|| {
                    StageError::UnexpectedResponse("finished without a file reference".to_string())
                }),
            pending @ ("downloading" | "processing") => Ok(Reply::Pending(pending.to_string())),
            other => Err(StageError::Rejected {
                status,
                message: reply.message.unwrap_or_else(|| format!("status '{}'", other)),
            }),
        }
    }

    /// Validate a link before any network I/O; watch links lose everything after `&`
    pub fn clean_link(link: &str) -> Result<String, StageError> {
        let link = link.trim();
        let parsed = Url::parse(link).map_err(|_| StageError::InvalidUrl(link.to_string()))?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(StageError::InvalidUrl(link.to_string()));
        }

        if parsed.path().ends_with("/watch") {
            let has_id = parsed
                .query_pairs()
                .any(|(key, value)| key == "v" && !value.is_empty());
            if !has_id {
                return Err(StageError::InvalidUrl(format!("empty watch link: {}", link)));
            }
        }

        let cleaned = if link.contains("watch?v=") {
            link.split('&').next().unwrap_or(link)
        } else {
            link
        };

        Ok(cleaned.to_string())
    }

    fn file_name(file: &str) -> Result<&str, StageError> {
        file.rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StageError::UnexpectedResponse(format!("unusable file reference: {}", file)))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fast_config, unreachable_url, StubResponse, StubServer};
    use serde_json::json;

    fn client_for(base: &str) -> RemoteApiClient {
        RemoteApiClient::new(fast_config(base).api)
    }

    const LINK: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[tokio::test]
    async fn test_success_returns_stream_url() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            json!({"status": "success", "file": "abc.mp3"}),
        )])
        .await;

        let url = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap();

        assert_eq!(url, format!("{}/stream/abc.mp3", server.base_url));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_request_carries_key_payload_and_context() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            json!({"status": "done", "file": "/srv/media/files/xyz.mp4"}),
        )])
        .await;
        let context = RequestContext::new(-1001234, Some("Night Owls"), None);

        let url = client_for(&server.base_url)
            .download(&format!("{}&list=RD1", LINK), MediaKind::Video, Some(&context))
            .await
            .unwrap();
        assert!(url.ends_with("/stream/xyz.mp4"));

        let request = &server.requests()[0];
        assert_eq!(request.request_line, "POST /download HTTP/1.1");
        assert_eq!(request.header("x-api-key"), Some("test-key"));

        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["url"], LINK);
        assert_eq!(body["type"], "video");
        assert_eq!(body["quality"], "best");
        assert_eq!(body["chat_id"], -1001234);
        assert_eq!(body["chat_title"], "Night Owls");
        assert_eq!(body["requester_name"], "Unknown");
    }

    #[tokio::test]
    async fn test_payload_omits_context_when_absent() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            json!({"status": "success", "file": "a.mp3"}),
        )])
        .await;

        client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.requests()[0].body).unwrap();
        assert!(body.get("chat_id").is_none());
        assert!(body.get("requester_name").is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = StubServer::start(vec![StubResponse::json(404, json!({"detail": "no such video"}))]).await;

        let err = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Rejected { status: 404, .. }));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_success() {
        let server = StubServer::start(vec![
            StubResponse::json(500, json!({})),
            StubResponse::json(503, json!({})),
            StubResponse::json(200, json!({"status": "success", "file": "late.mp3"})),
        ])
        .await;

        let url = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap();

        assert!(url.ends_with("/stream/late.mp3"));
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let server = StubServer::start(vec![StubResponse::json(500, json!({}))]).await;

        let err = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap_err();

        assert_eq!(err, StageError::UnexpectedResponse("HTTP 500".to_string()));
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_downloading_status_polls_without_using_attempts() {
        let server = StubServer::start(vec![
            StubResponse::json(202, json!({"status": "downloading"})),
            StubResponse::json(202, json!({"status": "processing"})),
            StubResponse::json(500, json!({})),
            StubResponse::json(500, json!({})),
            StubResponse::json(200, json!({"status": "success", "file": "polled.mp3"})),
        ])
        .await;

        // two polls plus three attempts (two failed) fit in max_attempts = 3
        let url = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap();

        assert!(url.ends_with("/stream/polled.mp3"));
        assert_eq!(server.hits(), 5);
    }

    #[tokio::test]
    async fn test_endless_processing_gives_up() {
        let server = StubServer::start(vec![StubResponse::json(200, json!({"status": "processing"}))]).await;

        let err = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Timeout(_)));
        // max_processing_polls = 3, the fourth pending reply ends the stage
        assert_eq!(server.hits(), 4);
    }

    #[tokio::test]
    async fn test_error_status_in_body_is_definitive() {
        let server = StubServer::start(vec![StubResponse::json(
            200,
            json!({"status": "error", "message": "video is private"}),
        )])
        .await;

        let err = client_for(&server.base_url)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StageError::Rejected { status: 200, message: "video is private".to_string() }
        );
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_invalid_links_never_hit_the_network() {
        let server = StubServer::start(vec![StubResponse::json(200, json!({}))]).await;
        let client = client_for(&server.base_url);

        for link in ["lofi hip hop", "https://www.youtube.com/watch?v=", "ftp://youtube.com/x"] {
            let err = client.download(link, MediaKind::Audio, None).await.unwrap_err();
            assert!(matches!(err, StageError::InvalidUrl(_)), "{}", link);
        }
        assert_eq!(server.hits(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_transport_failure() {
        let base = unreachable_url().await;

        let err = client_for(&base)
            .download(LINK, MediaKind::Audio, None)
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Transport(_)));
    }

    #[test]
    fn test_clean_link() {
        assert_eq!(
            RemoteApiClient::clean_link("https://www.youtube.com/watch?v=abc&t=10").unwrap(),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(
            RemoteApiClient::clean_link("https://youtu.be/abc?si=x").unwrap(),
            "https://youtu.be/abc?si=x"
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(RemoteApiClient::file_name("downloads/abc.mp3").unwrap(), "abc.mp3");
        assert_eq!(RemoteApiClient::file_name("C:\\media\\abc.mp3").unwrap(), "abc.mp3");
        assert!(RemoteApiClient::file_name("downloads/").is_err());
    }
}
