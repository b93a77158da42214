use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::ResolverError;

/// Environment variable overriding `api.base_url`
pub const API_URL_ENV: &str = "MEDIA_API_URL";

/// Environment variable overriding `api.api_key`
pub const API_KEY_ENV: &str = "MEDIA_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote download API
    pub api: ApiConfig,

    /// Local yt-dlp extraction
    pub extractor: ExtractorConfig,

    /// Watch-page scraping
    pub scrape: ScrapeConfig,

    /// Credential (cookie file) pool
    pub credentials: CredentialsConfig,

    /// Canonical link construction
    pub links: LinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; requests go to `<base>/download`, streams live at `<base>/stream/<file>`
    pub base_url: String,

    /// Sent as the `x-api-key` header
    pub api_key: String,

    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts before the stage gives up
    pub max_attempts: u32,

    /// Sleep between failed attempts
    pub retry_delay_ms: u64,

    /// Sleep before re-polling a job the API reports as still downloading
    pub processing_delay_ms: u64,

    /// Upper bound on "still downloading" polls
    pub max_processing_polls: u32,

    /// HTTP statuses whose body is inspected
    pub accept_statuses: Vec<u16>,

    /// HTTP statuses that end the stage immediately; anything else is retried
    pub reject_statuses: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// yt-dlp binary
    pub yt_dlp_path: String,

    /// Where local downloads are written
    pub download_dir: PathBuf,

    /// YouTube player client presented by yt-dlp
    pub player_client: String,

    /// Timeout for metadata-only lookups and searches
    pub lookup_timeout_secs: u64,

    /// Timeout for a local download
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Watch page prefix; the video id is appended
    pub page_base: String,

    /// User agent that gets the simplified server-rendered page
    pub user_agent: String,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Directory holding cookie files, created on first scan
    pub dir: PathBuf,

    /// Only files with this extension are considered
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Prefix of canonical links; the id is appended
    pub watch_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            api_key: "".to_string(),
            timeout_secs: 120,
            max_attempts: 5,
            retry_delay_ms: 2_000,
            processing_delay_ms: 5_000,
            max_processing_polls: 24,
            accept_statuses: vec![200, 202],
            reject_statuses: vec![400, 404],
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            download_dir: PathBuf::from("downloads"),
            player_client: "ios".to_string(),
            lookup_timeout_secs: 30,
            download_timeout_secs: 120,
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_base: "https://www.youtube.com/watch?v=".to_string(),
            user_agent: "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)"
                .to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cookies"),
            extension: "txt".to_string(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            watch_base: "https://www.youtube.com/watch?v=".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn download_endpoint(&self) -> String {
        format!("{}/download", self.base_url.trim_end_matches('/'))
    }

    /// Public stream location for a file the API produced
    pub fn stream_url(&self, file_name: &str) -> String {
        format!("{}/stream/{}", self.base_url.trim_end_matches('/'), file_name)
    }
}

impl ExtractorConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl ScrapeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from file (or defaults) and apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("music-resolver").join("config.yaml"))
    }

    fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        );
    }

    /// Replace the API endpoint and key when a non-empty override is given
    pub fn apply_overrides(&mut self, base_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api.api_key = key.trim().to_string();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.api.base_url).map_err(|_| {
            ResolverError::InvalidConfig(format!("api.base_url is not a URL: {}", self.api.base_url))
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ResolverError::InvalidConfig(
                "api.base_url must use HTTP or HTTPS".to_string(),
            )
            .into());
        }

        if self.api.max_attempts == 0 {
            return Err(ResolverError::InvalidConfig("api.max_attempts must be at least 1".to_string()).into());
        }

        if self.credentials.extension.is_empty() {
            return Err(ResolverError::InvalidConfig("credentials.extension must not be empty".to_string()).into());
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  API URL: {}", self.api.base_url);
        println!("  API Key: {}", mask_secret(&self.api.api_key));
        println!("  API Attempts: {} (timeout {}s)", self.api.max_attempts, self.api.timeout_secs);
        println!("  yt-dlp: {}", self.extractor.yt_dlp_path);
        println!("  Download Dir: {}", self.extractor.download_dir.display());
        println!("  Player Client: {}", self.extractor.player_client);
        println!(
            "  Cookies: {}/*.{}",
            self.credentials.dir.display(),
            self.credentials.extension
        );
    }
}

fn mask_secret(secret: &str) -> String {
    match secret.chars().count() {
        0 => "(not set)".to_string(),
        n if n <= 4 => "*".repeat(n),
        n => {
            let tail: String = secret.chars().skip(n - 4).collect();
            format!("{}{}", "*".repeat(n - 4), tail)
        }
    }
}
