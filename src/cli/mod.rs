use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{API_KEY_ENV, API_URL_ENV};

#[derive(Parser)]
#[command(
    name = "resolver",
    about = "Music Resolver - turn a link or search phrase into track metadata and a playable source",
    version,
    long_about = "Resolves YouTube links or free-text searches for a chat music bot. Media comes from a remote download API when possible, falling back to local yt-dlp extraction; metadata falls back from search to yt-dlp lookups to watch-page scraping."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Remote download API base URL (overrides the config file)
    #[arg(long, env = API_URL_ENV, global = true, hide_env_values = true)]
    pub api_url: Option<String>,

    /// Remote download API key (overrides the config file)
    #[arg(long, env = API_KEY_ENV, global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show how an input is normalized (no network access)
    Normalize {
        /// Link, short link or search text
        #[arg(value_name = "INPUT")]
        input: String,
    },

    /// Fetch track metadata through the full fallback ladder
    Details {
        #[arg(value_name = "INPUT")]
        input: String,
    },

    /// Search-backed track card: title, link, id, duration, thumbnail
    Track {
        #[arg(value_name = "INPUT")]
        input: String,
    },

    /// Pick one of the top 10 search results
    Slider {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Zero-based position in the result list
        #[arg(short, long, default_value = "0")]
        index: usize,
    },

    /// List downloadable formats (needs a cookie file)
    Formats {
        #[arg(value_name = "LINK")]
        input: String,
    },

    /// Obtain a playable stream URL or local file
    Acquire {
        #[arg(value_name = "INPUT")]
        input: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Get a direct stream URL without downloading locally
    Stream {
        #[arg(value_name = "INPUT")]
        input: String,

        /// Ask for video instead of audio
        #[arg(long)]
        video: bool,
    },

    /// Fetch metadata and acquire media concurrently
    Play {
        #[arg(value_name = "INPUT")]
        input: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Check that external tools are installed
    Check,

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a configuration file with the defaults
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

/// Options shared by commands that acquire media
#[derive(clap::Args, Debug, Clone)]
pub struct RequestArgs {
    /// Ask for video instead of audio
    #[arg(long)]
    pub video: bool,

    /// Chat the request came from
    #[arg(long, value_name = "ID", allow_hyphen_values = true)]
    pub chat_id: Option<i64>,

    #[arg(long, value_name = "TITLE")]
    pub chat_title: Option<String>,

    /// Display name of the requester
    #[arg(long, value_name = "NAME")]
    pub requester: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
