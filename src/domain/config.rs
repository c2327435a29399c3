//! Resolved application configuration.
//!
//! `Config` is built once per run by the resolver and is immutable
//! afterwards. Every field is present and typed regardless of which
//! source (defaults, file, environment, overrides) supplied it.

use serde::{Deserialize, Serialize};

/// Default Intercom API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.intercom.io";
/// Default `Intercom-Version` header value.
pub const DEFAULT_API_VERSION: &str = "2.8";
/// Default directory for exported files.
pub const DEFAULT_OUTPUT_DIR: &str = "exports";
/// Default number of conversations fetched per search request.
pub const DEFAULT_BATCH_SIZE: u32 = 10;
/// Default retry attempt limit.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default first backoff delay in seconds.
pub const DEFAULT_INITIAL_BACKOFF_SECS: f64 = 1.0;
/// Default multiplier applied to the backoff delay per attempt.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
/// Default backoff cap in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: f64 = 30.0;

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable Markdown format.
    #[default]
    Markdown,
    /// JSON format for programmatic use.
    Json,
}

impl OutputFormat {
    /// File extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: markdown, json")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Intercom API connection settings.
#[derive(Debug, Clone)]
pub struct IntercomConfig {
    /// Bearer token for the `Authorization` header.
    pub api_token: String,
    /// API endpoint, without trailing slash.
    pub base_url: String,
    /// Value of the `Intercom-Version` header.
    pub api_version: String,
}

/// Export rendering settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_format: OutputFormat,
    pub output_dir: String,
    /// Conversations fetched per search request. Always > 0.
    pub batch_size: u32,
    pub include_metadata: bool,
    pub include_context: bool,
}

/// Retry and backoff settings for the API client.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// First backoff delay. Always > 0.
    pub initial_backoff_seconds: f64,
    /// Multiplier applied per attempt. Always >= 1.
    pub backoff_factor: f64,
    /// Upper bound on any computed delay.
    pub max_backoff_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_seconds: DEFAULT_INITIAL_BACKOFF_SECS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff_seconds: DEFAULT_MAX_BACKOFF_SECS,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub intercom: IntercomConfig,
    pub export: ExportConfig,
    pub retry: RetryConfig,
    /// Always present; `false` when no source supplied it.
    pub debug: bool,
}
