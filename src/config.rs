use clap::{Parser, Subcommand};
use std::time::Duration;

use crate::error::ConfigError;

/// AutoAI Scout client. Submits a vehicle listing (link or description) for analysis.
#[derive(Parser, Debug, Clone)]
#[command(name = "autoai-scout", version)]
pub struct CliArgs {
    /// Base URL of the analysis service
    #[arg(long = "api-url", env = API_URL_ENV)]
    pub api_url: Option<String>,

    /// Give up on a request after this many seconds (0 waits forever)
    #[arg(long = "timeout-secs", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Extra attempts for transient transport failures
    #[arg(long = "retries", default_value_t = 0)]
    pub retries: u32,

    /// Backoff step between retries, multiplied by the attempt number
    #[arg(long = "retry-backoff-ms", default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    pub retry_backoff_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyze a listing URL or a free-text description
    Analyze {
        /// Listing URL, or description words (joined with spaces)
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,

        /// Keep the service's raw payload in the printed result
        #[arg(long = "include-raw")]
        include_raw: bool,
    },
    /// Query the analysis service's health endpoint
    Health,
}

pub struct ClientConfig {
    pub api_url: String,
    /// External deadline per request; `None` means no deadline.
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

// Service endpoint
pub const DEFAULT_API_URL: &str = "https://autoai-scout.onrender.com";
pub const API_URL_ENV: &str = "AUTOAI_API_URL";
/// Variable the web prototypes were deployed with.
pub const LEGACY_API_URL_ENV: &str = "VITE_API_URL";
pub const ANALYZE_PATH: &str = "/analyze";
pub const HEALTH_PATH: &str = "/health";

// Request constants
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

// Diagnostics constants
pub const DIAGNOSTICS_BUFFER_SIZE: usize = 200;

impl ClientConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let legacy = std::env::var(LEGACY_API_URL_ENV).ok();
        let api_url = resolve_api_url(args.api_url.as_deref(), legacy.as_deref())?;

        Ok(ClientConfig {
            api_url,
            timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            max_retries: args.retries,
            retry_backoff: Duration::from_millis(args.retry_backoff_ms),
        })
    }

    pub fn analyze_url(&self) -> String {
        format!("{}{}", self.api_url, ANALYZE_PATH)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.api_url, HEALTH_PATH)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            max_retries: 0,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Pick the base URL: explicit value first, then the legacy variable, then the
/// hosted default. Blank values count as unset; a trailing `/` is dropped.
pub fn resolve_api_url(explicit: Option<&str>, legacy: Option<&str>) -> Result<String, ConfigError> {
    let chosen = [explicit, legacy]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_API_URL);

    let parsed = url::Url::parse(chosen).map_err(|source| ConfigError::InvalidApiUrl {
        url: chosen.to_string(),
        source,
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(chosen.to_string()));
    }

    Ok(chosen.trim_end_matches('/').to_string())
}
