//! Client configuration (endpoints, allowlist, throttle and retry knobs).

use std::time::Duration;

/// Production catalog API base.
pub const DEFAULT_API_BASE: &str = "https://civitai.com/api/v1";

/// Production binary download endpoint, addressed by version id.
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://civitai.com/api/download/models";

/// Host suffix every outbound request must stay inside.
pub const DEFAULT_ALLOWED_HOST: &str = "civitai.com";

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Minimum spacing between any two outbound requests, process wide.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on the random jitter added to each throttle reservation.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(300);

/// Total attempts per request (initial + retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Cap applied to server-specified Retry-After delays before sleeping.
pub const RETRY_AFTER_CAP: Duration = Duration::from_secs(5);

/// Backoff used when a 429 response carries no usable Retry-After.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

/// Fixed backoff applied between retries of 5xx responses.
pub const SERVER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Configuration for [`CatalogClient`](super::CatalogClient).
///
/// Constructed once per process and injected into the components that need
/// it. Fields are public so tests can point the client at a mock server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for JSON API endpoints (`/models`, `/tags`, `/creators`).
    pub api_base: String,

    /// Base URL for the version-id-addressed download endpoint.
    pub download_base: String,

    /// Host (or parent domain) outbound requests are confined to.
    pub allowed_host: String,

    /// Permit plain HTTP. Only mock servers need this; production stays
    /// HTTPS-only.
    pub allow_http: bool,

    /// Minimum spacing between outbound requests across all callers.
    pub min_interval: Duration,

    /// Random jitter bound added to each throttle reservation.
    pub jitter_max: Duration,

    /// Total request attempts, including the first.
    pub max_attempts: u32,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            allowed_host: DEFAULT_ALLOWED_HOST.to_string(),
            allow_http: false,
            min_interval: DEFAULT_MIN_INTERVAL,
            jitter_max: DEFAULT_JITTER_MAX,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Builds a config rooted at a mock server URI: API, download endpoint
    /// and allowlist all point at the given base, HTTP permitted, throttling
    /// effectively disabled so tests stay fast.
    #[must_use]
    pub fn for_test_server(base: &str) -> Self {
        let host = url::Url::parse(base)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        Self {
            api_base: base.trim_end_matches('/').to_string(),
            download_base: format!("{}/download/models", base.trim_end_matches('/')),
            allowed_host: host,
            allow_http: true,
            min_interval: Duration::ZERO,
            jitter_max: Duration::ZERO,
            ..Self::default()
        }
    }
}
