//! Error types for the catalog HTTP layer.
//!
//! The taxonomy distinguishes locally-recovered conditions (429, 5xx — these
//! only surface once retries are exhausted) from fatal ones (blocked URL,
//! 401/403/404) that are never retried.

use thiserror::Error;

/// Errors produced by [`CatalogClient`](super::CatalogClient).
#[derive(Debug, Error)]
pub enum ApiError {
    /// URL failed the domain-confinement guard (non-HTTPS scheme, host
    /// outside the allowlist, or embedded credentials). Never retried and
    /// checked before any network traffic.
    #[error("blocked URL (outside allowed domain): {url}")]
    BlockedUrl {
        /// The rejected URL.
        url: String,
    },

    /// HTTP 403. Retrying a block is futile and abusive; fail immediately.
    #[error("access denied (HTTP 403) for {url}")]
    AccessDenied {
        /// The URL that was refused.
        url: String,
    },

    /// HTTP 401. Surfaced with an actionable credential hint by callers.
    #[error("unauthorized (HTTP 401) for {url}")]
    Unauthorized {
        /// The URL that required credentials.
        url: String,
    },

    /// HTTP 429 after all retry attempts were spent.
    #[error("rate limited (HTTP 429) for {url} after {attempts} attempts")]
    RateLimited {
        /// The URL that kept rate limiting.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// HTTP 5xx after all retry attempts were spent.
    #[error("server error (HTTP {status}) for {url} after {attempts} attempts")]
    ServerError {
        /// The URL that kept failing.
        url: String,
        /// The last 5xx status observed.
        status: u16,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// HTTP 404. The resource does not exist; no retry.
    #[error("not found (HTTP 404): {url}")]
    NotFound {
        /// The missing resource.
        url: String,
    },

    /// Any other non-retryable HTTP error status (remaining 4xx).
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level failure (DNS, connection refused, TLS, mid-body error).
    #[error("network error for {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout for {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Response body was not the expected JSON shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Creates a blocked-URL error.
    pub fn blocked(url: impl Into<String>) -> Self {
        Self::BlockedUrl { url: url.into() }
    }

    /// Creates a network error, promoting reqwest timeouts to [`ApiError::Timeout`].
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// True for conditions that no amount of retrying will fix.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RateLimited { .. } | Self::ServerError { .. })
    }
}

// No blanket `From<reqwest::Error>`: every variant needs the URL for context,
// so the helper constructors are the conversion surface.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blocked_url_display_names_the_url() {
        let error = ApiError::blocked("ftp://civitai.com/x");
        let msg = error.to_string();
        assert!(msg.contains("blocked URL"), "got: {msg}");
        assert!(msg.contains("ftp://civitai.com/x"), "got: {msg}");
    }

    #[test]
    fn rate_limited_display_includes_attempts() {
        let error = ApiError::RateLimited {
            url: "https://civitai.com/api/v1/models".to_string(),
            attempts: 3,
        };
        let msg = error.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
    }

    #[test]
    fn fatality_classification() {
        assert!(ApiError::blocked("x").is_fatal());
        assert!(
            ApiError::AccessDenied {
                url: "u".to_string()
            }
            .is_fatal()
        );
        assert!(
            !ApiError::RateLimited {
                url: "u".to_string(),
                attempts: 3
            }
            .is_fatal()
        );
        assert!(
            !ApiError::ServerError {
                url: "u".to_string(),
                status: 503,
                attempts: 3
            }
            .is_fatal()
        );
    }
}
