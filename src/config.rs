//! Client configuration

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Extra time a watch poll may take beyond its long-poll hint before the
/// client gives up on it.
pub const LONG_POLL_GRACE: Duration = Duration::from_secs(5);

/// Configuration options for the raccoon KV client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the store (default: http://localhost:3000)
    pub endpoint: String,
    /// Timeout for a single `get`/`put` exchange in milliseconds (default: 30000)
    pub request_timeout_ms: u64,
    /// Long-poll hint sent as `?watch=` on every watch poll (default: 60)
    pub watch_timeout_secs: u64,
    /// Upper bound for the watch backoff (default: 60)
    pub max_backoff_secs: u64,
    /// How long idle pooled connections are kept (default: 90000)
    pub pool_idle_timeout_ms: u64,
    /// Speak HTTP/2 only, including prior-knowledge h2c on plain http (default: false)
    pub http2_only: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            request_timeout_ms: 30000,
            watch_timeout_secs: 60,
            max_backoff_secs: 60,
            pool_idle_timeout_ms: 90000,
            http2_only: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `KV_*` environment variables.
    ///
    /// `KV_ENDPOINT` is required. `KV_REQUEST_TIMEOUT`, `KV_WATCH_TIMEOUT_SECS`,
    /// `KV_MAX_BACKOFF_SECS` and `KV_HTTP2_ONLY` fall back to their defaults when
    /// unset or unparsable.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let endpoint = env::var("KV_ENDPOINT").map_err(|_| {
            Error::InvalidConfig("KV_ENDPOINT environment variable must be set".to_string())
        })?;

        let request_timeout_ms = env::var("KV_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| parse_duration_ms(&s))
            .unwrap_or(defaults.request_timeout_ms);

        let watch_timeout_secs = env::var("KV_WATCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.watch_timeout_secs);

        let max_backoff_secs = env::var("KV_MAX_BACKOFF_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_backoff_secs);

        let http2_only = env::var("KV_HTTP2_ONLY")
            .ok()
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.http2_only);

        Ok(ClientConfig {
            endpoint,
            request_timeout_ms,
            watch_timeout_secs,
            max_backoff_secs,
            http2_only,
            ..defaults
        })
    }

    /// Per-request timeout for `get`/`put`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Long-poll hint for watch polls
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }

    /// Backoff ceiling, never below one second
    pub fn max_backoff(&self) -> u64 {
        self.max_backoff_secs.max(1)
    }
}

/// Parse a duration string to milliseconds (supports: 500ms, 30s, 2m, 1500, etc.)
pub fn parse_duration_ms(s: &str) -> Option<u64> {
    let s = s.trim().to_lowercase();
    let (num_str, factor): (&str, u64) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else {
        (s.as_str(), 1)
    };

    num_str.trim().parse::<u64>().ok().map(|n| n.saturating_mul(factor))
}
