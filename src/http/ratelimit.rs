use chrono::{DateTime, TimeZone, Utc};
use tracing::{error, warn};

use super::ApiResponse;

/// Below this many remaining requests the client starts warning.
pub const LOW_REMAINING_THRESHOLD: u64 = 10;

/// Backend rate-limit headers as read off a single response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitStatus {
    pub fn from_response(resp: &ApiResponse) -> Self {
        let num = |name: &str| resp.header(name).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            remaining: num("x-ratelimit-remaining"),
            // reset is unix seconds
            reset_at: num("x-ratelimit-reset")
                .and_then(|s| i64::try_from(s).ok())
                .and_then(|s| Utc.timestamp_opt(s, 0).single()),
            retry_after_secs: num("retry-after"),
        }
    }

    pub fn is_low(&self) -> bool {
        self.remaining.map(|r| r < LOW_REMAINING_THRESHOLD).unwrap_or(false)
    }

    /// Emit the client-side rate-limit diagnostics for one response.
    pub fn log(&self, status: u16, path: &str) {
        if status == 429 {
            error!(target: "http", path, retry_after_secs = ?self.retry_after_secs, "rate limited by backend");
        } else if self.is_low() {
            warn!(
                target: "http",
                path,
                remaining = ?self.remaining,
                reset_at = %self.reset_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "unknown".into()),
                "rate limit nearly exhausted"
            );
        }
    }
}
