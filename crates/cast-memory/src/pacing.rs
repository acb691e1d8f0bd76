//! Request pacing for paginated upstream calls.

use std::time::Duration;

/// Default wait between consecutive page requests.
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// How requests against a rate-limited upstream are spaced and retried.
///
/// `max_attempts` counts the first try, so `1` disables retries. The delay
/// is fixed: the same wait is used between pages and before every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub inter_request_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            max_attempts: 1,
        }
    }
}

impl Pacing {
    pub fn fixed(inter_request_delay: Duration) -> Self {
        Self {
            inter_request_delay,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before attempt number `attempt` (1-based) of the same request.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.inter_request_delay
        }
    }

    /// Whether a request that just failed on `attempt` may be tried again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
