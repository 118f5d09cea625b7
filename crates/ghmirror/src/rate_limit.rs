//! Quota tracking for the GitHub REST API.
//!
//! Two mechanisms live here:
//!
//! - **Reactive waiting** ([`RateLimiter::observe`]): after every response the
//!   client reports `x-ratelimit-remaining` / `x-ratelimit-reset`. When the
//!   remaining budget drops below the endpoint's threshold the caller is held
//!   until the window resets, plus a safety margin.
//! - **Proactive pacing** (optional): a governor token bucket that spaces
//!   requests out before they are sent, so bursts do not drain the window.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = Governor<NotKeyed, InMemoryState, DefaultClock>;

/// Fixed quota policy.
pub mod thresholds {
    use std::time::Duration;

    /// Minimum remaining budget before normal endpoints wait for reset.
    pub const CORE_MIN_REMAINING: u64 = 100;
    /// Minimum remaining budget before search endpoints wait for reset.
    pub const SEARCH_MIN_REMAINING: u64 = 5;
    /// Extra time slept past the reset instant for normal endpoints.
    pub const CORE_RESET_MARGIN: Duration = Duration::from_secs(60);
    /// Extra time slept past the reset instant for search endpoints.
    pub const SEARCH_RESET_MARGIN: Duration = Duration::from_secs(20);
    /// Default proactive pacing for GitHub (requests per second).
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
}

/// Last quota snapshot reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    pub remaining_requests: u64,
    pub reset_at: DateTime<Utc>,
    pub is_search: bool,
}

impl RateState {
    #[must_use]
    pub fn threshold(&self) -> u64 {
        if self.is_search {
            thresholds::SEARCH_MIN_REMAINING
        } else {
            thresholds::CORE_MIN_REMAINING
        }
    }

    #[must_use]
    pub fn margin(&self) -> Duration {
        if self.is_search {
            thresholds::SEARCH_RESET_MARGIN
        } else {
            thresholds::CORE_RESET_MARGIN
        }
    }

    /// How long a caller must wait at `now` before issuing another request.
    ///
    /// `None` when the budget is at or above the threshold, or when the
    /// reset instant plus margin has already passed.
    #[must_use]
    pub fn required_wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining_requests >= self.threshold() {
            return None;
        }
        let margin = chrono::Duration::from_std(self.margin()).ok()?;
        let deadline = self.reset_at + margin;
        (deadline - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Shared quota tracker owned by the API client.
pub struct RateLimiter {
    state: Mutex<Option<RateState>>,
    pacer: Option<Arc<GovernorRateLimiter>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// A limiter with reactive waiting only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            pacer: None,
        }
    }

    /// A limiter that also paces requests to `requests_per_second`.
    ///
    /// `0` disables pacing.
    #[must_use]
    pub fn with_pacing(requests_per_second: u32) -> Self {
        let pacer = NonZeroU32::new(requests_per_second)
            .map(|rps| Arc::new(Governor::direct(Quota::per_second(rps))));
        Self {
            state: Mutex::new(None),
            pacer,
        }
    }

    /// Wait for the proactive pacer, if one is configured.
    pub async fn pace(&self) {
        if let Some(ref pacer) = self.pacer {
            pacer.until_ready().await;
        }
    }

    /// The most recent quota snapshot.
    #[must_use]
    pub fn state(&self) -> Option<RateState> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a quota snapshot and wait out the window if it is exhausted.
    ///
    /// Never waits when `remaining` is at or above the endpoint's threshold.
    pub async fn observe(&self, remaining: u64, reset_at: DateTime<Utc>, is_search: bool) {
        let snapshot = RateState {
            remaining_requests: remaining,
            reset_at,
            is_search,
        };
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot);

        let Some(wait) = snapshot.required_wait(Utc::now()) else {
            return;
        };

        tracing::warn!(
            remaining,
            threshold = snapshot.threshold(),
            reset_at = %reset_at.format("%H:%M:%S UTC"),
            wait_secs = wait.as_secs(),
            "Rate limit nearly exhausted, waiting for reset"
        );
        tokio::time::sleep(wait).await;
        tracing::info!("Rate limit window reset, resuming");
    }
}
