// Rate limiting for outbound provider requests.
//
// One token bucket per data source, shared by every listing task of that
// source. Capacity is the burst allowance; tokens refill continuously at the
// hourly rate. State is in-memory only (resets on restart).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Float slack so a bucket refilled to 0.999999... after an exact wait counts as full.
const EPSILON: f64 = 1e-9;

/// Requests-per-hour ceiling with a burst allowance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_hour: u32,
    pub burst: u32,
}

/// Returned when a wait for a permit was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate limit wait cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Proof that one request token was consumed.
#[derive(Debug)]
#[must_use]
pub struct Permit(());

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Try to consume one token. On failure returns how long until one is available.
    fn try_consume(&mut self, capacity: f64, refill_per_sec: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;

        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / refill_per_sec).max(Duration::from_millis(1)))
        }
    }
}

/// Token bucket rate limiter for one data source.
///
/// Safe to share between listing tasks behind an `Arc`. Waiting suspends the
/// task on a timer, it never spins.
pub struct RateLimiter {
    limit: RateLimit,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let limit = RateLimit {
            requests_per_hour: limit.requests_per_hour.max(1),
            burst: limit.burst.max(1),
        };
        Self {
            limit,
            bucket: Mutex::new(TokenBucket::new(limit.burst as f64)),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    fn refill_per_sec(&self) -> f64 {
        self.limit.requests_per_hour as f64 / 3600.0
    }

    fn try_consume(&self) -> Result<(), Duration> {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bucket.try_consume(self.limit.burst as f64, self.refill_per_sec())
    }

    /// Consume a token if one is available right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        self.try_consume().ok().map(|_| Permit(()))
    }

    /// Wait until a token is available, or until `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let wait = match self.try_consume() {
                Ok(()) => return Ok(Permit(())),
                Err(wait) => wait,
            };

            debug!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
