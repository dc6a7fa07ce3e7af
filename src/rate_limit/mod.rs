// Rate governor for outbound bridge requests
//
// Two token buckets: per-light ("device") requests refill at ~10/s with a
// small burst, grouped-light ("group") requests at ~1/s. Every request the
// transport issues acquires a token first. Waiting never fails on its own;
// only a caller-supplied timeout aborts it.

use dashmap::DashMap;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Which quota a request is charged against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestCategory {
    /// Individual light / resource requests
    Device,
    /// Grouped-light and scene requests
    Group,
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestCategory::Device => write!(f, "device"),
            RequestCategory::Group => write!(f, "group"),
        }
    }
}

/// Rate limit configuration
#[derive(Clone, Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_device_per_second")]
    pub device_per_second: f64,
    #[serde(default = "default_device_burst")]
    pub device_burst: u32,
    #[serde(default = "default_group_per_second")]
    pub group_per_second: f64,
    #[serde(default = "default_group_burst")]
    pub group_burst: u32,
}

fn default_device_per_second() -> f64 {
    10.0
}

fn default_device_burst() -> u32 {
    5
}

fn default_group_per_second() -> f64 {
    1.0
}

fn default_group_burst() -> u32 {
    1
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            device_per_second: default_device_per_second(),
            device_burst: default_device_burst(),
            group_per_second: default_group_per_second(),
            group_burst: default_group_burst(),
        }
    }
}

impl RateLimitConfig {
    fn limits(&self, category: RequestCategory) -> (f64, f64) {
        match category {
            RequestCategory::Device => (self.device_per_second, self.device_burst.max(1) as f64),
            RequestCategory::Group => (self.group_per_second, self.group_burst.max(1) as f64),
        }
    }
}

/// Returned when a token could not be obtained before the deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireTimeout {
    pub category: RequestCategory,
    pub waited: Duration,
}

impl fmt::Display for AcquireTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out after {}ms waiting for a {} request slot",
            self.waited.as_millis(),
            self.category
        )
    }
}

impl std::error::Error for AcquireTimeout {}

/// Token bucket for a single category.
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(refill_per_second: f64, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Try to consume one token. On failure returns how long until one is available.
    fn try_consume(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else if self.refill_per_second <= 0.0 {
            // Misconfigured zero rate: poll slowly rather than spin.
            Err(Duration::from_secs(1))
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_second))
        }
    }
}

/// Per-category token bucket governor.
///
/// Buckets are created lazily on first use and start full. Token accounting
/// for a category happens under that bucket's map entry lock, so concurrent
/// callers never spend the same token twice.
pub struct RateGovernor {
    config: RateLimitConfig,
    buckets: DashMap<RequestCategory, TokenBucket>,
}

impl RateGovernor {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `category` if one is available right now.
    pub fn try_acquire(&self, category: RequestCategory) -> bool {
        self.consume(category).is_ok()
    }

    /// Wait until a token for `category` is available, then consume it.
    pub async fn acquire(&self, category: RequestCategory) {
        loop {
            match self.consume(category) {
                Ok(()) => return,
                Err(wait) => {
                    debug!(category = %category, wait_ms = wait.as_millis() as u64, "Rate governor delaying request");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn acquire_within(
        &self,
        category: RequestCategory,
        timeout: Duration,
    ) -> Result<(), AcquireTimeout> {
        let started = Instant::now();
        tokio::time::timeout(timeout, self.acquire(category))
            .await
            .map_err(|_| AcquireTimeout {
                category,
                waited: started.elapsed(),
            })
    }

    fn consume(&self, category: RequestCategory) -> Result<(), Duration> {
        let mut bucket = self.buckets.entry(category).or_insert_with(|| {
            let (rate, capacity) = self.config.limits(category);
            TokenBucket::new(rate, capacity)
        });
        bucket.try_consume()
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
