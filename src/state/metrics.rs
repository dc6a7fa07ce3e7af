use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Width of the sliding window used for the event rate.
const RATE_WINDOW_MS: i64 = 5000;

/// Tracks event-stream and sync activity for the state cache
#[derive(Default)]
pub struct CacheMetrics {
    /// Events that changed the cache
    events_applied: AtomicU64,

    /// Events for unknown ids, unmodelled kinds or mismatched kinds
    events_ignored: AtomicU64,

    /// Event timestamps for rate calculation (sliding 5-second window)
    event_timestamps: RwLock<VecDeque<i64>>,

    /// Connections after the first one
    reconnects: AtomicU64,

    /// True once the stream has connected at least once
    ever_connected: AtomicBool,

    stream_connected: AtomicBool,

    /// Set once the bridge rejects the stream's credentials
    stream_rejected: AtomicBool,

    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        self.record_timestamp();
    }

    pub fn record_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
        self.record_timestamp();
    }

    fn record_timestamp(&self) {
        let now = Utc::now().timestamp_millis();
        let mut timestamps = self
            .event_timestamps
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        timestamps.push_back(now);

        // Prune old timestamps (keep last 5 seconds)
        while let Some(&oldest) = timestamps.front() {
            if now - oldest > RATE_WINDOW_MS {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events per second over the last 5 seconds
    pub fn event_rate(&self) -> f64 {
        let now = Utc::now().timestamp_millis();
        let timestamps = self
            .event_timestamps
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let recent = timestamps
            .iter()
            .filter(|&&t| now - t <= RATE_WINDOW_MS)
            .count();
        recent as f64 / (RATE_WINDOW_MS as f64 / 1000.0)
    }

    pub fn record_connected(&self) {
        if self.ever_connected.swap(true, Ordering::SeqCst) {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.stream_connected.store(true, Ordering::SeqCst);
    }

    pub fn record_disconnected(&self) {
        self.stream_connected.store(false, Ordering::SeqCst);
    }

    pub fn record_rejected(&self) {
        self.stream_connected.store(false, Ordering::SeqCst);
        self.stream_rejected.store(true, Ordering::SeqCst);
    }

    pub fn is_stream_rejected(&self) -> bool {
        self.stream_rejected.load(Ordering::SeqCst)
    }

    pub fn record_sync(&self) {
        *self.last_sync.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    pub fn is_stream_connected(&self) -> bool {
        self.stream_connected.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            event_rate: self.event_rate(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            stream_connected: self.is_stream_connected(),
            stream_rejected: self.is_stream_rejected(),
            last_sync: *self.last_sync.read().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_applied: u64,
    pub events_ignored: u64,
    pub event_rate: f64,
    pub reconnects: u64,
    pub stream_connected: bool,
    pub stream_rejected: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_counters() {
        let metrics = CacheMetrics::new();
        metrics.record_applied();
        metrics.record_applied();
        metrics.record_ignored();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_applied, 2);
        assert_eq!(snapshot.events_ignored, 1);
    }

    #[test]
    fn test_event_rate_calculation() {
        let metrics = CacheMetrics::new();
        for _ in 0..10 {
            metrics.record_applied();
        }
        // 10 events / 5s window
        assert_eq!(metrics.event_rate(), 2.0);
    }

    #[test]
    fn test_reconnects_count_after_first_connection() {
        let metrics = CacheMetrics::new();
        metrics.record_connected();
        assert_eq!(metrics.snapshot().reconnects, 0);

        metrics.record_disconnected();
        assert!(!metrics.is_stream_connected());

        metrics.record_connected();
        metrics.record_disconnected();
        metrics.record_connected();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.reconnects, 2);
        assert!(snapshot.stream_connected);
    }

    #[test]
    fn test_rejection_is_sticky() {
        let metrics = CacheMetrics::new();
        metrics.record_connected();
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert!(snapshot.stream_rejected);
        assert!(!snapshot.stream_connected);
    }

    #[test]
    fn test_last_sync_recorded() {
        let metrics = CacheMetrics::new();
        assert!(metrics.snapshot().last_sync.is_none());
        metrics.record_sync();
        assert!(metrics.snapshot().last_sync.is_some());
    }
}
