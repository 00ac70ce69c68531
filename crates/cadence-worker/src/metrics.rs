//! Worker pool counters.
//!
//! Counters are plain atomics so that workers, the bus handler and the retry
//! scheduler can update them without coordination. Attempt durations are
//! sampled for percentile reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Maximum number of attempt durations kept in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Pool metrics collector.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    received: AtomicU64,
    rejected: AtomicU64,
    claimed: AtomicU64,
    contended: AtomicU64,
    claim_errors: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    failed_non_retryable: AtomicU64,
    retries_dropped: AtomicU64,
    in_flight: AtomicU64,
    durations: Mutex<Vec<Duration>>,
}

impl PoolMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// A message was accepted into the intake queue.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// A message was refused because the intake was full or closed.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A claim succeeded.
    pub fn record_claimed(&self) {
        self.claimed.fetch_add(1, Ordering::Relaxed);
    }

    /// A claim found the job no longer queued.
    pub fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    /// A claim failed with a store error.
    pub fn record_claim_error(&self) {
        self.claim_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt finished and the job is done.
    pub fn record_completed(&self, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.add_duration_sample(elapsed);
    }

    /// A failed attempt was re-queued for another try.
    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// A job reached its retry ceiling.
    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// A job failed on a precondition and was not retried.
    pub fn record_failed_non_retryable(&self) {
        self.failed_non_retryable.fetch_add(1, Ordering::Relaxed);
    }

    /// A scheduled re-submission was discarded.
    pub fn record_retry_dropped(&self) {
        self.retries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an attempt as in flight until the returned guard is dropped.
    pub fn start_attempt(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight { metrics: self }
    }

    fn add_duration_sample(&self, duration: Duration) {
        let mut samples = self.durations.lock();
        if samples.len() >= MAX_DURATION_SAMPLES {
            samples.remove(0);
        }
        samples.push(duration);
    }

    /// Current values of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut durations = self.durations.lock().clone();
        durations.sort();
        let percentile = |p: usize| durations.get(durations.len() * p / 100).copied();

        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            claim_errors: self.claim_errors.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            failed_non_retryable: self.failed_non_retryable.load(Ordering::Relaxed),
            retries_dropped: self.retries_dropped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            duration_p50: percentile(50),
            duration_p95: percentile(95),
        }
    }
}

/// Guard returned by [`PoolMetrics::start_attempt`].
#[derive(Debug)]
pub struct InFlight<'a> {
    metrics: &'a PoolMetrics,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages accepted into the intake.
    pub received: u64,
    /// Messages refused by a full or closed intake.
    pub rejected: u64,
    /// Successful claims.
    pub claimed: u64,
    /// Claims that found the job already taken.
    pub contended: u64,
    /// Claims that failed on a store error.
    pub claim_errors: u64,
    /// Jobs completed.
    pub completed: u64,
    /// Attempts re-queued for retry.
    pub retried: u64,
    /// Jobs failed at the retry ceiling.
    pub dead_lettered: u64,
    /// Jobs failed without retry.
    pub failed_non_retryable: u64,
    /// Re-submissions discarded by the retry scheduler.
    pub retries_dropped: u64,
    /// Attempts currently running.
    pub in_flight: u64,
    /// Median duration of completed attempts.
    pub duration_p50: Option<Duration>,
    /// 95th percentile duration of completed attempts.
    pub duration_p95: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard() {
        let metrics = PoolMetrics::new();
        {
            let _a = metrics.start_attempt();
            let _b = metrics.start_attempt();
            assert_eq!(metrics.snapshot().in_flight, 2);
        }
        assert_eq!(metrics.snapshot().in_flight, 0);
    }

    #[test]
    fn test_percentiles() {
        let metrics = PoolMetrics::new();
        assert_eq!(metrics.snapshot().duration_p50, None);

        for ms in 1..=100 {
            metrics.record_completed(Duration::from_millis(ms));
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.completed, 100);
        assert_eq!(snapshot.duration_p50, Some(Duration::from_millis(51)));
        assert_eq!(snapshot.duration_p95, Some(Duration::from_millis(96)));
    }
}
