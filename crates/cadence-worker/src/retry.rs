//! Retry bookkeeping and delayed re-submission.
//!
//! After a fatal failure the store's retry counter is incremented and read
//! back. At the ceiling the job becomes `failed`; below it the job returns to
//! `queued` and its message is handed to the [`RetryScheduler`], which puts
//! it back into the intake queue once the backoff delay has passed.
//!
//! Re-submission is best-effort. The `queued` status in the store is what
//! keeps the job recoverable when a scheduled message is dropped.

use std::future::poll_fn;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

use cadence_core::result::AppResult;
use cadence_core::traits::JobStore;
use cadence_entity::job::JobMessage;

use crate::lifecycle::JobLifecycle;
use crate::metrics::PoolMetrics;
use crate::queue::IntakeQueue;

/// Exponential backoff: `base * 2^(retry_count - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
}

impl BackoffPolicy {
    /// Create a policy with the delay used before the first retry.
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay before the retry that follows the `retry_count`-th failure.
    pub fn delay(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.saturating_sub(1).max(0) as u32;
        self.base.saturating_mul(2u32.saturating_pow(exponent))
    }
}

#[derive(Debug)]
struct ScheduledRetry {
    message: JobMessage,
    delay: Duration,
}

/// Owns the single delay queue of pending re-submissions.
///
/// At most `capacity` re-submissions are outstanding at any time; requests
/// beyond that are dropped.
#[derive(Debug)]
pub struct RetryScheduler {
    requests: mpsc::Sender<ScheduledRetry>,
    outstanding: Arc<AtomicUsize>,
    capacity: usize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    /// Spawn the scheduler task. Fired retries go into `intake`; the task
    /// exits when `cancel` fires or the scheduler is shut down.
    pub fn spawn(
        intake: Arc<IntakeQueue>,
        capacity: usize,
        metrics: Arc<PoolMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        let capacity = capacity.max(1);
        let (requests, receiver) = mpsc::channel(capacity);
        let outstanding = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(run_scheduler(
            receiver,
            intake,
            Arc::clone(&outstanding),
            metrics,
            cancel,
        ));

        Self {
            requests,
            outstanding,
            capacity,
            task: Mutex::new(Some(task)),
        }
    }

    /// Re-submit `message` after `delay`. Returns `false` when the request
    /// was dropped because the scheduler is full or stopped.
    pub fn schedule(&self, message: JobMessage, delay: Duration) -> bool {
        let reserved = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return false;
        }

        match self.requests.try_send(ScheduledRetry { message, delay }) {
            Ok(()) => true,
            Err(_) => {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Re-submissions waiting for their delay.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Stop the scheduler task and wait for it. Pending re-submissions are
    /// discarded.
    pub async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            match task.await {
                Err(e) if e.is_panic() => error!(error = %e, "Retry scheduler task panicked"),
                _ => {}
            }
        }
    }
}

async fn run_scheduler(
    mut receiver: mpsc::Receiver<ScheduledRetry>,
    intake: Arc<IntakeQueue>,
    outstanding: Arc<AtomicUsize>,
    metrics: Arc<PoolMetrics>,
    cancel: CancellationToken,
) {
    let mut queue: DelayQueue<JobMessage> = DelayQueue::new();
    debug!("Retry scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = receiver.recv() => match request {
                Some(ScheduledRetry { message, delay }) => {
                    queue.insert(message, delay);
                }
                None => break,
            },
            Some(expired) = poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                outstanding.fetch_sub(1, Ordering::SeqCst);
                let message = expired.into_inner();
                let job_id = message.job_id;
                match intake.try_enqueue(message) {
                    Ok(()) => debug!(job_id = %job_id, "Re-submitted job"),
                    Err(e) => {
                        metrics.record_retry_dropped();
                        warn!(job_id = %job_id, error = %e, "Dropped retry, job stays queued");
                    }
                }
            }
        }
    }

    if !queue.is_empty() {
        info!(pending = queue.len(), "Retry scheduler stopped with pending retries");
    }
}

/// What the controller did with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `queued`; `scheduled` tells whether a re-submission is pending.
    Requeued {
        /// Failed attempts so far.
        retry_count: i32,
        /// Backoff before the re-submission.
        delay: Duration,
        /// Whether the scheduler accepted the re-submission.
        scheduled: bool,
    },
    /// The ceiling was reached and the job is `failed`.
    DeadLettered {
        /// Failed attempts so far.
        retry_count: i32,
    },
    /// The status write did not apply; the job left `running` some other way.
    Skipped,
}

/// Decides between re-queue and terminal failure after a fatal error.
#[derive(Debug, Clone)]
pub struct RetryController {
    store: Arc<dyn JobStore>,
    lifecycle: JobLifecycle,
    backoff: BackoffPolicy,
    scheduler: Arc<RetryScheduler>,
}

impl RetryController {
    /// Create a controller.
    pub fn new(
        lifecycle: JobLifecycle,
        backoff: BackoffPolicy,
        scheduler: Arc<RetryScheduler>,
    ) -> Self {
        Self {
            store: Arc::clone(lifecycle.store()),
            lifecycle,
            backoff,
            scheduler,
        }
    }

    /// Record the failure of `message`'s job and route it.
    ///
    /// Never waits for the backoff delay.
    pub async fn handle_failure(&self, message: &JobMessage, error: &str) -> AppResult<RetryDecision> {
        let job_id = message.job_id;
        self.store.increment_retry(job_id, error).await?;
        let state = self.store.read_retry_state(job_id).await?;

        if state.is_exhausted() {
            let note = format!("job failed after {} retries: {error}", state.retry_count);
            if !self.lifecycle.fail(job_id, error, &note).await? {
                return Ok(RetryDecision::Skipped);
            }
            return Ok(RetryDecision::DeadLettered {
                retry_count: state.retry_count,
            });
        }

        let delay = self.backoff.delay(state.retry_count);
        let note = format!(
            "attempt {} of {} failed, retrying in {}ms: {error}",
            state.retry_count,
            state.max_retries,
            delay.as_millis()
        );
        if !self.lifecycle.requeue(job_id, &note).await? {
            return Ok(RetryDecision::Skipped);
        }

        let scheduled = self.scheduler.schedule(message.clone(), delay);
        if !scheduled {
            warn!(job_id = %job_id, "Retry scheduler full, job stays queued");
        }
        Ok(RetryDecision::Requeued {
            retry_count: state.retry_count,
            delay,
            scheduled,
        })
    }
}
