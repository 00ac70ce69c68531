//! Fixed-size pool of worker tasks over one bounded intake queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cadence_core::config::WorkerConfig;
use cadence_core::error::AppError;
use cadence_core::result::AppResult;
use cadence_core::traits::JobStore;
use cadence_core::types::JobId;
use cadence_entity::job::JobMessage;

use crate::claim::{ClaimOutcome, ClaimProtocol};
use crate::executor::{PipelineError, StageExecutor};
use crate::lifecycle::JobLifecycle;
use crate::metrics::PoolMetrics;
use crate::queue::{EnqueueError, IntakeQueue};
use crate::retry::{BackoffPolicy, RetryController, RetryDecision, RetryScheduler};

/// Label used when `worker.instance_name` is empty.
fn default_instance_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}

/// A pool of `concurrency` workers sharing one intake queue.
///
/// Workers hold no lock over a job; the store's claim decides ownership.
#[derive(Debug)]
pub struct WorkerPool {
    config: WorkerConfig,
    instance: String,
    intake: Arc<IntakeQueue>,
    lifecycle: JobLifecycle,
    executor: Arc<StageExecutor>,
    metrics: Arc<PoolMetrics>,
    tasks: Mutex<Option<JoinSet<()>>>,
    scheduler: Mutex<Option<Arc<RetryScheduler>>>,
}

impl WorkerPool {
    /// Create a pool. Nothing runs until [`WorkerPool::start`].
    pub fn new(config: WorkerConfig, store: Arc<dyn JobStore>, executor: StageExecutor) -> Self {
        let instance = if config.instance_name.trim().is_empty() {
            default_instance_name()
        } else {
            config.instance_name.trim().to_string()
        };

        Self {
            intake: Arc::new(IntakeQueue::new(config.queue_size)),
            lifecycle: JobLifecycle::new(store),
            executor: Arc::new(executor),
            metrics: Arc::new(PoolMetrics::new()),
            tasks: Mutex::new(None),
            scheduler: Mutex::new(None),
            instance,
            config,
        }
    }

    /// Instance label; worker labels are `"<instance>-w<index>"`.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Shared metrics.
    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    /// The intake queue.
    pub fn intake(&self) -> &Arc<IntakeQueue> {
        &self.intake
    }

    /// Spawn the workers and the retry scheduler.
    ///
    /// When `cancel` fires, workers stop taking messages from the intake.
    /// Attempts already running finish under their own deadline.
    pub fn start(&self, cancel: CancellationToken) -> AppResult<()> {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return Err(AppError::conflict("worker pool already started"));
        }

        let scheduler = Arc::new(RetryScheduler::spawn(
            Arc::clone(&self.intake),
            self.config.max_pending_retries,
            Arc::clone(&self.metrics),
            cancel.clone(),
        ));
        *self.scheduler.lock() = Some(Arc::clone(&scheduler));

        let shared = Arc::new(Worker {
            intake: Arc::clone(&self.intake),
            claim: ClaimProtocol::new(Arc::clone(self.lifecycle.store())),
            lifecycle: self.lifecycle.clone(),
            executor: Arc::clone(&self.executor),
            retry: RetryController::new(
                self.lifecycle.clone(),
                BackoffPolicy::new(self.config.retry_base_delay()),
                scheduler,
            ),
            metrics: Arc::clone(&self.metrics),
            job_timeout: self.config.job_timeout(),
        });

        info!(
            instance = %self.instance,
            concurrency = self.config.concurrency,
            queue_size = self.intake.capacity(),
            job_timeout_secs = self.config.job_timeout_seconds,
            "Starting worker pool"
        );

        let mut join_set = JoinSet::new();
        for i in 0..self.config.concurrency.max(1) {
            let label = format!("{}-w{i}", self.instance);
            join_set.spawn(Arc::clone(&shared).run(label, cancel.clone()));
        }
        *tasks = Some(join_set);
        Ok(())
    }

    /// Offer a message to the pool without waiting.
    pub fn enqueue(&self, message: JobMessage) -> Result<(), EnqueueError> {
        let job_id = message.job_id;
        match self.intake.try_enqueue(message) {
            Ok(()) => {
                self.metrics.record_received();
                debug!(job_id = %job_id, "Job enqueued");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_rejected();
                Err(e)
            }
        }
    }

    /// Close the intake and wait for every worker to return.
    ///
    /// Without a prior cancellation, workers first drain the messages still
    /// buffered in the intake.
    pub async fn stop(&self) {
        self.shut_down(None).await;
    }

    /// Like [`WorkerPool::stop`], but waits at most `grace` for the workers.
    ///
    /// Returns `false` when workers were still busy at the deadline. Those
    /// tasks are detached, not aborted: their attempts run to completion
    /// and record their outcome while the runtime is alive. The retry
    /// scheduler is shut down either way.
    pub async fn stop_within(&self, grace: Duration) -> bool {
        self.shut_down(Some(grace)).await
    }

    async fn shut_down(&self, grace: Option<Duration>) -> bool {
        self.intake.close();

        let mut drained = true;
        let tasks = self.tasks.lock().take();
        if let Some(mut tasks) = tasks {
            info!(instance = %self.instance, "Waiting for workers to finish");
            let join_all = async {
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = %e, "Worker task failed");
                    }
                }
            };
            match grace {
                None => join_all.await,
                Some(grace) => {
                    if tokio::time::timeout(grace, join_all).await.is_err() {
                        warn!(
                            instance = %self.instance,
                            busy = tasks.len(),
                            grace_ms = grace.as_millis() as u64,
                            "Workers still busy after shutdown grace, detaching"
                        );
                        tasks.detach_all();
                        drained = false;
                    }
                }
            }
        }

        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        info!(instance = %self.instance, drained, "Worker pool stopped");
        drained
    }
}

/// State shared by the worker tasks of one pool.
#[derive(Debug)]
struct Worker {
    intake: Arc<IntakeQueue>,
    claim: ClaimProtocol,
    lifecycle: JobLifecycle,
    executor: Arc<StageExecutor>,
    retry: RetryController,
    metrics: Arc<PoolMetrics>,
    job_timeout: Duration,
}

impl Worker {
    async fn run(self: Arc<Self>, label: String, cancel: CancellationToken) {
        debug!(worker = %label, "Worker started");
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = self.intake.dequeue() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.process(&label, message).await;
        }
        debug!(worker = %label, "Worker stopped");
    }

    async fn process(&self, worker: &str, message: JobMessage) {
        let job_id = message.job_id;

        match self.claim.claim(job_id, worker).await {
            Ok(ClaimOutcome::Claimed) => self.metrics.record_claimed(),
            Ok(ClaimOutcome::Contended) => {
                self.metrics.record_contended();
                debug!(job_id = %job_id, worker, "Job already taken, skipping");
                return;
            }
            Err(e) => {
                self.metrics.record_claim_error();
                error!(job_id = %job_id, worker, error = %e, "Claim failed, abandoning message");
                return;
            }
        }

        let _in_flight = self.metrics.start_attempt();
        info!(job_id = %job_id, worker, job_type = %message.job_type, "Processing job");

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.job_timeout, self.executor.execute(&message))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout {
                seconds: self.job_timeout.as_secs(),
            }),
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(()) => self.complete(worker, job_id, elapsed).await,
            Err(err) if !err.is_retryable() => self.fail_permanently(worker, &message, &err).await,
            Err(err) => self.retry(worker, &message, &err).await,
        }
    }

    async fn complete(&self, worker: &str, job_id: JobId, elapsed: Duration) {
        let note = format!("completed in {:.1}s", elapsed.as_secs_f64());
        match self.lifecycle.complete(job_id, &note).await {
            Ok(true) => {
                self.metrics.record_completed(elapsed);
                info!(job_id = %job_id, worker, elapsed_ms = elapsed.as_millis() as u64, "Job completed");
            }
            Ok(false) => warn!(job_id = %job_id, worker, "Job left running before completion"),
            Err(e) => error!(job_id = %job_id, worker, error = %e, "Failed to mark job done"),
        }
    }

    async fn fail_permanently(&self, worker: &str, message: &JobMessage, err: &PipelineError) {
        let job_id = message.job_id;
        let error = err.to_string();
        self.metrics.record_failed_non_retryable();
        error!(job_id = %job_id, worker, error = %error, "Job failed without retry");

        if let Err(e) = self
            .lifecycle
            .fail(job_id, &error, &format!("failed: {error}"))
            .await
        {
            error!(job_id = %job_id, worker, error = %e, "Failed to mark job failed");
        }
    }

    async fn retry(&self, worker: &str, message: &JobMessage, err: &PipelineError) {
        let job_id = message.job_id;
        let error = err.to_string();

        match self.retry.handle_failure(message, &error).await {
            Ok(RetryDecision::Requeued {
                retry_count, delay, ..
            }) => {
                self.metrics.record_retried();
                warn!(
                    job_id = %job_id,
                    worker,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Job failed, will retry"
                );
            }
            Ok(RetryDecision::DeadLettered { retry_count }) => {
                self.metrics.record_dead_lettered();
                error!(job_id = %job_id, worker, retry = retry_count, error = %error, "Job failed permanently");
            }
            Ok(RetryDecision::Skipped) => {
                warn!(job_id = %job_id, worker, "Job left running before the retry was recorded");
            }
            Err(e) => {
                error!(job_id = %job_id, worker, error = %e, "Failed to record job failure");
            }
        }
    }
}
