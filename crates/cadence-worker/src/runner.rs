//! Worker runner: connects the message bus to the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cadence_core::config::BusConfig;
use cadence_core::error::AppError;
use cadence_core::result::AppResult;
use cadence_core::traits::{Delivery, MessageBus, MessageHandler, Subscription};
use cadence_entity::job::JobMessage;

use crate::pool::WorkerPool;
use crate::queue::EnqueueError;

/// Build the bus callback that feeds `pool`.
///
/// Malformed payloads are acknowledged and dropped. A saturated or closed
/// pool answers [`Delivery::Retry`] so the bus keeps the message for later
/// or for another consumer.
pub fn job_handler(pool: Arc<WorkerPool>) -> MessageHandler {
    Arc::new(move |payload: &[u8]| {
        let message = match JobMessage::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Discarding malformed job message");
                return Delivery::Ack;
            }
        };

        let job_id = message.job_id;
        match pool.enqueue(message) {
            Ok(()) => Delivery::Ack,
            Err(EnqueueError::Full) => {
                warn!(job_id = %job_id, "Job queue full, deferring message");
                Delivery::Retry
            }
            Err(EnqueueError::Closed) => {
                warn!(job_id = %job_id, "Worker pool stopped, deferring message");
                Delivery::Retry
            }
        }
    })
}

/// Runs a [`WorkerPool`] subscribed to the job topic.
pub struct WorkerRunner {
    pool: Arc<WorkerPool>,
    bus: Arc<dyn MessageBus>,
    topic: String,
    group: String,
    subscription: tokio::sync::Mutex<Option<Box<dyn Subscription>>>,
}

impl std::fmt::Debug for WorkerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner")
            .field("instance", &self.pool.instance())
            .field("bus", &self.bus.bus_type())
            .field("topic", &self.topic)
            .field("group", &self.group)
            .finish()
    }
}

impl WorkerRunner {
    /// Create a runner for `pool` on the topic and group named in `bus_config`.
    pub fn new(pool: Arc<WorkerPool>, bus: Arc<dyn MessageBus>, bus_config: &BusConfig) -> Self {
        Self {
            pool,
            bus,
            topic: bus_config.topic.clone(),
            group: bus_config.group.clone(),
            subscription: tokio::sync::Mutex::new(None),
        }
    }

    /// The pool driven by this runner.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Start the workers, then subscribe to the job topic.
    pub async fn start(&self, cancel: CancellationToken) -> AppResult<()> {
        self.pool.start(cancel)?;

        let handler = job_handler(Arc::clone(&self.pool));
        let subscription = match self
            .bus
            .queue_subscribe(&self.topic, &self.group, handler)
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                self.pool.stop().await;
                return Err(e);
            }
        };
        *self.subscription.lock().await = Some(subscription);

        info!(
            bus = self.bus.bus_type(),
            topic = %self.topic,
            group = %self.group,
            instance = self.pool.instance(),
            "Worker subscribed"
        );
        Ok(())
    }

    /// Unsubscribe, then stop the pool within `grace`.
    ///
    /// Returns a timeout error when workers are still busy once `grace` has
    /// elapsed. Those workers are detached rather than aborted, so their
    /// current attempts still finish and record an outcome as long as the
    /// runtime stays up.
    pub async fn shutdown(&self, grace: Duration) -> AppResult<()> {
        let subscription = self.subscription.lock().await.take();
        if let Some(subscription) = subscription {
            if let Err(e) = subscription.unsubscribe().await {
                warn!(error = %e, "Failed to unsubscribe cleanly");
            }
        }

        if self.pool.stop_within(grace).await {
            Ok(())
        } else {
            Err(AppError::timeout(format!(
                "workers still busy after {}ms shutdown grace",
                grace.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::config::{PipelineConfig, WorkerConfig};
    use cadence_core::types::{AssetId, JobId};
    use cadence_database::{MemoryAssetStore, MemoryJobStore};

    use crate::executor::StageExecutor;
    use crate::lifecycle::JobLifecycle;

    fn idle_pool(queue_size: usize) -> Arc<WorkerPool> {
        let store = Arc::new(MemoryJobStore::new());
        let executor = StageExecutor::new(
            JobLifecycle::new(store.clone()),
            Arc::new(MemoryAssetStore::new("/srv/cadence")),
            Arc::new(unavailable::Toolkit),
            PipelineConfig::default(),
        );
        let config = WorkerConfig {
            queue_size,
            instance_name: "test".to_string(),
            ..WorkerConfig::default()
        };
        Arc::new(WorkerPool::new(config, store, executor))
    }

    mod unavailable {
        use std::path::Path;
        use std::time::Duration;

        use cadence_core::AppResult;
        use cadence_core::error::AppError;
        use cadence_core::traits::MediaToolkit;
        use cadence_core::types::{MusicalAnalysis, ProbeInfo};

        #[derive(Debug)]
        pub struct Toolkit;

        #[async_trait::async_trait]
        impl MediaToolkit for Toolkit {
            async fn probe(&self, _: &Path, _: Duration) -> AppResult<ProbeInfo> {
                Err(AppError::external_tool("unavailable"))
            }
            async fn transcode(&self, _: &Path, _: &Path, _: Duration) -> AppResult<()> {
                Err(AppError::external_tool("unavailable"))
            }
            async fn loudness(&self, _: &Path, _: Duration) -> AppResult<f64> {
                Err(AppError::external_tool("unavailable"))
            }
            async fn analyze(&self, _: &Path, _: Duration) -> AppResult<MusicalAnalysis> {
                Err(AppError::external_tool("unavailable"))
            }
            async fn waveform(&self, _: &Path, _: &Path, _: Duration) -> AppResult<()> {
                Err(AppError::external_tool("unavailable"))
            }
        }
    }

    fn payload(id: i64) -> Vec<u8> {
        JobMessage::new(JobId(id), AssetId(id), "transcode")
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn test_handler_defers_when_pool_is_full() {
        let pool = idle_pool(1);
        let handler = job_handler(Arc::clone(&pool));

        assert_eq!(handler(&payload(1)), Delivery::Ack);
        assert_eq!(handler(&payload(2)), Delivery::Retry);

        let snapshot = pool.metrics().snapshot();
        assert_eq!(snapshot.received, 1);
        assert_eq!(snapshot.rejected, 1);
    }

    #[test]
    fn test_handler_acks_malformed_payload() {
        let pool = idle_pool(4);
        let handler = job_handler(Arc::clone(&pool));

        assert_eq!(handler(b"{\"job_id\": \"seven\"}"), Delivery::Ack);
        assert!(pool.intake().is_empty());
    }

    #[test]
    fn test_handler_defers_after_close() {
        let pool = idle_pool(4);
        pool.intake().close();
        let handler = job_handler(Arc::clone(&pool));

        assert_eq!(handler(&payload(1)), Delivery::Retry);
    }
}
