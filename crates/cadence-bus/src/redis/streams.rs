//! Redis Streams implementation of [`MessageBus`].
//!
//! Topics map to stream keys and queue groups map to consumer groups, so each
//! entry is handed to exactly one consumer of a group. Entries stay in the
//! group's pending list until the handler answers [`Delivery::Ack`]; anything
//! left pending (handler said `Retry`, or the consumer died) is reclaimed with
//! `XAUTOCLAIM` once it has been idle for `claim_idle_ms` and delivered again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_core::config::BusConfig;
use cadence_core::error::{AppError, ErrorKind};
use cadence_core::result::AppResult;
use cadence_core::traits::{Delivery, MessageBus, MessageHandler, Subscription};

use super::client::RedisClient;

/// Stream entry field that carries the message payload.
const PAYLOAD_FIELD: &str = "payload";

fn bus_err(context: &str, e: redis::RedisError) -> AppError {
    AppError::with_source(ErrorKind::Bus, format!("{context}: {e}"), e)
}

/// Message bus backed by Redis Streams consumer groups.
#[derive(Debug, Clone)]
pub struct RedisStreamsBus {
    client: RedisClient,
    config: BusConfig,
    consumer_prefix: String,
}

impl RedisStreamsBus {
    /// Create a bus over an established connection.
    ///
    /// `consumer_prefix` names this process inside each consumer group.
    pub fn new(client: RedisClient, config: BusConfig, consumer_prefix: impl Into<String>) -> Self {
        Self {
            client,
            config,
            consumer_prefix: consumer_prefix.into(),
        }
    }

    /// Create the consumer group (and the stream) if it does not exist yet.
    pub async fn ensure_group(&self, topic: &str, group: &str) -> AppResult<()> {
        let mut conn = self.client.conn();
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(topic)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => {
                info!(topic, group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(bus_err("XGROUP CREATE failed", e)),
        }
    }
}

#[async_trait]
impl MessageBus for RedisStreamsBus {
    fn bus_type(&self) -> &str {
        "redis"
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> AppResult<()> {
        let mut conn = self.client.conn();
        let id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.config.max_len)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| bus_err("XADD failed", e))?;

        debug!(topic, entry_id = %id, "Published message");
        Ok(())
    }

    async fn queue_subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: MessageHandler,
    ) -> AppResult<Box<dyn Subscription>> {
        self.ensure_group(topic, group).await?;

        let consumer = format!(
            "{}-{}",
            self.consumer_prefix,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let cancel = CancellationToken::new();
        let reader = StreamReader {
            conn: self.client.conn(),
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.clone(),
            handler,
            batch_size: self.config.batch_size,
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            claim_idle_ms: self.config.claim_idle_ms,
            reclaim_interval: Duration::from_millis(self.config.reclaim_interval_ms),
        };

        info!(topic, group, consumer = %consumer, "Subscribed to stream");
        let task = tokio::spawn(reader.run(cancel.clone()));

        Ok(Box::new(RedisSubscription {
            cancel,
            task: Some(task),
        }))
    }
}

/// Background reader for one consumer in one group.
struct StreamReader {
    conn: ConnectionManager,
    topic: String,
    group: String,
    consumer: String,
    handler: MessageHandler,
    batch_size: usize,
    poll_interval: Duration,
    claim_idle_ms: u64,
    reclaim_interval: Duration,
}

impl StreamReader {
    async fn run(mut self, cancel: CancellationToken) {
        let mut last_reclaim = Instant::now();
        let mut reclaim_cursor = "0-0".to_string();

        while !cancel.is_cancelled() {
            if last_reclaim.elapsed() >= self.reclaim_interval {
                last_reclaim = Instant::now();
                match self.reclaim(&reclaim_cursor).await {
                    Ok(next) => reclaim_cursor = next,
                    Err(e) => warn!(topic = %self.topic, error = %e, "Reclaim sweep failed"),
                }
            }

            let delivered = match self.read_new().await {
                Ok(count) => count,
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "Stream read failed");
                    0
                }
            };

            if delivered == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        debug!(topic = %self.topic, consumer = %self.consumer, "Stream reader stopped");
    }

    /// Read entries never delivered to this group. Returns how many arrived.
    async fn read_new(&mut self) -> AppResult<usize> {
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.batch_size)
            .arg("STREAMS")
            .arg(&self.topic)
            .arg(">")
            .query_async(&mut self.conn)
            .await
            .map_err(|e| bus_err("XREADGROUP failed", e))?;

        let entries: Vec<StreamId> = reply
            .map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default();

        let count = entries.len();
        for entry in entries {
            self.deliver(entry).await;
        }
        Ok(count)
    }

    /// Take over entries pending longer than the idle threshold and deliver
    /// them again. Returns the cursor for the next sweep.
    async fn reclaim(&mut self, cursor: &str) -> AppResult<String> {
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.topic)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle_ms)
            .arg(cursor)
            .arg("COUNT")
            .arg(self.batch_size)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| bus_err("XAUTOCLAIM failed", e))?;

        if !reply.claimed.is_empty() {
            debug!(
                topic = %self.topic,
                count = reply.claimed.len(),
                "Reclaimed idle stream entries"
            );
        }
        for entry in reply.claimed {
            self.deliver(entry).await;
        }
        Ok(reply.next_stream_id)
    }

    async fn deliver(&mut self, entry: StreamId) {
        let Some(payload) = entry.get::<Vec<u8>>(PAYLOAD_FIELD) else {
            warn!(entry_id = %entry.id, "Dropping stream entry without payload");
            self.ack(&entry.id).await;
            return;
        };

        match (self.handler)(&payload) {
            Delivery::Ack => self.ack(&entry.id).await,
            Delivery::Retry => {
                debug!(entry_id = %entry.id, "Handler deferred entry; leaving it pending");
            }
        }
    }

    async fn ack(&mut self, entry_id: &str) {
        let acked: redis::RedisResult<i64> = redis::cmd("XACK")
            .arg(&self.topic)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(&mut self.conn)
            .await;
        if let Err(e) = acked {
            warn!(entry_id, error = %e, "XACK failed; entry will be redelivered");
        }
    }
}

/// Handle returned by [`RedisStreamsBus::queue_subscribe`].
struct RedisSubscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn unsubscribe(mut self: Box<Self>) -> AppResult<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| AppError::internal(format!("Stream reader panicked: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for RedisSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
