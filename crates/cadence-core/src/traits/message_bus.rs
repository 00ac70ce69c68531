//! Pub/sub contract with queue-group (competing consumers) semantics.

use async_trait::async_trait;

use crate::result::AppResult;

/// What the subscriber wants the bus to do with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was accepted (or is unusable and should be discarded).
    Ack,
    /// The subscriber could not take the message right now; leave it
    /// unacknowledged so the bus may redeliver it later.
    Retry,
}

/// Subscriber callback. Invoked on the bus delivery task, so it must not block.
pub type MessageHandler = std::sync::Arc<dyn Fn(&[u8]) -> Delivery + Send + Sync>;

/// Handle to an active subscription.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Stop receiving messages and wait for the delivery task to exit.
    async fn unsubscribe(self: Box<Self>) -> AppResult<()>;
}

/// A message bus with at-least-once delivery.
#[async_trait]
pub trait MessageBus: Send + Sync + std::fmt::Debug + 'static {
    /// Return the bus implementation name (e.g. `"redis"`, `"memory"`).
    fn bus_type(&self) -> &str;

    /// Publish a payload. Fire-and-forget: no consumer acknowledgment is awaited.
    async fn publish(&self, topic: &str, payload: &[u8]) -> AppResult<()>;

    /// Subscribe `handler` to `topic` as a member of `group`. Each message is
    /// delivered to exactly one member of the group, possibly more than once.
    async fn queue_subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: MessageHandler,
    ) -> AppResult<Box<dyn Subscription>>;
}
