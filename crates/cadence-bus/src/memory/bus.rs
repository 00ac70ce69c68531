//! In-memory message bus with queue-group semantics.
//!
//! `publish` hands the payload to one member of every group subscribed to the
//! topic, rotating through members round-robin. Delivery happens on the
//! publisher's task. A `Retry` answer drops the message: there is no pending
//! list to redeliver from, and the durable job status covers the loss.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use cadence_core::result::AppResult;
use cadence_core::traits::{Delivery, MessageBus, MessageHandler, Subscription};

#[derive(Default)]
struct Group {
    members: Vec<(u64, MessageHandler)>,
    next: usize,
}

impl Group {
    fn pick(&mut self) -> Option<MessageHandler> {
        if self.members.is_empty() {
            return None;
        }
        let index = self.next % self.members.len();
        self.next = self.next.wrapping_add(1);
        Some(Arc::clone(&self.members[index].1))
    }
}

#[derive(Default)]
struct State {
    /// topic → group → members
    topics: HashMap<String, HashMap<String, Group>>,
    published: HashMap<String, Vec<Vec<u8>>>,
    dropped: u64,
}

/// Message bus held entirely in process memory.
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<State>>,
    next_member: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBus")
            .field("topics", &state.topics.keys().collect::<Vec<_>>())
            .field("dropped", &state.dropped)
            .finish()
    }
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload published to `topic`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliveries answered with `Retry` (and therefore dropped).
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn bus_type(&self) -> &str {
        "memory"
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> AppResult<()> {
        // Pick receivers under the lock, call them after releasing it so a
        // handler may publish in turn.
        let receivers: Vec<(String, MessageHandler)> = {
            let mut state = self.state.lock();
            state
                .published
                .entry(topic.to_string())
                .or_default()
                .push(payload.to_vec());
            state
                .topics
                .get_mut(topic)
                .map(|groups| {
                    groups
                        .iter_mut()
                        .filter_map(|(name, group)| group.pick().map(|h| (name.clone(), h)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (group, handler) in receivers {
            if handler(payload) == Delivery::Retry {
                debug!(topic, group = %group, "Subscriber deferred message; dropping it");
                self.state.lock().dropped += 1;
            }
        }
        Ok(())
    }

    async fn queue_subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: MessageHandler,
    ) -> AppResult<Box<dyn Subscription>> {
        let member = self.next_member.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .topics
            .entry(topic.to_string())
            .or_default()
            .entry(group.to_string())
            .or_default()
            .members
            .push((member, handler));

        Ok(Box::new(MemorySubscription {
            state: Arc::clone(&self.state),
            topic: topic.to_string(),
            group: group.to_string(),
            member,
        }))
    }
}

struct MemorySubscription {
    state: Arc<Mutex<State>>,
    topic: String,
    group: String,
    member: u64,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn unsubscribe(self: Box<Self>) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(group) = state
            .topics
            .get_mut(&self.topic)
            .and_then(|groups| groups.get_mut(&self.group))
        {
            group.members.retain(|(id, _)| *id != self.member);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: Arc<AtomicUsize>, answer: Delivery) -> MessageHandler {
        Arc::new(move |_payload: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
            answer
        })
    }

    #[tokio::test]
    async fn test_each_message_reaches_one_group_member() {
        let bus = MemoryBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let _sa = bus
            .queue_subscribe("jobs", "workers", counting(a.clone(), Delivery::Ack))
            .await
            .unwrap();
        let _sb = bus
            .queue_subscribe("jobs", "workers", counting(b.clone(), Delivery::Ack))
            .await
            .unwrap();

        for _ in 0..4 {
            bus.publish("jobs", b"{}").await.unwrap();
        }

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_every_group_gets_a_copy() {
        let bus = MemoryBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let _sa = bus
            .queue_subscribe("jobs", "workers", counting(a.clone(), Delivery::Ack))
            .await
            .unwrap();
        let _sb = bus
            .queue_subscribe("jobs", "auditors", counting(b.clone(), Delivery::Ack))
            .await
            .unwrap();

        bus.publish("jobs", b"{}").await.unwrap();

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery_and_retry_drops() {
        let bus = MemoryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = bus
            .queue_subscribe("jobs", "workers", counting(count.clone(), Delivery::Retry))
            .await
            .unwrap();

        bus.publish("jobs", b"one").await.unwrap();
        assert_eq!(bus.dropped(), 1);

        sub.unsubscribe().await.unwrap();
        bus.publish("jobs", b"two").await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.published("jobs"), vec![b"one".to_vec(), b"two".to_vec()]);
    }
}
