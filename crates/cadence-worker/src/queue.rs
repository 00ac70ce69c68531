//! Bounded intake queue shared by every worker of a pool.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use cadence_entity::job::JobMessage;

/// Why a message could not be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The queue is at capacity.
    #[error("job queue full")]
    Full,
    /// The queue was closed by shutdown.
    #[error("job queue closed")]
    Closed,
}

/// Multi-producer, multi-consumer bounded queue of job references.
///
/// Producers never wait: [`IntakeQueue::try_enqueue`] fails immediately when
/// the queue is saturated. Consumers share one receiver, so each buffered
/// message is handed to exactly one worker.
#[derive(Debug)]
pub struct IntakeQueue {
    sender: Mutex<Option<mpsc::Sender<JobMessage>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<JobMessage>>,
    capacity: usize,
}

impl IntakeQueue {
    /// Create a queue holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            capacity,
        }
    }

    /// Maximum number of buffered messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered messages (0 once closed).
    pub fn len(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`IntakeQueue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Buffer `message` without waiting.
    pub fn try_enqueue(&self, message: JobMessage) -> Result<(), EnqueueError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(EnqueueError::Closed)?;
        sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Wait for the next message. Returns `None` once the queue is closed
    /// and every buffered message has been taken.
    pub async fn dequeue(&self) -> Option<JobMessage> {
        self.receiver.lock().await.recv().await
    }

    /// Stop accepting messages. Already buffered messages stay available
    /// to [`IntakeQueue::dequeue`].
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!("Intake queue closed");
        }
    }
}
