use super::QueueSource;
use async_trait::async_trait;
use taskq_shared::{Message, Payload, TaskqError, TaskqResult};
use tokio::sync::{Mutex, mpsc};

/// In-process queue backed by an unbounded channel.
///
/// Useful for embedding the subscriber and for tests. `pop` returns
/// `QueueClosed` once every [`MemoryQueueSender`] is dropped and the
/// buffer is drained.
pub struct MemoryQueue {
    channel: String,
    rx: Mutex<mpsc::UnboundedReceiver<TaskqResult<Payload>>>,
}

#[derive(Clone)]
pub struct MemoryQueueSender {
    tx: mpsc::UnboundedSender<TaskqResult<Payload>>,
}

impl MemoryQueue {
    pub fn new(channel: impl Into<String>) -> (Self, MemoryQueueSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                channel: channel.into(),
                rx: Mutex::new(rx),
            },
            MemoryQueueSender { tx },
        )
    }
}

impl MemoryQueueSender {
    pub fn push(&self, payload: impl Into<Payload>) -> TaskqResult<()> {
        self.tx
            .send(Ok(payload.into()))
            .map_err(|_| TaskqError::QueueClosed)
    }

    /// Make the next `pop` fail with `Dequeue(reason)`.
    pub fn push_error(&self, reason: impl Into<String>) -> TaskqResult<()> {
        self.tx
            .send(Err(TaskqError::Dequeue(reason.into())))
            .map_err(|_| TaskqError::QueueClosed)
    }
}

#[async_trait]
impl QueueSource for MemoryQueue {
    async fn pop(&self) -> TaskqResult<Message> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Ok(payload)) => Ok(Message::new(self.channel.as_str(), payload)),
            Some(Err(e)) => Err(e),
            None => Err(TaskqError::QueueClosed),
        }
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}
