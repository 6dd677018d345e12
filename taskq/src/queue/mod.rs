//! Work queue sources.
//!
//! The consumer only needs one primitive: block until the next message is
//! available and return it. Connection handling stays behind this trait.

mod memory;
mod redis;

pub use self::memory::{MemoryQueue, MemoryQueueSender};
pub use self::redis::RedisQueue;

use async_trait::async_trait;
use taskq_shared::{Message, TaskqResult};

/// Blocking "pop next message" primitive.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Wait, without timeout, for the next message.
    ///
    /// Transient failures return [`TaskqError::Dequeue`](taskq_shared::TaskqError::Dequeue);
    /// a source that can never yield again returns
    /// [`TaskqError::QueueClosed`](taskq_shared::TaskqError::QueueClosed).
    async fn pop(&self) -> TaskqResult<Message>;

    /// Channel this source pops from, for logging.
    fn channel(&self) -> &str;
}
