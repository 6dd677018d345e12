use super::QueueSource;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use std::net::SocketAddr;
use taskq_shared::{Message, TaskqError, TaskqResult};
use tokio::sync::OnceCell;

/// Redis list consumer using `BLPOP <channel> 0`.
///
/// The connection is established lazily on the first `pop`, so an
/// unreachable server shows up as retryable dequeue errors rather than a
/// startup failure. Once established, `ConnectionManager` reconnects on
/// its own after connection loss.
pub struct RedisQueue {
    address: SocketAddr,
    channel: String,
    client: ::redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisQueue {
    pub fn new(address: SocketAddr, channel: impl Into<String>) -> TaskqResult<Self> {
        let client = ::redis::Client::open(format!("redis://{}/", address))
            .map_err(|e| TaskqError::QueueAddress(format!("{}: {}", address, e)))?;

        Ok(Self {
            address,
            channel: channel.into(),
            client,
            conn: OnceCell::new(),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    async fn connection(&self) -> TaskqResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::info!(address = %self.address, "Connecting to queue server");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(|e| TaskqError::Dequeue(format!("connect to {}: {}", self.address, e)))?;

        Ok(conn.clone())
    }
}

#[async_trait]
impl QueueSource for RedisQueue {
    async fn pop(&self) -> TaskqResult<Message> {
        let mut conn = self.connection().await?;

        let reply: Option<(String, Vec<u8>)> = ::redis::cmd("BLPOP")
            .arg(&self.channel)
            .arg(0)
            .query_async(&mut conn)
            .await
            .map_err(|e| TaskqError::Dequeue(e.to_string()))?;

        match reply {
            Some((channel, payload)) => Ok(Message::new(channel, payload)),
            None => Err(TaskqError::Dequeue("BLPOP returned no item".into())),
        }
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}
