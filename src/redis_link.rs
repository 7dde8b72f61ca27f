//! Redis Connection Link
//!
//! A lazily established, time-bounded Redis connection shared by the fanout
//! publisher and presence accounting. Nothing connects at startup: the first
//! command opens a `ConnectionManager`, which then reconnects on its own.
//! A timed-out connection is discarded and reopened on the next command.

use redis::aio::ConnectionManager;
use redis::{FromRedisValue, Pipeline};
use std::time::Duration;
use thiserror::Error;

/// Errors talking to Redis
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis operation timed out after {0:?}")]
    Timeout(Duration),
}

pub(crate) struct RedisLink {
    client: redis::Client,
    conn: Option<ConnectionManager>,
    timeout: Duration,
}

impl RedisLink {
    pub fn new(client: redis::Client, timeout: Duration) -> Self {
        Self {
            client,
            conn: None,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Get the connection, opening it first if needed
    pub async fn connection(&mut self) -> Result<&mut ConnectionManager, LinkError> {
        let manager = match self.conn.take() {
            Some(manager) => manager,
            None => {
                let connect = ConnectionManager::new(self.client.clone());
                match tokio::time::timeout(self.timeout, connect).await {
                    Ok(result) => result?,
                    Err(_) => return Err(LinkError::Timeout(self.timeout)),
                }
            }
        };
        Ok(self.conn.insert(manager))
    }

    /// Run a pipeline within the operation timeout
    pub async fn query<T: FromRedisValue>(&mut self, pipe: &Pipeline) -> Result<T, LinkError> {
        let timeout = self.timeout;
        let conn = self.connection().await?;

        match tokio::time::timeout(timeout, pipe.query_async::<T>(conn)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                self.conn = None;
                Err(LinkError::Timeout(timeout))
            }
        }
    }
}
