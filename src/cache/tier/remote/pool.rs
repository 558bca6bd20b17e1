//! Bounded connection pool for the remote tier
//!
//! A fixed number of multiplexed connections guarded by a semaphore.
//! Callers queue for a slot up to the configured acquire deadline and
//! then receive `RemoteUnavailable`. Each slot tracks consecutive
//! command errors; a slot that reaches the error ceiling is retired and
//! reconnected on next use. Every command carries its own deadline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, warn};
use redis::aio::MultiplexedConnection;
use redis::FromRedisValue;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

use crate::cache::config::types::RemoteTierConfig;
use crate::cache::error::CacheError;

struct Slot {
    conn: Option<MultiplexedConnection>,
    error_count: u32,
}

/// Fixed-size pool of multiplexed redis connections.
pub struct ConnectionPool {
    client: redis::Client,
    permits: Semaphore,
    slots: Vec<Mutex<Slot>>,
    next_slot: AtomicUsize,
    config: RemoteTierConfig,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.slots.len())
            .finish()
    }
}

impl ConnectionPool {
    /// Create the pool. Connections are established lazily on first use
    /// so a cold remote does not block cache startup.
    pub fn new(config: RemoteTierConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::remote(format!("invalid remote url: {}", e)))?;
        let slots = (0..config.pool_size)
            .map(|_| {
                Mutex::new(Slot {
                    conn: None,
                    error_count: 0,
                })
            })
            .collect();
        Ok(Self {
            client,
            permits: Semaphore::new(config.pool_size),
            slots,
            next_slot: AtomicUsize::new(0),
            config,
        })
    }

    /// Run one command with the pool's timeout and retry contract:
    /// a failing command retires its connection and is retried once on a
    /// fresh one; a second failure surfaces to the caller.
    pub async fn command<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, CacheError> {
        let _permit = match timeout(
            Duration::from_millis(self.config.acquire_timeout_ms),
            self.permits.acquire(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CacheError::remote("connection pool closed")),
            Err(_) => return Err(CacheError::remote("connection pool exhausted")),
        };

        // The permit guarantees a free slot exists; scan from the
        // round-robin cursor until one unlocks.
        let start = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let mut slot = None;
        for i in 0..self.slots.len() {
            let idx = (start + i) % self.slots.len();
            if let Ok(guard) = self.slots[idx].try_lock() {
                slot = Some(guard);
                break;
            }
        }
        let mut slot = match slot {
            Some(s) => s,
            // All slots transiently locked; fall back to waiting on one.
            None => self.slots[start % self.slots.len()].lock().await,
        };

        match self.run_on_slot(&mut slot, cmd).await {
            Ok(value) => Ok(value),
            Err(first_err) => {
                debug!("remote command failed, retrying on fresh connection: {}", first_err);
                slot.conn = None;
                self.run_on_slot(&mut slot, cmd).await.map_err(|e| {
                    warn!("remote command failed after retry: {}", e);
                    e
                })
            }
        }
    }

    async fn run_on_slot<T: FromRedisValue>(
        &self,
        slot: &mut Slot,
        cmd: &redis::Cmd,
    ) -> Result<T, CacheError> {
        let deadline = Duration::from_millis(self.config.command_timeout_ms);

        if slot.error_count >= self.config.max_error_count {
            debug!("retiring connection after {} consecutive errors", slot.error_count);
            slot.conn = None;
            slot.error_count = 0;
        }

        if slot.conn.is_none() {
            let connected = timeout(deadline, self.client.get_multiplexed_async_connection())
                .await
                .map_err(|_| CacheError::Timeout)?
                .map_err(CacheError::from)?;
            slot.conn = Some(connected);
        }

        let Some(conn) = slot.conn.as_mut() else {
            return Err(CacheError::Internal("connection slot empty".to_string()));
        };
        let result = timeout(deadline, cmd.query_async::<T>(conn)).await;
        match result {
            Ok(Ok(value)) => {
                slot.error_count = 0;
                Ok(value)
            }
            Ok(Err(err)) => {
                slot.error_count += 1;
                Err(CacheError::from(err))
            }
            Err(_) => {
                slot.error_count += 1;
                Err(CacheError::Timeout)
            }
        }
    }

    /// Stop handing out connections. In-flight commands finish; later
    /// acquisitions fail fast.
    pub fn close(&self) {
        self.permits.close();
    }
}
