//! Bounded pool of durable-store connections.
//!
//! A semaphore caps the number of connections in existence. `acquire` waits
//! for a permit up to the configured timeout; dropping the wait has no side
//! effects. Idle connections are liveness-checked before reuse.

#[cfg(feature = "db")]
mod sqlite;

#[cfg(feature = "db")]
pub use sqlite::{KeyValue, SqliteConnector};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};

/// Opens and checks connections for a [`Pool`]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a fresh connection
    fn connect(&self) -> Result<Self::Connection>;

    /// Cheap liveness check run before an idle connection is reused
    fn is_valid(&self, conn: &mut Self::Connection) -> bool;
}

/// Pool counters plus current occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub gets: u64,
    pub creates: u64,
    pub reuses: u64,
    pub discarded: u64,
    pub timeouts: u64,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    creates: AtomicU64,
    reuses: AtomicU64,
    discarded: AtomicU64,
    timeouts: AtomicU64,
}

struct Shared<C: Connector> {
    connector: C,
    idle: Mutex<Vec<C::Connection>>,
    permits: Arc<Semaphore>,
    max_size: usize,
    acquire_timeout: Duration,
    counters: Counters,
}

/// Cloneable handle to a shared pool
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> Pool<C> {
    /// Build a pool and open `min_idle` connections up front
    pub fn new(connector: C, config: &PoolConfig) -> Result<Self> {
        if config.max_size == 0 {
            return Err(Error::invalid_input("pool max_size must be greater than 0"));
        }

        let warm = config.min_idle.min(config.max_size);
        let mut idle = Vec::with_capacity(config.max_size);
        for _ in 0..warm {
            idle.push(connector.connect()?);
        }

        let pool = Self {
            shared: Arc::new(Shared {
                connector,
                idle: Mutex::new(idle),
                permits: Arc::new(Semaphore::new(config.max_size)),
                max_size: config.max_size,
                acquire_timeout: config.acquire_timeout(),
                counters: Counters::default(),
            }),
        };
        pool.shared.counters.creates.fetch_add(warm as u64, Ordering::Relaxed);
        debug!(warm, max_size = config.max_size, "Connection pool ready");
        Ok(pool)
    }

    /// Lease a connection, waiting up to the acquire timeout for capacity
    pub async fn acquire(&self) -> Result<PoolHandle<C>> {
        let shared = &self.shared;
        shared.counters.gets.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let waited = tokio::time::timeout(
            shared.acquire_timeout,
            Arc::clone(&shared.permits).acquire_owned(),
        )
        .await;

        let permit = match waited {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                shared.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(waited_ms, "Connection pool exhausted");
                return Err(Error::PoolExhausted { waited_ms });
            }
        };

        // The permit is released by drop if checkout fails
        let conn = self.checkout()?;
        Ok(PoolHandle {
            conn: Some(conn),
            permit: Some(permit),
            shared: Arc::clone(shared),
        })
    }

    fn checkout(&self) -> Result<C::Connection> {
        let shared = &self.shared;
        loop {
            let candidate = shared.idle.lock().map_err(|_| Error::LockPoisoned)?.pop();
            match candidate {
                Some(mut conn) => {
                    if shared.connector.is_valid(&mut conn) {
                        shared.counters.reuses.fetch_add(1, Ordering::Relaxed);
                        return Ok(conn);
                    }
                    shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
                    debug!("Discarded dead pooled connection");
                }
                None => {
                    let conn = shared.connector.connect()?;
                    shared.counters.creates.fetch_add(1, Ordering::Relaxed);
                    debug!("Opened pooled connection");
                    return Ok(conn);
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let idle = shared.idle.lock().map(|i| i.len()).unwrap_or(0);
        PoolStats {
            gets: shared.counters.gets.load(Ordering::Relaxed),
            creates: shared.counters.creates.load(Ordering::Relaxed),
            reuses: shared.counters.reuses.load(Ordering::Relaxed),
            discarded: shared.counters.discarded.load(Ordering::Relaxed),
            timeouts: shared.counters.timeouts.load(Ordering::Relaxed),
            idle,
            in_use: shared.max_size - shared.permits.available_permits(),
            max_size: shared.max_size,
        }
    }
}

/// An exclusively leased connection.
///
/// Returned to the pool by [`PoolHandle::release`] or on drop, whichever
/// comes first.
pub struct PoolHandle<C: Connector> {
    conn: Option<C::Connection>,
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared<C>>,
}

impl<C: Connector> PoolHandle<C> {
    pub fn connection(&self) -> Result<&C::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::invalid_input("pool handle already released"))
    }

    pub fn connection_mut(&mut self) -> Result<&mut C::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::invalid_input("pool handle already released"))
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// Return the connection to the pool; later calls do nothing
    pub fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A poisoned idle list only costs us the connection
            if let Ok(mut idle) = self.shared.idle.lock() {
                if idle.len() < self.shared.max_size {
                    idle.push(conn);
                }
            }
        }
        // Only after the connection is back, so the next waiter finds it
        self.permit.take();
    }

    /// Drop the connection instead of returning it, e.g. after an I/O error
    pub fn discard(&mut self) {
        if self.conn.take().is_some() {
            self.shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
        }
        self.permit.take();
    }
}

impl<C: Connector> Drop for PoolHandle<C> {
    fn drop(&mut self) {
        self.release();
    }
}
