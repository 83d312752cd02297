use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::Semaphore, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use disabled::DisabledLimiter;
pub use slot::Slot;

mod disabled;
mod slot;

/// Limits the number of in-flight operations per backend server.
///
/// Concurrency is reserved through [Slot]s. Acquire a slot for a server before
/// dispatching to it, and release the slot once the operation is finished.
/// Dropping a [Slot] releases it, so the reservation is returned on every exit
/// path of the guarded operation, including error paths.
#[async_trait]
pub trait Limiter: Debug + Send + Sync {
    /// The maximum number of slots per server.
    ///
    /// Returns 0 when limiting is disabled, meaning "unbounded".
    fn capacity(&self) -> usize;

    /// Acquire a [Slot] for `server`, waiting for one to become free.
    ///
    /// Races the wait against `cancel`: whichever resolves first determines
    /// the outcome. On cancellation the caller holds no slot.
    async fn acquire(&self, cancel: &CancellationToken, server: &str)
        -> Result<Slot, AcquireError>;

    /// Acquire a [Slot] for `server`, waiting for at most `duration`.
    ///
    /// A deadline expressed as a cancellation signal; the elapsed case maps to
    /// [AcquireError::Cancelled].
    async fn acquire_timeout(
        &self,
        duration: Duration,
        server: &str,
    ) -> Result<Slot, AcquireError> {
        let never = CancellationToken::new();
        match timeout(duration, self.acquire(&never, server)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(server, "timed out waiting for a slot");
                Err(AcquireError::Cancelled)
            }
        }
    }

    /// Return the [Slot] to its pool.
    ///
    /// Equivalent to dropping it. Never blocks.
    fn release(&self, slot: Slot) {
        drop(slot);
    }
}

/// The error returned by a failed [Limiter::acquire].
///
/// A failed acquire holds no slot, so pool occupancy is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The cancellation signal resolved before a slot became free.
    #[error("cancelled while waiting for a slot")]
    Cancelled,

    /// The server is not in the set the limiter was built with.
    #[error("unknown server: {0}")]
    UnknownServer(String),
}

/// Create a limiter for a specific list of servers.
///
/// A `capacity` of 0 disables limiting: every acquire succeeds immediately.
/// Callers program against the returned [Limiter] either way.
pub fn create_limiter<I, S>(servers: I, capacity: usize) -> Arc<dyn Limiter>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if capacity == 0 {
        Arc::new(DisabledLimiter)
    } else {
        Arc::new(BoundedLimiter::new(servers, capacity))
    }
}

/// A limiter holding one slot pool of a fixed capacity per server.
///
/// The server set and the capacity are fixed at construction. Pools are fully
/// independent: saturating one server never delays acquires for another.
#[derive(Debug)]
pub struct BoundedLimiter {
    pools: HashMap<String, Pool>,
    capacity: usize,
}

#[derive(Debug)]
struct Pool {
    slots: Arc<Semaphore>,

    /// Best-effort, for snapshots.
    in_flight: Arc<AtomicUsize>,
}

/// A snapshot of one server's pool in a [BoundedLimiter].
///
/// Not guaranteed to be consistent under high concurrency.
#[derive(Debug, Clone, Copy)]
pub struct PoolState {
    capacity: usize,
    available: usize,
    in_flight: usize,
}

impl BoundedLimiter {
    /// Create a limiter with one pool of `capacity` slots per server.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Use [create_limiter] to map 0 to a
    /// [DisabledLimiter] instead.
    pub fn new<I, S>(servers: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        assert!(capacity >= 1);

        let pools = servers
            .into_iter()
            .map(|server| (server.into(), Pool::new(capacity)))
            .collect();

        Self { pools, capacity }
    }

    /// The current state of the pool for `server`, if it is configured.
    pub fn state(&self, server: &str) -> Option<PoolState> {
        self.pools.get(server).map(|pool| PoolState {
            capacity: self.capacity,
            available: pool.slots.available_permits(),
            in_flight: pool.in_flight.load(Ordering::Acquire),
        })
    }
}

#[async_trait]
impl Limiter for BoundedLimiter {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn acquire(
        &self,
        cancel: &CancellationToken,
        server: &str,
    ) -> Result<Slot, AcquireError> {
        let pool = self
            .pools
            .get(server)
            .ok_or_else(|| AcquireError::UnknownServer(server.to_owned()))?;

        tokio::select! {
            permit = Arc::clone(&pool.slots).acquire_owned() => match permit {
                Ok(permit) => Ok(Slot::new(permit, Arc::clone(&pool.in_flight))),
                Err(_) => panic!("we own the semaphore, we shouldn't have closed it"),
            },
            () = cancel.cancelled() => {
                warn!(server, "cancelled while waiting for a slot");
                Err(AcquireError::Cancelled)
            }
        }
    }
}

impl Pool {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PoolState {
    /// The maximum number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    /// The number of free slots.
    pub fn available(&self) -> usize {
        self.available
    }
    /// The number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
