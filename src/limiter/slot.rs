use std::sync::{
    atomic::{self, AtomicUsize},
    Arc,
};

use tokio::sync::OwnedSemaphorePermit;

/// One unit of reserved concurrency for a server.
///
/// Release the slot back to the [Limiter](crate::limiter::Limiter) once the
/// operation against the server is complete. Dropping the slot releases it.
#[derive(Debug)]
#[must_use = "a slot is released as soon as it is dropped"]
pub struct Slot {
    inner: Option<SlotInner>,
}

#[derive(Debug)]
struct SlotInner {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Slot {
    pub(crate) fn new(permit: OwnedSemaphorePermit, in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, atomic::Ordering::SeqCst);
        Self {
            inner: Some(SlotInner {
                _permit: permit,
                in_flight,
            }),
        }
    }

    /// A slot from an unbounded pool. Holds no reservation.
    pub(crate) fn unbounded() -> Self {
        Self { inner: None }
    }
}

impl Drop for SlotInner {
    /// Reduces the number of operations in flight; dropping the permit frees
    /// the slot for the next waiter.
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, atomic::Ordering::SeqCst);
    }
}
