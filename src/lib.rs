//! Per-server admission control for fan-out request dispatchers.

#![deny(missing_docs)]

#[cfg(doctest)]
use doc_comment::doctest;
#[cfg(doctest)]
doctest!("../README.md");

mod limiter;

pub use limiter::{
    create_limiter, AcquireError, BoundedLimiter, DisabledLimiter, Limiter, PoolState, Slot,
};
