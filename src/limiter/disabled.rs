use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AcquireError, Limiter, Slot};

/// A limiter that never blocks and never limits.
///
/// Selected by [create_limiter](crate::create_limiter) when the configured
/// capacity is 0, so call sites program against the same [Limiter] surface
/// whether limiting is on or off. Never inspects the server name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLimiter;

#[async_trait]
impl Limiter for DisabledLimiter {
    fn capacity(&self) -> usize {
        0
    }

    async fn acquire(
        &self,
        _cancel: &CancellationToken,
        _server: &str,
    ) -> Result<Slot, AcquireError> {
        Ok(Slot::unbounded())
    }
}
