use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use schemat_store::Block;

/// Debounced background flusher for one block.
///
/// The first write after a flush arms a timer; writes arriving while it is
/// armed are folded into the same flush. The pending flag is cleared before
/// the flush runs, so a write racing with it arms a new timer.
pub(crate) struct Flusher {
    delay: Duration,
    pending: Arc<AtomicBool>,
}

impl Flusher {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Arrange for `block` to be flushed after the delay.
    ///
    /// Without a tokio runtime, or with a zero delay, the block is flushed
    /// inline.
    pub(crate) fn schedule(&self, block: &Arc<dyn Block>, ring: &str) {
        if !block.is_dirty() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.delay.is_zero() => handle,
            _ => {
                if let Err(e) = block.flush() {
                    warn!(ring, error = %e, "flush failed");
                }
                return;
            }
        };
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = Arc::clone(&self.pending);
        let block = Arc::clone(block);
        let delay = self.delay;
        let ring = ring.to_string();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            match tokio::task::spawn_blocking(move || block.flush()).await {
                Ok(Ok(())) => debug!(ring = %ring, "flushed"),
                Ok(Err(e)) => warn!(ring = %ring, error = %e, "flush failed"),
                Err(e) => warn!(ring = %ring, error = %e, "flush task panicked"),
            }
        });
    }
}
