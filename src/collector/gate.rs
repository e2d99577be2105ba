use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Admission control for channel fetchers.
///
/// A counting semaphore with `capacity` slots plus instrumentation
/// (current and peak holders). Fairness among waiters is not
/// promised.
///
/// Cloning is cheap; all clones share the same slots.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// A held slot. Dropping it releases the slot, whatever the exit
/// path of the holder (return, `?`, panic, task abort).
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
    inner: Arc<GateInner>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_use: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for a free slot.
    ///
    /// Only fails if the gate was closed, which this crate never does.
    pub async fn acquire(&self) -> Result<GateSlot, AcquireError> {
        let permit = self.inner.semaphore.clone().acquire_owned().await?;

        let now = self.inner.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        Ok(GateSlot {
            _permit: permit,
            inner: self.inner.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots held right now.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous holders observed.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

impl Drop for GateSlot {
    fn drop(&mut self) {
        // Decrement before the permit field is dropped so that
        // `in_use` never exceeds capacity from a waiter's view.
        self.inner.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}
