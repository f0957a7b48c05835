use crate::client::types::SyncError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-holder flag serializing mutations. Acquisition never waits: a
/// second caller gets `SyncError::Busy`.
#[derive(Debug, Default)]
pub struct BusyFlag(AtomicBool);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn acquire(&self) -> Result<BusyGuard<'_>, SyncError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(&self.0))
            .map_err(|_| SyncError::Busy)
    }
}

/// Clears the flag on drop, so every exit path releases it.
#[must_use]
pub struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
