use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission control for the submission endpoint: hand out a permit or tell
/// the caller to back off. Callers hold the permit for the duration of the
/// admission work and respond 503 when none is available.
#[derive(Clone)]
pub struct LoadShed {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl LoadShed {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().ok()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.permits.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
