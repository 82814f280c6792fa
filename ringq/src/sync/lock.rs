use raw_sync::locks::{LockGuard, LockImpl, LockInit, Mutex};
use tracing::trace;

use super::segment::Segment;
use crate::errors::QueueError;

/// Process-shared mutex living in its own named segment.
pub struct NamedLock {
    // dropped before the mapping it points into
    lock: Box<dyn LockImpl>,
    segment: Segment,
}

/// Proof that the queue lock is held. Released when dropped, on every path.
pub struct QueueLock<'a> {
    _guard: LockGuard<'a>,
    lock: &'a str,
}

impl QueueLock<'_> {
    /// Name of the lock segment this guard holds.
    pub fn lock_name(&self) -> &str {
        self.lock
    }
}

impl NamedLock {
    pub(crate) fn create(name: String) -> Result<NamedLock, QueueError> {
        let segment = Segment::create(name, Mutex::size_of(None))?;
        let base = segment.as_ptr();
        // SAFETY: the segment is fresh, page aligned and sized for one mutex.
        let (lock, _) = unsafe { Mutex::new(base, base) }
            .map_err(|e| QueueError::sync("creating queue lock", &e))?;
        Ok(NamedLock { lock, segment })
    }

    pub(crate) fn open(name: String) -> Result<NamedLock, QueueError> {
        let segment = Segment::open(name, Mutex::size_of(None))?;
        let base = segment.as_ptr();
        // SAFETY: the creator initialized a mutex at the start of this segment.
        let (lock, _) = unsafe { Mutex::from_existing(base, base) }
            .map_err(|e| QueueError::sync("opening queue lock", &e))?;
        Ok(NamedLock { lock, segment })
    }

    /// Blocks until the lock is free. Unbounded: holders only ever keep it
    /// for one queue mutation.
    pub fn lock(&self) -> Result<QueueLock<'_>, QueueError> {
        let guard = self
            .lock
            .lock()
            .map_err(|e| QueueError::sync(self.segment.name(), &e))?;
        trace!(lock = self.segment.name(), "acquired");
        Ok(QueueLock {
            _guard: guard,
            lock: self.segment.name(),
        })
    }
}
