//! Named cross-process primitives bound to one queue.
//!
//! The receiver creates every primitive; senders look each one up by the
//! name derived from the queue name. A sender never proceeds with a subset.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Admission, Binding, ResourceNames};
use crate::errors::QueueError;

mod lock;
mod permits;
mod segment;
mod signal;

pub use lock::{NamedLock, QueueLock};
pub use permits::Permits;
pub use signal::Signal;

/// Shortest wait used when polling signals after the barrier deadline passed.
const MIN_POLL: Duration = Duration::from_millis(1);

pub struct SyncSet {
    names: ResourceNames,
    lock: NamedLock,
    presence: Signal,
    space: Signal,
    permits: Permits,
}

impl SyncSet {
    pub fn open(names: &ResourceNames, binding: Binding) -> Result<SyncSet, QueueError> {
        match binding {
            Binding::Create {
                capacity,
                admission,
                ..
            } => SyncSet::create_all(names, capacity, admission),
            Binding::Attach => SyncSet::attach_all(names),
        }
    }

    /// Lock unheld, presence clear, space set, `capacity` permits.
    pub fn create_all(
        names: &ResourceNames,
        capacity: u32,
        admission: Admission,
    ) -> Result<SyncSet, QueueError> {
        let set = SyncSet {
            names: names.clone(),
            lock: NamedLock::create(names.lock())?,
            presence: Signal::create(names.presence(), false)?,
            space: Signal::create(names.space(), true)?,
            permits: Permits::create(names.permits(), capacity, admission)?,
        };
        info!(queue = names.queue(), capacity, ?admission, "created sync set");
        Ok(set)
    }

    pub fn attach_all(names: &ResourceNames) -> Result<SyncSet, QueueError> {
        let set = SyncSet {
            names: names.clone(),
            lock: NamedLock::open(names.lock())?,
            presence: Signal::open(names.presence())?,
            space: Signal::open(names.space())?,
            permits: Permits::open(names.permits())?,
        };
        debug!(queue = names.queue(), admission = ?set.admission(), "attached sync set");
        Ok(set)
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    pub fn admission(&self) -> Admission {
        self.permits.admission()
    }

    pub fn lock(&self) -> Result<QueueLock<'_>, QueueError> {
        self.lock.lock()
    }

    pub fn presence(&self) -> &Signal {
        &self.presence
    }

    pub fn space(&self) -> &Signal {
        &self.space
    }

    pub fn permits(&self) -> &Permits {
        &self.permits
    }

    /// Producer admission: one permit, or the space signal, depending on the
    /// queue's configuration. False means `timeout` elapsed.
    pub(crate) fn admit(&self, timeout: Duration) -> Result<bool, QueueError> {
        match self.admission() {
            Admission::Permits => self.permits.acquire(timeout),
            Admission::SpaceSignal => self.space.wait(timeout),
        }
    }

    /// Gives back what `admit` took when the push did not happen.
    pub(crate) fn refund(&self) -> Result<(), QueueError> {
        if self.admission() == Admission::Permits {
            self.permits.release()?;
        }
        Ok(())
    }

    /// Consumer side: a slot was freed.
    pub(crate) fn slot_freed(&self) -> Result<(), QueueError> {
        self.space.set()?;
        if self.admission() == Admission::Permits {
            self.permits.release()?;
        }
        Ok(())
    }

    /// Receiver side, before sender `index` is launched.
    pub fn create_ready(&self, index: u32) -> Result<ReadySignal, QueueError> {
        Ok(ReadySignal {
            index,
            signal: Signal::create(self.names.ready(index), false)?,
        })
    }

    /// Sender side, after attaching.
    pub fn open_ready(&self, index: u32) -> Result<ReadySignal, QueueError> {
        Ok(ReadySignal {
            index,
            signal: Signal::open(self.names.ready(index))?,
        })
    }

    /// Succeeds only if every listed signal fired within `timeout`; otherwise
    /// names every index that did not.
    pub fn await_all_ready(
        &self,
        ready: &[ReadySignal],
        timeout: Duration,
    ) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        let mut missing = Vec::new();
        for r in ready {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_POLL);
            if r.signal.wait(remaining)? {
                debug!(index = r.index, "sender ready");
            } else {
                missing.push(r.index);
            }
        }
        if missing.is_empty() {
            info!(senders = ready.len(), "all senders ready");
            Ok(())
        } else {
            warn!(?missing, "senders did not signal readiness in time");
            Err(QueueError::PartialReadiness { missing })
        }
    }
}

/// One-shot startup acknowledgment for sender `index`; never reset.
pub struct ReadySignal {
    index: u32,
    signal: Signal,
}

impl ReadySignal {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Safe to repeat, though each sender is expected to call it once.
    pub fn signal(&self) -> Result<(), QueueError> {
        self.signal.set()
    }
}
