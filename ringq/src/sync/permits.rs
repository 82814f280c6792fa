//! Counting admission permits shared between processes.
//!
//! ```text
//! {Q}.permits
//! ┌──────────────┬──────────────┬──────────────────────────────────┐
//! │ mutex        │ event        │ available | max | admission (u32) │
//! └──────────────┴──────────────┴──────────────────────────────────┘
//! ```
//!
//! The event is set iff `available > 0`; both change together under the
//! mutex, so a waiter cannot miss a release.

use std::mem::size_of;
use std::time::{Duration, Instant};

use raw_sync::events::{Event, EventImpl, EventInit, EventState};
use raw_sync::locks::{LockImpl, LockInit, Mutex};
use tracing::{trace, warn};

use super::segment::{align_up, Segment};
use super::signal::{set_event, wait_event};
use crate::config::Admission;
use crate::errors::QueueError;

#[repr(C)]
struct PermitState {
    available: u32,
    max: u32,
    /// Zero until the creator finished; then the queue's `Admission`.
    admission: u32,
}

struct PermitLayout {
    event_offset: usize,
    state_offset: usize,
    size: usize,
}

fn layout() -> PermitLayout {
    let event_offset = align_up(Mutex::size_of(None), 8);
    let state_offset = align_up(event_offset + Event::size_of(None), 8);
    PermitLayout {
        event_offset,
        state_offset,
        size: state_offset + size_of::<PermitState>(),
    }
}

pub struct Permits {
    lock: Box<dyn LockImpl>,
    event: Box<dyn EventImpl>,
    state: *mut PermitState,
    admission: Admission,
    segment: Segment,
}

impl Permits {
    pub(crate) fn create(
        name: String,
        max: u32,
        admission: Admission,
    ) -> Result<Permits, QueueError> {
        let l = layout();
        let segment = Segment::create(name, l.size)?;
        let base = segment.as_ptr();
        // SAFETY: fresh segment sized by `layout()`; each primitive gets its own
        // 8-byte aligned range inside it.
        let (lock, event, state) = unsafe {
            let state = base.add(l.state_offset) as *mut PermitState;
            let (lock, _) = Mutex::new(base, state as *mut u8)
                .map_err(|e| QueueError::sync("creating permit lock", &e))?;
            let (event, _) = Event::new(base.add(l.event_offset), false)
                .map_err(|e| QueueError::sync("creating permit event", &e))?;
            state.write(PermitState {
                available: max,
                max,
                admission: 0,
            });
            (lock, event, state)
        };
        let permits = Permits {
            lock,
            event,
            state,
            admission,
            segment,
        };
        set_event(
            permits.event.as_ref(),
            if max > 0 {
                EventState::Signaled
            } else {
                EventState::Clear
            },
            permits.segment.name(),
        )?;
        let state = permits.state;
        {
            let _guard = permits.guard()?;
            // SAFETY: the permit mutex is held.
            unsafe { (*state).admission = admission.to_raw() };
        }
        Ok(permits)
    }

    pub(crate) fn open(name: String) -> Result<Permits, QueueError> {
        let l = layout();
        let segment = Segment::open(name, l.size)?;
        let base = segment.as_ptr();
        // SAFETY: the creator laid the segment out with the same `layout()`.
        let (lock, event, state) = unsafe {
            let state = base.add(l.state_offset) as *mut PermitState;
            let (lock, _) = Mutex::from_existing(base, state as *mut u8)
                .map_err(|e| QueueError::sync("opening permit lock", &e))?;
            let (event, _) = Event::from_existing(base.add(l.event_offset))
                .map_err(|e| QueueError::sync("opening permit event", &e))?;
            (lock, event, state)
        };
        let raw = {
            let _guard = lock
                .lock()
                .map_err(|e| QueueError::sync(segment.name(), &e))?;
            // SAFETY: the permit mutex is held.
            unsafe { (*state).admission }
        };
        let admission = Admission::from_raw(raw).ok_or_else(|| QueueError::LayoutMismatch {
            name: segment.name().to_string(),
            reason: "admission mode not yet published",
        })?;
        Ok(Permits {
            lock,
            event,
            state,
            admission,
            segment,
        })
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Takes one permit, waiting up to `timeout` for one to be released.
    /// False means the wait timed out and nothing was taken.
    pub fn acquire(&self, timeout: Duration) -> Result<bool, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !wait_event(self.event.as_ref(), remaining, self.segment.name())? {
                return Ok(false);
            }
            let _guard = self.guard()?;
            // SAFETY: the permit mutex is held.
            let state = unsafe { &mut *self.state };
            if state.available > 0 {
                state.available -= 1;
                if state.available == 0 {
                    set_event(self.event.as_ref(), EventState::Clear, self.segment.name())?;
                }
                trace!(available = state.available, "permit acquired");
                return Ok(true);
            }
            // another waiter took the last permit between the event and the lock
        }
    }

    /// Returns one permit. False if the count was already at its maximum.
    pub fn release(&self) -> Result<bool, QueueError> {
        let _guard = self.guard()?;
        // SAFETY: the permit mutex is held.
        let state = unsafe { &mut *self.state };
        let released = if state.available < state.max {
            state.available += 1;
            true
        } else {
            warn!(max = state.max, "permit released beyond its maximum");
            false
        };
        set_event(self.event.as_ref(), EventState::Signaled, self.segment.name())?;
        Ok(released)
    }

    pub fn available(&self) -> Result<u32, QueueError> {
        let _guard = self.guard()?;
        // SAFETY: the permit mutex is held.
        Ok(unsafe { (*self.state).available })
    }

    fn guard(&self) -> Result<raw_sync::locks::LockGuard<'_>, QueueError> {
        self.lock
            .lock()
            .map_err(|e| QueueError::sync(self.segment.name(), &e))
    }
}
