//! Consumer protocol, run by the receiver.
//!
//! `Idle → WaitingForMessage → WaitingForLock → Mutating → Signaling → Idle`

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::errors::{Attempt, QueueError};
use crate::region::SharedRegion;
use crate::ring::QueueStatus;
use crate::sync::SyncSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopOutcome {
    Received(Vec<u8>),
    /// The queue stayed empty for the whole wait. Not a failure.
    NoMessageTimeout,
}

pub struct MessageReader {
    region: SharedRegion,
    sync: SyncSet,
}

impl MessageReader {
    pub fn new(region: SharedRegion, sync: SyncSet) -> MessageReader {
        MessageReader { region, sync }
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn sync(&self) -> &SyncSet {
        &self.sync
    }

    /// Pops the oldest message, waiting up to `timeout` for one to arrive.
    pub fn pop(&mut self, timeout: Duration) -> Result<PopOutcome, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.attempt(deadline)? {
                Attempt::Done(message) => {
                    trace!(len = message.len(), "popped");
                    return Ok(PopOutcome::Received(message));
                }
                Attempt::TimedOut => return Ok(PopOutcome::NoMessageTimeout),
                Attempt::Retry => debug!("presence set on an empty queue, retrying"),
            }
        }
    }

    fn attempt(&mut self, deadline: Instant) -> Result<Attempt<Vec<u8>>, QueueError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !self.sync.presence().wait(remaining)? {
            return Ok(Attempt::TimedOut);
        }

        let held = self.sync.lock()?;
        let mut queue = self.region.queue(&held);
        let message = match queue.try_pop() {
            Some(message) => message,
            None => {
                self.sync.presence().clear()?;
                return Ok(Attempt::Retry);
            }
        };
        if queue.is_empty() {
            self.sync.presence().clear()?;
        }
        self.sync.slot_freed()?;
        Ok(Attempt::Done(message))
    }

    pub fn status(&mut self) -> Result<QueueStatus, QueueError> {
        let held = self.sync.lock()?;
        let status = self.region.queue(&held).status();
        Ok(status)
    }
}
