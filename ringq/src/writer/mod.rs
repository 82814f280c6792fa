//! Producer protocol, run by every sender.
//!
//! `Idle → WaitingForSpace → WaitingForLock → Mutating → Signaling → Idle`

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::ResourceNames;
use crate::errors::{Attempt, QueueError};
use crate::region::SharedRegion;
use crate::ring::QueueStatus;
use crate::sync::SyncSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent { occupancy: u32, truncated: bool },
    /// No space showed up in time; nothing was written.
    BackpressureTimeout,
}

pub struct MessageWriter {
    region: SharedRegion,
    sync: SyncSet,
}

impl MessageWriter {
    pub fn new(region: SharedRegion, sync: SyncSet) -> MessageWriter {
        MessageWriter { region, sync }
    }

    /// Attaches to a queue someone else created.
    pub fn attach(
        names: &ResourceNames,
        attach_timeout: Duration,
    ) -> Result<MessageWriter, QueueError> {
        let region = SharedRegion::attach_with_retry(names, attach_timeout)?;
        let sync = SyncSet::attach_all(names)?;
        Ok(MessageWriter::new(region, sync))
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn sync(&self) -> &SyncSet {
        &self.sync
    }

    pub fn max_message_len(&self) -> usize {
        self.region.slot_size() as usize - 1
    }

    /// Pushes one message, waiting up to `timeout` for room.
    ///
    /// Messages longer than [`max_message_len`](Self::max_message_len) are
    /// truncated; `Sent::truncated` reports when that happened.
    pub fn push(&mut self, message: &[u8], timeout: Duration) -> Result<PushOutcome, QueueError> {
        let deadline = Instant::now() + timeout;
        let truncated = message.len() > self.max_message_len();
        loop {
            match self.attempt(message, deadline)? {
                Attempt::Done(occupancy) => {
                    trace!(occupancy, len = message.len(), truncated, "pushed");
                    return Ok(PushOutcome::Sent {
                        occupancy,
                        truncated,
                    });
                }
                Attempt::TimedOut => {
                    debug!(?timeout, "no space in queue");
                    return Ok(PushOutcome::BackpressureTimeout);
                }
                Attempt::Retry if Instant::now() >= deadline => {
                    return Ok(PushOutcome::BackpressureTimeout);
                }
                Attempt::Retry => {
                    debug!("queue full despite admission, retrying");
                    thread::yield_now();
                }
            }
        }
    }

    fn attempt(&mut self, message: &[u8], deadline: Instant) -> Result<Attempt<u32>, QueueError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !self.sync.admit(remaining)? {
            return Ok(Attempt::TimedOut);
        }

        let held = self.sync.lock()?;
        let mut queue = self.region.queue(&held);
        if !queue.try_push(message) {
            // stale advisory state; the queue itself is full. The space signal
            // is cleared rather than left set, or space-signal senders spin here.
            self.sync.space().clear()?;
            self.sync.refund()?;
            return Ok(Attempt::Retry);
        }
        self.sync.presence().set()?;
        if queue.is_full() {
            self.sync.space().clear()?;
        }
        Ok(Attempt::Done(queue.occupancy()))
    }

    pub fn status(&mut self) -> Result<QueueStatus, QueueError> {
        let held = self.sync.lock()?;
        let status = self.region.queue(&held).status();
        Ok(status)
    }
}
