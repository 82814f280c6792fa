//! Startup rendezvous between the receiver and its senders.
//!
//! ```text
//! receiver: create region + sync set
//!           for i in 0..K { create {Q}.ready.i; launch sender i }
//!           wait until every ready signal fired (or timeout)
//! sender i: attach region (retrying while uninitialized) + sync set
//!           open {Q}.ready.i, set it once, then produce
//! ```

use std::time::Duration;

use tracing::info;

use crate::config::{QueueConfig, ResourceNames};
use crate::errors::QueueError;
use crate::reader::MessageReader;
use crate::region::SharedRegion;
use crate::sync::{ReadySignal, SyncSet};
use crate::writer::MessageWriter;

mod launcher;

pub use launcher::{Children, ProcessLauncher, SenderLauncher};

/// Owner of every named object of a queue. Dropping it unlinks them.
pub struct Receiver {
    reader: MessageReader,
    ready: Vec<ReadySignal>,
}

impl Receiver {
    pub fn create(config: &QueueConfig) -> Result<Receiver, QueueError> {
        config.validate()?;
        let names = config.names()?;
        let region = SharedRegion::open(&names, config.binding())?;
        let sync = SyncSet::open(&names, config.binding())?;
        Ok(Receiver {
            reader: MessageReader::new(region, sync),
            ready: Vec::new(),
        })
    }

    pub fn names(&self) -> &ResourceNames {
        self.reader.sync().names()
    }

    /// Creates the ready signals of the next `count` senders without
    /// launching anything; for senders started by some other means.
    pub fn expect_senders(&mut self, count: u32) -> Result<(), QueueError> {
        for _ in 0..count {
            let index = self.ready.len() as u32;
            let ready = self.reader.sync().create_ready(index)?;
            self.ready.push(ready);
        }
        Ok(())
    }

    /// Launches the next `count` senders, each only after its ready signal
    /// exists.
    pub fn launch_senders(
        &mut self,
        count: u32,
        launcher: &mut dyn SenderLauncher,
    ) -> Result<(), QueueError> {
        for _ in 0..count {
            self.expect_senders(1)?;
            let index = self.ready.len() as u32 - 1;
            launcher.launch(self.names().queue(), index)?;
        }
        Ok(())
    }

    pub fn expected_senders(&self) -> u32 {
        self.ready.len() as u32
    }

    /// One-time barrier over every sender expected so far.
    pub fn await_senders(&self, timeout: Duration) -> Result<(), QueueError> {
        self.reader.sync().await_all_ready(&self.ready, timeout)
    }

    pub fn reader(&mut self) -> &mut MessageReader {
        &mut self.reader
    }
}

/// Sender side of the handshake: attach to queue `queue` as sender `index`
/// and signal readiness.
pub fn join(queue: &str, index: u32, attach_timeout: Duration) -> Result<MessageWriter, QueueError> {
    let names = ResourceNames::new(queue)?;
    let writer = MessageWriter::attach(&names, attach_timeout)?;
    writer.sync().open_ready(index)?.signal()?;
    info!(queue, index, admission = ?writer.sync().admission(), "joined queue");
    Ok(writer)
}
