use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::errors::QueueError;

mod names;

pub use names::{validate_name, ResourceNames, MAX_NAME_LEN};

pub const DEFAULT_QUEUE_NAME: &str = "ringq";
pub const DEFAULT_CAPACITY: u32 = 10;
pub const DEFAULT_SLOT_SIZE: u32 = 20;
pub const DEFAULT_WAIT_MS: u64 = 5_000;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 2_000;

/// Which advisory mechanism producers block on before taking the lock.
///
/// Both are maintained under the queue lock; only one is waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Permits,
    SpaceSignal,
}

impl Default for Admission {
    fn default() -> Self {
        Admission::Permits
    }
}

impl FromStr for Admission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permits" => Ok(Admission::Permits),
            "space_signal" | "space-signal" => Ok(Admission::SpaceSignal),
            other => Err(format!(
                "unknown admission {:?}, expected permits or space_signal",
                other
            )),
        }
    }
}

impl Admission {
    pub(crate) fn to_raw(self) -> u32 {
        match self {
            Admission::Permits => 1,
            Admission::SpaceSignal => 2,
        }
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Admission> {
        match raw {
            1 => Some(Admission::Permits),
            2 => Some(Admission::SpaceSignal),
            _ => None,
        }
    }
}

/// How a participant binds to the named objects of a queue: the receiver
/// creates them, every sender attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Create {
        capacity: u32,
        slot_size: u32,
        admission: Admission,
    },
    Attach,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub capacity: u32,
    pub slot_size: u32,
    pub admission: Admission,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            name: DEFAULT_QUEUE_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
            slot_size: DEFAULT_SLOT_SIZE,
            admission: Admission::default(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        validate_name(&self.name)?;
        validate_layout(self.capacity, self.slot_size)
    }

    pub fn names(&self) -> Result<ResourceNames, QueueError> {
        ResourceNames::new(&self.name)
    }

    pub fn binding(&self) -> Binding {
        Binding::Create {
            capacity: self.capacity,
            slot_size: self.slot_size,
            admission: self.admission,
        }
    }
}

pub fn validate_layout(capacity: u32, slot_size: u32) -> Result<(), QueueError> {
    if capacity < 1 {
        return Err(QueueError::InvalidConfig(
            "capacity must be at least 1".to_string(),
        ));
    }
    if slot_size < 2 {
        // one byte of payload plus the terminating NUL
        return Err(QueueError::InvalidConfig(
            "slot_size must be at least 2".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub queue: QueueConfig,
    pub senders: u32,
    /// Empty means the `sender` binary next to the running executable.
    pub sender_program: String,
    /// Wraps each sender command, e.g. `["xterm", "-e"]` for one console per sender.
    pub launch_prefix: Vec<String>,
    pub sender_args: Vec<String>,
    pub ready_timeout_ms: u64,
    pub message_timeout_ms: u64,
    pub proceed_on_partial_readiness: bool,
    pub log_level: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            queue: QueueConfig::default(),
            senders: 1,
            sender_program: String::new(),
            launch_prefix: Vec::new(),
            sender_args: Vec::new(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            message_timeout_ms: DEFAULT_WAIT_MS,
            proceed_on_partial_readiness: false,
            log_level: "info".to_string(),
        }
    }
}

impl ReceiverConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ReceiverConfig, QueueError> {
        Ok(confy::load_path(path)?)
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        self.queue.validate()?;
        if self.senders == 0 {
            return Err(QueueError::InvalidConfig(
                "at least one sender is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub space_timeout_ms: u64,
    pub attach_timeout_ms: u64,
    pub log_level: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            space_timeout_ms: DEFAULT_WAIT_MS,
            attach_timeout_ms: DEFAULT_ATTACH_TIMEOUT_MS,
            log_level: "info".to_string(),
        }
    }
}

impl SenderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SenderConfig, QueueError> {
        Ok(confy::load_path(path)?)
    }

    pub fn space_timeout(&self) -> Duration {
        Duration::from_millis(self.space_timeout_ms)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }
}
