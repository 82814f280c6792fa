use std::{fmt, io};

use shared_memory::ShmemError;

#[derive(Debug)]
pub enum QueueError {
    /// A named segment could not be created or sized.
    Storage { name: String, source: ShmemError },
    /// Attach before creation, or a typo in the queue name.
    NotFound { name: String, source: ShmemError },
    /// The attached region has not been initialized (yet) by its creator.
    LayoutMismatch { name: String, reason: &'static str },
    /// Senders that never signaled readiness before the barrier timed out.
    PartialReadiness { missing: Vec<u32> },
    /// raw_sync reports errors as boxed trait objects that are not `Send`,
    /// so only their text is kept.
    Sync(String),
    InvalidConfig(String),
    Config(confy::ConfyError),
    Io(io::Error),
}

impl QueueError {
    /// Only a not-yet-initialized region is worth retrying in place.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::LayoutMismatch { .. })
    }

    pub(crate) fn sync<E: fmt::Display + ?Sized>(what: &str, e: &E) -> QueueError {
        QueueError::Sync(format!("{}: {}", what, e))
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Storage { name, source } => {
                write!(f, "Cannot create shared segment {}: {}", name, source)
            }
            QueueError::NotFound { name, source } => {
                write!(f, "Shared segment {} not found: {}", name, source)
            }
            QueueError::LayoutMismatch { name, reason } => {
                write!(f, "Layout mismatch in {}: {}", name, reason)
            }
            QueueError::PartialReadiness { missing } => {
                write!(f, "Senders never signaled readiness: {:?}", missing)
            }
            QueueError::Sync(s) => write!(f, "Synchronization error: {}", s),
            QueueError::InvalidConfig(s) => write!(f, "Invalid configuration: {}", s),
            QueueError::Config(e) => write!(f, "Configuration error: {}", e),
            QueueError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueueError::Storage { source, .. } => Some(source),
            QueueError::NotFound { source, .. } => Some(source),
            QueueError::Config(e) => Some(e),
            QueueError::Io(e) => Some(e),
            QueueError::LayoutMismatch { .. }
            | QueueError::PartialReadiness { .. }
            | QueueError::Sync(_)
            | QueueError::InvalidConfig(_) => None,
        }
    }
}

impl From<io::Error> for QueueError {
    fn from(err: io::Error) -> Self {
        QueueError::Io(err)
    }
}

impl From<confy::ConfyError> for QueueError {
    fn from(err: confy::ConfyError) -> Self {
        QueueError::Config(err)
    }
}

/// Result of a single pass through a wait/lock/mutate protocol.
///
/// `Retry` is the race between an advisory signal and the authoritative queue
/// state. Callers loop on it and never hand it further out.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Attempt<T> {
    Done(T),
    TimedOut,
    Retry,
}
