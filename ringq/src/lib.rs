//! A bounded message queue in named shared memory, written by any number of
//! sender processes and drained by one receiver.

pub mod cleanup;
pub mod config;
pub mod console;
mod errors;
pub mod handshake;
mod logging;
pub mod reader;
pub mod region;
pub mod ring;
pub mod sync;
pub mod writer;

#[cfg(test)]
mod tests;

pub use config::{
    Admission, Binding, QueueConfig, ReceiverConfig, ResourceNames, SenderConfig,
};
pub use errors::QueueError;
pub use handshake::{join, Children, ProcessLauncher, Receiver, SenderLauncher};
pub use logging::init_tracing;
pub use reader::{MessageReader, PopOutcome};
pub use ring::QueueStatus;
pub use writer::{MessageWriter, PushOutcome};
