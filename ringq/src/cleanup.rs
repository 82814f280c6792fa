//! Removal of named objects left behind by a receiver that did not exit
//! cleanly.

use std::process;
use std::thread;

use shared_memory::ShmemConf;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use crate::config::ResourceNames;
use crate::errors::QueueError;

/// Unlinks every derived name of the queue that still exists, including the
/// ready signals of senders `0..senders`. Returns how many were removed.
pub fn remove_stale(names: &ResourceNames, senders: u32) -> usize {
    let ready = (0..senders).map(|i| names.ready(i));
    let mut removed = 0;
    for name in names.fixed().into_iter().chain(ready) {
        if let Ok(mut shmem) = ShmemConf::new().os_id(&name).open() {
            // dropping an owner unlinks the name
            shmem.set_owner(true);
            drop(shmem);
            info!(%name, "removed stale object");
            removed += 1;
        }
    }
    removed
}

/// Runs `before_exit`, then unlinks the queue's names. What the termination
/// handler does before exiting; returns how many names were removed.
pub fn shutdown<F: FnOnce()>(names: &ResourceNames, senders: u32, before_exit: F) -> usize {
    before_exit();
    remove_stale(names, senders)
}

/// On SIGHUP, SIGINT, SIGQUIT or SIGTERM: runs `before_exit`, unlinks the
/// queue's names and exits with `128 + signal`. Destructors do not run, so
/// `before_exit` has to stop anything they would have.
pub fn unlink_on_termination<F>(
    names: ResourceNames,
    senders: u32,
    before_exit: F,
) -> Result<(), QueueError>
where
    F: FnOnce() + Send + 'static,
{
    let mut signals = Signals::new(&[SIGHUP, SIGINT, SIGQUIT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            warn!(signal, queue = names.queue(), "terminated, removing named objects");
            shutdown(&names, senders, before_exit);
            process::exit(128 + signal);
        }
    });
    Ok(())
}
