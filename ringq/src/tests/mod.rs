use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{Admission, QueueConfig};

mod protocol_tests;

/// Queue names must not collide between tests running in parallel, nor
/// between concurrent `cargo test` invocations.
fn unique_queue(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "rqt-{}-{}-{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

fn queue_config(tag: &str, capacity: u32, slot_size: u32, admission: Admission) -> QueueConfig {
    QueueConfig {
        name: unique_queue(tag),
        capacity,
        slot_size,
        admission,
    }
}
