//! Receiver and senders in separate OS processes.
//!
//! The test executable launches itself once per sender, with the role and
//! sender index in environment variables:
//!
//! ```text
//! [test process]  create queue, ready.0..K ──► spawn self (RINGQ_E2E_ROLE=sender) × K
//!                 await ready ◄── each child: join, set ready.i
//!                 pop K × M  ◄── each child: push M tagged messages, exit
//! ```
//!
//! ```bash
//! cargo test -p ringq --test e2e_processes -- --nocapture
//! ```

use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::process::{Child, Command};
use std::time::Duration;

use ringq::ring::check_cursors;
use ringq::{Admission, PopOutcome, PushOutcome, QueueConfig, Receiver, SenderLauncher};

macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "RINGQ_E2E_ROLE";
const ENV_QUEUE: &str = "RINGQ_E2E_QUEUE";
const ENV_INDEX: &str = "RINGQ_E2E_INDEX";
const ROLE_SENDER: &str = "sender";

const SENDERS: u32 = 3;
const MESSAGES_PER_SENDER: u32 = 40;
/// Far below SENDERS * MESSAGES_PER_SENDER so senders hit backpressure.
const CAPACITY: u32 = 4;
const WAIT: Duration = Duration::from_secs(10);

const TEST_NAME: &str = "senders_in_separate_processes";

fn run_sender(queue: &str, index: u32) {
    let mut writer = ringq::join(queue, index, WAIT).expect("sender: join failed");
    for seq in 0..MESSAGES_PER_SENDER {
        let message = format!("{}:{}", index, seq);
        match writer.push(message.as_bytes(), WAIT).expect("sender: push failed") {
            PushOutcome::Sent { .. } => {}
            PushOutcome::BackpressureTimeout => panic!("sender {} starved at {}", index, seq),
        }
    }
    log!("[SENDER {}] pushed {} messages", index, MESSAGES_PER_SENDER);
}

/// Starts this test executable again, filtered to this test, as sender `index`.
struct SelfLauncher {
    children: Vec<Child>,
}

impl SenderLauncher for SelfLauncher {
    fn launch(&mut self, queue: &str, index: u32) -> io::Result<()> {
        let child = Command::new(env::current_exe()?)
            .args([TEST_NAME, "--exact", "--nocapture", "--test-threads=1"])
            .env(ENV_ROLE, ROLE_SENDER)
            .env(ENV_QUEUE, queue)
            .env(ENV_INDEX, index.to_string())
            .spawn()?;
        self.children.push(child);
        Ok(())
    }
}

impl Drop for SelfLauncher {
    fn drop(&mut self) {
        for child in &mut self.children {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn run_receiver() {
    let config = QueueConfig {
        name: format!("ringq-e2e-{}", std::process::id()),
        capacity: CAPACITY,
        slot_size: 16,
        admission: Admission::Permits,
    };
    let mut receiver = Receiver::create(&config).expect("receiver: create failed");
    let mut launcher = SelfLauncher {
        children: Vec::new(),
    };
    receiver
        .launch_senders(SENDERS, &mut launcher)
        .expect("receiver: launch failed");
    receiver
        .await_senders(WAIT)
        .expect("receiver: senders never became ready");
    log!("[RECEIVER] {} senders ready", SENDERS);

    let total = SENDERS * MESSAGES_PER_SENDER;
    let mut next_seq: HashMap<u32, u32> = HashMap::new();
    let reader = receiver.reader();
    for _ in 0..total {
        let message = match reader.pop(WAIT).expect("receiver: pop failed") {
            PopOutcome::Received(message) => message,
            PopOutcome::NoMessageTimeout => panic!("receiver starved"),
        };
        let text = String::from_utf8(message).expect("utf8 payload");
        let (index, seq) = text.split_once(':').expect("index:seq payload");
        let (index, seq): (u32, u32) = (index.parse().unwrap(), seq.parse().unwrap());
        let expected = next_seq.entry(index).or_insert(0);
        assert_eq!(seq, *expected, "sender {} out of order", index);
        *expected += 1;

        let held = reader.sync().lock().expect("receiver: lock failed");
        check_cursors(&reader.region().cursors(&held), CAPACITY).unwrap();
    }
    log!("[RECEIVER] received {} messages", total);

    for child in &mut launcher.children {
        let status = child.wait().expect("receiver: wait failed");
        assert!(status.success(), "a sender exited with {}", status);
    }
    launcher.children.clear();
    assert_eq!(
        reader.pop(Duration::from_millis(20)).unwrap(),
        PopOutcome::NoMessageTimeout
    );
    assert_eq!(reader.status().unwrap().occupancy, 0);
}

#[test]
fn senders_in_separate_processes() {
    match env::var(ENV_ROLE).as_deref() {
        Ok(ROLE_SENDER) => {
            let queue = env::var(ENV_QUEUE).expect("queue name in environment");
            let index = env::var(ENV_INDEX)
                .expect("sender index in environment")
                .parse()
                .expect("numeric sender index");
            run_sender(&queue, index);
        }
        _ => run_receiver(),
    }
}
