use std::thread;
use std::time::{Duration, Instant};

use super::queue_config;
use crate::config::Admission;
use crate::errors::QueueError;
use crate::handshake::Receiver;
use crate::reader::PopOutcome;
use crate::writer::{MessageWriter, PushOutcome};

const SHORT: Duration = Duration::from_millis(50);
const LONG: Duration = Duration::from_secs(5);

fn receiver_and_writer(
    tag: &str,
    capacity: u32,
    slot_size: u32,
    admission: Admission,
) -> Result<(Receiver, MessageWriter), QueueError> {
    let config = queue_config(tag, capacity, slot_size, admission);
    let receiver = Receiver::create(&config)?;
    let writer = MessageWriter::attach(receiver.names(), LONG)?;
    Ok((receiver, writer))
}

fn sent(occupancy: u32) -> PushOutcome {
    PushOutcome::Sent {
        occupancy,
        truncated: false,
    }
}

#[test]
fn message_crosses_from_writer_to_reader() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("hello", 10, 20, Admission::Permits)?;
    assert_eq!(writer.push(b"Hello World", SHORT)?, sent(1));
    assert_eq!(
        receiver.reader().pop(SHORT)?,
        PopOutcome::Received(b"Hello World".to_vec())
    );
    assert_eq!(receiver.reader().status()?.occupancy, 0);
    Ok(())
}

#[test]
fn long_message_is_truncated_and_reported() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("trunc", 2, 8, Admission::Permits)?;
    assert_eq!(writer.max_message_len(), 7);
    assert_eq!(
        writer.push(b"[Sender 0] a long one", SHORT)?,
        PushOutcome::Sent {
            occupancy: 1,
            truncated: true,
        }
    );
    assert_eq!(
        receiver.reader().pop(SHORT)?,
        PopOutcome::Received(b"[Sender".to_vec())
    );
    Ok(())
}

#[test]
fn empty_queue_times_out_without_a_message() -> Result<(), QueueError> {
    let (mut receiver, _writer) = receiver_and_writer("empty", 3, 20, Admission::Permits)?;
    let started = Instant::now();
    assert_eq!(
        receiver.reader().pop(Duration::from_millis(100))?,
        PopOutcome::NoMessageTimeout
    );
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert_eq!(receiver.reader().status()?.occupancy, 0);
    Ok(())
}

#[test]
fn repeated_timeouts_are_outcomes_not_errors() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("repeat", 1, 20, Admission::Permits)?;
    for ms in [17, 59, 101, 143, 227, 311] {
        let timeout = Duration::from_millis(ms);
        assert_eq!(receiver.reader().pop(timeout)?, PopOutcome::NoMessageTimeout);
    }
    assert_eq!(writer.push(b"only slot", SHORT)?, sent(1));
    for ms in [23, 71, 137, 199, 263, 307] {
        let timeout = Duration::from_millis(ms);
        let started = Instant::now();
        assert_eq!(writer.push(b"no room", timeout)?, PushOutcome::BackpressureTimeout);
        assert!(started.elapsed() >= timeout);
    }
    assert_eq!(
        receiver.reader().pop(SHORT)?,
        PopOutcome::Received(b"only slot".to_vec())
    );
    Ok(())
}

fn full_queue_applies_backpressure(admission: Admission) -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("full", 2, 20, admission)?;
    assert_eq!(writer.push(b"Message 1", SHORT)?, sent(1));
    assert_eq!(writer.push(b"Message 2", SHORT)?, sent(2));

    let started = Instant::now();
    assert_eq!(
        writer.push(b"Message 3", Duration::from_millis(100))?,
        PushOutcome::BackpressureTimeout
    );
    assert!(started.elapsed() >= Duration::from_millis(90));
    let status = writer.status()?;
    assert_eq!((status.occupancy, status.free()), (2, 0));

    assert_eq!(
        receiver.reader().pop(SHORT)?,
        PopOutcome::Received(b"Message 1".to_vec())
    );
    assert_eq!(writer.push(b"Message 3", SHORT)?, sent(2));
    Ok(())
}

#[test]
fn full_queue_applies_backpressure_with_permits() -> Result<(), QueueError> {
    full_queue_applies_backpressure(Admission::Permits)
}

#[test]
fn full_queue_applies_backpressure_with_space_signal() -> Result<(), QueueError> {
    full_queue_applies_backpressure(Admission::SpaceSignal)
}

#[test]
fn fifo_order_survives_wraparound() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("wrap", 3, 20, Admission::Permits)?;
    writer.push(b"A", SHORT)?;
    writer.push(b"B", SHORT)?;
    assert_eq!(receiver.reader().pop(SHORT)?, PopOutcome::Received(b"A".to_vec()));
    writer.push(b"C", SHORT)?;
    assert_eq!(writer.push(b"D", SHORT)?, sent(3));

    for expected in [&b"B"[..], b"C", b"D"] {
        assert_eq!(
            receiver.reader().pop(SHORT)?,
            PopOutcome::Received(expected.to_vec())
        );
    }
    assert_eq!(receiver.reader().pop(SHORT)?, PopOutcome::NoMessageTimeout);
    Ok(())
}

#[test]
fn permits_track_free_slots() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("permits", 3, 20, Admission::Permits)?;
    assert_eq!(writer.sync().permits().available()?, 3);
    writer.push(b"x", SHORT)?;
    writer.push(b"y", SHORT)?;
    assert_eq!(writer.sync().permits().available()?, 1);
    receiver.reader().pop(SHORT)?;
    assert_eq!(writer.sync().permits().available()?, 2);
    Ok(())
}

#[test]
fn signals_follow_occupancy() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("signals", 1, 20, Admission::SpaceSignal)?;
    let sync = receiver.reader().sync();
    assert!(!sync.presence().wait(Duration::ZERO)?);
    assert!(sync.space().wait(Duration::ZERO)?);

    writer.push(b"only", SHORT)?;
    let sync = receiver.reader().sync();
    assert!(sync.presence().wait(Duration::ZERO)?);
    assert!(!sync.space().wait(Duration::ZERO)?, "space cleared once full");

    receiver.reader().pop(SHORT)?;
    let sync = receiver.reader().sync();
    assert!(!sync.presence().wait(Duration::ZERO)?, "presence cleared once empty");
    assert!(sync.space().wait(Duration::ZERO)?);
    Ok(())
}

#[test]
fn stale_presence_is_cleared_and_the_wait_resumes() -> Result<(), QueueError> {
    let (mut receiver, _writer) = receiver_and_writer("stale", 2, 20, Admission::Permits)?;
    receiver.reader().sync().presence().set()?;
    assert_eq!(receiver.reader().pop(SHORT)?, PopOutcome::NoMessageTimeout);
    assert!(!receiver.reader().sync().presence().wait(Duration::ZERO)?);
    Ok(())
}

#[test]
fn stale_space_signal_does_not_outlive_the_deadline() -> Result<(), QueueError> {
    let (_receiver, mut writer) = receiver_and_writer("stalespace", 1, 20, Admission::SpaceSignal)?;
    writer.push(b"fills it", SHORT)?;
    writer.sync().space().set()?;
    let started = Instant::now();
    assert_eq!(
        writer.push(b"no room", Duration::from_millis(100))?,
        PushOutcome::BackpressureTimeout
    );
    assert!(started.elapsed() < LONG);
    assert!(!writer.sync().space().wait(Duration::ZERO)?);
    assert_eq!(writer.status()?.occupancy, 1);
    Ok(())
}

#[test]
fn pop_wakes_a_blocked_producer() -> Result<(), QueueError> {
    let (mut receiver, mut writer) = receiver_and_writer("wake", 1, 20, Admission::Permits)?;
    writer.push(b"first", SHORT)?;

    let names = receiver.names().clone();
    let producer = thread::spawn(move || -> Result<PushOutcome, QueueError> {
        let mut writer = MessageWriter::attach(&names, LONG)?;
        writer.push(b"second", LONG)
    });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        receiver.reader().pop(LONG)?,
        PopOutcome::Received(b"first".to_vec())
    );
    assert!(matches!(
        producer.join().expect("producer panicked")?,
        PushOutcome::Sent { .. }
    ));
    assert_eq!(
        receiver.reader().pop(LONG)?,
        PopOutcome::Received(b"second".to_vec())
    );
    Ok(())
}
