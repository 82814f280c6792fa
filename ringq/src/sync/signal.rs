use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use raw_sync::events::{Event, EventImpl, EventInit, EventState};
use raw_sync::Timeout;
use tracing::trace;

use super::segment::Segment;
use crate::errors::QueueError;

/// Timed waits report expiry as an error; one that arrives this close to the
/// deadline is taken as a timeout.
const CLOCK_SLACK: Duration = Duration::from_millis(5);
const MAX_WAIT_FAILURES: u32 = 3;
const NANOS_PER_SEC: u32 = 1_000_000_000;
/// Covers the clock moving between our reading and raw_sync's.
const SECOND_MARGIN_NANOS: u32 = 1_000_000;

/// Manual-reset event in its own named segment: stays set until cleared.
pub struct Signal {
    event: Box<dyn EventImpl>,
    segment: Segment,
}

impl Signal {
    pub(crate) fn create(name: String, initially_set: bool) -> Result<Signal, QueueError> {
        let segment = Segment::create(name, Event::size_of(None))?;
        // SAFETY: the segment is fresh, page aligned and sized for one event.
        let (event, _) = unsafe { Event::new(segment.as_ptr(), false) }
            .map_err(|e| QueueError::sync("creating event", &e))?;
        let signal = Signal { event, segment };
        if initially_set {
            signal.set()?;
        } else {
            signal.clear()?;
        }
        Ok(signal)
    }

    pub(crate) fn open(name: String) -> Result<Signal, QueueError> {
        let segment = Segment::open(name, Event::size_of(None))?;
        // SAFETY: the creator initialized an event at the start of this segment.
        let (event, _) = unsafe { Event::from_existing(segment.as_ptr()) }
            .map_err(|e| QueueError::sync("opening event", &e))?;
        Ok(Signal { event, segment })
    }

    pub fn name(&self) -> &str {
        self.segment.name()
    }

    pub fn set(&self) -> Result<(), QueueError> {
        set_event(self.event.as_ref(), EventState::Signaled, self.name())
    }

    pub fn clear(&self) -> Result<(), QueueError> {
        set_event(self.event.as_ref(), EventState::Clear, self.name())
    }

    /// True once the signal is set, false if `timeout` elapsed first.
    pub fn wait(&self, timeout: Duration) -> Result<bool, QueueError> {
        wait_event(self.event.as_ref(), timeout, self.name())
    }
}

pub(crate) fn set_event(
    event: &dyn EventImpl,
    state: EventState,
    name: &str,
) -> Result<(), QueueError> {
    event
        .set(state)
        .map_err(|e| QueueError::sync(name, &e))
}

/// How the next part of a timed wait is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slice {
    /// Block on the event for this long.
    Wait(Duration),
    /// Too close to the end of the wall-clock second to hand raw_sync a
    /// sub-second timeout; poll, then sleep this long.
    Sleep(Duration),
}

/// raw_sync turns a timeout into `now + timeout` by adding nanoseconds
/// without carrying into seconds, and `pthread_cond_timedwait` rejects the
/// result once it reaches 1e9. Whole seconds never carry; a sub-second part
/// must end before the current second does.
pub(crate) fn next_slice(remaining: Duration, wall_nanos: u32) -> Slice {
    if remaining.as_secs() > 0 {
        return Slice::Wait(Duration::from_secs(remaining.as_secs()));
    }
    let budget = NANOS_PER_SEC.saturating_sub(wall_nanos.saturating_add(SECOND_MARGIN_NANOS));
    if budget == 0 {
        let to_boundary = Duration::from_nanos(u64::from(NANOS_PER_SEC.saturating_sub(wall_nanos)));
        return Slice::Sleep(remaining.min(to_boundary));
    }
    Slice::Wait(remaining.min(Duration::from_nanos(u64::from(budget))))
}

/// Sub-second part of the realtime clock raw_sync computes deadlines from.
fn wall_nanos() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
}

pub(crate) fn wait_event(
    event: &dyn EventImpl,
    timeout: Duration,
    name: &str,
) -> Result<bool, QueueError> {
    let deadline = Instant::now() + timeout;
    let mut failures = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let slice = match next_slice(remaining, wall_nanos()) {
            Slice::Wait(slice) => slice,
            Slice::Sleep(pause) => {
                if event.wait(Timeout::Val(Duration::ZERO)).is_ok() {
                    return Ok(true);
                }
                thread::sleep(pause);
                if Instant::now() >= deadline {
                    trace!(signal = name, ?timeout, "wait timed out");
                    return Ok(false);
                }
                continue;
            }
        };
        let started = Instant::now();
        match event.wait(Timeout::Val(slice)) {
            Ok(()) => return Ok(true),
            // the slice ran out; the whole wait may not have
            Err(_) if started.elapsed() + CLOCK_SLACK >= slice => {
                if Instant::now() >= deadline {
                    trace!(signal = name, ?timeout, "wait timed out");
                    return Ok(false);
                }
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_WAIT_FAILURES {
                    return Err(QueueError::sync(name, &e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NANOS: u32 = NANOS_PER_SEC;

    fn ends_within_the_second(slice: Slice, wall: u32) -> bool {
        match slice {
            Slice::Wait(d) => d.subsec_nanos() == 0 || wall + d.subsec_nanos() < NANOS,
            Slice::Sleep(_) => true,
        }
    }

    #[test]
    fn whole_seconds_are_waited_without_a_fraction() {
        assert_eq!(
            next_slice(Duration::from_millis(2_750), 900_000_000),
            Slice::Wait(Duration::from_secs(2))
        );
    }

    #[test]
    fn fraction_is_cut_at_the_second_boundary() {
        assert_eq!(
            next_slice(Duration::from_millis(300), 100_000_000),
            Slice::Wait(Duration::from_millis(300))
        );
        assert_eq!(
            next_slice(Duration::from_millis(300), 800_000_000),
            Slice::Wait(Duration::from_nanos(u64::from(NANOS - 800_000_000 - SECOND_MARGIN_NANOS)))
        );
    }

    #[test]
    fn last_instant_of_a_second_sleeps_across_it() {
        assert_eq!(
            next_slice(Duration::from_millis(300), NANOS - 500_000),
            Slice::Sleep(Duration::from_nanos(500_000))
        );
        assert_eq!(next_slice(Duration::ZERO, NANOS - 1), Slice::Sleep(Duration::ZERO));
    }

    #[test]
    fn no_slice_overflows_the_nanosecond_field() {
        for wall in (0..NANOS).step_by(7_777_777).chain([NANOS - 1, NANOS - 1_000_000]) {
            for ms in [0u64, 1, 13, 299, 500, 999, 1_000, 1_001, 4_321] {
                let slice = next_slice(Duration::from_millis(ms), wall);
                assert!(ends_within_the_second(slice, wall), "{:?} at {}", slice, wall);
            }
        }
    }
}
