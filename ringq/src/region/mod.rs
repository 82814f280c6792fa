//! The named shared-memory block holding the queue.
//!
//! # Memory Layout
//!
//! ```text
//! offset 0   capacity    u32   written once by the creator, published last
//! offset 4   slot_size   u32   written once by the creator
//! offset 8   read_index  u32 ┐
//! offset 12  write_index u32 ├ Cursors, only touched under the queue lock
//! offset 16  count       u32 ┘
//! offset 20  slot[0] .. slot[capacity - 1], slot_size bytes each
//! ```
//!
//! Native byte order, no padding. Raw pointers never leave this module:
//! callers get a [`Header`] reference or a [`RingQueue`] built against a held
//! [`QueueLock`]. The guard must come from this queue's lock and outlives
//! every view built from it:
//!
//! ```compile_fail
//! # use ringq::region::SharedRegion;
//! # use ringq::sync::SyncSet;
//! # use ringq::{Admission, ResourceNames};
//! # fn demo() -> Result<(), ringq::QueueError> {
//! let names = ResourceNames::new("unheld")?;
//! let mut region = SharedRegion::create(&names, 2, 8)?;
//! let sync = SyncSet::create_all(&names, 2, Admission::Permits)?;
//! let mut queue = region.queue(&sync.lock()?);
//! queue.try_push(b"unlocked");
//! # Ok(())
//! # }
//! ```

use std::mem::size_of;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use shared_memory::{Shmem, ShmemConf, ShmemError};
use tracing::{debug, info};

use crate::config::{validate_layout, Binding, ResourceNames};
use crate::errors::QueueError;
use crate::ring::{Cursors, RingQueue, SlotArena};
use crate::sync::QueueLock;

#[repr(C)]
pub struct Header {
    capacity: AtomicU32,
    slot_size: AtomicU32,
    // reached through CURSORS_OFFSET while the lock is held
    #[allow(dead_code)]
    cursors: Cursors,
}

pub const HEADER_SIZE: usize = size_of::<Header>();
const CURSORS_OFFSET: usize = 2 * size_of::<u32>();

const _: () = assert!(HEADER_SIZE == 5 * size_of::<u32>());

impl Header {
    /// Zero until the creator has finished initializing the region.
    pub fn capacity(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size.load(Ordering::Acquire)
    }
}

/// Total bytes for a region, or `None` if it does not fit the address space.
pub fn region_size(capacity: u32, slot_size: u32) -> Option<usize> {
    (capacity as usize)
        .checked_mul(slot_size as usize)?
        .checked_add(HEADER_SIZE)
}

pub struct SharedRegion {
    shmem: Shmem,
    name: String,
    /// The only lock whose guards may open this region.
    lock_name: String,
    capacity: u32,
    slot_size: u32,
}

impl SharedRegion {
    pub fn open(names: &ResourceNames, binding: Binding) -> Result<SharedRegion, QueueError> {
        match binding {
            Binding::Create {
                capacity,
                slot_size,
                ..
            } => SharedRegion::create(names, capacity, slot_size),
            Binding::Attach => SharedRegion::attach(names),
        }
    }

    pub fn create(
        names: &ResourceNames,
        capacity: u32,
        slot_size: u32,
    ) -> Result<SharedRegion, QueueError> {
        validate_layout(capacity, slot_size)?;
        let name = names.region();
        let size = region_size(capacity, slot_size).ok_or_else(|| {
            QueueError::InvalidConfig(format!(
                "{} slots of {} bytes do not fit in memory",
                capacity, slot_size
            ))
        })?;
        let shmem = ShmemConf::new()
            .os_id(&name)
            .size(size)
            .create()
            .map_err(|source| QueueError::Storage {
                name: name.clone(),
                source,
            })?;

        let base = shmem.as_ptr();
        // SAFETY: the mapping was just created with `size` bytes and nobody can
        // interpret it before `capacity` is published below.
        unsafe {
            ptr::write_bytes(base, 0, size);
            let header = &*(base as *const Header);
            header.slot_size.store(slot_size, Ordering::Relaxed);
            header.capacity.store(capacity, Ordering::Release);
        }
        info!(%name, capacity, slot_size, size, "created shared region");

        Ok(SharedRegion {
            shmem,
            name,
            lock_name: names.lock(),
            capacity,
            slot_size,
        })
    }

    pub fn attach(names: &ResourceNames) -> Result<SharedRegion, QueueError> {
        let name = names.region();
        let shmem = ShmemConf::new()
            .os_id(&name)
            .open()
            .map_err(|source| classify_open_error(&name, source))?;

        if shmem.len() < HEADER_SIZE {
            return Err(QueueError::LayoutMismatch {
                name,
                reason: "mapping is shorter than the header",
            });
        }
        // SAFETY: at least HEADER_SIZE bytes are mapped and the first two
        // fields are only ever accessed atomically.
        let header = unsafe { &*(shmem.as_ptr() as *const Header) };
        let capacity = header.capacity();
        if capacity == 0 {
            return Err(QueueError::LayoutMismatch {
                name,
                reason: "capacity not yet published",
            });
        }
        let slot_size = header.slot_size();
        if validate_layout(capacity, slot_size).is_err() {
            return Err(QueueError::LayoutMismatch {
                name,
                reason: "slot_size not yet published",
            });
        }
        match region_size(capacity, slot_size) {
            Some(size) if size <= shmem.len() => {}
            _ => {
                return Err(QueueError::LayoutMismatch {
                    name,
                    reason: "mapping is smaller than the recorded layout",
                })
            }
        }
        debug!(%name, capacity, slot_size, "attached shared region");

        Ok(SharedRegion {
            shmem,
            name,
            lock_name: names.lock(),
            capacity,
            slot_size,
        })
    }

    /// Attaches, retrying while the creator is still initializing, until
    /// `timeout` elapses.
    pub fn attach_with_retry(
        names: &ResourceNames,
        timeout: Duration,
    ) -> Result<SharedRegion, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Duration::from_millis(1);
        loop {
            match SharedRegion::attach(names) {
                Err(e) if e.is_transient() && Instant::now() < deadline => {
                    debug!(error = %e, ?backoff, "region not ready, retrying");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_millis(50));
                }
                other => return other,
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn is_owner(&self) -> bool {
        self.shmem.is_owner()
    }

    pub fn header(&self) -> &Header {
        // SAFETY: validated at create/attach; lives as long as `self.shmem`.
        unsafe { &*(self.shmem.as_ptr() as *const Header) }
    }

    fn check_held(&self, held: &QueueLock<'_>) {
        assert_eq!(
            held.lock_name(),
            self.lock_name,
            "region {} used under another queue's lock",
            self.name
        );
    }

    /// Copy of the cursors as of this lock hold.
    pub fn cursors(&self, held: &QueueLock<'_>) -> Cursors {
        self.check_held(held);
        // SAFETY: the lock excludes every writer of the cursors.
        unsafe { ptr::read(self.shmem.as_ptr().add(CURSORS_OFFSET) as *const Cursors) }
    }

    pub fn slot<'a>(&'a self, held: &'a QueueLock<'_>, index: u32) -> Option<&'a [u8]> {
        self.check_held(held);
        if index >= self.capacity {
            return None;
        }
        let start = HEADER_SIZE + index as usize * self.slot_size as usize;
        // SAFETY: index < capacity, so the slot lies inside the validated mapping.
        Some(unsafe { slice::from_raw_parts(self.shmem.as_ptr().add(start), self.slot_size as usize) })
    }

    /// Panics if `held` is not this queue's lock.
    pub fn queue<'a>(&'a mut self, held: &'a QueueLock<'_>) -> RingQueue<'a> {
        self.check_held(held);
        let base = self.shmem.as_ptr();
        let slots_len = self.capacity as usize * self.slot_size as usize;
        // SAFETY: the lock excludes every other holder of the cursors and slot
        // bytes, and `&mut self` excludes every other view from this handle.
        unsafe {
            let cursors = &mut *(base.add(CURSORS_OFFSET) as *mut Cursors);
            let slots = slice::from_raw_parts_mut(base.add(HEADER_SIZE), slots_len);
            RingQueue::new(cursors, SlotArena::new(slots, self.slot_size as usize))
        }
    }
}

/// Opening by name fails for two reasons worth telling apart: nothing by
/// that name exists, or it exists but has not been sized yet.
pub(crate) fn classify_open_error(name: &str, source: ShmemError) -> QueueError {
    match source {
        ShmemError::MapSizeZero => QueueError::LayoutMismatch {
            name: name.to_string(),
            reason: "mapping has not been sized yet",
        },
        source => QueueError::NotFound {
            name: name.to_string(),
            source,
        },
    }
}
