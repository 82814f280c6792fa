//! Slot indexing, wraparound and occupancy accounting.
//!
//! Nothing here synchronizes: a [`RingQueue`] is only ever built while the
//! queue's exclusive lock is held, and it borrows the cursors and slot bytes
//! for exactly that long.

/// Mutable part of the region header.
///
/// `write_index == (read_index + count) % capacity` holds between operations.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub read_index: u32,
    pub write_index: u32,
    pub count: u32,
}

/// Occupancy snapshot taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub occupancy: u32,
    pub capacity: u32,
}

impl QueueStatus {
    pub fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy)
    }
}

/// Bounds-checked view over `capacity` contiguous slots of `slot_size` bytes.
pub struct SlotArena<'a> {
    bytes: &'a mut [u8],
    slot_size: usize,
}

impl<'a> SlotArena<'a> {
    /// Trailing bytes that do not fill a whole slot are ignored.
    pub fn new(bytes: &'a mut [u8], slot_size: usize) -> SlotArena<'a> {
        assert!(slot_size >= 2, "slot_size must be at least 2");
        SlotArena { bytes, slot_size }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len() / self.slot_size
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.slot_size)?;
        self.bytes.get(start..start + self.slot_size)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let start = index.checked_mul(self.slot_size)?;
        self.bytes.get_mut(start..start + self.slot_size)
    }
}

pub struct RingQueue<'a> {
    cursors: &'a mut Cursors,
    arena: SlotArena<'a>,
    capacity: u32,
}

impl<'a> RingQueue<'a> {
    pub fn new(cursors: &'a mut Cursors, arena: SlotArena<'a>) -> RingQueue<'a> {
        let capacity = arena.capacity() as u32;
        assert!(capacity >= 1, "a ring needs at least one slot");
        RingQueue {
            cursors,
            arena,
            capacity,
        }
    }

    /// Longest payload a slot can hold; one byte is kept for the terminator.
    #[inline]
    pub fn max_message_len(&self) -> usize {
        self.arena.slot_size() - 1
    }

    /// Commits `message` (truncated to [`max_message_len`](Self::max_message_len))
    /// into the next free slot, or returns false without touching anything.
    pub fn try_push(&mut self, message: &[u8]) -> bool {
        if self.is_full() {
            return false;
        }
        let len = message.len().min(self.max_message_len());
        let write_index = self.cursors.write_index;
        let slot = match self.arena.slot_mut(write_index as usize) {
            Some(slot) => slot,
            None => {
                debug_assert!(false, "write_index {} out of range", write_index);
                return false;
            }
        };
        slot[..len].copy_from_slice(&message[..len]);
        for b in slot[len..].iter_mut() {
            *b = 0;
        }
        self.cursors.write_index = (write_index + 1) % self.capacity;
        self.cursors.count += 1;
        true
    }

    /// Takes the oldest message and zeroes its slot.
    pub fn try_pop(&mut self) -> Option<Vec<u8>> {
        if self.is_empty() {
            return None;
        }
        let read_index = self.cursors.read_index;
        let max_len = self.max_message_len();
        let slot = self.arena.slot_mut(read_index as usize)?;
        let len = slot[..max_len].iter().position(|&b| b == 0).unwrap_or(max_len);
        let message = slot[..len].to_vec();
        for b in slot.iter_mut() {
            *b = 0;
        }
        self.cursors.read_index = (read_index + 1) % self.capacity;
        self.cursors.count -= 1;
        Some(message)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cursors.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.cursors.count >= self.capacity
    }

    #[inline]
    pub fn occupancy(&self) -> u32 {
        self.cursors.count
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cursors(&self) -> Cursors {
        *self.cursors
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            occupancy: self.occupancy(),
            capacity: self.capacity,
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        check_cursors(&self.cursors, self.capacity)
    }
}

pub fn check_cursors(c: &Cursors, capacity: u32) -> Result<(), String> {
    if c.count > capacity {
        return Err(format!("count {} exceeds capacity {}", c.count, capacity));
    }
    if c.read_index >= capacity || c.write_index >= capacity {
        return Err(format!(
            "cursor out of range: read {} write {} capacity {}",
            c.read_index, c.write_index, capacity
        ));
    }
    let expected = ((c.read_index as u64 + c.count as u64) % capacity as u64) as u32;
    if c.write_index != expected {
        return Err(format!(
            "write_index {} != (read_index {} + count {}) % {}",
            c.write_index, c.read_index, c.count, capacity
        ));
    }
    Ok(())
}
