use shared_memory::{Shmem, ShmemConf};

use crate::errors::QueueError;
use crate::region::classify_open_error;

/// A small named mapping that hosts one synchronization primitive.
pub(crate) struct Segment {
    shmem: Shmem,
    name: String,
}

impl Segment {
    pub(crate) fn create(name: String, size: usize) -> Result<Segment, QueueError> {
        let shmem = ShmemConf::new()
            .os_id(&name)
            .size(size)
            .create()
            .map_err(|source| QueueError::Storage {
                name: name.clone(),
                source,
            })?;
        Ok(Segment { shmem, name })
    }

    /// Opens an existing segment that must be at least `min_size` bytes.
    pub(crate) fn open(name: String, min_size: usize) -> Result<Segment, QueueError> {
        let shmem = ShmemConf::new()
            .os_id(&name)
            .open()
            .map_err(|source| classify_open_error(&name, source))?;
        if shmem.len() < min_size {
            return Err(QueueError::LayoutMismatch {
                name,
                reason: "segment is smaller than its primitive",
            });
        }
        Ok(Segment { shmem, name })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.shmem.as_ptr()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}
