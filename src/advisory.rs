//! Advisory byte-range locks
//!
//! Lock requests are granted immediately and recorded, nothing more: the
//! filesystem lives in one process, so there is no enforcement point and
//! concurrent I/O proceeds regardless. The record exists so code written
//! against a real filesystem's locking API keeps working.

use std::sync::atomic::{AtomicBool, Ordering};

/// A granted byte-range lock over `[position, position + size)`.
pub struct AdvisoryLock {
    position: u64,
    size: u64,
    shared: bool,
    valid: AtomicBool,
}

impl AdvisoryLock {
    pub(crate) fn new(position: u64, size: u64, shared: bool) -> Self {
        Self {
            position,
            size,
            shared,
            valid: AtomicBool::new(true),
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// True until released or until the owning channel closes.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Releases the lock. Releasing twice is a no-op.
    pub fn release(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Whether this lock's range intersects `[position, position + size)`.
    pub fn overlaps(&self, position: u64, size: u64) -> bool {
        let this_end = self.position.saturating_add(self.size);
        let other_end = position.saturating_add(size);
        self.position < other_end && position < this_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_until_released() {
        let lock = AdvisoryLock::new(0, 10, false);
        assert!(lock.is_valid());

        lock.release();
        assert!(!lock.is_valid());

        // Second release is tolerated.
        lock.release();
        assert!(!lock.is_valid());
    }

    #[test]
    fn test_overlaps() {
        let lock = AdvisoryLock::new(10, 10, true);
        assert!(lock.overlaps(15, 1));
        assert!(lock.overlaps(0, 11));
        assert!(lock.overlaps(19, 100));
        assert!(!lock.overlaps(20, 5));
        assert!(!lock.overlaps(0, 10));
    }

    #[test]
    fn test_whole_file_lock() {
        let lock = AdvisoryLock::new(0, u64::MAX, false);
        assert!(lock.overlaps(u64::MAX - 1, 1));
        assert!(!lock.is_shared());
    }
}
