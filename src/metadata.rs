//! File metadata records
//!
//! The storage core only needs a narrow slice of a file's metadata:
//! timestamp maintenance and the hard-link count that gates deferred
//! deletion. That slice is the [`Metadata`] trait; attribute-view providers
//! living outside the core work against the concrete record they injected.
//!
//! [`InodeRecord`] is the default record. Everything in it is atomic so a
//! reader holding only the shared side of the file lock can still bump the
//! access time.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The metadata interface consumed by the storage core.
pub trait Metadata: Send + Sync {
    fn creation_time(&self) -> SystemTime;
    fn access_time(&self) -> SystemTime;
    fn modified_time(&self) -> SystemTime;

    fn update_access_time(&self);
    fn update_modified_time(&self);

    fn link_count(&self) -> u32;
    fn increment_link_count(&self);
    fn decrement_link_count(&self);
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn to_system_time(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// Default metadata record: POSIX-ish owner/group/permissions plus
/// timestamps and the link count.
pub struct InodeRecord {
    created: AtomicU64,
    accessed: AtomicU64,
    modified: AtomicU64,
    links: AtomicU32,
    uid: AtomicU32,
    gid: AtomicU32,
    mode: AtomicU32,
}

impl InodeRecord {
    /// Creates a record owned by uid/gid 0 with mode 0o644, stamped now.
    pub fn new() -> Self {
        Self::with_owner(0, 0, 0o644)
    }

    pub fn with_owner(uid: u32, gid: u32, mode: u32) -> Self {
        let now = now_nanos();
        Self {
            created: AtomicU64::new(now),
            accessed: AtomicU64::new(now),
            modified: AtomicU64::new(now),
            links: AtomicU32::new(0),
            uid: AtomicU32::new(uid),
            gid: AtomicU32::new(gid),
            mode: AtomicU32::new(mode),
        }
    }

    pub fn uid(&self) -> u32 {
        self.uid.load(Ordering::Acquire)
    }

    pub fn set_uid(&self, uid: u32) {
        self.uid.store(uid, Ordering::Release);
    }

    pub fn gid(&self) -> u32 {
        self.gid.load(Ordering::Acquire)
    }

    pub fn set_gid(&self, gid: u32) {
        self.gid.store(gid, Ordering::Release);
    }

    /// Permission bits, e.g. `0o644`
    pub fn mode(&self) -> u32 {
        self.mode.load(Ordering::Acquire)
    }

    pub fn set_mode(&self, mode: u32) {
        self.mode.store(mode, Ordering::Release);
    }
}

impl Default for InodeRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl Metadata for InodeRecord {
    fn creation_time(&self) -> SystemTime {
        to_system_time(self.created.load(Ordering::Acquire))
    }

    fn access_time(&self) -> SystemTime {
        to_system_time(self.accessed.load(Ordering::Acquire))
    }

    fn modified_time(&self) -> SystemTime {
        to_system_time(self.modified.load(Ordering::Acquire))
    }

    fn update_access_time(&self) {
        self.accessed.store(now_nanos(), Ordering::Release);
    }

    fn update_modified_time(&self) {
        self.modified.store(now_nanos(), Ordering::Release);
    }

    fn link_count(&self) -> u32 {
        self.links.load(Ordering::Acquire)
    }

    fn increment_link_count(&self) {
        self.links.fetch_add(1, Ordering::AcqRel);
    }

    fn decrement_link_count(&self) {
        // The count never goes below zero even if unlink is miscounted.
        let _ = self
            .links
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |links| {
                links.checked_sub(1)
            });
    }
}
