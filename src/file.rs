//! Regular files
//!
//! A [`RegularFile`] binds a [`ByteStore`] to its metadata record and the
//! reader/writer lock that guards both the content and timestamp updates.
//! Channels go through the lock accessors so their waits stay
//! interruptible; everyone else can use the locked convenience wrappers.
//!
//! Lifetime is governed by two counters: the hard-link count kept in the
//! metadata record and the open-channel count kept here. Content is freed
//! once both reach zero, so an unlinked file stays readable through any
//! channel still open on it.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::common::Result;
use crate::locking::{AcquireError, InterruptibleRwLock, ReadGuard, ThreadToken, WriteGuard};
use crate::metadata::Metadata;
use crate::store::ByteStore;

pub struct RegularFile {
    store: InterruptibleRwLock<ByteStore>,
    size: Arc<AtomicU64>,
    metadata: Box<dyn Metadata>,
    open_count: AtomicU32,
}

impl RegularFile {
    pub fn new(store: ByteStore, metadata: Box<dyn Metadata>) -> Self {
        let size = store.size_handle();
        Self {
            store: InterruptibleRwLock::new(store),
            size,
            metadata,
            open_count: AtomicU32::new(0),
        }
    }

    /// Current content length, read without taking the file lock.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn metadata(&self) -> &dyn Metadata {
        &*self.metadata
    }

    pub(crate) fn store(&self) -> &InterruptibleRwLock<ByteStore> {
        &self.store
    }

    /// Interruptible shared acquisition for the channel path.
    pub(crate) fn lock_read(
        &self,
        token: &ThreadToken,
        abort: &AtomicBool,
    ) -> std::result::Result<ReadGuard<'_, ByteStore>, AcquireError> {
        self.store.read_interruptibly(token, abort)
    }

    /// Interruptible exclusive acquisition for the channel path.
    pub(crate) fn lock_write(
        &self,
        token: &ThreadToken,
        abort: &AtomicBool,
    ) -> std::result::Result<WriteGuard<'_, ByteStore>, AcquireError> {
        self.store.write_interruptibly(token, abort)
    }

    pub fn update_access_time(&self) {
        self.metadata.update_access_time();
    }

    pub fn update_modified_time(&self) {
        self.metadata.update_modified_time();
    }

    pub fn links(&self) -> u32 {
        self.metadata.link_count()
    }

    /// Called by the directory layer when a new hard link names this file.
    pub fn increment_link_count(&self) {
        self.metadata.increment_link_count();
    }

    /// Called by the directory layer on unlink. If this was the last link
    /// and no channel is open, the content is freed.
    pub fn decrement_link_count(&self) {
        self.metadata.decrement_link_count();
        self.maybe_free();
    }

    /// Number of channels currently open on this file
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Acquire)
    }

    /// Called when a channel binds to this file.
    pub(crate) fn opened(&self) {
        self.open_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Called when a channel releases its reference. Frees the content if
    /// the file is also unlinked.
    pub(crate) fn closed(&self) {
        let previous = self.open_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0);
        self.maybe_free();
    }

    fn maybe_free(&self) {
        if self.links() != 0 || self.open_count() != 0 {
            return;
        }
        // A holder of the write lock is still using the content; the pages
        // are reclaimed when the file itself is dropped instead.
        if let Some(mut store) = self.store.try_write() {
            if self.links() == 0 && self.open_count() == 0 {
                let pages = store.page_count();
                store.free();
                if pages > 0 {
                    log::debug!("freed {} pages of an unreferenced file", pages);
                }
            }
        }
    }

    // Locked convenience wrappers. Each takes the appropriate side of the
    // lock uninterruptibly, delegates to the store, and maintains the
    // matching timestamp.

    pub fn read(&self, position: u64, dst: &mut [u8]) -> i64 {
        let store = self.store.read();
        let n = store.read(position, dst);
        drop(store);
        self.metadata.update_access_time();
        n
    }

    pub fn read_vectored(&self, position: u64, dsts: &mut [&mut [u8]]) -> i64 {
        let store = self.store.read();
        let n = store.read_vectored(position, dsts);
        drop(store);
        self.metadata.update_access_time();
        n
    }

    pub fn write(&self, position: u64, src: &[u8]) -> Result<i64> {
        let mut store = self.store.write();
        let n = store.write(position, src)?;
        drop(store);
        self.metadata.update_modified_time();
        Ok(n)
    }

    pub fn write_vectored(&self, position: u64, srcs: &[&[u8]]) -> Result<i64> {
        let mut store = self.store.write();
        let n = store.write_vectored(position, srcs)?;
        drop(store);
        self.metadata.update_modified_time();
        Ok(n)
    }

    pub fn transfer_to<W: Write + ?Sized>(
        &self,
        position: u64,
        count: u64,
        sink: &mut W,
    ) -> Result<u64> {
        let store = self.store.read();
        let n = store.transfer_to(position, count, sink)?;
        drop(store);
        self.metadata.update_access_time();
        Ok(n)
    }

    pub fn transfer_from<R: Read + ?Sized>(
        &self,
        source: &mut R,
        position: u64,
        count: u64,
    ) -> Result<u64> {
        let mut store = self.store.write();
        let n = store.transfer_from(source, position, count)?;
        drop(store);
        self.metadata.update_modified_time();
        Ok(n)
    }

    pub fn truncate(&self, new_size: u64) {
        let mut store = self.store.write();
        store.truncate(new_size);
        drop(store);
        self.metadata.update_modified_time();
    }

    /// Independent copy of the current content, for copy-on-link callers.
    pub fn copy_content(&self) -> Result<ByteStore> {
        self.store.read().copy()
    }
}
