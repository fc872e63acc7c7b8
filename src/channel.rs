//! Seekable file channels
//!
//! A [`FileChannel`] is an open handle bound to one [`RegularFile`]. It
//! enforces three disciplines on top of the file's own lock:
//!
//! - **Mode gating**: reads require read mode, writes (including truncate)
//!   require write mode, checked before any state is touched.
//! - **Self-serialization**: all read/write/transfer/truncate and
//!   position operations on one channel are mutually exclusive. The mutex
//!   that holds the position doubles as the serialization lock.
//! - **Interruptible blocking**: before waiting on the file lock, the
//!   operation parks its [`ThreadToken`] in the blocking slot; `close`
//!   from another thread wakes the waiter, and a thread interrupt both
//!   closes the channel and surfaces as a distinct error. The epilogue in
//!   `end_blocking` converts the unwind into [`AsynchronousClose`] or
//!   [`ClosedByInterrupt`].
//!
//! Append mode reads the effective write offset from the file size while
//! holding the write lock, which is what makes concurrent appends land
//! back to back instead of overlapping.
//!
//! [`AsynchronousClose`]: MemFsError::AsynchronousClose
//! [`ClosedByInterrupt`]: MemFsError::ClosedByInterrupt

use std::io::{Read, Write};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::advisory::AdvisoryLock;
use crate::common::{MemFsError, OpenMode, Result};
use crate::file::RegularFile;
use crate::locking::{AcquireError, ThreadToken};
use crate::registry::ChannelRegistry;

pub struct FileChannel {
    id: u64,
    file: Arc<RegularFile>,
    mode: OpenMode,
    closed: AtomicBool,
    /// Channel position. Held for the duration of every operation, which
    /// is what serializes operations on this channel.
    position: Mutex<u64>,
    /// Token of the thread currently inside a blocking operation.
    blocking: Mutex<Option<Arc<ThreadToken>>>,
    locks: Mutex<Vec<Arc<AdvisoryLock>>>,
    registry: Weak<ChannelRegistry>,
}

impl FileChannel {
    pub(crate) fn new(
        id: u64,
        file: Arc<RegularFile>,
        mode: OpenMode,
        registry: Weak<ChannelRegistry>,
    ) -> Result<Self> {
        mode.validate()?;
        file.opened();
        Ok(Self {
            id,
            file,
            mode,
            closed: AtomicBool::new(false),
            position: Mutex::new(0),
            blocking: Mutex::new(None),
            locks: Mutex::new(Vec::new()),
            registry,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn file(&self) -> &Arc<RegularFile> {
        &self.file
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MemFsError::ClosedChannel);
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        if !self.mode.read {
            return Err(MemFsError::NonReadable);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if !self.mode.write {
            return Err(MemFsError::NonWritable);
        }
        Ok(())
    }

    fn check_buffer_range(offset: usize, len: usize, count: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= count => Ok(()),
            _ => Err(MemFsError::illegal_argument(format!(
                "buffer range [{}, {}+{}) out of bounds for {} buffers",
                offset, offset, len, count
            ))),
        }
    }

    fn check_no_overflow(position: u64, count: u64) -> Result<()> {
        position.checked_add(count).map(|_| ()).ok_or_else(|| {
            MemFsError::illegal_argument("position + count overflows the address space")
        })
    }

    /// Parks the current thread's token in the blocking slot. Returns
    /// false if the channel was closed in the meantime; the caller then
    /// skips its work and lets `end_blocking` report the close.
    fn begin_blocking(&self) -> bool {
        let token = ThreadToken::current();
        let mut slot = self.blocking.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        *slot = Some(token);
        true
    }

    /// Clears the blocking slot and converts an unwound operation into the
    /// right close error: a thread interrupted while the channel went away
    /// sees `ClosedByInterrupt`, an operation cut short by a close from
    /// another thread sees `AsynchronousClose`.
    fn end_blocking(&self, completed: bool) -> Result<()> {
        self.blocking.lock().take();
        let interrupted = ThreadToken::current().is_interrupted();
        let closed = self.closed.load(Ordering::Acquire);
        if interrupted && closed {
            return Err(MemFsError::ClosedByInterrupt);
        }
        if closed && !completed {
            return Err(MemFsError::AsynchronousClose);
        }
        Ok(())
    }

    /// An interrupted lock wait closes the channel; the interrupt flag
    /// stays asserted on the thread.
    fn close_on_interrupt(&self) {
        self.close_internal();
    }

    /// Reads into `dst` at the current position, advancing it by the bytes
    /// read. Returns `-1` at end of file, leaving the position alone.
    pub fn read(&self, dst: &mut [u8]) -> Result<i64> {
        self.check_open()?;
        self.check_readable()?;

        let mut position = self.position.lock();
        let mut n = -1i64;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_read(&ThreadToken::current(), &self.closed) {
                Ok(store) => {
                    n = store.read(*position, dst);
                    drop(store);
                    self.file.update_access_time();
                    completed = true;
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if n > 0 {
            *position += n as u64;
        }
        Ok(n)
    }

    /// Scatter read into every buffer of `dsts`.
    pub fn read_vectored(&self, dsts: &mut [&mut [u8]]) -> Result<i64> {
        let len = dsts.len();
        self.read_vectored_range(dsts, 0, len)
    }

    /// Scatter read into `dsts[offset..offset + len]`.
    pub fn read_vectored_range(
        &self,
        dsts: &mut [&mut [u8]],
        offset: usize,
        len: usize,
    ) -> Result<i64> {
        Self::check_buffer_range(offset, len, dsts.len())?;
        self.check_open()?;
        self.check_readable()?;
        let dsts = &mut dsts[offset..offset + len];

        let mut position = self.position.lock();
        let mut n = -1i64;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_read(&ThreadToken::current(), &self.closed) {
                Ok(store) => {
                    n = store.read_vectored(*position, dsts);
                    drop(store);
                    self.file.update_access_time();
                    completed = true;
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if n > 0 {
            *position += n as u64;
        }
        Ok(n)
    }

    /// Reads at an explicit position. The channel position is not moved,
    /// whatever the outcome.
    pub fn read_at(&self, dst: &mut [u8], position: u64) -> Result<i64> {
        self.check_open()?;
        self.check_readable()?;

        let _serial = self.position.lock();
        let mut n = -1i64;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_read(&ThreadToken::current(), &self.closed) {
                Ok(store) => {
                    n = store.read(position, dst);
                    drop(store);
                    self.file.update_access_time();
                    completed = true;
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        Ok(n)
    }

    /// Writes `src` at the current position (or at the end of the file in
    /// append mode), advancing the position past the written bytes.
    pub fn write(&self, src: &[u8]) -> Result<i64> {
        self.check_open()?;
        self.check_writable()?;

        let mut position = self.position.lock();
        if !self.mode.append {
            Self::check_no_overflow(*position, src.len() as u64)?;
        }

        let mut n = 0i64;
        let mut written_at = *position;
        let mut op_error: Option<MemFsError> = None;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_write(&ThreadToken::current(), &self.closed) {
                Ok(mut store) => {
                    // The append offset must come from the size while the
                    // write lock is held.
                    let offset = if self.mode.append {
                        store.size()
                    } else {
                        *position
                    };
                    match store.write(offset, src) {
                        Ok(written) => {
                            n = written;
                            written_at = offset;
                            drop(store);
                            self.file.update_modified_time();
                            completed = true;
                        }
                        Err(e) => op_error = Some(e),
                    }
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if let Some(e) = op_error {
            return Err(e);
        }
        *position = written_at + n as u64;
        Ok(n)
    }

    /// Gather write of every buffer in `srcs`.
    pub fn write_vectored(&self, srcs: &[&[u8]]) -> Result<i64> {
        self.write_vectored_range(srcs, 0, srcs.len())
    }

    /// Gather write of `srcs[offset..offset + len]`.
    pub fn write_vectored_range(&self, srcs: &[&[u8]], offset: usize, len: usize) -> Result<i64> {
        Self::check_buffer_range(offset, len, srcs.len())?;
        self.check_open()?;
        self.check_writable()?;
        let srcs = &srcs[offset..offset + len];
        let total: u64 = srcs.iter().map(|s| s.len() as u64).sum();

        let mut position = self.position.lock();
        if !self.mode.append {
            Self::check_no_overflow(*position, total)?;
        }

        let mut n = 0i64;
        let mut written_at = *position;
        let mut op_error: Option<MemFsError> = None;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_write(&ThreadToken::current(), &self.closed) {
                Ok(mut store) => {
                    let offset = if self.mode.append {
                        store.size()
                    } else {
                        *position
                    };
                    match store.write_vectored(offset, srcs) {
                        Ok(written) => {
                            n = written;
                            written_at = offset;
                            drop(store);
                            self.file.update_modified_time();
                            completed = true;
                        }
                        Err(e) => op_error = Some(e),
                    }
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if let Some(e) = op_error {
            return Err(e);
        }
        *position = written_at + n as u64;
        Ok(n)
    }

    /// Writes at an explicit position. Without append the channel position
    /// is untouched; with append the write lands at the end of the file
    /// and the position follows it there.
    pub fn write_at(&self, src: &[u8], position: u64) -> Result<i64> {
        self.check_open()?;
        self.check_writable()?;
        Self::check_no_overflow(position, src.len() as u64)?;

        let mut channel_position = self.position.lock();
        let mut n = 0i64;
        let mut written_at = position;
        let mut op_error: Option<MemFsError> = None;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_write(&ThreadToken::current(), &self.closed) {
                Ok(mut store) => {
                    let offset = if self.mode.append {
                        store.size()
                    } else {
                        position
                    };
                    match store.write(offset, src) {
                        Ok(written) => {
                            n = written;
                            written_at = offset;
                            drop(store);
                            self.file.update_modified_time();
                            completed = true;
                        }
                        Err(e) => op_error = Some(e),
                    }
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if let Some(e) = op_error {
            return Err(e);
        }
        if self.mode.append {
            *channel_position = written_at + n as u64;
        }
        Ok(n)
    }

    /// Shrinks the file to `new_size` and clamps the position to it.
    pub fn truncate(&self, new_size: u64) -> Result<()> {
        self.check_open()?;
        self.check_writable()?;

        let mut position = self.position.lock();
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_write(&ThreadToken::current(), &self.closed) {
                Ok(mut store) => {
                    store.truncate(new_size);
                    drop(store);
                    self.file.update_modified_time();
                    completed = true;
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if *position > new_size {
            *position = new_size;
        }
        Ok(())
    }

    /// Copies up to `count` bytes from `position` into `sink`. The channel
    /// position is untouched. An error from the sink is reported even if
    /// some bytes were already transferred.
    pub fn transfer_to<W: Write + ?Sized>(
        &self,
        position: u64,
        count: u64,
        sink: &mut W,
    ) -> Result<u64> {
        self.check_open()?;
        self.check_readable()?;
        Self::check_no_overflow(position, count)?;

        let _serial = self.position.lock();
        let mut transferred = 0u64;
        let mut op_error: Option<MemFsError> = None;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_read(&ThreadToken::current(), &self.closed) {
                Ok(store) => match store.transfer_to(position, count, sink) {
                    Ok(n) => {
                        transferred = n;
                        drop(store);
                        self.file.update_access_time();
                        completed = true;
                    }
                    Err(e) => op_error = Some(e),
                },
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if let Some(e) = op_error {
            return Err(e);
        }
        Ok(transferred)
    }

    /// Copies up to `count` bytes from `source` into the file at
    /// `position` (at the end of the file in append mode, which also moves
    /// the channel position). Transfers nothing if `position` is past the
    /// end of the file and append is unset.
    pub fn transfer_from<R: Read + ?Sized>(
        &self,
        source: &mut R,
        position: u64,
        count: u64,
    ) -> Result<u64> {
        self.check_open()?;
        self.check_writable()?;
        Self::check_no_overflow(position, count)?;

        let mut channel_position = self.position.lock();
        let mut transferred = 0u64;
        let mut effective = position;
        let mut op_error: Option<MemFsError> = None;
        let mut completed = false;
        if self.begin_blocking() {
            match self.file.lock_write(&ThreadToken::current(), &self.closed) {
                Ok(mut store) => {
                    let offset = if self.mode.append {
                        store.size()
                    } else {
                        position
                    };
                    if !self.mode.append && offset > store.size() {
                        // Nothing to transfer beyond the end of the file.
                        completed = true;
                    } else {
                        match store.transfer_from(source, offset, count) {
                            Ok(n) => {
                                transferred = n;
                                effective = offset;
                                drop(store);
                                self.file.update_modified_time();
                                completed = true;
                            }
                            Err(e) => op_error = Some(e),
                        }
                    }
                }
                Err(AcquireError::Interrupted) => self.close_on_interrupt(),
                Err(AcquireError::Aborted) => {}
            }
        }
        self.end_blocking(completed)?;
        if let Some(e) = op_error {
            return Err(e);
        }
        if self.mode.append {
            *channel_position = effective + transferred;
        }
        Ok(transferred)
    }

    /// Current position.
    pub fn position(&self) -> Result<u64> {
        self.check_open()?;
        Ok(*self.position.lock())
    }

    /// Moves the position; seeking past the end of the file is legal.
    pub fn set_position(&self, position: u64) -> Result<()> {
        self.check_open()?;
        *self.position.lock() = position;
        Ok(())
    }

    /// Current file size.
    pub fn size(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.file.size())
    }

    /// Nothing to flush for in-memory content; still fails once closed.
    pub fn force(&self, _metadata: bool) -> Result<()> {
        self.check_open()?;
        Ok(())
    }

    /// Acquires an advisory lock over `[position, position + size)`.
    ///
    /// Shared locks require read mode, exclusive locks require write mode.
    /// There is no contention in-process, so the lock is granted
    /// immediately; it is invalidated by `release` or by closing this
    /// channel.
    pub fn lock(&self, position: u64, size: u64, shared: bool) -> Result<Arc<AdvisoryLock>> {
        self.check_open()?;
        if shared {
            self.check_readable()?;
        } else {
            self.check_writable()?;
        }
        Self::check_no_overflow(position, size)?;

        let lock = Arc::new(AdvisoryLock::new(position, size, shared));
        self.locks.lock().push(Arc::clone(&lock));

        // A close that raced the grant must not leave a valid lock behind.
        if self.closed.load(Ordering::Acquire) {
            lock.release();
            return Err(MemFsError::ClosedChannel);
        }
        Ok(lock)
    }

    /// Identical to [`lock`](Self::lock): an in-process advisory lock is
    /// never contended, so trying cannot fail differently.
    pub fn try_lock(&self, position: u64, size: u64, shared: bool) -> Result<Arc<AdvisoryLock>> {
        self.lock(position, size, shared)
    }

    /// Memory-mapped regions are not supported by the in-memory store.
    pub fn map(&self, _position: u64, _size: u64) -> Result<()> {
        Err(MemFsError::Unsupported {
            operation: "memory-mapped regions".to_string(),
        })
    }

    /// Closes the channel. Closing an already-closed channel is a no-op.
    ///
    /// A thread blocked in an operation on this channel is released and
    /// unwinds with [`MemFsError::AsynchronousClose`].
    pub fn close(&self) {
        self.close_internal();
    }

    fn close_internal(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for lock in self.locks.lock().drain(..) {
            lock.release();
        }

        // Release a thread waiting on the file lock. This is a wake, not an
        // interrupt: the waiter must observe an asynchronous close, not a
        // thread interrupt.
        let blocked = self.blocking.lock().clone();
        if let Some(token) = blocked {
            token.wake();
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
        self.file.closed();
        log::debug!("channel {} closed", self.id);
    }

    #[cfg(test)]
    pub(crate) fn blocking_registered(&self) -> bool {
        self.blocking.lock().is_some()
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        self.close_internal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InodeRecord;
    use crate::store::{ByteStore, PagePool};

    fn test_channel(mode: OpenMode) -> FileChannel {
        let pool = Arc::new(PagePool::new(1024, 4));
        let file = Arc::new(RegularFile::new(
            ByteStore::new(pool),
            Box::new(InodeRecord::new()),
        ));
        FileChannel::new(1, file, mode, Weak::new()).unwrap()
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let channel = test_channel(OpenMode::read_write());

        assert_eq!(channel.write(&[0x41, 0x42, 0x43]).unwrap(), 3);
        assert_eq!(channel.position().unwrap(), 3);
        assert_eq!(channel.size().unwrap(), 3);

        channel.set_position(0).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(channel.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0x41, 0x42, 0x43]);
        assert_eq!(channel.position().unwrap(), 3);

        // At end of file the read reports EOF and the position stays put.
        assert_eq!(channel.read(&mut buf).unwrap(), -1);
        assert_eq!(channel.position().unwrap(), 3);
    }

    #[test]
    fn test_sparse_explicit_position_write() {
        let channel = test_channel(OpenMode::read_write());

        assert_eq!(channel.write_at(&[0xFF], 5).unwrap(), 1);
        assert_eq!(channel.size().unwrap(), 6);
        assert_eq!(channel.position().unwrap(), 0);

        let mut buf = [1u8; 6];
        assert_eq!(channel.read_at(&mut buf, 0).unwrap(), 6);
        assert_eq!(buf, [0, 0, 0, 0, 0, 0xFF]);
    }

    #[test]
    fn test_truncate_clamps_position() {
        let channel = test_channel(OpenMode::read_write());

        channel.write(&[7u8; 10]).unwrap();
        assert_eq!(channel.position().unwrap(), 10);

        channel.truncate(4).unwrap();
        assert_eq!(channel.size().unwrap(), 4);
        assert_eq!(channel.position().unwrap(), 4);

        let mut buf = [0u8; 2];
        assert_eq!(channel.read(&mut buf).unwrap(), -1);
    }

    #[test]
    fn test_truncate_above_size_keeps_content() {
        let channel = test_channel(OpenMode::read_write());
        channel.write(b"keep").unwrap();

        channel.truncate(100).unwrap();
        assert_eq!(channel.size().unwrap(), 4);
        assert_eq!(channel.position().unwrap(), 4);
    }

    #[test]
    fn test_positional_read_leaves_position() {
        let channel = test_channel(OpenMode::read_write());
        channel.write(b"0123456789").unwrap();
        channel.set_position(2).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(channel.read_at(&mut buf, 6).unwrap(), 4);
        assert_eq!(&buf, b"6789");
        assert_eq!(channel.position().unwrap(), 2);

        // EOF through the positional path does not move it either.
        assert_eq!(channel.read_at(&mut buf, 100).unwrap(), -1);
        assert_eq!(channel.position().unwrap(), 2);
    }

    #[test]
    fn test_append_write_lands_at_end() {
        let channel = test_channel(OpenMode::read_write().with_append());
        channel.write(b"abc").unwrap();

        channel.set_position(0).unwrap();
        assert_eq!(channel.write(b"de").unwrap(), 2);

        // Append overrides the position for the write and then follows it.
        assert_eq!(channel.size().unwrap(), 5);
        assert_eq!(channel.position().unwrap(), 5);

        let mut buf = [0u8; 5];
        assert_eq!(channel.read_at(&mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"abcde");
    }

    #[test]
    fn test_append_overrides_explicit_position() {
        let channel = test_channel(OpenMode::read_write().with_append());
        channel.write(b"abc").unwrap();

        assert_eq!(channel.write_at(b"XY", 0).unwrap(), 2);
        assert_eq!(channel.size().unwrap(), 5);
        assert_eq!(channel.position().unwrap(), 5);

        let mut buf = [0u8; 5];
        channel.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"abcXY");
    }

    #[test]
    fn test_explicit_position_write_without_append() {
        let channel = test_channel(OpenMode::read_write());
        channel.set_position(7).unwrap();

        channel.write_at(b"at start", 0).unwrap();
        assert_eq!(channel.position().unwrap(), 7);
    }

    #[test]
    fn test_mode_gating() {
        let write_only = test_channel(OpenMode::write_only());
        let mut buf = [0u8; 1];
        assert!(matches!(
            write_only.read(&mut buf),
            Err(MemFsError::NonReadable)
        ));
        assert!(matches!(
            write_only.read_at(&mut buf, 0),
            Err(MemFsError::NonReadable)
        ));

        let read_only = test_channel(OpenMode::read_only());
        assert!(matches!(
            read_only.write(b"x"),
            Err(MemFsError::NonWritable)
        ));
        assert!(matches!(
            read_only.truncate(0),
            Err(MemFsError::NonWritable)
        ));
        let mut source: &[u8] = b"x";
        assert!(matches!(
            read_only.transfer_from(&mut source, 0, 1),
            Err(MemFsError::NonWritable)
        ));
    }

    #[test]
    fn test_vectored_round_trip() {
        let channel = test_channel(OpenMode::read_write());
        assert_eq!(channel.write_vectored(&[b"ab", b"cde"]).unwrap(), 5);
        assert_eq!(channel.position().unwrap(), 5);

        channel.set_position(0).unwrap();
        let mut first = [0u8; 1];
        let mut second = [0u8; 4];
        let n = channel.read_vectored(&mut [&mut first, &mut second]).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&first, b"a");
        assert_eq!(&second, b"bcde");
        assert_eq!(channel.position().unwrap(), 5);
    }

    #[test]
    fn test_vectored_range_arguments_checked_first() {
        let channel = test_channel(OpenMode::read_write());
        let srcs: [&[u8]; 2] = [b"ab", b"cd"];

        assert!(matches!(
            channel.write_vectored_range(&srcs, 1, 2),
            Err(MemFsError::IllegalArgument { .. })
        ));
        assert!(matches!(
            channel.write_vectored_range(&srcs, usize::MAX, 2),
            Err(MemFsError::IllegalArgument { .. })
        ));

        // The argument check fires even on a closed channel.
        channel.close();
        assert!(matches!(
            channel.write_vectored_range(&srcs, 3, 1),
            Err(MemFsError::IllegalArgument { .. })
        ));
    }

    #[test]
    fn test_transfer_to_leaves_position() {
        let channel = test_channel(OpenMode::read_write());
        channel.write(b"0123456789").unwrap();
        channel.set_position(3).unwrap();

        let mut sink = Vec::new();
        assert_eq!(channel.transfer_to(2, 4, &mut sink).unwrap(), 4);
        assert_eq!(&sink, b"2345");
        assert_eq!(channel.position().unwrap(), 3);
    }

    #[test]
    fn test_transfer_from_beyond_end_transfers_nothing() {
        let channel = test_channel(OpenMode::read_write());
        channel.write(b"ab").unwrap();

        let mut source: &[u8] = b"ignored";
        assert_eq!(channel.transfer_from(&mut source, 50, 7).unwrap(), 0);
        assert_eq!(channel.size().unwrap(), 2);
    }

    #[test]
    fn test_transfer_from_append_moves_position() {
        let channel = test_channel(OpenMode::read_write().with_append());
        channel.write(b"abc").unwrap();

        let mut source: &[u8] = b"de";
        assert_eq!(channel.transfer_from(&mut source, 0, 2).unwrap(), 2);
        assert_eq!(channel.size().unwrap(), 5);
        assert_eq!(channel.position().unwrap(), 5);
    }

    #[test]
    fn test_close_is_idempotent() {
        let channel = test_channel(OpenMode::read_write());
        assert!(channel.is_open());

        channel.close();
        assert!(!channel.is_open());
        channel.close();
        assert!(!channel.is_open());
    }

    #[test]
    fn test_operations_fail_after_close() {
        let channel = test_channel(OpenMode::read_write());
        channel.write(b"x").unwrap();
        channel.close();

        let mut buf = [0u8; 1];
        assert!(matches!(
            channel.read(&mut buf),
            Err(MemFsError::ClosedChannel)
        ));
        assert!(matches!(channel.write(b"y"), Err(MemFsError::ClosedChannel)));
        assert!(matches!(channel.position(), Err(MemFsError::ClosedChannel)));
        assert!(matches!(
            channel.set_position(0),
            Err(MemFsError::ClosedChannel)
        ));
        assert!(matches!(channel.size(), Err(MemFsError::ClosedChannel)));
        assert!(matches!(
            channel.force(true),
            Err(MemFsError::ClosedChannel)
        ));
        assert!(matches!(
            channel.lock(0, 10, false),
            Err(MemFsError::ClosedChannel)
        ));
    }

    #[test]
    fn test_advisory_lock_validity() {
        let channel = test_channel(OpenMode::read_write());

        let lock = channel.lock(0, 10, false).unwrap();
        assert!(lock.is_valid());
        assert!(!lock.is_shared());

        lock.release();
        assert!(!lock.is_valid());
        lock.release();

        let shared = channel.try_lock(5, 5, true).unwrap();
        assert!(shared.is_valid());
        assert!(shared.is_shared());
    }

    #[test]
    fn test_close_invalidates_advisory_locks() {
        let channel = test_channel(OpenMode::read_write());
        let lock = channel.lock(0, 100, false).unwrap();

        channel.close();
        assert!(!lock.is_valid());
    }

    #[test]
    fn test_advisory_lock_mode_gating() {
        let read_only = test_channel(OpenMode::read_only());
        assert!(read_only.lock(0, 1, true).is_ok());
        assert!(matches!(
            read_only.lock(0, 1, false),
            Err(MemFsError::NonWritable)
        ));

        let write_only = test_channel(OpenMode::write_only());
        assert!(write_only.lock(0, 1, false).is_ok());
        assert!(matches!(
            write_only.lock(0, 1, true),
            Err(MemFsError::NonReadable)
        ));
    }

    #[test]
    fn test_map_is_unsupported() {
        let channel = test_channel(OpenMode::read_write());
        assert!(matches!(
            channel.map(0, 10),
            Err(MemFsError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_force_is_a_no_op() {
        let channel = test_channel(OpenMode::read_write());
        channel.write(b"x").unwrap();
        assert!(channel.force(true).is_ok());
        assert!(channel.force(false).is_ok());
        assert_eq!(channel.size().unwrap(), 1);
    }

    #[test]
    fn test_drop_releases_file_reference() {
        let pool = Arc::new(PagePool::new(1024, 4));
        let file = Arc::new(RegularFile::new(
            ByteStore::new(pool),
            Box::new(InodeRecord::new()),
        ));

        {
            let channel =
                FileChannel::new(1, Arc::clone(&file), OpenMode::read_write(), Weak::new())
                    .unwrap();
            channel.write(b"gone").unwrap();
            assert_eq!(file.open_count(), 1);
        }

        // Dropped without an explicit close: the open count still falls and
        // the unlinked file's content is freed.
        assert_eq!(file.open_count(), 0);
        assert_eq!(file.size(), 0);
    }
}
