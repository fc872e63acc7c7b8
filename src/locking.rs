//! Interruptible reader/writer locking for memfs
//!
//! Every regular file is guarded by an [`InterruptibleRwLock`]: readers
//! share, writers are exclusive, and waiting writers block new readers so a
//! stream of readers cannot starve a writer. Unlike the standard library
//! lock, acquisition can be abandoned from outside - either because the
//! waiting thread's [`ThreadToken`] was interrupted, or because an abort
//! flag (a channel's closed bit) flipped while waiting.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// Why an interruptible acquisition gave up before taking the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The waiting thread's token was interrupted.
    Interrupted,
    /// The abort flag flipped while waiting (the owning handle was closed).
    Aborted,
}

#[derive(Default)]
struct LockState {
    readers: u32,
    writer: bool,
    waiting_writers: u32,
}

/// Shared wait machinery for one lock: the state word and the condition
/// variable every waiter sleeps on.
struct WaitQueue {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl WaitQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LockState::default()),
            cond: Condvar::new(),
        })
    }
}

thread_local! {
    static CURRENT_TOKEN: Arc<ThreadToken> = Arc::new(ThreadToken::new());
}

/// Per-thread cancellation token.
///
/// The token carries a sticky interrupt flag (cleared only by
/// [`clear_interrupted`](ThreadToken::clear_interrupted)) and remembers
/// which lock the thread is currently waiting on so that `interrupt` and
/// `wake` can get the sleeper out of its condition-variable wait.
pub struct ThreadToken {
    interrupted: AtomicBool,
    waiting_on: Mutex<Option<Arc<WaitQueue>>>,
}

impl ThreadToken {
    fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            waiting_on: Mutex::new(None),
        }
    }

    /// Returns the calling thread's token.
    pub fn current() -> Arc<ThreadToken> {
        CURRENT_TOKEN.with(Arc::clone)
    }

    /// Sets the sticky interrupt flag and wakes the thread if it is parked
    /// in an interruptible lock wait.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.wake();
    }

    /// Wakes the thread from an interruptible lock wait without touching
    /// the interrupt flag. Used by channel close so that an asynchronous
    /// close stays distinguishable from a thread interrupt.
    pub(crate) fn wake(&self) {
        let waiting = self.waiting_on.lock();
        if let Some(queue) = waiting.as_ref() {
            // Taking the queue mutex orders this wakeup after the waiter's
            // most recent predicate check; notifying without it can race a
            // waiter that is between checking and sleeping.
            let _state = queue.state.lock();
            queue.cond.notify_all();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Clears the interrupt flag, returning whether it was set.
    pub fn clear_interrupted(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    fn begin_wait(&self, queue: &Arc<WaitQueue>) {
        *self.waiting_on.lock() = Some(Arc::clone(queue));
    }

    fn end_wait(&self) {
        *self.waiting_on.lock() = None;
    }
}

/// A reader/writer lock whose blocking acquisitions can be cancelled.
///
/// The uninterruptible `read`/`write` methods mirror the standard lock API
/// and are used by callers that own no channel (attribute providers, the
/// locked convenience wrappers on `RegularFile`). Channels use the
/// `*_interruptibly` variants, passing their own closed flag as `abort`.
pub struct InterruptibleRwLock<T> {
    queue: Arc<WaitQueue>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for InterruptibleRwLock<T> {}
unsafe impl<T: Send + Sync> Sync for InterruptibleRwLock<T> {}

impl<T> InterruptibleRwLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            queue: WaitQueue::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the shared side, blocking uninterruptibly.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut state = self.queue.state.lock();
        while state.writer || state.waiting_writers > 0 {
            self.queue.cond.wait(&mut state);
        }
        state.readers += 1;
        ReadGuard { lock: self }
    }

    /// Acquires the exclusive side, blocking uninterruptibly.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.queue.state.lock();
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            self.queue.cond.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer = true;
        WriteGuard { lock: self }
    }

    /// Attempts the shared side without blocking.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        let mut state = self.queue.state.lock();
        if state.writer || state.waiting_writers > 0 {
            return None;
        }
        state.readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Attempts the exclusive side without blocking.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let mut state = self.queue.state.lock();
        if state.writer || state.readers > 0 {
            return None;
        }
        state.writer = true;
        Some(WriteGuard { lock: self })
    }

    /// Acquires the shared side, giving up if `token` is interrupted or
    /// `abort` becomes true while waiting.
    pub fn read_interruptibly(
        &self,
        token: &ThreadToken,
        abort: &AtomicBool,
    ) -> Result<ReadGuard<'_, T>, AcquireError> {
        token.begin_wait(&self.queue);
        let result = {
            let mut state = self.queue.state.lock();
            loop {
                if token.is_interrupted() {
                    break Err(AcquireError::Interrupted);
                }
                if abort.load(Ordering::Acquire) {
                    break Err(AcquireError::Aborted);
                }
                if !state.writer && state.waiting_writers == 0 {
                    state.readers += 1;
                    break Ok(());
                }
                self.queue.cond.wait(&mut state);
            }
        };
        token.end_wait();
        result.map(|_| ReadGuard { lock: self })
    }

    /// Acquires the exclusive side, giving up if `token` is interrupted or
    /// `abort` becomes true while waiting.
    pub fn write_interruptibly(
        &self,
        token: &ThreadToken,
        abort: &AtomicBool,
    ) -> Result<WriteGuard<'_, T>, AcquireError> {
        token.begin_wait(&self.queue);
        let result = {
            let mut state = self.queue.state.lock();
            state.waiting_writers += 1;
            let acquired = loop {
                if token.is_interrupted() {
                    break Err(AcquireError::Interrupted);
                }
                if abort.load(Ordering::Acquire) {
                    break Err(AcquireError::Aborted);
                }
                if !state.writer && state.readers == 0 {
                    break Ok(());
                }
                self.queue.cond.wait(&mut state);
            };
            state.waiting_writers -= 1;
            match acquired {
                Ok(()) => {
                    state.writer = true;
                    Ok(())
                }
                Err(e) => {
                    // Readers held back by our waiting_writers claim must be
                    // given another chance.
                    self.queue.cond.notify_all();
                    Err(e)
                }
            }
        };
        token.end_wait();
        result.map(|_| WriteGuard { lock: self })
    }

    fn release_shared(&self) {
        let mut state = self.queue.state.lock();
        debug_assert!(state.readers > 0);
        state.readers -= 1;
        if state.readers == 0 {
            self.queue.cond.notify_all();
        }
    }

    fn release_exclusive(&self) {
        let mut state = self.queue.state.lock();
        debug_assert!(state.writer);
        state.writer = false;
        self.queue.cond.notify_all();
    }
}

/// RAII guard for the shared side
pub struct ReadGuard<'a, T> {
    lock: &'a InterruptibleRwLock<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}

/// RAII guard for the exclusive side
pub struct WriteGuard<'a, T> {
    lock: &'a InterruptibleRwLock<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_multiple_readers() {
        let lock = InterruptibleRwLock::new(7u32);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a, 7);
        assert_eq!(*b, 7);
    }

    #[test]
    fn test_writer_excludes_readers() {
        let lock = InterruptibleRwLock::new(0u32);
        let guard = lock.write();
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());
        drop(guard);
        assert!(lock.try_read().is_some());
    }

    #[test]
    fn test_write_mutates() {
        let lock = InterruptibleRwLock::new(Vec::<u8>::new());
        lock.write().push(42);
        assert_eq!(*lock.read(), vec![42]);
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(InterruptibleRwLock::new(0u32));
        let reader = lock.read();

        let lock2 = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            let mut guard = lock2.write();
            *guard = 1;
        });

        // Give the writer time to start waiting, then verify new readers
        // are held back behind it.
        thread::sleep(Duration::from_millis(50));
        assert!(lock.try_read().is_none());

        drop(reader);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn test_interrupt_releases_waiter() {
        let lock = Arc::new(InterruptibleRwLock::new(0u32));
        let abort = Arc::new(AtomicBool::new(false));
        let guard = lock.write();

        let (tx, rx) = mpsc::channel();
        let lock2 = Arc::clone(&lock);
        let abort2 = Arc::clone(&abort);
        let waiter = thread::spawn(move || {
            let token = ThreadToken::current();
            tx.send(Arc::clone(&token)).unwrap();
            let result = lock2.read_interruptibly(&token, &abort2);
            assert_eq!(result.err(), Some(AcquireError::Interrupted));
            assert!(token.clear_interrupted());
        });

        let token = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        token.interrupt();
        waiter.join().unwrap();
        drop(guard);
    }

    #[test]
    fn test_abort_releases_waiter() {
        let lock = Arc::new(InterruptibleRwLock::new(0u32));
        let abort = Arc::new(AtomicBool::new(false));
        let guard = lock.write();

        let (tx, rx) = mpsc::channel();
        let lock2 = Arc::clone(&lock);
        let abort2 = Arc::clone(&abort);
        let waiter = thread::spawn(move || {
            let token = ThreadToken::current();
            tx.send(Arc::clone(&token)).unwrap();
            let result = lock2.write_interruptibly(&token, &abort2);
            assert_eq!(result.err(), Some(AcquireError::Aborted));
            assert!(!token.is_interrupted());
        });

        let token = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        abort.store(true, Ordering::Release);
        token.wake();
        waiter.join().unwrap();
        drop(guard);
    }

    #[test]
    fn test_interruptible_acquire_succeeds_uncontended() {
        let lock = InterruptibleRwLock::new(5u32);
        let abort = AtomicBool::new(false);
        let token = ThreadToken::current();

        let guard = lock.read_interruptibly(&token, &abort).unwrap();
        assert_eq!(*guard, 5);
        drop(guard);

        let mut guard = lock.write_interruptibly(&token, &abort).unwrap();
        *guard = 6;
        drop(guard);
        assert_eq!(*lock.read(), 6);
    }

    #[test]
    fn test_aborted_writer_lets_readers_through() {
        let lock = Arc::new(InterruptibleRwLock::new(0u32));
        let abort = Arc::new(AtomicBool::new(false));
        let reader = lock.read();

        let (tx, rx) = mpsc::channel();
        let lock2 = Arc::clone(&lock);
        let abort2 = Arc::clone(&abort);
        let writer = thread::spawn(move || {
            let token = ThreadToken::current();
            tx.send(Arc::clone(&token)).unwrap();
            lock2.write_interruptibly(&token, &abort2).map(|_guard| ())
        });

        let token = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        // While the writer waits, its claim holds back new readers.
        assert!(lock.try_read().is_none());

        abort.store(true, Ordering::Release);
        token.wake();
        assert!(writer.join().unwrap().is_err());

        // The abandoned claim must not keep blocking readers.
        assert!(lock.try_read().is_some());
        drop(reader);
    }
}
