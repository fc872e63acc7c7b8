//! Asynchronous facade over [`FileChannel`]
//!
//! Each call submits the matching synchronous operation to tokio's
//! blocking pool and awaits the completion. Buffers travel by value and
//! come back alongside the result, the same convention io_uring-style
//! APIs use, so no borrow has to live across the await.
//!
//! Dropping a returned future abandons the completion only: the submitted
//! synchronous operation still runs. Use [`close`](AsyncFileChannel::close)
//! (or close the underlying channel) to actually cut an operation short.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::advisory::AdvisoryLock;
use crate::channel::FileChannel;
use crate::common::{MemFsError, Result};

pub struct AsyncFileChannel {
    inner: Arc<FileChannel>,
    handle: Handle,
}

impl AsyncFileChannel {
    /// Wraps `channel`, dispatching onto the current tokio runtime.
    ///
    /// Panics if called outside a runtime; use
    /// [`with_handle`](Self::with_handle) to pick one explicitly.
    pub fn new(channel: Arc<FileChannel>) -> Self {
        Self::with_handle(channel, Handle::current())
    }

    pub fn with_handle(channel: Arc<FileChannel>, handle: Handle) -> Self {
        Self {
            inner: channel,
            handle,
        }
    }

    pub fn channel(&self) -> &Arc<FileChannel> {
        &self.inner
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn dispatch<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileChannel) -> Result<T> + Send + 'static,
    {
        let channel = Arc::clone(&self.inner);
        self.handle
            .spawn_blocking(move || operation(&channel))
            .await
            .map_err(|e| MemFsError::Io(std::io::Error::other(e)))?
    }

    /// Reads at the current position. The buffer is returned with the
    /// result so the caller keeps ownership either way.
    pub async fn read(&self, mut buf: Vec<u8>) -> (Result<i64>, Vec<u8>) {
        let result = self
            .dispatch(move |channel| {
                let n = channel.read(&mut buf)?;
                Ok((n, buf))
            })
            .await;
        match result {
            Ok((n, buf)) => (Ok(n), buf),
            Err(e) => (Err(e), Vec::new()),
        }
    }

    /// Reads at an explicit position without moving the channel position.
    pub async fn read_at(&self, mut buf: Vec<u8>, position: u64) -> (Result<i64>, Vec<u8>) {
        let result = self
            .dispatch(move |channel| {
                let n = channel.read_at(&mut buf, position)?;
                Ok((n, buf))
            })
            .await;
        match result {
            Ok((n, buf)) => (Ok(n), buf),
            Err(e) => (Err(e), Vec::new()),
        }
    }

    /// Writes at the current position (or the end of the file in append
    /// mode).
    pub async fn write(&self, buf: Vec<u8>) -> (Result<i64>, Vec<u8>) {
        let result = self
            .dispatch(move |channel| {
                let n = channel.write(&buf)?;
                Ok((n, buf))
            })
            .await;
        match result {
            Ok((n, buf)) => (Ok(n), buf),
            Err(e) => (Err(e), Vec::new()),
        }
    }

    /// Writes at an explicit position.
    pub async fn write_at(&self, buf: Vec<u8>, position: u64) -> (Result<i64>, Vec<u8>) {
        let result = self
            .dispatch(move |channel| {
                let n = channel.write_at(&buf, position)?;
                Ok((n, buf))
            })
            .await;
        match result {
            Ok((n, buf)) => (Ok(n), buf),
            Err(e) => (Err(e), Vec::new()),
        }
    }

    pub async fn truncate(&self, new_size: u64) -> Result<()> {
        self.dispatch(move |channel| channel.truncate(new_size)).await
    }

    pub async fn size(&self) -> Result<u64> {
        self.dispatch(|channel| channel.size()).await
    }

    pub async fn position(&self) -> Result<u64> {
        self.dispatch(|channel| channel.position()).await
    }

    pub async fn set_position(&self, position: u64) -> Result<()> {
        self.dispatch(move |channel| channel.set_position(position))
            .await
    }

    pub async fn force(&self, metadata: bool) -> Result<()> {
        self.dispatch(move |channel| channel.force(metadata)).await
    }

    /// Acquires an advisory lock; granted immediately, like the
    /// synchronous variant.
    pub async fn lock(&self, position: u64, size: u64, shared: bool) -> Result<Arc<AdvisoryLock>> {
        self.dispatch(move |channel| channel.lock(position, size, shared))
            .await
    }

    /// Closes the underlying channel, releasing any blocked operation.
    pub fn close(&self) {
        self.inner.close();
    }
}
