//! Top-level filesystem instance
//!
//! [`MemFs`] owns the pieces shared by every file it creates: the validated
//! configuration, the free-page pool, and the open-channel registry. The
//! path and directory layers sit above this type; embedders that only need
//! raw file storage can drive it directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::channel::FileChannel;
use crate::common::{Config, MemFsError, OpenMode, Result};
use crate::file::RegularFile;
use crate::metadata::{InodeRecord, Metadata};
use crate::registry::ChannelRegistry;
use crate::store::{ByteStore, PagePool};

pub struct MemFs {
    config: Config,
    pool: Arc<PagePool>,
    registry: Arc<ChannelRegistry>,
    open: AtomicBool,
}

impl MemFs {
    /// Create a new filesystem instance with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        log::info!(
            "initializing memfs: page_size={}, page_pool_capacity={}",
            config.page_size,
            config.page_pool_capacity
        );

        let pool = Arc::new(PagePool::new(config.page_size, config.page_pool_capacity));
        Ok(Self {
            config,
            pool,
            registry: Arc::new(ChannelRegistry::new()),
            open: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(MemFsError::ClosedFileSystem);
        }
        Ok(())
    }

    /// Creates a regular file with a fresh default metadata record.
    ///
    /// The file starts with link count zero; the directory layer takes the
    /// first link when it stores the file under a name.
    pub fn create_file(&self) -> Arc<RegularFile> {
        self.create_file_with_metadata(Box::new(InodeRecord::new()))
    }

    /// Creates a regular file around a caller-provided metadata record.
    pub fn create_file_with_metadata(&self, metadata: Box<dyn Metadata>) -> Arc<RegularFile> {
        Arc::new(RegularFile::new(
            ByteStore::new(Arc::clone(&self.pool)),
            metadata,
        ))
    }

    /// Opens a channel on `file` and registers it so a filesystem close
    /// reaches it.
    pub fn open(&self, file: &Arc<RegularFile>, mode: OpenMode) -> Result<Arc<FileChannel>> {
        self.check_open()?;
        mode.validate()?;

        let id = self.registry.allocate_id();
        let channel = Arc::new(FileChannel::new(
            id,
            Arc::clone(file),
            mode,
            Arc::downgrade(&self.registry),
        )?);
        self.registry.register(Arc::clone(&channel));

        // A close racing this open must not strand a live channel.
        if !self.is_open() {
            channel.close();
            return Err(MemFsError::ClosedFileSystem);
        }
        Ok(channel)
    }

    /// Number of channels currently open through this instance
    pub fn open_channels(&self) -> usize {
        self.registry.len()
    }

    /// Closes the filesystem: every registered channel is closed, which
    /// also releases any threads blocked in channel operations. Closing
    /// twice is a no-op.
    pub fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.registry.close_all();
        log::info!("memfs closed");
    }

    /// Point-in-time snapshot of instance counters
    pub fn stats(&self) -> MemFsStats {
        MemFsStats {
            open_channels: self.registry.len(),
            pooled_pages: self.pool.pooled(),
            page_size: self.config.page_size,
        }
    }
}

impl Drop for MemFs {
    fn drop(&mut self) {
        self.close();
    }
}

/// Statistics about a [`MemFs`] instance
#[derive(Debug, Clone)]
pub struct MemFsStats {
    /// Channels currently registered as open
    pub open_channels: usize,
    /// Pages waiting in the free-page pool
    pub pooled_pages: usize,
    /// Page size every store uses
    pub page_size: usize,
}
