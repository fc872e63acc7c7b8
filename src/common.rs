//! Common types and error definitions for memfs
//!
//! This module contains the error taxonomy, configuration, and open-mode
//! flags used throughout the filesystem core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default page size for byte stores - 8 KiB
pub const DEFAULT_PAGE_SIZE: usize = 8 * 1024;

/// Default bound on the free-page cache shared by all byte stores
pub const DEFAULT_PAGE_POOL_CAPACITY: usize = 16;

/// Error types for memfs operations
#[derive(Error, Debug)]
pub enum MemFsError {
    /// Operation attempted on a channel that has already been closed
    #[error("Channel is closed")]
    ClosedChannel,

    /// Channel was closed by another thread while this one was blocked
    #[error("Channel was closed by another thread during a blocking operation")]
    AsynchronousClose,

    /// This thread was interrupted while blocked; the channel is now closed
    #[error("Thread was interrupted while blocked; channel has been closed")]
    ClosedByInterrupt,

    /// Read attempted on a channel not opened for reading
    #[error("Channel is not open for reading")]
    NonReadable,

    /// Write attempted on a channel not opened for writing
    #[error("Channel is not open for writing")]
    NonWritable,

    /// Operation attempted through a filesystem that has been closed
    #[error("Filesystem is closed")]
    ClosedFileSystem,

    /// Growing a byte store failed to get memory from the allocator
    #[error("Allocation failed: size {size}")]
    AllocationFailed { size: usize },

    #[error("Illegal argument: {message}")]
    IllegalArgument { message: String },

    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemFsError {
    /// Check if this error means the channel (or filesystem) went away
    pub fn is_close_error(&self) -> bool {
        matches!(
            self,
            MemFsError::ClosedChannel
                | MemFsError::AsynchronousClose
                | MemFsError::ClosedByInterrupt
                | MemFsError::ClosedFileSystem
        )
    }

    /// Check if this error is a user input error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MemFsError::IllegalArgument { .. }
                | MemFsError::InvalidConfig { .. }
                | MemFsError::NonReadable
                | MemFsError::NonWritable
        )
    }

    /// Get error category for logging and diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            MemFsError::ClosedChannel => "closed",
            MemFsError::AsynchronousClose => "async_close",
            MemFsError::ClosedByInterrupt => "interrupt",
            MemFsError::NonReadable | MemFsError::NonWritable => "mode",
            MemFsError::ClosedFileSystem => "closed_fs",
            MemFsError::AllocationFailed { .. } => "allocation",
            MemFsError::IllegalArgument { .. } => "argument",
            MemFsError::Unsupported { .. } => "unsupported",
            MemFsError::InvalidConfig { .. } => "configuration",
            MemFsError::Io(_) => "io",
        }
    }

    pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
        MemFsError::IllegalArgument {
            message: message.into(),
        }
    }
}

/// Result type alias for memfs operations
pub type Result<T> = std::result::Result<T, MemFsError>;

/// Open-mode flags for a file channel.
///
/// At least one of `read` and `write` must be set; `append` requires `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
}

impl OpenMode {
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
        }
    }

    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            append: false,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            append: false,
        }
    }

    /// Write mode where every write lands at the current end of the file
    pub fn append() -> Self {
        Self {
            read: false,
            write: true,
            append: true,
        }
    }

    /// Adds append to an existing mode
    pub fn with_append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Validate the flag combination
    pub fn validate(&self) -> Result<()> {
        if !self.read && !self.write {
            return Err(MemFsError::illegal_argument(
                "channel must be opened for reading or writing",
            ));
        }
        if self.append && !self.write {
            return Err(MemFsError::illegal_argument(
                "append mode requires write mode",
            ));
        }
        Ok(())
    }
}

/// Configuration for a memfs instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page size used by every byte store created through this instance
    pub page_size: usize,
    /// Maximum number of freed pages kept for reuse
    pub page_pool_capacity: usize,
}

impl Config {
    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.page_size < 512 {
            return Err(MemFsError::InvalidConfig {
                message: "Page size must be at least 512 bytes".to_string(),
            });
        }

        if self.page_size > 16 * 1024 * 1024 {
            return Err(MemFsError::InvalidConfig {
                message: "Page size cannot exceed 16MB".to_string(),
            });
        }

        if !self.page_size.is_power_of_two() {
            return Err(MemFsError::InvalidConfig {
                message: "Page size must be a power of 2".to_string(),
            });
        }

        if self.page_pool_capacity > 1024 {
            log::warn!(
                "Page pool capacity {} is large; idle pools will hoard memory",
                self.page_pool_capacity
            );
        }

        Ok(())
    }

    /// Create a configuration tuned for many small files
    pub fn small_pages() -> Result<Self> {
        let config = Self {
            page_size: 1024,
            page_pool_capacity: 64,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration tuned for large sequential content
    pub fn large_pages() -> Result<Self> {
        let config = Self {
            page_size: 64 * 1024,
            page_pool_capacity: 8,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_pool_capacity: DEFAULT_PAGE_POOL_CAPACITY,
        }
    }
}
