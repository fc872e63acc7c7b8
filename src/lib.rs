//! # memfs: An embeddable in-memory filesystem core
//!
//! `memfs` keeps regular-file content in paged byte stores and exposes
//! seekable, closable file channels with the semantics test harnesses and
//! sandboxes expect from a real filesystem, without ever touching the host
//! disk.
//!
//! ## Core Features
//!
//! - **Paged Byte Store**: growable fixed-size-page storage with sparse
//!   zero-fill, truncate, scatter/gather I/O, and a bounded free-page pool
//! - **Interruptible File Locking**: one reader/writer lock per file whose
//!   acquisition unwinds when the channel is closed from another thread
//! - **POSIX-style Channels**: position-keeping handles with
//!   read/write/append mode gating, advisory byte-range locks, atomic
//!   append against concurrent writers, and idempotent close
//! - **Async Facade**: every synchronous operation available through a
//!   tokio-backed completion API
//!
//! ## Example
//!
//! ```rust,ignore
//! use memfs::{Config, MemFs, OpenMode};
//!
//! let fs = MemFs::new(Config::default())?;
//! let file = fs.create_file();
//! let channel = fs.open(&file, OpenMode::read_write())?;
//!
//! channel.write(b"hello")?;
//! channel.set_position(0)?;
//!
//! let mut buf = [0u8; 5];
//! assert_eq!(channel.read(&mut buf)?, 5);
//! assert_eq!(&buf, b"hello");
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod advisory;
pub mod async_channel;
pub mod channel;
pub mod common;
pub mod file;
pub mod locking;
pub mod memfs;
pub mod metadata;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use advisory::AdvisoryLock;
pub use async_channel::AsyncFileChannel;
pub use channel::FileChannel;
pub use common::{Config, MemFsError, OpenMode, Result};
pub use file::RegularFile;
pub use locking::{AcquireError, InterruptibleRwLock, ReadGuard, ThreadToken, WriteGuard};
pub use memfs::{MemFs, MemFsStats};
pub use metadata::{InodeRecord, Metadata};
pub use registry::ChannelRegistry;
pub use store::{ByteStore, PagePool};
