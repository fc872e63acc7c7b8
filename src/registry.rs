//! Filesystem-wide open-channel registry
//!
//! Every channel registers itself at construction and unregisters on
//! close, so shutting down the filesystem can close every handle that is
//! still out there. The map is concurrent: registration and close happen
//! from arbitrary threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::channel::FileChannel;

pub struct ChannelRegistry {
    channels: DashMap<u64, Arc<FileChannel>>,
    next_id: AtomicU64,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, channel: Arc<FileChannel>) {
        self.channels.insert(channel.id(), channel);
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.channels.remove(&id);
    }

    /// Number of channels currently registered
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Closes every registered channel. Each close unregisters the channel
    /// and releases any thread blocked on it.
    pub fn close_all(&self) {
        let channels: Vec<Arc<FileChannel>> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if !channels.is_empty() {
            log::info!("closing {} open channels", channels.len());
        }
        for channel in channels {
            channel.close();
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
