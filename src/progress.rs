//! Progress reporting and cooperative cancellation.
//!
//! Both are shared between the caller and a running archive operation, so
//! they are cheap clonable handles around atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::error::{Result, ZipError};

/// Receives progress of entry streams and volume creation.
///
/// Byte counts are cumulative for the entry currently being streamed and
/// never decrease within one entry.
pub trait ProgressSink: Send + Sync {
    /// `unpacked` bytes of entry content have passed through the codec,
    /// corresponding to `packed` bytes on the volumes.
    fn on_progress(&self, unpacked: u64, packed: u64);

    /// A new volume with index `disk` was started by the writer.
    fn on_volume_started(&self, _disk: u32) {}
}

/// A [`ProgressSink`] that simply remembers the latest values.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    unpacked: AtomicU64,
    packed: AtomicU64,
    volumes: AtomicU32,
}

impl ProgressCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unpacked(&self) -> u64 {
        self.unpacked.load(Ordering::Relaxed)
    }

    pub fn packed(&self) -> u64 {
        self.packed.load(Ordering::Relaxed)
    }

    /// Highest volume index reported plus one.
    pub fn volumes_started(&self) -> u32 {
        self.volumes.load(Ordering::Relaxed)
    }
}

impl ProgressSink for ProgressCounter {
    fn on_progress(&self, unpacked: u64, packed: u64) {
        self.unpacked.store(unpacked, Ordering::Relaxed);
        self.packed.store(packed, Ordering::Relaxed);
    }

    fn on_volume_started(&self, disk: u32) {
        self.volumes.fetch_max(disk + 1, Ordering::Relaxed);
    }
}

/// Cooperative cancellation signal, honored at the next volume I/O call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation so the handle can be used again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ZipError::Cancelled);
        }
        Ok(())
    }
}
