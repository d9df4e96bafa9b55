//! Byte sources and sinks that volumes are built from.
//!
//! The archive engine itself is synchronous and talks to volumes through
//! [`VolumeRead`] and [`VolumeWrite`]. Remote or otherwise asynchronous
//! sources implement the async [`ReadAt`] trait instead and are adapted with
//! [`BlockingReadAt`].

mod blocking;
mod http;
mod local;
mod memory;

pub use blocking::BlockingReadAt;
pub use http::HttpRangeReader;
pub use local::{FileVolume, LocalFileReader};
pub use memory::MemoryVolume;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for random access reading from an asynchronous data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// A single readable volume of an archive.
pub trait VolumeRead: Send {
    /// Read up to `buf.len()` bytes starting at `offset`. Returns the number
    /// of bytes read, which is zero only at the end of the volume.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Current length of the volume in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single writable volume of an archive.
///
/// Volumes only ever grow at the end; positioned writes are used to patch
/// bytes that were already appended (local headers whose sizes became known
/// after the entry data was written).
pub trait VolumeWrite: Send {
    /// Append `buf` to the end of the volume.
    fn append(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Overwrite already written bytes starting at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()>;

    /// Current length of the volume in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
