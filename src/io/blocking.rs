use std::io;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::{ReadAt, VolumeRead};

/// Exposes an async [`ReadAt`] source as a synchronous volume.
///
/// Reads are driven with [`Handle::block_on`], so the volume must only be
/// used from a thread that is not itself running async tasks, such as the
/// blocking pool behind [`tokio::task::spawn_blocking`]. The async archive
/// front ends ([`ZipExtractor`](crate::ZipExtractor)) do exactly that.
pub struct BlockingReadAt<R: ReadAt> {
    source: Arc<R>,
    handle: Handle,
}

impl<R: ReadAt> BlockingReadAt<R> {
    pub fn new(source: Arc<R>, handle: Handle) -> Self {
        Self { source, handle }
    }

    /// Bind to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current(source: Arc<R>) -> Self {
        Self::new(source, Handle::current())
    }

    pub fn source(&self) -> &Arc<R> {
        &self.source
    }
}

impl<R: ReadAt + 'static> VolumeRead for BlockingReadAt<R> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.source.size();
        if offset >= size {
            return Ok(0);
        }
        let max = (size - offset).min(buf.len() as u64) as usize;
        self.handle
            .block_on(self.source.read_at(offset, &mut buf[..max]))
            .map_err(io::Error::other)
    }

    fn len(&self) -> u64 {
        self.source.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LocalFileReader;

    #[test]
    fn reads_through_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let source = Arc::new(LocalFileReader::new(&path).unwrap());
        let volume = BlockingReadAt::new(source, runtime.handle().clone());

        let mut buf = [0u8; 4];
        assert_eq!(volume.read_at(3, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"3456");
        assert_eq!(volume.len(), 10);
        assert_eq!(volume.read_at(10, &mut buf).unwrap(), 0);
    }
}
