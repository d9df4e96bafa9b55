use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{VolumeRead, VolumeWrite};

/// An in-memory volume.
///
/// Clones share the same buffer, so a volume handed to an archive writer can
/// be read back through another clone once the writer is done with it.
#[derive(Clone, Default)]
pub struct MemoryVolume {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes.into())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }
}

impl std::fmt::Debug for MemoryVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVolume")
            .field("len", &self.lock().len())
            .finish()
    }
}

impl VolumeRead for MemoryVolume {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.lock();
        let Some(available) = data.get(offset.min(data.len() as u64) as usize..) else {
            return Ok(0);
        };
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.lock().len() as u64
    }
}

impl VolumeWrite for MemoryVolume {
    fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        self.lock().extend_from_slice(buf);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut data = self.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "positioned write past the end of the volume",
            ));
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.lock().len() as u64
    }
}
