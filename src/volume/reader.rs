//! Sequential reading over a set of volumes.

use std::io;
use std::ops::{Deref, DerefMut};

use super::{VolumePosition, VolumeSet};
use crate::error::{CorruptionKind, Result, ZipError};
use crate::progress::CancelFlag;

/// A byte stream spanning every volume of a [`VolumeSet`].
///
/// Plain reads flow from the end of one volume into the start of the next.
/// While a [`VolumeLock`] is held, any read or seek that would leave the
/// current volume fails with [`CorruptionKind::FragmentedHeader`] instead,
/// which is how header parsing detects records split across volumes.
pub struct SpanningReader {
    volumes: VolumeSet,
    lengths: Vec<u64>,
    position: VolumePosition,
    locked: bool,
    cancel: CancelFlag,
}

impl SpanningReader {
    pub fn new(volumes: VolumeSet) -> Self {
        let lengths = volumes.lengths();
        Self {
            volumes,
            lengths,
            position: VolumePosition::START,
            locked: false,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    /// Volume lengths as seen when the reader was created.
    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn last_disk(&self) -> u32 {
        self.volumes.last_disk()
    }

    pub fn position(&self) -> VolumePosition {
        self.position
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Move to `position`. Fails if it names a disk or offset beyond the
    /// known volumes, or leaves the locked volume.
    pub fn seek(&mut self, position: VolumePosition) -> Result<()> {
        let len = self.lengths.get(position.disk as usize).copied();
        match len {
            Some(len) if position.offset <= len => {}
            _ => {
                return Err(ZipError::corrupt(
                    CorruptionKind::AddressOutOfRange,
                    Some(position),
                    format!("seek beyond the {} known volume(s)", self.lengths.len()),
                ));
            }
        }
        if self.locked && position.disk != self.position.disk {
            return Err(self.fragmented(format!("seek to {position} while volume is locked")));
        }
        self.position = position;
        Ok(())
    }

    /// Position `count` bytes ahead of `from`, resolved across volumes.
    pub fn advance(&self, from: VolumePosition, count: u64) -> Result<VolumePosition> {
        from.checked_add(count, &self.lengths)
    }

    pub fn remaining_in_volume(&self) -> u64 {
        self.lengths[self.position.disk as usize] - self.position.offset
    }

    /// Whether `count` bytes can be read from the current position without
    /// crossing into the next volume.
    pub fn check_if_can_atomic_read(&self, count: u64) -> bool {
        count <= self.remaining_in_volume()
    }

    pub fn has_next_volume(&self) -> bool {
        self.position.disk < self.last_disk()
    }

    pub fn advance_to_next_volume(&mut self) -> Result<()> {
        if self.locked {
            return Err(self.fragmented("volume change requested while locked"));
        }
        if !self.has_next_volume() {
            return Err(ZipError::corrupt(
                CorruptionKind::AddressOutOfRange,
                Some(self.position),
                "no volume follows the last one",
            ));
        }
        self.position = VolumePosition::new(self.position.disk + 1, 0);
        log::trace!("reader moved to volume {}", self.position.disk);
        Ok(())
    }

    /// Make sure a `count` byte header can be read atomically, stepping to
    /// the next volume when the current one is exhausted. Bytes left over in
    /// a volume that cannot hold the header mean the header is fragmented.
    pub fn ensure_atomic(&mut self, count: u64) -> Result<()> {
        if self.check_if_can_atomic_read(count) {
            return Ok(());
        }
        if self.remaining_in_volume() == 0 && self.has_next_volume() {
            self.advance_to_next_volume()?;
            if self.check_if_can_atomic_read(count) {
                return Ok(());
            }
        }
        Err(self.fragmented(format!(
            "{count} byte header does not fit in the {} bytes left on the volume",
            self.remaining_in_volume()
        )))
    }

    /// Forbid reads and seeks from leaving the current volume until the
    /// returned guard is dropped.
    pub fn lock_volume_disk(&mut self) -> Result<VolumeLock<'_>> {
        if self.locked {
            return Err(ZipError::misuse("volume is already locked"));
        }
        self.locked = true;
        Ok(VolumeLock { reader: self })
    }

    /// Read up to `buf.len()` bytes, moving into the next volume when the
    /// current one is exhausted. Returns 0 only at the end of the last volume.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.cancel.check()?;

        while self.remaining_in_volume() == 0 {
            if self.locked {
                return Err(self.fragmented("read past the end of a locked volume"));
            }
            if !self.has_next_volume() {
                return Ok(0);
            }
            self.advance_to_next_volume()?;
        }

        let max = self.remaining_in_volume().min(buf.len() as u64) as usize;
        let volume = self
            .volumes
            .get(self.position.disk)
            .ok_or_else(|| self.fragmented("volume disappeared"))?;
        let n = volume.read_at(self.position.offset, &mut buf[..max])?;
        if n == 0 {
            return Err(ZipError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("volume {} ended early at offset {}", self.position.disk, self.position.offset),
            )));
        }
        self.position.offset += n as u64;
        Ok(n)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.locked && buf.len() as u64 > self.remaining_in_volume() {
            return Err(self.fragmented(format!(
                "{} byte read crosses the end of a locked volume",
                buf.len()
            )));
        }
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_some(&mut buf[filled..])?;
            if n == 0 {
                return Err(ZipError::corrupt(
                    CorruptionKind::Truncated,
                    Some(self.position),
                    "unexpected end of archive",
                ));
            }
            filled += n;
        }
        Ok(())
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn fragmented(&self, detail: impl Into<String>) -> ZipError {
        ZipError::corrupt(CorruptionKind::FragmentedHeader, Some(self.position), detail)
    }
}

impl io::Read for SpanningReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_some(buf).map_err(ZipError::into_io)
    }
}

/// Scoped volume lock; see [`SpanningReader::lock_volume_disk`].
///
/// The lock is released when the guard is dropped, on every exit path.
pub struct VolumeLock<'a> {
    reader: &'a mut SpanningReader,
}

impl VolumeLock<'_> {
    /// Release the lock early.
    pub fn unlock(self) {}
}

impl Deref for VolumeLock<'_> {
    type Target = SpanningReader;

    fn deref(&self) -> &SpanningReader {
        self.reader
    }
}

impl DerefMut for VolumeLock<'_> {
    fn deref_mut(&mut self) -> &mut SpanningReader {
        self.reader
    }
}

impl Drop for VolumeLock<'_> {
    fn drop(&mut self) {
        self.reader.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryVolume;
    use std::io::Read;

    fn reader(volumes: &[&[u8]]) -> SpanningReader {
        let set = VolumeSet::from_memory(volumes.iter().map(|v| MemoryVolume::from_bytes(*v)))
            .unwrap();
        SpanningReader::new(set)
    }

    #[test]
    fn reads_flow_across_volumes() {
        let mut r = reader(&[b"abc", b"", b"defg"]);
        let mut out = String::new();
        r.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcdefg");
        assert_eq!(r.position(), VolumePosition::new(2, 4));
    }

    #[test]
    fn atomic_read_check() {
        let mut r = reader(&[b"abcdef", b"ghij"]);
        r.seek(VolumePosition::new(0, 2)).unwrap();
        assert!(r.check_if_can_atomic_read(4));
        assert!(!r.check_if_can_atomic_read(5));
    }

    #[test]
    fn locked_read_cannot_cross() {
        let mut r = reader(&[b"abcdef", b"ghij"]);
        r.seek(VolumePosition::new(0, 4)).unwrap();
        {
            let mut lock = r.lock_volume_disk().unwrap();
            let mut buf = [0u8; 4];
            let err = lock.read_exact(&mut buf).unwrap_err();
            assert_eq!(err.corruption_kind(), Some(CorruptionKind::FragmentedHeader));
            assert!(lock.seek(VolumePosition::new(1, 0)).is_err());
        }
        assert!(!r.is_locked());
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"efgh");
    }

    #[test]
    fn lock_is_released_on_error_paths() {
        fn parse(r: &mut SpanningReader) -> Result<()> {
            let mut lock = r.lock_volume_disk()?;
            lock.read_vec(100)?;
            Ok(())
        }
        let mut r = reader(&[b"abc", b"def"]);
        assert!(parse(&mut r).is_err());
        assert!(!r.is_locked());
        assert!(r.lock_volume_disk().is_ok());
    }

    #[test]
    fn ensure_atomic_steps_over_exhausted_volume() {
        let mut r = reader(&[b"abc", b"defghi"]);
        r.seek(VolumePosition::new(0, 3)).unwrap();
        r.ensure_atomic(4).unwrap();
        assert_eq!(r.position(), VolumePosition::new(1, 0));

        r.seek(VolumePosition::new(1, 4)).unwrap();
        let err = r.ensure_atomic(4).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::FragmentedHeader));
    }

    #[test]
    fn seek_outside_is_an_addressing_error() {
        let mut r = reader(&[b"abc"]);
        let err = r.seek(VolumePosition::new(1, 0)).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::AddressOutOfRange));
        assert!(r.seek(VolumePosition::new(0, 4)).is_err());
        assert!(r.seek(VolumePosition::new(0, 3)).is_ok());
    }

    #[test]
    fn cancellation_stops_reads() {
        let cancel = CancelFlag::new();
        let mut r = reader(&[b"abc"]).with_cancel(cancel.clone());
        cancel.cancel();
        let mut buf = [0u8; 1];
        assert!(matches!(r.read_some(&mut buf), Err(ZipError::Cancelled)));
        cancel.reset();
        assert_eq!(r.read_some(&mut buf).unwrap(), 1);
    }
}
