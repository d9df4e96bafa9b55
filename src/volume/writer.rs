//! Sequential writing over volumes that are created on demand.

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::{VolumeFactory, VolumePosition};
use crate::error::{CorruptionKind, Result, ZipError};
use crate::io::VolumeWrite;
use crate::progress::{CancelFlag, ProgressSink};

/// A byte sink that opens a new volume whenever the current one reaches
/// the configured size.
///
/// Content bytes flow freely from one volume into the next. Headers must
/// not: callers [`reserve`](SpanningWriter::reserve) the header's length
/// first, which closes the current volume early if the header would not fit,
/// and then write it under a [`WriteLock`].
pub struct SpanningWriter {
    factory: Box<dyn VolumeFactory>,
    volumes: Vec<Box<dyn VolumeWrite>>,
    volume_size: Option<u64>,
    locked: bool,
    cancel: CancelFlag,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl SpanningWriter {
    /// Start writing with the first volume. `volume_size` of `None` means a
    /// single volume of unbounded size.
    pub fn new(
        factory: Box<dyn VolumeFactory>,
        volume_size: Option<u64>,
        cancel: CancelFlag,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        if volume_size == Some(0) {
            return Err(ZipError::misuse("volume size must be greater than zero"));
        }
        let mut writer = Self {
            factory,
            volumes: Vec::new(),
            volume_size,
            locked: false,
            cancel,
            progress,
        };
        writer.start_volume()?;
        Ok(writer)
    }

    fn start_volume(&mut self) -> Result<()> {
        let disk = self.volumes.len() as u32;
        let volume = self.factory.create(disk)?;
        self.volumes.push(volume);
        if let Some(progress) = &self.progress {
            progress.on_volume_started(disk);
        }
        if disk > 0 {
            log::debug!("started volume {disk}");
        }
        Ok(())
    }

    fn current_disk(&self) -> u32 {
        (self.volumes.len() - 1) as u32
    }

    fn current(&mut self) -> &mut Box<dyn VolumeWrite> {
        let disk = self.volumes.len() - 1;
        &mut self.volumes[disk]
    }

    pub fn volume_size(&self) -> Option<u64> {
        self.volume_size
    }

    /// Where the next byte will be written.
    pub fn position(&self) -> VolumePosition {
        let disk = self.current_disk();
        VolumePosition::new(disk, self.volumes[disk as usize].len())
    }

    pub fn lengths(&self) -> Vec<u64> {
        self.volumes.iter().map(|v| v.len()).collect()
    }

    /// Bytes that still fit in the current volume; `None` when unbounded.
    pub fn remaining_in_volume(&self) -> Option<u64> {
        self.volume_size
            .map(|size| size.saturating_sub(self.position().offset))
    }

    pub fn check_if_can_atomic_write(&self, count: u64) -> bool {
        self.remaining_in_volume().is_none_or(|left| count <= left)
    }

    /// Guarantee that the next `count` bytes land in a single volume,
    /// starting a new volume if needed.
    pub fn reserve(&mut self, count: u64) -> Result<()> {
        if self.check_if_can_atomic_write(count) {
            return Ok(());
        }
        if self.locked {
            return Err(self.fragmented("cannot change volume while locked"));
        }
        if let Some(size) = self.volume_size {
            if count > size {
                return Err(self.fragmented(format!(
                    "{count} byte header can never fit in a {size} byte volume"
                )));
            }
        }
        self.start_volume()
    }

    pub fn lock_volume_disk(&mut self) -> Result<WriteLock<'_>> {
        if self.locked {
            return Err(ZipError::misuse("volume is already locked"));
        }
        self.locked = true;
        Ok(WriteLock { writer: self })
    }

    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            self.cancel.check()?;
            let room = match self.remaining_in_volume() {
                None => buf.len(),
                Some(0) => {
                    if self.locked {
                        return Err(self.fragmented("write crosses the end of a locked volume"));
                    }
                    self.start_volume()?;
                    continue;
                }
                Some(left) => left.min(buf.len() as u64) as usize,
            };
            if self.locked && room < buf.len() {
                return Err(self.fragmented("write crosses the end of a locked volume"));
            }
            let (head, tail) = buf.split_at(room);
            self.current().append(head)?;
            buf = tail;
        }
        Ok(())
    }

    /// Overwrite bytes already written at `position`. The range must lie
    /// within one volume.
    pub fn write_at(&mut self, position: VolumePosition, buf: &[u8]) -> Result<()> {
        self.cancel.check()?;
        let volume = self.volumes.get_mut(position.disk as usize).ok_or_else(|| {
            ZipError::corrupt(
                CorruptionKind::AddressOutOfRange,
                Some(position),
                "patch targets a volume that was never written",
            )
        })?;
        volume.write_at(position.offset, buf)?;
        Ok(())
    }

    /// Flush and close every volume. Returns the number of volumes written.
    pub fn finish(mut self) -> Result<u32> {
        for volume in &mut self.volumes {
            volume.flush()?;
        }
        let count = self.volumes.len() as u32;
        self.volumes.clear();
        self.factory.finish(count)?;
        Ok(count)
    }

    fn fragmented(&self, detail: impl Into<String>) -> ZipError {
        ZipError::corrupt(CorruptionKind::FragmentedHeader, Some(self.position()), detail)
    }
}

impl io::Write for SpanningWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf).map_err(ZipError::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current().flush()
    }
}

/// Scoped write lock; see [`SpanningWriter::lock_volume_disk`].
pub struct WriteLock<'a> {
    writer: &'a mut SpanningWriter,
}

impl Deref for WriteLock<'_> {
    type Target = SpanningWriter;

    fn deref(&self) -> &SpanningWriter {
        self.writer
    }
}

impl DerefMut for WriteLock<'_> {
    fn deref_mut(&mut self) -> &mut SpanningWriter {
        self.writer
    }
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        self.writer.locked = false;
    }
}
