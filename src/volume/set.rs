//! The physical volumes behind a split archive.
//!
//! On the read side a [`VolumeSet`] is an ordered list of already existing
//! volumes. On the write side volumes come into existence one at a time, so
//! the writer asks a [`VolumeFactory`] for each new one.
//!
//! Split archives on disk follow the PKZIP naming convention: every volume
//! but the last is named `name.z01`, `name.z02`, ..., and the last one is
//! `name.zip`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Result, ZipError};
use crate::io::{FileVolume, MemoryVolume, VolumeRead, VolumeWrite};

/// Path of volume `disk` for the split archive whose last volume is `base`.
pub fn split_volume_path(base: &Path, disk: u32) -> PathBuf {
    base.with_extension(format!("z{:02}", disk + 1))
}

/// Ordered, read-only set of volumes making up one archive.
pub struct VolumeSet {
    volumes: Vec<Box<dyn VolumeRead>>,
}

impl VolumeSet {
    pub fn new(volumes: Vec<Box<dyn VolumeRead>>) -> Result<Self> {
        if volumes.is_empty() {
            return Err(ZipError::misuse("a volume set needs at least one volume"));
        }
        Ok(Self { volumes })
    }

    pub fn single(volume: impl VolumeRead + 'static) -> Self {
        Self {
            volumes: vec![Box::new(volume)],
        }
    }

    /// Open the given files, in order, as the volumes of one archive.
    pub fn open_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let volumes = paths
            .iter()
            .map(|p| Ok(Box::new(FileVolume::open(p.as_ref())?) as Box<dyn VolumeRead>))
            .collect::<Result<Vec<_>>>()?;
        Self::new(volumes)
    }

    /// Open `path` (the `.zip` volume) together with any `.z01`, `.z02`, ...
    /// siblings preceding it.
    pub fn open_split(path: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        loop {
            let candidate = split_volume_path(path, paths.len() as u32);
            if !candidate.is_file() {
                break;
            }
            paths.push(candidate);
        }
        paths.push(path.to_path_buf());
        log::debug!("opening {} with {} volume(s)", path.display(), paths.len());
        Self::open_files(&paths)
    }

    pub fn from_memory(volumes: impl IntoIterator<Item = MemoryVolume>) -> Result<Self> {
        Self::new(
            volumes
                .into_iter()
                .map(|v| Box::new(v) as Box<dyn VolumeRead>)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Index of the last volume, which holds the end of central directory.
    pub fn last_disk(&self) -> u32 {
        self.volumes.len().saturating_sub(1) as u32
    }

    pub fn get(&self, disk: u32) -> Option<&dyn VolumeRead> {
        self.volumes.get(disk as usize).map(|v| v.as_ref())
    }

    /// Lengths of all volumes, in order; the input to position arithmetic.
    pub fn lengths(&self) -> Vec<u64> {
        self.volumes.iter().map(|v| v.len()).collect()
    }
}

/// Creates the volumes of an archive that is being written.
pub trait VolumeFactory: Send {
    /// Create volume number `disk`. Volumes are requested in order.
    fn create(&mut self, disk: u32) -> Result<Box<dyn VolumeWrite>>;

    /// Called once every volume has been flushed and dropped.
    fn finish(&mut self, _disk_count: u32) -> Result<()> {
        Ok(())
    }
}

/// Writes `name.z01`, `name.z02`, ... and renames the last volume to the
/// archive's own name once it is known to be the last.
pub struct SplitFileFactory {
    base: PathBuf,
}

impl SplitFileFactory {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl VolumeFactory for SplitFileFactory {
    fn create(&mut self, disk: u32) -> Result<Box<dyn VolumeWrite>> {
        let path = split_volume_path(&self.base, disk);
        log::trace!("creating volume {}", path.display());
        Ok(Box::new(FileVolume::create(&path)?))
    }

    fn finish(&mut self, disk_count: u32) -> Result<()> {
        let last = split_volume_path(&self.base, disk_count.saturating_sub(1));
        std::fs::rename(&last, &self.base)?;
        Ok(())
    }
}

/// Keeps every volume in memory. Clones share the same list.
#[derive(Clone, Default)]
pub struct MemoryFactory {
    volumes: Arc<Mutex<Vec<MemoryVolume>>>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Volumes created so far, in order.
    pub fn volumes(&self) -> Vec<MemoryVolume> {
        self.volumes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn volume_set(&self) -> Result<VolumeSet> {
        VolumeSet::from_memory(self.volumes())
    }
}

impl VolumeFactory for MemoryFactory {
    fn create(&mut self, _disk: u32) -> Result<Box<dyn VolumeWrite>> {
        let volume = MemoryVolume::new();
        self.volumes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(volume.clone());
        Ok(Box::new(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_names_follow_pkzip_convention() {
        let base = Path::new("/tmp/backup.zip");
        assert_eq!(split_volume_path(base, 0), Path::new("/tmp/backup.z01"));
        assert_eq!(split_volume_path(base, 11), Path::new("/tmp/backup.z12"));
        assert_eq!(split_volume_path(base, 99), Path::new("/tmp/backup.z100"));
    }

    #[test]
    fn open_split_discovers_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("a.zip");
        std::fs::write(split_volume_path(&base, 0), b"one").unwrap();
        std::fs::write(split_volume_path(&base, 1), b"two!").unwrap();
        std::fs::write(&base, b"last").unwrap();

        let set = VolumeSet::open_split(&base).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.lengths(), vec![3, 4, 4]);
        assert_eq!(set.last_disk(), 2);
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(VolumeSet::new(Vec::new()).is_err());
    }
}
