use super::{ReadAt, VolumeRead, VolumeWrite};
use anyhow::Result;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Positioned read that does not move any shared cursor where the platform
/// allows it.
fn pread(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::Read;
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// One volume of a split archive stored as a local file.
pub struct FileVolume {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileVolume {
    /// Open an existing volume for reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    /// Create (or truncate) a volume for writing.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VolumeRead for FileVolume {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let max = (self.len - offset).min(buf.len() as u64) as usize;
        pread(&self.file, offset, &mut buf[..max])
    }

    fn len(&self) -> u64 {
        self.len
    }
}

impl VolumeWrite for FileVolume {
    fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(buf)?;
        self.len += buf.len() as u64;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if offset + buf.len() as u64 > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "positioned write past the end of the volume",
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }
}

/// Local file reader with async random access support
pub struct LocalFileReader {
    file: File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(pread(&self.file, offset, buf)?)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_patch_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.z01");

        let mut volume = FileVolume::create(&path).unwrap();
        volume.append(b"hello world").unwrap();
        volume.write_at(0, b"HELLO").unwrap();
        assert!(volume.write_at(8, b"long").is_err());
        VolumeWrite::flush(&mut volume).unwrap();

        let volume = FileVolume::open(&path).unwrap();
        assert_eq!(VolumeRead::len(&volume), 11);
        let mut buf = [0u8; 16];
        let n = volume.read_at(6, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(volume.read_at(11, &mut buf).unwrap(), 0);
    }
}
