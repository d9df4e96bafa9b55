//! Async front end for reading archives.
//!
//! The archive engine is synchronous. [`ZipExtractor`] runs each operation
//! on tokio's blocking pool, moving the [`ArchiveReader`] into the task and
//! back out once it completes, so an operation that fails or is cancelled
//! still returns the reader with every volume lock released.

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::parser::{ArchiveReader, CentralDirectoryInfo, ReadOptions, ZipEntry};
use super::validate::ValidationReport;
use crate::error::{Result, ZipError};
use crate::io::{BlockingReadAt, HttpRangeReader, ReadAt};
use crate::progress::CancelFlag;
use crate::volume::VolumeSet;

pub(crate) fn join_error(err: tokio::task::JoinError) -> ZipError {
    ZipError::Io(io::Error::other(err))
}

/// Async archive reader
pub struct ZipExtractor {
    reader: Option<ArchiveReader>,
    directory: CentralDirectoryInfo,
    cancel: CancelFlag,
}

impl ZipExtractor {
    pub async fn open(volumes: VolumeSet, options: ReadOptions) -> Result<Self> {
        let cancel = options.cancel.clone();
        let reader = tokio::task::spawn_blocking(move || ArchiveReader::open(volumes, options))
            .await
            .map_err(join_error)??;
        Ok(Self {
            directory: reader.directory().clone(),
            reader: Some(reader),
            cancel,
        })
    }

    /// Open a local archive and any split volumes next to it.
    pub async fn open_path(path: impl Into<PathBuf>, options: ReadOptions) -> Result<Self> {
        let path = path.into();
        let volumes = tokio::task::spawn_blocking(move || VolumeSet::open_split(&path))
            .await
            .map_err(join_error)??;
        Self::open(volumes, options).await
    }

    /// Open a single-volume archive over HTTP Range requests.
    pub async fn open_url(url: &str, options: ReadOptions) -> Result<Self> {
        let source = HttpRangeReader::new(url.to_string())
            .await
            .map_err(|e| ZipError::Io(io::Error::other(e)))?;
        Self::open_source(Arc::new(source), options).await
    }

    /// Open a single-volume archive over any async positioned source.
    pub async fn open_source<R: ReadAt + 'static>(source: Arc<R>, options: ReadOptions) -> Result<Self> {
        let volume = BlockingReadAt::current(source);
        Self::open(VolumeSet::single(volume), options).await
    }

    /// Run `op` against the reader on the blocking pool.
    async fn run<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut ArchiveReader) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| ZipError::misuse("archive reader is closed"))?;
        let (reader, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut reader);
            (reader, result)
        })
        .await
        .map_err(join_error)?;
        self.reader = Some(reader);
        result
    }

    pub fn directory(&self) -> &CentralDirectoryInfo {
        &self.directory
    }

    /// Flag that interrupts the running operation at its next volume access.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// List all entries in the archive
    pub async fn list_files(&mut self) -> Result<Vec<ZipEntry>> {
        self.run(|reader| reader.read_all_entries()).await
    }

    /// Extract an entry's content to memory, verifying size and CRC
    pub async fn extract_to_memory(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let entry = entry.clone();
        self.run(move |reader| reader.read_entry_to_vec(&entry)).await
    }

    /// Extract an entry to disk. Directory entries just create the directory.
    pub async fn extract_to_file(&mut self, entry: &ZipEntry, output_path: &Path) -> Result<()> {
        if entry.is_directory() {
            fs::create_dir_all(output_path).await?;
            return Ok(());
        }
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let entry = entry.clone();
        let output_path = output_path.to_path_buf();
        self.run(move |reader| {
            let mut file = BufWriter::new(std::fs::File::create(&output_path)?);
            let mut content = reader.open_entry(&entry)?;
            content.copy_to(&mut file)?;
            io::Write::flush(&mut file)?;
            Ok(())
        })
        .await
    }

    /// Extract an entry to stdout
    pub async fn extract_to_stdout(&mut self, entry: &ZipEntry) -> Result<()> {
        let data = self.extract_to_memory(entry).await?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&data).await?;
        stdout.flush().await?;
        Ok(())
    }

    /// Check every entry; see [`ArchiveReader::validate`].
    pub async fn validate(&mut self) -> Result<ValidationReport> {
        self.run(|reader| reader.validate()).await
    }

    /// Release the volumes.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Hand back the synchronous reader.
    pub fn into_inner(self) -> Option<ArchiveReader> {
        self.reader
    }
}
