//! Async front end for writing archives, the counterpart of
//! [`ZipExtractor`](super::ZipExtractor).

use std::fs::File;
use std::path::PathBuf;

use super::extractor::join_error;
use super::header::EntrySizes;
use super::writer::{ArchiveWriter, EntryOptions, WriteOptions, WriteSummary};
use crate::error::{Result, ZipError};
use crate::progress::CancelFlag;
use crate::volume::VolumeFactory;

/// Async archive writer
pub struct ZipArchiver {
    writer: Option<ArchiveWriter>,
    cancel: CancelFlag,
}

impl ZipArchiver {
    pub async fn create(factory: Box<dyn VolumeFactory>, options: WriteOptions) -> Result<Self> {
        let cancel = options.cancel.clone();
        let writer = tokio::task::spawn_blocking(move || ArchiveWriter::create(factory, options))
            .await
            .map_err(join_error)??;
        Ok(Self {
            writer: Some(writer),
            cancel,
        })
    }

    pub async fn create_path(path: impl Into<PathBuf>, options: WriteOptions) -> Result<Self> {
        let path = path.into();
        let cancel = options.cancel.clone();
        let writer =
            tokio::task::spawn_blocking(move || ArchiveWriter::create_path(&path, options))
                .await
                .map_err(join_error)??;
        Ok(Self {
            writer: Some(writer),
            cancel,
        })
    }

    async fn run<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut ArchiveWriter) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| ZipError::misuse("archive writer is no longer available"))?;
        let (writer, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut writer);
            (writer, result)
        })
        .await
        .map_err(join_error)?;
        self.writer = Some(writer);
        result
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn add_entry(&mut self, options: EntryOptions, data: Vec<u8>) -> Result<EntrySizes> {
        self.run(move |writer| writer.add_entry(options, &data)).await
    }

    /// Add the content of a local file. Its length becomes the declared size.
    pub async fn add_file(&mut self, options: EntryOptions, path: PathBuf) -> Result<EntrySizes> {
        self.run(move |writer| {
            let mut file = File::open(&path)?;
            let len = file.metadata()?.len();
            writer.add_reader(options.declared_size(len), &mut file)
        })
        .await
    }

    pub async fn add_directory(&mut self, name: String) -> Result<EntrySizes> {
        self.run(move |writer| writer.add_directory(name)).await
    }

    /// Write the central directory and close all volumes.
    pub async fn finish(mut self) -> Result<WriteSummary> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| ZipError::misuse("archive writer is no longer available"))?;
        tokio::task::spawn_blocking(move || writer.finish())
            .await
            .map_err(join_error)?
    }
}
