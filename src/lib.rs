//! # spanzip
//!
//! A ZIP/ZIP64 reader and writer with first-class support for split
//! (multi-volume) archives.
//!
//! Archive bytes are addressed as (disk, offset) pairs through
//! [`VolumePosition`], so a set of `.z01`, `.z02`, ..., `.zip` volumes reads
//! and writes exactly like a single file. Headers are never allowed to
//! straddle two volumes: the writer moves them to the next volume, and the
//! reader reports a fragmented header as corruption.
//!
//! ## Features
//!
//! - Split archives on local disk or in memory, single archives over HTTP
//!   Range requests
//! - ZIP64 sizes, offsets and counts, used only when 32-bit fields saturate
//! - STORED and DEFLATE, plus a registry for other compression methods
//! - Size and CRC verification of every entry stream
//! - Data descriptor resolution that does not trust the signature alone
//! - Whole-archive validation
//! - Async front ends running on tokio's blocking pool
//!
//! ## Example
//!
//! ```no_run
//! use spanzip::{ArchiveReader, ArchiveWriter, EntryOptions, ReadOptions, WriteOptions};
//!
//! # fn main() -> spanzip::Result<()> {
//! let mut writer = ArchiveWriter::create_path(
//!     "backup.zip".as_ref(),
//!     WriteOptions::new().volume_size(64 * 1024 * 1024),
//! )?;
//! writer.add_entry(EntryOptions::file("hello.txt"), b"hello world")?;
//! writer.finish()?;
//!
//! let mut archive = ArchiveReader::open_path("backup.zip".as_ref(), ReadOptions::default())?;
//! for entry in archive.read_all_entries()? {
//!     println!("{}", entry.name());
//! }
//! assert!(archive.validate()?.status.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod compression;
pub mod error;
pub mod io;
pub mod progress;
pub mod volume;
pub mod zip;

pub use cli::Cli;
pub use compression::{CodecRegistry, CoderOption, DeflateLevel};
pub use error::{CorruptionKind, ErrorClass, Result, UnsupportedFeature, ZipError};
pub use io::{HttpRangeReader, LocalFileReader, MemoryVolume, ReadAt};
pub use progress::{CancelFlag, ProgressCounter, ProgressSink};
pub use volume::{
    MemoryFactory, SpanningReader, SpanningWriter, SplitFileFactory, VolumeLock, VolumePosition,
    VolumeSet,
};
pub use zip::{
    ArchiveReader, ArchiveWriter, EntryOptions, ReadOptions, ValidationReport, ValidationStatus,
    ValidationStringency, WriteOptions, WriteSummary, ZipArchiver, ZipEntry, ZipExtractor,
};
