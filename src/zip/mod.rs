//! The ZIP container format.
//!
//! ## Architecture
//!
//! - [`structures`]: signatures, flags, compression methods, DOS timestamps
//! - [`extra`]: the extra field blob and its typed fields
//! - [`header`]: local and central directory headers
//! - [`descriptor`]: data descriptors and their layout resolution
//! - [`eocd`]: end of central directory records, classic and ZIP64
//! - [`text`]: name and comment encodings
//! - [`parser`] / [`writer`]: reading and writing whole archives
//! - [`validate`]: whole-archive checks
//! - [`extractor`] / [`archiver`]: async front ends
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end, preceded by the
//!    ZIP64 records when any of its fields overflow
//!
//! In a split archive these bytes are spread over several volumes. Every
//! header lies entirely within one volume; entry data may cross volumes.
//!
//! ## Limitations
//!
//! - No encryption support
//! - Only STORED and DEFLATE are built in; other methods plug in through
//!   [`CodecRegistry`](crate::compression::CodecRegistry)

pub mod archiver;
pub mod descriptor;
pub mod eocd;
pub mod extra;
pub mod extractor;
pub mod header;
pub mod parser;
pub mod structures;
pub mod text;
pub mod validate;
pub mod writer;

pub use archiver::ZipArchiver;
pub use descriptor::{DataDescriptor, DescriptorLayout};
pub use extra::{ExtraField, ExtraFieldCollection, ValidationStringency};
pub use extractor::ZipExtractor;
pub use header::{EntryHeader, EntrySizes};
pub use parser::{ArchiveReader, CentralDirectoryInfo, Entries, EntryReader, ReadOptions, ZipEntry};
pub use structures::*;
pub use text::{Cp437, TextEncoding, TextResolver, Utf8};
pub use validate::{ValidationReport, ValidationStatus};
pub use writer::{ArchiveWriter, EntryOptions, EntryWriter, WriteOptions, WriteSummary};
