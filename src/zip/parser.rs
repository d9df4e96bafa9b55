//! Reading archives.
//!
//! This module handles locating the end records, walking the central
//! directory and opening entry content, all through a [`SpanningReader`] so
//! that split archives read exactly like single-file ones.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the end of the last volume
//! 2. If ZIP64, follow the locator to the ZIP64 EOCD record
//! 3. Walk the Central Directory one header at a time
//! 4. For every entry, read its Local File Header (and data descriptor) and
//!    cross-check it against the central header
//!
//! Entries are produced lazily, so listing a huge archive never holds more
//! than one header in memory.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;

use super::descriptor::DataDescriptor;
use super::eocd::{
    EndOfCentralDirectory, MAX_COMMENT_SIZE, Zip64EndLocator, Zip64EndOfCentralDirectory,
    find_candidates,
};
use super::extra::{
    ExtendedTimestamp, NtfsTimes, UnicodeComment, UnicodePath, ValidationStringency, XceedUnicode,
};
use super::header::{EntryHeader, EntrySizes, cross_validate};
use super::structures::*;
use super::text::TextResolver;
use crate::compression::{CodecRegistry, DecodingStream, PackedInput};
use crate::error::{CorruptionKind, Result, ZipError};
use crate::progress::{CancelFlag, ProgressSink};
use crate::volume::{SpanningReader, VolumePosition, VolumeSet};

/// Settings for [`ArchiveReader`].
#[derive(Clone, Default)]
pub struct ReadOptions {
    pub stringency: ValidationStringency,
    pub cancel: CancelFlag,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub codecs: Arc<CodecRegistry>,
    pub text: TextResolver,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stringency(mut self, stringency: ValidationStringency) -> Self {
        self.stringency = stringency;
        self
    }

    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    pub fn text(mut self, text: TextResolver) -> Self {
        self.text = text;
        self
    }
}

/// Where the central directory is and what the end records say about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryInfo {
    /// Position of the first central directory header.
    pub start: VolumePosition,
    /// Size in bytes as recorded in the end records.
    pub size: u64,
    pub total_entries: u64,
    pub entries_on_last_disk: u64,
    /// Position of the classic end of central directory record.
    pub end_record: VolumePosition,
    /// Whether ZIP64 end records were present.
    pub zip64: bool,
    pub comment: Vec<u8>,
}

/// One archive entry: its central directory header paired with the
/// matching, cross-checked local header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    index: u64,
    name: String,
    comment: String,
    central: EntryHeader,
    local: EntryHeader,
    data_position: VolumePosition,
}

impl ZipEntry {
    /// Index in the central directory.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name bytes as stored.
    pub fn raw_name(&self) -> &[u8] {
        &self.central.common.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn size(&self) -> u64 {
        self.central.common.sizes.size
    }

    pub fn packed_size(&self) -> u64 {
        self.central.common.sizes.packed_size
    }

    pub fn crc32(&self) -> u32 {
        self.central.common.sizes.crc
    }

    pub fn sizes(&self) -> EntrySizes {
        self.central.common.sizes
    }

    pub fn method(&self) -> CompressionMethod {
        self.central.common.method
    }

    pub fn flags(&self) -> GeneralPurposeFlags {
        self.central.common.flags
    }

    pub fn is_directory(&self) -> bool {
        self.central.is_directory()
    }

    pub fn host_system(&self) -> Option<HostSystem> {
        self.central.host_system()
    }

    pub fn unix_mode(&self) -> Option<u32> {
        self.central.unix_mode()
    }

    pub fn external_attributes(&self) -> u32 {
        self.central.central().map_or(0, |c| c.external_attributes)
    }

    pub fn dos_timestamp(&self) -> Option<DosDateTime> {
        self.central.common.timestamp
    }

    /// Last modification time: NTFS times first, then the extended
    /// timestamp, then the DOS timestamp.
    pub fn modified(&self) -> Option<NaiveDateTime> {
        let extra = &self.central.common.extra;
        let lenient = ValidationStringency::Lenient;
        if let Ok(Some(ntfs)) = extra.find::<NtfsTimes>(HeaderKind::Central, lenient) {
            if let Some(time) = ntfs.modified_naive() {
                return Some(time);
            }
        }
        if let Ok(Some(ext)) = extra.find::<ExtendedTimestamp>(HeaderKind::Central, lenient) {
            if let Some(time) = ext.modified_naive() {
                return Some(time);
            }
        }
        self.central.common.timestamp.and_then(|t| t.to_naive())
    }

    pub fn central_header(&self) -> &EntryHeader {
        &self.central
    }

    pub fn local_header(&self) -> &EntryHeader {
        &self.local
    }

    pub fn local_header_position(&self) -> VolumePosition {
        self.local.position
    }

    /// First byte of the packed data.
    pub fn data_position(&self) -> VolumePosition {
        self.data_position
    }

    pub fn data_descriptor(&self) -> Option<&DataDescriptor> {
        self.local.local().and_then(|l| l.descriptor.as_ref())
    }
}

/// Decode an entry name: a Unicode path field written for exactly these
/// name bytes wins, then an Xceed Unicode field, then the text resolver.
fn resolve_name(header: &EntryHeader, text: &TextResolver) -> String {
    let common = &header.common;
    let lenient = ValidationStringency::Lenient;
    if let Ok(Some(path)) = common.extra.find::<UnicodePath>(HeaderKind::Central, lenient) {
        if path.applies_to(&common.name) {
            return path.name;
        }
    }
    if let Ok(Some(xceed)) = common.extra.find::<XceedUnicode>(HeaderKind::Central, lenient) {
        return xceed.name;
    }
    text.decode(common.flags, &common.name)
}

fn resolve_comment(header: &EntryHeader, text: &TextResolver) -> String {
    let Some(central) = header.central() else {
        return String::new();
    };
    let lenient = ValidationStringency::Lenient;
    let extra = &header.common.extra;
    if let Ok(Some(unicode)) = extra.find::<UnicodeComment>(HeaderKind::Central, lenient) {
        if unicode.applies_to(&central.comment) {
            return unicode.comment;
        }
    }
    if let Ok(Some(XceedUnicode {
        comment: Some(comment),
        ..
    })) = extra.find::<XceedUnicode>(HeaderKind::Central, lenient)
    {
        return comment;
    }
    text.decode(header.common.flags, &central.comment)
}

/// Read-only handle on an archive.
///
/// ## Example
///
/// ```no_run
/// use spanzip::{ArchiveReader, ReadOptions};
///
/// # fn main() -> spanzip::Result<()> {
/// let mut archive = ArchiveReader::open_path("backup.zip".as_ref(), ReadOptions::default())?;
/// for entry in archive.entries()? {
///     let entry = entry?;
///     println!("{} {}", entry.size(), entry.name());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ArchiveReader {
    stream: Option<SpanningReader>,
    directory: CentralDirectoryInfo,
    options: ReadOptions,
}

impl ArchiveReader {
    /// Open the archive spread over `volumes` and locate its central
    /// directory.
    pub fn open(volumes: VolumeSet, options: ReadOptions) -> Result<Self> {
        let mut stream = SpanningReader::new(volumes).with_cancel(options.cancel.clone());
        let directory = locate_central_directory(&mut stream)?;
        log::debug!(
            "central directory: {} entries, {} bytes at {}{}",
            directory.total_entries,
            directory.size,
            directory.start,
            if directory.zip64 { " (zip64)" } else { "" }
        );
        Ok(Self {
            stream: Some(stream),
            directory,
            options,
        })
    }

    /// Open a single-file archive or the last volume of a split archive,
    /// together with its `.z01`, `.z02`, ... siblings.
    pub fn open_path(path: &Path, options: ReadOptions) -> Result<Self> {
        Self::open(VolumeSet::open_split(path)?, options)
    }

    pub fn directory(&self) -> &CentralDirectoryInfo {
        &self.directory
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn entry_count(&self) -> u64 {
        self.directory.total_entries
    }

    /// Number of volumes.
    pub fn volume_count(&self) -> Result<usize> {
        Ok(self.stream()?.volumes().len())
    }

    /// Archive comment, decoded with the fallback encoding.
    pub fn comment(&self) -> String {
        self.options.text.fallback().decode(&self.directory.comment)
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.options.cancel
    }

    /// Dispose of the volumes; every later operation fails.
    pub fn close(&mut self) {
        self.stream = None;
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream(&self) -> Result<&SpanningReader> {
        self.stream
            .as_ref()
            .ok_or_else(|| ZipError::misuse("archive reader is closed"))
    }

    fn stream_mut(&mut self) -> Result<&mut SpanningReader> {
        self.stream
            .as_mut()
            .ok_or_else(|| ZipError::misuse("archive reader is closed"))
    }

    /// Lazily enumerate the entries in central directory order.
    pub fn entries(&mut self) -> Result<Entries<'_>> {
        self.stream()?;
        let cursor = EntryCursor::new(&self.directory);
        Ok(Entries {
            archive: self,
            cursor,
        })
    }

    /// All entries, stopping at the first error.
    pub fn read_all_entries(&mut self) -> Result<Vec<ZipEntry>> {
        self.entries()?.collect()
    }

    pub fn find_entry(&mut self, name: &str) -> Result<Option<ZipEntry>> {
        for entry in self.entries()? {
            let entry = entry?;
            if entry.name() == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub(crate) fn next_entry(&mut self, cursor: &mut EntryCursor) -> Option<Result<ZipEntry>> {
        if cursor.done || cursor.next_index >= self.directory.total_entries {
            return None;
        }
        let index = cursor.next_index;
        let result = self.read_entry(cursor).map_err(|e| e.with_entry(index));
        match result {
            Ok(entry) => {
                cursor.next_index += 1;
                Some(Ok(entry))
            }
            Err(e) => {
                cursor.done = true;
                Some(Err(e))
            }
        }
    }

    fn read_entry(&mut self, cursor: &mut EntryCursor) -> Result<ZipEntry> {
        let stringency = self.options.stringency;
        let stream = self.stream_mut()?;
        stream.seek(cursor.position)?;
        let central = EntryHeader::read_central(stream, stringency)?;
        cursor.position = stream.position();

        let local_position = central
            .central()
            .map(|c| c.local_header_position)
            .unwrap_or_default();
        let mut local = EntryHeader::read_local(stream, local_position, stringency)?;
        let data_position = stream.advance(local.position, local.stored_len() as u64)?;

        if local.common.flags.has_data_descriptor() {
            let expected = central.sizes();
            let descriptor_position = stream.advance(data_position, expected.packed_size)?;
            let descriptor = DataDescriptor::read(stream, descriptor_position, &expected)?;
            local.apply_descriptor(descriptor);
        }

        cross_validate(&central, &local, cursor.next_index)?;

        Ok(ZipEntry {
            index: cursor.next_index,
            name: resolve_name(&central, &self.options.text),
            comment: resolve_comment(&central, &self.options.text),
            central,
            local,
            data_position,
        })
    }

    /// Open a reader over the entry's unpacked content.
    ///
    /// The returned reader verifies size and CRC when it reaches the end of
    /// the content.
    pub fn open_entry(&mut self, entry: &ZipEntry) -> Result<EntryReader<'_>> {
        let codec = self.options.codecs.get(entry.method())?;
        let option = codec.option_from_flags(entry.flags());
        let progress = self.options.progress.clone();
        let stream = self.stream_mut()?;
        stream.seek(entry.data_position)?;

        let input = PackedInput::new(stream, entry.packed_size());
        let decoder = codec.decoder(input, &option)?;
        Ok(EntryReader {
            inner: DecodingStream::new(decoder, entry.size(), Some(entry.crc32()), progress),
            index: entry.index,
        })
    }

    /// Read an entry's whole content into memory.
    pub fn read_entry_to_vec(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let mut reader = self.open_entry(entry)?;
        let mut out = Vec::with_capacity(entry.size().min(64 << 20) as usize);
        reader.read_to_end_checked(&mut out)?;
        Ok(out)
    }

    /// Where the enumeration cursor ended, for the central directory size
    /// check during validation.
    pub(crate) fn directory_span(&self, end: VolumePosition) -> Result<u64> {
        let stream = self.stream()?;
        self.directory.start.distance_to(end, stream.lengths())
    }

    pub(crate) fn duplicate_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut seen = HashSet::new();
        names
            .filter(|name| !seen.insert(*name))
            .map(str::to_string)
            .collect()
    }
}

/// Iteration state over the central directory.
#[derive(Debug, Clone)]
pub(crate) struct EntryCursor {
    pub(crate) next_index: u64,
    pub(crate) position: VolumePosition,
    pub(crate) done: bool,
}

impl EntryCursor {
    pub(crate) fn new(directory: &CentralDirectoryInfo) -> Self {
        Self {
            next_index: 0,
            position: directory.start,
            done: false,
        }
    }
}

/// Lazy, forward-only iterator over an archive's entries.
///
/// The first error ends the iteration.
pub struct Entries<'a> {
    archive: &'a mut ArchiveReader,
    cursor: EntryCursor,
}

impl Iterator for Entries<'_> {
    type Item = Result<ZipEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.archive.next_entry(&mut self.cursor)
    }
}

/// Unpacked content of one entry.
pub struct EntryReader<'a> {
    inner: DecodingStream<'a>,
    index: u64,
}

impl EntryReader<'_> {
    pub fn unpacked_bytes(&self) -> u64 {
        self.inner.unpacked_bytes()
    }

    pub fn packed_bytes(&self) -> u64 {
        self.inner.packed_bytes()
    }

    /// Like `read`, but with the crate's error type and the entry index
    /// attached to integrity errors.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read_chunk(buf).map_err(|e| e.with_entry(self.index))
    }

    pub fn read_to_end_checked(&mut self, out: &mut Vec<u8>) -> Result<u64> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read_chunk(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n as u64;
        }
    }

    /// Stream the content into `sink`, verifying it on the way.
    pub fn copy_to(&mut self, sink: &mut dyn std::io::Write) -> Result<u64> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read_chunk(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            sink.write_all(&buf[..n])?;
            total += n as u64;
        }
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_chunk(buf).map_err(ZipError::into_io)
    }
}

fn missing_end(detail: impl Into<String>) -> ZipError {
    ZipError::corrupt(CorruptionKind::MissingEndRecord, None, detail)
}

/// Find the end records in the last volume and work out where the central
/// directory is.
fn locate_central_directory(stream: &mut SpanningReader) -> Result<CentralDirectoryInfo> {
    let last_disk = stream.last_disk();
    let last_len = stream.lengths()[last_disk as usize];
    let window_len = last_len.min((EndOfCentralDirectory::SIZE + MAX_COMMENT_SIZE) as u64);
    if window_len < EndOfCentralDirectory::SIZE as u64 {
        return Err(missing_end(format!(
            "last volume is only {last_len} bytes long"
        )));
    }

    let window_start = VolumePosition::new(last_disk, last_len - window_len);
    stream.seek(window_start)?;
    let window = {
        let mut lock = stream.lock_volume_disk()?;
        lock.read_vec(window_len as usize)?
    };

    let candidates = find_candidates(&window);
    if candidates.is_empty() {
        return Err(missing_end("no end of central directory signature found"));
    }
    let Some(found) = candidates.iter().find(|c| {
        c.record.disk_number as u32 == last_disk || c.record.disk_number == u16::MAX
    }) else {
        return Err(ZipError::corrupt(
            CorruptionKind::DiskCountMismatch,
            Some(window_start),
            format!(
                "end record names disk {} but the last volume is disk {last_disk}",
                candidates[0].record.disk_number
            ),
        ));
    };
    let eocd = found.record.clone();
    let end_record = VolumePosition::new(last_disk, window_start.offset + found.offset as u64);
    log::debug!("end of central directory record at {end_record}");

    let locator = read_locator(stream, end_record)?;
    let Some(locator) = locator else {
        if eocd.is_zip64() {
            return Err(missing_end(
                "end record is saturated but no zip64 locator precedes it",
            ));
        }
        if eocd.cd_start_disk as u32 > last_disk {
            return Err(ZipError::corrupt(
                CorruptionKind::DiskCountMismatch,
                Some(end_record),
                format!(
                    "central directory starts on disk {} of {}",
                    eocd.cd_start_disk,
                    last_disk + 1
                ),
            ));
        }
        return Ok(CentralDirectoryInfo {
            start: VolumePosition::new(eocd.cd_start_disk as u32, eocd.cd_offset as u64),
            size: eocd.cd_size as u64,
            total_entries: eocd.total_entries as u64,
            entries_on_last_disk: eocd.entries_on_disk as u64,
            end_record,
            zip64: false,
            comment: eocd.comment,
        });
    };

    locator
        .check_disk_count(last_disk)
        .map_err(|e| e.at(end_record))?;
    let eocd64 = read_zip64_record(stream, &locator)?;
    if eocd64.disk_number != last_disk && eocd64.disk_number != locator.eocd64_disk {
        return Err(ZipError::corrupt(
            CorruptionKind::DiskCountMismatch,
            Some(VolumePosition::new(locator.eocd64_disk, locator.eocd64_offset)),
            format!(
                "zip64 end record names disk {} but the last volume is disk {last_disk}",
                eocd64.disk_number
            ),
        ));
    }
    log::debug!("using zip64 end of central directory record");

    let wide16 = |raw: u16, wide: u64| if raw == u16::MAX { wide } else { raw as u64 };
    let wide32 = |raw: u32, wide: u64| if raw == u32::MAX { wide } else { raw as u64 };
    let start_disk = if eocd.cd_start_disk == u16::MAX {
        eocd64.cd_start_disk
    } else {
        eocd.cd_start_disk as u32
    };
    Ok(CentralDirectoryInfo {
        start: VolumePosition::new(start_disk, wide32(eocd.cd_offset, eocd64.cd_offset)),
        size: wide32(eocd.cd_size, eocd64.cd_size),
        total_entries: wide16(eocd.total_entries, eocd64.total_entries),
        entries_on_last_disk: wide16(eocd.entries_on_disk, eocd64.entries_on_disk),
        end_record,
        zip64: true,
        comment: eocd.comment,
    })
}

/// The ZIP64 locator, if one directly precedes the end record. An end
/// record at the start of a volume may have its locator at the very end of
/// the previous one.
fn read_locator(
    stream: &mut SpanningReader,
    end_record: VolumePosition,
) -> Result<Option<Zip64EndLocator>> {
    let size = Zip64EndLocator::SIZE as u64;
    let Ok(position) = end_record.checked_sub(size, stream.lengths()) else {
        return Ok(None);
    };
    stream.seek(position)?;
    if !stream.check_if_can_atomic_read(size) {
        return Ok(None);
    }
    let bytes = {
        let mut lock = stream.lock_volume_disk()?;
        lock.read_vec(Zip64EndLocator::SIZE)?
    };
    if &bytes[..4] != Zip64EndLocator::SIGNATURE {
        return Ok(None);
    }
    Zip64EndLocator::from_bytes(&bytes)
        .map(Some)
        .map_err(|e| e.at(position))
}

fn read_zip64_record(
    stream: &mut SpanningReader,
    locator: &Zip64EndLocator,
) -> Result<Zip64EndOfCentralDirectory> {
    let position = VolumePosition::new(locator.eocd64_disk, locator.eocd64_offset);
    stream.seek(position)?;
    let bytes = {
        let mut lock = stream.lock_volume_disk()?;
        lock.read_vec(Zip64EndOfCentralDirectory::MIN_SIZE)?
    };
    Zip64EndOfCentralDirectory::from_bytes(&bytes).map_err(|e| e.at(position))
}
