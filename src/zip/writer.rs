//! Writing archives, optionally split into fixed-size volumes.
//!
//! Every entry starts with its local header. The header is reserved in one
//! volume up front, then the content is streamed through the codec, and
//! finally the header is patched in place with the real CRC and sizes, or
//! the CRC and sizes follow the content in a signed data descriptor. The
//! central directory and end records are written by
//! [`ArchiveWriter::finish`].

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;

use super::descriptor::{DataDescriptor, DescriptorLayout};
use super::eocd::{
    EndOfCentralDirectory, MAX_COMMENT_SIZE, Zip64EndLocator, Zip64EndOfCentralDirectory,
    count_needs_zip64,
};
use super::extra::{ExtendedTimestamp, ExtraFieldCollection, Zip64ExtendedInfo};
use super::header::{
    CentralFields, CommonFields, EntryHeader, EntrySizes, HeaderVariant, LocalFields, RawSizes,
};
use super::structures::*;
use super::text::TextResolver;
use crate::compression::{CodecRegistry, CoderOption, EncodingStream};
use crate::error::{Result, ZipError};
use crate::progress::{CancelFlag, ProgressSink};
use crate::volume::{MemoryFactory, SpanningWriter, SplitFileFactory, VolumeFactory, VolumePosition};

/// Settings for [`ArchiveWriter`].
#[derive(Clone, Default)]
pub struct WriteOptions {
    /// Maximum size of each volume; `None` writes a single volume.
    pub volume_size: Option<u64>,
    /// Archive comment.
    pub comment: String,
    pub cancel: CancelFlag,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub codecs: Arc<CodecRegistry>,
    pub text: TextResolver,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume_size(mut self, size: u64) -> Self {
        self.volume_size = Some(size);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
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

/// Per-entry settings.
#[derive(Debug, Clone)]
pub struct EntryOptions {
    pub name: String,
    pub comment: String,
    pub method: CompressionMethod,
    /// Codec option; the codec's default when `None`.
    pub option: Option<CoderOption>,
    pub modified: Option<NaiveDateTime>,
    /// Exact content length, when known in advance.
    pub declared_size: Option<u64>,
    /// Put CRC and sizes in a data descriptor instead of patching the
    /// local header.
    pub data_descriptor: bool,
    /// Always store names and comments as UTF-8.
    pub unicode: bool,
    pub host: HostSystem,
    pub external_attributes: u32,
    /// Reserve ZIP64 sizes in the local header even if the declared size
    /// does not need them.
    pub large_file: bool,
    /// Additional extra fields, written to both headers.
    pub extra: ExtraFieldCollection,
}

impl EntryOptions {
    /// A regular file, deflated.
    pub fn file(name: impl Into<String>) -> Self {
        let host = HostSystem::current();
        let external_attributes = if host.uses_unix_mode() {
            (UNIX_REGULAR_FILE | 0o644) << 16
        } else {
            0
        };
        Self {
            name: name.into(),
            comment: String::new(),
            method: CompressionMethod::Deflate,
            option: None,
            modified: None,
            declared_size: None,
            data_descriptor: false,
            unicode: false,
            host,
            external_attributes,
            large_file: false,
            extra: ExtraFieldCollection::new(),
        }
    }

    /// A directory entry. A trailing `/` is added to the name if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        let mut options = Self::file(name).method(CompressionMethod::Stored);
        options.declared_size = Some(0);
        options.external_attributes = DOS_DIRECTORY_ATTRIBUTE;
        if options.host.uses_unix_mode() {
            options.external_attributes |= (UNIX_DIRECTORY | 0o755) << 16;
        }
        options
    }

    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn option(mut self, option: CoderOption) -> Self {
        self.option = Some(option);
        self
    }

    pub fn modified(mut self, modified: NaiveDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn data_descriptor(mut self, enabled: bool) -> Self {
        self.data_descriptor = enabled;
        self
    }

    pub fn unicode(mut self, enabled: bool) -> Self {
        self.unicode = enabled;
        self
    }

    pub fn large_file(mut self, enabled: bool) -> Self {
        self.large_file = enabled;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn host(mut self, host: HostSystem) -> Self {
        self.host = host;
        self
    }

    pub fn external_attributes(mut self, attributes: u32) -> Self {
        self.external_attributes = attributes;
        self
    }

    /// Record Unix permission and file type bits.
    pub fn unix_mode(mut self, mode: u32) -> Self {
        self.host = HostSystem::Unix;
        self.external_attributes = (mode << 16) | (self.external_attributes & 0xffff);
        self
    }

    pub fn extra(mut self, tag: u16, data: Vec<u8>) -> Self {
        self.extra.push(tag, data);
        self
    }
}

/// Result of [`ArchiveWriter::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub volumes: u32,
    pub entries: u64,
    pub zip64: bool,
}

/// Writes a new archive.
///
/// Entries are written one at a time: [`start_entry`](Self::start_entry)
/// returns an [`EntryWriter`] that must be finished before the next entry
/// starts. An entry writer dropped without [`EntryWriter::finish`] leaves
/// the archive unusable, and every later call fails.
pub struct ArchiveWriter {
    stream: SpanningWriter,
    options: WriteOptions,
    central: Vec<EntryHeader>,
    poisoned: bool,
}

impl ArchiveWriter {
    pub fn create(factory: Box<dyn VolumeFactory>, options: WriteOptions) -> Result<Self> {
        let stream = SpanningWriter::new(
            factory,
            options.volume_size,
            options.cancel.clone(),
            options.progress.clone(),
        )?;
        Ok(Self {
            stream,
            options,
            central: Vec::new(),
            poisoned: false,
        })
    }

    /// Write to `path`; split volumes are named `.z01`, `.z02`, ... next to
    /// it.
    pub fn create_path(path: &Path, options: WriteOptions) -> Result<Self> {
        Self::create(Box::new(SplitFileFactory::new(path)), options)
    }

    /// Write into memory; the returned factory hands out the volumes.
    pub fn in_memory(options: WriteOptions) -> Result<(Self, MemoryFactory)> {
        let factory = MemoryFactory::new();
        let writer = Self::create(Box::new(factory.clone()), options)?;
        Ok((writer, factory))
    }

    pub fn entry_count(&self) -> usize {
        self.central.len()
    }

    pub fn position(&self) -> VolumePosition {
        self.stream.position()
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(ZipError::misuse(
                "a previous entry was abandoned before it was finished",
            ));
        }
        Ok(())
    }

    /// Write the local header of a new entry and return a writer for its
    /// content.
    pub fn start_entry(&mut self, options: EntryOptions) -> Result<EntryWriter<'_>> {
        self.check_usable()?;
        let codec = self.options.codecs.get(options.method)?;
        let option = options
            .option
            .clone()
            .unwrap_or_else(|| codec.default_option());
        let option_bits = codec.flags_for_option(&option)?;

        let (name, name_utf8) = self.options.text.encode(&options.name, options.unicode);
        let (comment, comment_utf8) = self.options.text.encode(&options.comment, options.unicode);
        if name.len() > u16::MAX as usize || comment.len() > u16::MAX as usize {
            return Err(ZipError::misuse(format!(
                "name or comment of {:?} is longer than 65535 bytes",
                options.name
            )));
        }

        let mut flags = GeneralPurposeFlags(option_bits);
        flags.set(GeneralPurposeFlags::DATA_DESCRIPTOR, options.data_descriptor);
        flags.set(GeneralPurposeFlags::UNICODE, name_utf8 || comment_utf8);

        let zip64 = options.large_file
            || options
                .declared_size
                .is_some_and(|size| size >= ZIP64_BYTES_THR);
        let version_needed = if zip64 {
            codec.version_needed().max(VERSION_ZIP64)
        } else {
            codec.version_needed()
        };

        let mut shared_extra = options.extra.clone();
        shared_extra.remove(Zip64ExtendedInfo::TAG);
        if let Some(secs) = options
            .modified
            .and_then(|m| i32::try_from(m.and_utc().timestamp()).ok())
        {
            shared_extra.insert(&ExtendedTimestamp::from_modified(secs), HeaderKind::Local);
        }

        let placeholder = if zip64 { u32::MAX } else { 0 };
        let mut local = EntryHeader {
            common: CommonFields {
                version_needed,
                flags,
                method: options.method,
                timestamp: options.modified.as_ref().map(DosDateTime::from_naive),
                raw: RawSizes {
                    crc: 0,
                    packed_size: placeholder,
                    size: placeholder,
                },
                sizes: EntrySizes::default(),
                name,
                extra: with_zip64(
                    zip64.then_some(Zip64ExtendedInfo {
                        size: Some(options.declared_size.unwrap_or(0)),
                        packed_size: Some(0),
                        ..Default::default()
                    }),
                    &shared_extra,
                ),
            },
            variant: HeaderVariant::Local(LocalFields::default()),
            position: VolumePosition::START,
        };
        check_extra_len(&local.common.extra)?;

        let encoder = codec.encoder(&option)?;
        let Self {
            stream,
            options: write_options,
            central,
            poisoned,
        } = self;

        let bytes = local.to_bytes();
        stream.reserve(bytes.len() as u64)?;
        local.position = stream.position();
        *poisoned = true;
        {
            let mut lock = stream.lock_volume_disk()?;
            lock.write_all(&bytes)?;
        }
        log::trace!("local header for {:?} at {}", options.name, local.position);

        let content = EncodingStream::new(
            encoder,
            stream,
            options.declared_size,
            write_options.progress.clone(),
        )?;
        Ok(EntryWriter {
            content,
            central,
            poisoned,
            local,
            options,
            comment,
            shared_extra,
            zip64,
        })
    }

    /// Write a whole entry from memory. The declared size defaults to the
    /// length of `data`.
    pub fn add_entry(&mut self, mut options: EntryOptions, data: &[u8]) -> Result<EntrySizes> {
        options.declared_size.get_or_insert(data.len() as u64);
        let mut entry = self.start_entry(options)?;
        entry.write_all(data)?;
        entry.finish()
    }

    /// Write a whole entry, streaming it from `source`.
    pub fn add_reader(&mut self, options: EntryOptions, source: &mut dyn Read) -> Result<EntrySizes> {
        let mut entry = self.start_entry(options)?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            entry.write_all(&buf[..n])?;
        }
        entry.finish()
    }

    pub fn add_directory(&mut self, name: impl Into<String>) -> Result<EntrySizes> {
        self.add_entry(EntryOptions::directory(name), &[])
    }

    /// Write the central directory and end records and close every volume.
    pub fn finish(mut self) -> Result<WriteSummary> {
        self.check_usable()?;
        let (comment, _) = self.options.text.encode(&self.options.comment, false);
        if comment.len() > MAX_COMMENT_SIZE {
            return Err(ZipError::misuse("archive comment is longer than 65535 bytes"));
        }

        let mut start = None;
        let mut header_disks = Vec::with_capacity(self.central.len());
        for header in &self.central {
            let bytes = header.to_bytes();
            self.stream.reserve(bytes.len() as u64)?;
            let position = self.stream.position();
            start.get_or_insert(position);
            header_disks.push(position.disk);
            let mut lock = self.stream.lock_volume_disk()?;
            lock.write_all(&bytes)?;
        }
        let end = self.stream.position();
        let start = start.unwrap_or(end);
        let cd_size = start.distance_to(end, &self.stream.lengths())?;
        let total_entries = self.central.len() as u64;

        // The tail may still move to one more volume.
        let last_disk_bound = end.disk as u64 + 1;
        let zip64 = count_needs_zip64(total_entries)
            || count_needs_zip64(last_disk_bound)
            || count_needs_zip64(start.disk as u64)
            || cd_size >= ZIP64_BYTES_THR
            || start.offset >= ZIP64_BYTES_THR;

        let mut tail_len = (EndOfCentralDirectory::SIZE + comment.len()) as u64;
        if zip64 {
            tail_len += (Zip64EndOfCentralDirectory::MIN_SIZE + Zip64EndLocator::SIZE) as u64;
        }
        self.stream.reserve(tail_len)?;
        let tail_start = self.stream.position();
        let disk = tail_start.disk;
        let entries_on_disk = header_disks.iter().filter(|&&d| d == disk).count() as u64;

        let mut tail = Vec::with_capacity(tail_len as usize);
        if zip64 {
            tail.extend(
                Zip64EndOfCentralDirectory {
                    version_made_by: made_by(HostSystem::current()),
                    version_needed: VERSION_ZIP64,
                    disk_number: disk,
                    cd_start_disk: start.disk,
                    entries_on_disk,
                    total_entries,
                    cd_size,
                    cd_offset: start.offset,
                    extensible_data: Vec::new(),
                }
                .to_bytes(),
            );
            tail.extend(
                Zip64EndLocator {
                    eocd64_disk: disk,
                    eocd64_offset: tail_start.offset,
                    total_disks: disk + 1,
                }
                .to_bytes(),
            );
        }
        tail.extend(
            EndOfCentralDirectory {
                disk_number: saturate_u16(disk as u64),
                cd_start_disk: saturate_u16(start.disk as u64),
                entries_on_disk: saturate_u16(entries_on_disk),
                total_entries: saturate_u16(total_entries),
                cd_size: saturate_u32(cd_size),
                cd_offset: saturate_u32(start.offset),
                comment,
            }
            .to_bytes(),
        );
        {
            let mut lock = self.stream.lock_volume_disk()?;
            lock.write_all(&tail)?;
        }

        let volumes = self.stream.finish()?;
        log::debug!(
            "archive finished: {total_entries} entries, {cd_size} byte central directory, {volumes} volume(s){}",
            if zip64 { ", zip64" } else { "" }
        );
        Ok(WriteSummary {
            volumes,
            entries: total_entries,
            zip64,
        })
    }
}

fn made_by(host: HostSystem) -> u16 {
    ((host.as_u8() as u16) << 8) | VERSION_MADE_BY
}

/// `extra` with a ZIP64 field in front of it.
fn with_zip64(zip64: Option<Zip64ExtendedInfo>, extra: &ExtraFieldCollection) -> ExtraFieldCollection {
    let mut out = ExtraFieldCollection::new();
    if let Some(info) = zip64 {
        out.push(Zip64ExtendedInfo::TAG, info.encode());
    }
    for field in extra.iter() {
        out.push(field.tag, field.data.clone());
    }
    out
}

fn check_extra_len(extra: &ExtraFieldCollection) -> Result<()> {
    if extra.encoded_len() > u16::MAX as usize {
        return Err(ZipError::misuse("extra fields are longer than 65535 bytes"));
    }
    Ok(())
}

/// Content of the entry being written.
pub struct EntryWriter<'a> {
    content: EncodingStream<&'a mut SpanningWriter>,
    central: &'a mut Vec<EntryHeader>,
    poisoned: &'a mut bool,
    local: EntryHeader,
    options: EntryOptions,
    comment: Vec<u8>,
    shared_extra: ExtraFieldCollection,
    zip64: bool,
}

impl EntryWriter<'_> {
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.content.write_all(buf)
    }

    pub fn unpacked_bytes(&self) -> u64 {
        self.content.unpacked_bytes()
    }

    /// Complete the entry: flush the codec, record CRC and sizes and queue
    /// the central directory header.
    pub fn finish(self) -> Result<EntrySizes> {
        let Self {
            content,
            central,
            poisoned,
            mut local,
            options,
            comment,
            shared_extra,
            zip64,
        } = self;

        let (stream, summary) = content.finish()?;
        let sizes = EntrySizes {
            crc: summary.crc,
            packed_size: summary.packed_size,
            size: summary.size,
        };
        if !zip64 && (sizes.size >= ZIP64_BYTES_THR || sizes.packed_size >= ZIP64_BYTES_THR) {
            return Err(ZipError::misuse(format!(
                "entry {:?} reached {} bytes without large_file set",
                options.name,
                sizes.size.max(sizes.packed_size)
            )));
        }

        if options.data_descriptor {
            let descriptor = DataDescriptor {
                crc: sizes.crc,
                packed_size: sizes.packed_size,
                size: sizes.size,
                layout: if zip64 {
                    DescriptorLayout::Signed64
                } else {
                    DescriptorLayout::Signed32
                },
            };
            let bytes = descriptor.to_bytes();
            stream.reserve(bytes.len() as u64)?;
            let mut lock = stream.lock_volume_disk()?;
            lock.write_all(&bytes)?;
        } else {
            local.common.raw = RawSizes {
                crc: sizes.crc,
                packed_size: if zip64 { u32::MAX } else { sizes.packed_size as u32 },
                size: if zip64 { u32::MAX } else { sizes.size as u32 },
            };
            if zip64 {
                local.common.extra = with_zip64(
                    Some(Zip64ExtendedInfo {
                        size: Some(sizes.size),
                        packed_size: Some(sizes.packed_size),
                        ..Default::default()
                    }),
                    &shared_extra,
                );
            }
            stream.write_at(local.position, &local.to_bytes())?;
        }

        let position = local.position;
        let slot_size = sizes.size >= ZIP64_BYTES_THR;
        let slot_packed = sizes.packed_size >= ZIP64_BYTES_THR;
        let slot_offset = position.offset >= ZIP64_BYTES_THR;
        let slot_disk = count_needs_zip64(position.disk as u64);
        let central_zip64 = (slot_size || slot_packed || slot_offset || slot_disk).then(|| {
            Zip64ExtendedInfo {
                size: slot_size.then_some(sizes.size),
                packed_size: slot_packed.then_some(sizes.packed_size),
                local_header_offset: slot_offset.then_some(position.offset),
                disk_start: slot_disk.then_some(position.disk),
            }
        });

        let mut central_extra = with_zip64(central_zip64, &shared_extra);
        if let Some(ts) = shared_extra.find::<ExtendedTimestamp>(
            HeaderKind::Local,
            super::extra::ValidationStringency::Lenient,
        )? {
            central_extra.insert(&ts, HeaderKind::Central);
        }
        check_extra_len(&central_extra)?;

        let version_needed = if central_zip64.is_some() {
            local.common.version_needed.max(VERSION_ZIP64)
        } else {
            local.common.version_needed
        };
        central.push(EntryHeader {
            common: CommonFields {
                version_needed,
                flags: local.common.flags,
                method: local.common.method,
                timestamp: local.common.timestamp,
                raw: RawSizes {
                    crc: sizes.crc,
                    packed_size: saturate_u32(sizes.packed_size),
                    size: saturate_u32(sizes.size),
                },
                sizes,
                name: local.common.name,
                extra: central_extra,
            },
            variant: HeaderVariant::Central(CentralFields {
                version_made_by: made_by(options.host),
                comment,
                raw_disk_start: saturate_u16(position.disk as u64),
                raw_local_offset: saturate_u32(position.offset),
                internal_attributes: 0,
                external_attributes: options.external_attributes,
                local_header_position: position,
            }),
            position: VolumePosition::START,
        });
        *poisoned = false;
        log::trace!(
            "entry {:?}: {} bytes packed to {}",
            options.name,
            sizes.size,
            sizes.packed_size
        );
        Ok(sizes)
    }
}

impl io::Write for EntryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf).map_err(ZipError::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
