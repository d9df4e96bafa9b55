//! Local and central directory headers.
//!
//! Both headers share most of their fields, so they are one [`EntryHeader`]
//! value: a [`CommonFields`] block plus a [`HeaderVariant`] carrying what only
//! one of them has. How the effective CRC and sizes are derived from the raw
//! 32-bit fields, a ZIP64 extra field and an optional data descriptor is a
//! pure function, [`resolve_sizes`], used by both variants.
//!
//! Headers are always read through a [`VolumeLock`](crate::VolumeLock): a
//! header that would run past the end of its volume is reported as
//! [`CorruptionKind::FragmentedHeader`] rather than stitched together.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use super::descriptor::DataDescriptor;
use super::extra::{ExtraFieldCollection, ValidationStringency, Zip64ExtendedInfo, Zip64Slots};
use super::structures::*;
use crate::error::{CorruptionKind, Result, UnsupportedFeature, ZipError};
use crate::volume::{SpanningReader, VolumePosition};

/// CRC and sizes of one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntrySizes {
    pub crc: u32,
    pub packed_size: u64,
    pub size: u64,
}

/// The CRC and size fields exactly as stored in a header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSizes {
    pub crc: u32,
    pub packed_size: u32,
    pub size: u32,
}

impl RawSizes {
    /// Which size fields carry the ZIP64 sentinel.
    pub fn saturated(&self) -> (bool, bool) {
        (self.size == u32::MAX, self.packed_size == u32::MAX)
    }
}

/// Effective CRC and sizes of a header.
///
/// A data descriptor wins over everything else. Otherwise each raw field is
/// used as is, unless it holds the sentinel and the ZIP64 extra field
/// supplies the real value.
pub fn resolve_sizes(
    raw: RawSizes,
    zip64: Option<&Zip64ExtendedInfo>,
    descriptor: Option<&DataDescriptor>,
) -> EntrySizes {
    if let Some(descriptor) = descriptor {
        return descriptor.sizes();
    }
    let (size_saturated, packed_saturated) = raw.saturated();
    let pick = |raw: u32, saturated: bool, wide: Option<u64>| match wide {
        Some(value) if saturated => value,
        _ => raw as u64,
    };
    EntrySizes {
        crc: raw.crc,
        packed_size: pick(raw.packed_size, packed_saturated, zip64.and_then(|z| z.packed_size)),
        size: pick(raw.size, size_saturated, zip64.and_then(|z| z.size)),
    }
}

/// Where the local header of a central directory entry lives.
pub fn resolve_local_position(
    raw_disk: u16,
    raw_offset: u32,
    zip64: Option<&Zip64ExtendedInfo>,
) -> VolumePosition {
    let disk = match zip64.and_then(|z| z.disk_start) {
        Some(disk) if raw_disk == u16::MAX => disk,
        _ => raw_disk as u32,
    };
    let offset = match zip64.and_then(|z| z.local_header_offset) {
        Some(offset) if raw_offset == u32::MAX => offset,
        _ => raw_offset as u64,
    };
    VolumePosition::new(disk, offset)
}

/// Fields present in both header kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonFields {
    pub version_needed: u16,
    pub flags: GeneralPurposeFlags,
    pub method: CompressionMethod,
    pub timestamp: Option<DosDateTime>,
    pub raw: RawSizes,
    /// Effective values, see [`resolve_sizes`].
    pub sizes: EntrySizes,
    pub name: Vec<u8>,
    pub extra: ExtraFieldCollection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFields {
    /// The data descriptor that followed the entry data, once resolved.
    pub descriptor: Option<DataDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralFields {
    pub version_made_by: u16,
    pub comment: Vec<u8>,
    pub raw_disk_start: u16,
    pub raw_local_offset: u32,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    /// Position of the matching local header, ZIP64 overrides applied.
    pub local_header_position: VolumePosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderVariant {
    Local(LocalFields),
    Central(CentralFields),
}

/// One parsed local or central directory header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub common: CommonFields,
    pub variant: HeaderVariant,
    /// Where the header's signature was found.
    pub position: VolumePosition,
}

fn bad_signature(what: &str, found: &[u8], position: VolumePosition) -> ZipError {
    ZipError::corrupt(
        CorruptionKind::BadSignature,
        Some(position),
        format!("expected {what} signature, found {found:02x?}"),
    )
}

fn truncated(position: VolumePosition) -> impl FnOnce(std::io::Error) -> ZipError {
    move |_| ZipError::corrupt(CorruptionKind::Truncated, Some(position), "header ends early")
}

/// Reject feature flags and versions this crate cannot process.
fn check_supported(
    flags: GeneralPurposeFlags,
    version_needed: u16,
    position: VolumePosition,
) -> Result<()> {
    if flags.is_encrypted() {
        return Err(ZipError::unsupported(UnsupportedFeature::Encryption, Some(position)));
    }
    if flags.is_compressed_patched() {
        return Err(ZipError::unsupported(
            UnsupportedFeature::CompressedPatchedData,
            Some(position),
        ));
    }
    if version_needed & 0xff > VERSION_MADE_BY {
        return Err(ZipError::unsupported(
            UnsupportedFeature::VersionNeeded(version_needed & 0xff),
            Some(position),
        ));
    }
    Ok(())
}

impl EntryHeader {
    pub fn kind(&self) -> HeaderKind {
        match self.variant {
            HeaderVariant::Local(_) => HeaderKind::Local,
            HeaderVariant::Central(_) => HeaderKind::Central,
        }
    }

    pub fn central(&self) -> Option<&CentralFields> {
        match &self.variant {
            HeaderVariant::Central(fields) => Some(fields),
            HeaderVariant::Local(_) => None,
        }
    }

    pub fn local(&self) -> Option<&LocalFields> {
        match &self.variant {
            HeaderVariant::Local(fields) => Some(fields),
            HeaderVariant::Central(_) => None,
        }
    }

    pub fn sizes(&self) -> EntrySizes {
        self.common.sizes
    }

    /// Parse a complete local header (fixed part, name and extra fields).
    pub fn parse_local(
        bytes: &[u8],
        position: VolumePosition,
        stringency: ValidationStringency,
    ) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig).map_err(truncated(position))?;
        if &sig != LFH_SIGNATURE {
            return Err(bad_signature("local header", &sig, position));
        }

        let fixed = || -> std::io::Result<_> {
            let mut c = Cursor::new(&bytes[4..]);
            Ok((
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u32::<LittleEndian>()?,
                c.read_u32::<LittleEndian>()?,
                c.read_u32::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
            ))
        };
        let (version_needed, flags, method, time, date, crc, packed, size, name_len, extra_len) =
            fixed().map_err(truncated(position))?;
        let flags = GeneralPurposeFlags(flags);
        check_supported(flags, version_needed, position)?;

        let name_end = LFH_SIZE + name_len as usize;
        let extra_end = name_end + extra_len as usize;
        if bytes.len() < extra_end {
            return Err(ZipError::corrupt(
                CorruptionKind::Truncated,
                Some(position),
                "local header name or extra field ends early",
            ));
        }
        let name = bytes[LFH_SIZE..name_end].to_vec();
        let extra =
            ExtraFieldCollection::parse(&bytes[name_end..extra_end], HeaderKind::Local, stringency)
                .map_err(|e| e.at(position))?;

        let raw = RawSizes {
            crc,
            packed_size: packed,
            size,
        };
        let (size_slot, packed_slot) = raw.saturated();
        let slots = Zip64Slots {
            size: size_slot,
            packed_size: packed_slot,
            ..Zip64Slots::default()
        };
        let zip64 = extra
            .zip64(HeaderKind::Local, slots, stringency)
            .map_err(|e| e.at(position))?;

        Ok(Self {
            common: CommonFields {
                version_needed,
                flags,
                method: CompressionMethod::from_u16(method),
                timestamp: DosDateTime::from_raw(time, date),
                raw,
                sizes: resolve_sizes(raw, zip64.as_ref(), None),
                name,
                extra,
            },
            variant: HeaderVariant::Local(LocalFields::default()),
            position,
        })
    }

    /// Parse a complete central directory header (fixed part, name, extra
    /// fields and comment).
    pub fn parse_central(
        bytes: &[u8],
        position: VolumePosition,
        stringency: ValidationStringency,
    ) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig).map_err(truncated(position))?;
        if &sig != CDFH_SIGNATURE {
            return Err(bad_signature("central directory header", &sig, position));
        }

        let read_fixed = |cursor: &mut Cursor<&[u8]>| -> std::io::Result<_> {
            let version_made_by = cursor.read_u16::<LittleEndian>()?;
            let version_needed = cursor.read_u16::<LittleEndian>()?;
            let flags = cursor.read_u16::<LittleEndian>()?;
            let method = cursor.read_u16::<LittleEndian>()?;
            let time = cursor.read_u16::<LittleEndian>()?;
            let date = cursor.read_u16::<LittleEndian>()?;
            let raw = RawSizes {
                crc: cursor.read_u32::<LittleEndian>()?,
                packed_size: cursor.read_u32::<LittleEndian>()?,
                size: cursor.read_u32::<LittleEndian>()?,
            };
            let lengths = (
                cursor.read_u16::<LittleEndian>()? as usize,
                cursor.read_u16::<LittleEndian>()? as usize,
                cursor.read_u16::<LittleEndian>()? as usize,
            );
            let disk = cursor.read_u16::<LittleEndian>()?;
            let internal = cursor.read_u16::<LittleEndian>()?;
            let external = cursor.read_u32::<LittleEndian>()?;
            let offset = cursor.read_u32::<LittleEndian>()?;
            Ok((
                version_made_by,
                version_needed,
                flags,
                method,
                time,
                date,
                raw,
                lengths,
                disk,
                internal,
                external,
                offset,
            ))
        };
        let (
            version_made_by,
            version_needed,
            flags,
            method,
            time,
            date,
            raw,
            (name_len, extra_len, comment_len),
            raw_disk_start,
            internal_attributes,
            external_attributes,
            raw_local_offset,
        ) = read_fixed(&mut cursor).map_err(truncated(position))?;
        let flags = GeneralPurposeFlags(flags);
        check_supported(flags, version_needed, position)?;

        let name_end = CDFH_SIZE + name_len;
        let extra_end = name_end + extra_len;
        let comment_end = extra_end + comment_len;
        if bytes.len() < comment_end {
            return Err(ZipError::corrupt(
                CorruptionKind::Truncated,
                Some(position),
                "central header name, extra field or comment ends early",
            ));
        }
        let extra = ExtraFieldCollection::parse(
            &bytes[name_end..extra_end],
            HeaderKind::Central,
            stringency,
        )
        .map_err(|e| e.at(position))?;

        let (size_slot, packed_slot) = raw.saturated();
        let slots = Zip64Slots {
            size: size_slot,
            packed_size: packed_slot,
            offset: raw_local_offset == u32::MAX,
            disk: raw_disk_start == u16::MAX,
        };
        let zip64 = if slots.any() {
            extra
                .zip64(HeaderKind::Central, slots, stringency)
                .map_err(|e| e.at(position))?
        } else {
            None
        };

        Ok(Self {
            common: CommonFields {
                version_needed,
                flags,
                method: CompressionMethod::from_u16(method),
                timestamp: DosDateTime::from_raw(time, date),
                raw,
                sizes: resolve_sizes(raw, zip64.as_ref(), None),
                name: bytes[CDFH_SIZE..name_end].to_vec(),
                extra,
            },
            variant: HeaderVariant::Central(CentralFields {
                version_made_by,
                comment: bytes[extra_end..comment_end].to_vec(),
                raw_disk_start,
                raw_local_offset,
                internal_attributes,
                external_attributes,
                local_header_position: resolve_local_position(
                    raw_disk_start,
                    raw_local_offset,
                    zip64.as_ref(),
                ),
            }),
            position,
        })
    }

    /// Read the central directory header at the reader's current position,
    /// stepping over an exhausted volume first.
    pub fn read_central(
        reader: &mut SpanningReader,
        stringency: ValidationStringency,
    ) -> Result<Self> {
        reader.ensure_atomic(CDFH_SIZE as u64)?;
        let position = reader.position();
        let mut lock = reader.lock_volume_disk()?;
        let mut bytes = lock.read_vec(CDFH_SIZE)?;
        if &bytes[..4] == CDFH_SIGNATURE {
            let variable: usize = [28, 30, 32]
                .iter()
                .map(|&at| u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize)
                .sum();
            bytes.extend(lock.read_vec(variable)?);
        }
        drop(lock);
        log::trace!("central directory header at {position}");
        Self::parse_central(&bytes, position, stringency)
    }

    /// Read the local header at `position`.
    pub fn read_local(
        reader: &mut SpanningReader,
        position: VolumePosition,
        stringency: ValidationStringency,
    ) -> Result<Self> {
        reader.seek(position)?;
        reader.ensure_atomic(LFH_SIZE as u64)?;
        let position = reader.position();
        let mut lock = reader.lock_volume_disk()?;
        let mut bytes = lock.read_vec(LFH_SIZE)?;
        if &bytes[..4] == LFH_SIGNATURE {
            let variable = u16::from_le_bytes([bytes[26], bytes[27]]) as usize
                + u16::from_le_bytes([bytes[28], bytes[29]]) as usize;
            bytes.extend(lock.read_vec(variable)?);
        }
        drop(lock);
        log::trace!("local header at {position}");
        Self::parse_local(&bytes, position, stringency)
    }

    /// Record the resolved data descriptor of a local header; it replaces the
    /// raw CRC and sizes.
    pub fn apply_descriptor(&mut self, descriptor: DataDescriptor) {
        if let HeaderVariant::Local(local) = &mut self.variant {
            self.common.sizes = descriptor.sizes();
            local.descriptor = Some(descriptor);
        }
    }

    /// Total length of the encoded header.
    pub fn encoded_len(&self) -> usize {
        let variable = self.common.name.len() + self.common.extra.encoded_len();
        match &self.variant {
            HeaderVariant::Local(_) => LFH_SIZE + variable,
            HeaderVariant::Central(central) => CDFH_SIZE + variable + central.comment.len(),
        }
    }

    /// Length the header occupied in the archive, including extra field
    /// bytes that were skipped as malformed.
    pub fn stored_len(&self) -> usize {
        self.encoded_len() + self.common.extra.malformed_tail().len()
    }

    /// Serialize the header from its raw fields.
    pub fn to_bytes(&self) -> Vec<u8> {
        let common = &self.common;
        let extra = common.extra.to_bytes();
        let timestamp = common.timestamp.unwrap_or(DosDateTime { time: 0, date: 0 });
        let mut out = Vec::with_capacity(self.encoded_len());

        match &self.variant {
            HeaderVariant::Local(_) => out.extend_from_slice(LFH_SIGNATURE),
            HeaderVariant::Central(central) => {
                out.extend_from_slice(CDFH_SIGNATURE);
                out.extend_from_slice(&central.version_made_by.to_le_bytes());
            }
        }
        for field in [
            common.version_needed,
            common.flags.bits(),
            common.method.as_u16(),
            timestamp.time,
            timestamp.date,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        for field in [common.raw.crc, common.raw.packed_size, common.raw.size] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&(common.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        if let HeaderVariant::Central(central) = &self.variant {
            out.extend_from_slice(&(central.comment.len() as u16).to_le_bytes());
            out.extend_from_slice(&central.raw_disk_start.to_le_bytes());
            out.extend_from_slice(&central.internal_attributes.to_le_bytes());
            out.extend_from_slice(&central.external_attributes.to_le_bytes());
            out.extend_from_slice(&central.raw_local_offset.to_le_bytes());
        }
        out.extend_from_slice(&common.name);
        out.extend_from_slice(&extra);
        if let HeaderVariant::Central(central) = &self.variant {
            out.extend_from_slice(&central.comment);
        }
        out
    }

    /// Host system from the high byte of "version made by"; local headers
    /// do not record it.
    pub fn host_system(&self) -> Option<HostSystem> {
        self.central()
            .map(|c| HostSystem::from_u8((c.version_made_by >> 8) as u8))
    }

    /// Unix mode bits, when the producing host stores them.
    pub fn unix_mode(&self) -> Option<u32> {
        let central = self.central()?;
        let host = self.host_system()?;
        let mode = central.external_attributes >> 16;
        (host.uses_unix_mode() && mode != 0).then_some(mode)
    }

    /// Whether the entry is a directory: a trailing path separator in the
    /// name first, then the host-specific attribute bits.
    pub fn is_directory(&self) -> bool {
        if matches!(self.common.name.last(), Some(b'/') | Some(b'\\')) {
            return true;
        }
        let (Some(central), Some(host)) = (self.central(), self.host_system()) else {
            return false;
        };
        if host.uses_unix_mode() {
            return (central.external_attributes >> 16) & UNIX_FILE_TYPE_MASK == UNIX_DIRECTORY;
        }
        if host.uses_dos_attributes() {
            return central.external_attributes & DOS_DIRECTORY_ATTRIBUTE != 0;
        }
        false
    }
}

/// Check that a local header agrees with its central directory header.
///
/// The first differing field is reported together with the entry's central
/// directory index.
pub fn cross_validate(central: &EntryHeader, local: &EntryHeader, index: u64) -> Result<()> {
    let c = &central.common;
    let l = &local.common;
    let mismatch = |field: &str, in_central: String, in_local: String| {
        Err(ZipError::corrupt(
            CorruptionKind::HeaderMismatch,
            Some(local.position),
            format!("{field} differs: central {in_central}, local {in_local}"),
        )
        .with_entry(index))
    };

    if c.name != l.name {
        return mismatch(
            "name",
            String::from_utf8_lossy(&c.name).into_owned(),
            String::from_utf8_lossy(&l.name).into_owned(),
        );
    }
    if c.method != l.method {
        return mismatch(
            "compression method",
            c.method.as_u16().to_string(),
            l.method.as_u16().to_string(),
        );
    }
    if c.timestamp != l.timestamp {
        return mismatch("timestamp", format!("{:?}", c.timestamp), format!("{:?}", l.timestamp));
    }
    let paired = GeneralPurposeFlags::PAIRED;
    if c.flags.bits() & paired != l.flags.bits() & paired {
        return mismatch(
            "flags",
            format!("{:#06x}", c.flags.bits() & paired),
            format!("{:#06x}", l.flags.bits() & paired),
        );
    }
    if c.sizes.crc != l.sizes.crc {
        return mismatch("crc", format!("{:#010x}", c.sizes.crc), format!("{:#010x}", l.sizes.crc));
    }
    if c.sizes.packed_size != l.sizes.packed_size {
        return mismatch(
            "packed size",
            c.sizes.packed_size.to_string(),
            l.sizes.packed_size.to_string(),
        );
    }
    if c.sizes.size != l.sizes.size {
        return mismatch("size", c.sizes.size.to_string(), l.sizes.size.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::extra::ExtraFieldType;
    use crate::zip::descriptor::DescriptorLayout;

    fn central(name: &str, raw: RawSizes, disk: u16, offset: u32) -> EntryHeader {
        EntryHeader {
            common: CommonFields {
                version_needed: VERSION_STORED,
                flags: GeneralPurposeFlags::default(),
                method: CompressionMethod::Stored,
                timestamp: DosDateTime::from_raw(0x6000, 0x5321),
                raw,
                sizes: resolve_sizes(raw, None, None),
                name: name.as_bytes().to_vec(),
                extra: ExtraFieldCollection::new(),
            },
            variant: HeaderVariant::Central(CentralFields {
                version_made_by: (3 << 8) | VERSION_MADE_BY,
                comment: b"note".to_vec(),
                raw_disk_start: disk,
                raw_local_offset: offset,
                internal_attributes: 0,
                external_attributes: (UNIX_REGULAR_FILE | 0o644) << 16,
                local_header_position: VolumePosition::new(disk as u32, offset as u64),
            }),
            position: VolumePosition::START,
        }
    }

    fn local_of(central: &EntryHeader) -> EntryHeader {
        EntryHeader {
            common: central.common.clone(),
            variant: HeaderVariant::Local(LocalFields::default()),
            position: VolumePosition::START,
        }
    }

    const RAW: RawSizes = RawSizes {
        crc: 0xdead_beef,
        packed_size: 100,
        size: 100,
    };

    #[test]
    fn central_header_round_trip() {
        let header = central("dir/file.txt", RAW, 2, 0x1234);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), header.encoded_len());
        assert_eq!(&bytes[..4], b"PK\x01\x02");
        assert_eq!(&bytes[34..36], &2u16.to_le_bytes());
        assert_eq!(&bytes[42..46], &0x1234u32.to_le_bytes());
        assert_eq!(&bytes[46..58], b"dir/file.txt");
        let parsed =
            EntryHeader::parse_central(&bytes, VolumePosition::START, ValidationStringency::Strict)
                .unwrap();
        similar_asserts::assert_eq!(parsed, header);
        assert_eq!(parsed.central().unwrap().local_header_position, VolumePosition::new(2, 0x1234));
    }

    #[test]
    fn local_header_round_trip() {
        let header = local_of(&central("a", RAW, 0, 0));
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), LFH_SIZE + 1);
        let parsed =
            EntryHeader::parse_local(&bytes, VolumePosition::START, ValidationStringency::Strict)
                .unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn wrong_signature() {
        let mut bytes = local_of(&central("a", RAW, 0, 0)).to_bytes();
        bytes[2] = 9;
        let err = EntryHeader::parse_local(&bytes, VolumePosition::new(1, 8), Default::default())
            .unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::BadSignature));
        assert!(err.to_string().contains("disk 1"));
    }

    #[test]
    fn encrypted_and_patched_entries_are_unsupported() {
        for bit in [GeneralPurposeFlags::ENCRYPTED, GeneralPurposeFlags::COMPRESSED_PATCHED] {
            let mut header = local_of(&central("a", RAW, 0, 0));
            header.common.flags.set(bit, true);
            let err =
                EntryHeader::parse_local(&header.to_bytes(), VolumePosition::START, Default::default())
                    .unwrap_err();
            assert_eq!(err.class(), crate::ErrorClass::Unsupported);
        }

        let mut header = central("a", RAW, 0, 0);
        header.common.version_needed = 64;
        let err = EntryHeader::parse_central(&header.to_bytes(), VolumePosition::START, Default::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ZipError::Unsupported {
                feature: UnsupportedFeature::VersionNeeded(64),
                ..
            }
        ));
    }

    #[test]
    fn zip64_overrides_only_saturated_fields() {
        let raw = RawSizes {
            crc: 1,
            packed_size: u32::MAX,
            size: 500,
        };
        let mut header = central("big", raw, u16::MAX, 77);
        let zip64 = Zip64ExtendedInfo {
            packed_size: Some(0x1_2345_6789),
            disk_start: Some(70_000),
            ..Default::default()
        };
        header.common.extra.push(Zip64ExtendedInfo::TAG, zip64.encode());

        let parsed = EntryHeader::parse_central(
            &header.to_bytes(),
            VolumePosition::START,
            ValidationStringency::Strict,
        )
        .unwrap();
        assert_eq!(parsed.sizes().size, 500);
        assert_eq!(parsed.sizes().packed_size, 0x1_2345_6789);
        assert_eq!(
            parsed.central().unwrap().local_header_position,
            VolumePosition::new(70_000, 77)
        );
    }

    #[test]
    fn sizes_resolution_prefers_descriptor() {
        let raw = RawSizes {
            crc: 0,
            packed_size: u32::MAX,
            size: u32::MAX,
        };
        let zip64 = Zip64ExtendedInfo {
            size: Some(1),
            packed_size: Some(2),
            ..Default::default()
        };
        assert_eq!(resolve_sizes(raw, Some(&zip64), None).size, 1);
        let descriptor = DataDescriptor {
            crc: 9,
            packed_size: 8,
            size: 7,
            layout: DescriptorLayout::Signed32,
        };
        let sizes = resolve_sizes(raw, Some(&zip64), Some(&descriptor));
        assert_eq!((sizes.crc, sizes.packed_size, sizes.size), (9, 8, 7));
        // Saturated without an extra field: the sentinel is the value.
        assert_eq!(resolve_sizes(raw, None, None).size, u32::MAX as u64);
    }

    #[test]
    fn directory_detection_order() {
        let mut header = central("folder/", RAW, 0, 0);
        assert!(header.is_directory());

        header.common.name = b"folder".to_vec();
        assert!(!header.is_directory());
        if let HeaderVariant::Central(c) = &mut header.variant {
            c.external_attributes = (UNIX_DIRECTORY | 0o755) << 16;
        }
        assert!(header.is_directory());

        if let HeaderVariant::Central(c) = &mut header.variant {
            c.version_made_by = VERSION_MADE_BY;
            c.external_attributes = DOS_DIRECTORY_ATTRIBUTE;
        }
        assert!(header.is_directory());

        if let HeaderVariant::Central(c) = &mut header.variant {
            c.version_made_by = (99 << 8) | VERSION_MADE_BY;
        }
        assert!(!header.is_directory());
    }

    #[test]
    fn cross_validation_names_field_and_entry() {
        let c = central("a.txt", RAW, 0, 0);
        let mut l = local_of(&c);
        assert!(cross_validate(&c, &l, 0).is_ok());

        l.common.sizes.crc ^= 1;
        l.position = VolumePosition::new(3, 40);
        let err = cross_validate(&c, &l, 5).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::HeaderMismatch));
        let msg = err.to_string();
        assert!(msg.contains("crc differs"), "{msg}");
        assert!(msg.contains("entry #5"), "{msg}");
        // Reported at the local header, not the central one.
        assert!(msg.contains("disk 3"), "{msg}");

        let mut l = local_of(&c);
        l.common.flags.set(GeneralPurposeFlags::UNICODE, true);
        assert!(cross_validate(&c, &l, 0).unwrap_err().to_string().contains("flags"));

        // Bits outside the paired set may differ.
        let mut l = local_of(&c);
        l.common.flags.set(0b10, true);
        assert!(cross_validate(&c, &l, 0).is_ok());
    }

    #[test]
    fn comment_field_in_local_header() {
        let mut header = local_of(&central("a", RAW, 0, 0));
        let comment = crate::zip::extra::UnicodeComment::new("x", b"x");
        header
            .common
            .extra
            .push(crate::zip::extra::UnicodeComment::TAG, comment.encode(HeaderKind::Central));
        let bytes = header.to_bytes();
        assert!(
            EntryHeader::parse_local(&bytes, VolumePosition::START, ValidationStringency::Strict)
                .is_err()
        );
        assert!(
            EntryHeader::parse_local(&bytes, VolumePosition::START, ValidationStringency::Lenient)
                .is_ok()
        );
    }
}
