//! Extra fields attached to local and central headers.
//!
//! The extra field blob is a sequence of `(tag: u16, length: u16, payload)`
//! records. [`ExtraFieldCollection`] keeps those records raw and in order;
//! typed views such as [`NtfsTimes`] or [`UnicodePath`] are decoded lazily
//! through [`ExtraFieldCollection::find`]. Tags may repeat, in which case the
//! first payload that decodes cleanly wins.
//!
//! Payloads in the wild are frequently shorter or longer than the format
//! describes. [`ValidationStringency::Strict`] rejects such payloads for the
//! tags this module knows; [`ValidationStringency::Lenient`] decodes as much
//! as it can and ignores the rest.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDateTime};

use super::structures::HeaderKind;
use crate::error::{CorruptionKind, Result, ZipError};

/// How forgiving extra field decoding is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValidationStringency {
    /// Malformed, oversized or undersized payloads of known tags are errors.
    Strict,
    /// Known tags decode best-effort; malformed trailing bytes are ignored.
    #[default]
    Lenient,
}

/// One raw `(tag, payload)` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub tag: u16,
    pub data: Vec<u8>,
}

/// Raw extra fields of one header, in blob order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldCollection {
    fields: Vec<ExtraField>,
    malformed_tail: Vec<u8>,
}

fn malformed(tag: u16, detail: impl std::fmt::Display) -> ZipError {
    ZipError::corrupt(
        CorruptionKind::InvalidExtraField,
        None,
        format!("extra field {tag:#06x}: {detail}"),
    )
}

/// Whether a known tag may legally appear in a header kind; `None` for tags
/// this module does not know.
fn legal_in(tag: u16, kind: HeaderKind) -> Option<bool> {
    match tag {
        Zip64ExtendedInfo::TAG => Some(true),
        NtfsTimes::TAG => Some(NtfsTimes::legal_in(kind)),
        ExtendedTimestamp::TAG => Some(ExtendedTimestamp::legal_in(kind)),
        UnicodePath::TAG => Some(UnicodePath::legal_in(kind)),
        UnicodeComment::TAG => Some(UnicodeComment::legal_in(kind)),
        XceedUnicode::TAG => Some(XceedUnicode::legal_in(kind)),
        _ => None,
    }
}

impl ExtraFieldCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split an extra field blob into records.
    pub fn parse(blob: &[u8], kind: HeaderKind, stringency: ValidationStringency) -> Result<Self> {
        let mut fields = Vec::new();
        let mut cursor = Cursor::new(blob);

        while (cursor.position() as usize) < blob.len() {
            let start = cursor.position() as usize;
            let remaining = blob.len() - start;
            if remaining < 4 {
                return Self::tail(fields, &blob[start..], stringency);
            }

            let tag = cursor.read_u16::<LittleEndian>()?;
            let len = cursor.read_u16::<LittleEndian>()? as usize;
            if len > remaining - 4 {
                return Self::tail(fields, &blob[start..], stringency);
            }

            if stringency == ValidationStringency::Strict && legal_in(tag, kind) == Some(false) {
                return Err(malformed(tag, format!("not allowed in a {kind:?} header")));
            }

            let data = blob[start + 4..start + 4 + len].to_vec();
            cursor.set_position((start + 4 + len) as u64);
            fields.push(ExtraField { tag, data });
        }

        Ok(Self {
            fields,
            malformed_tail: Vec::new(),
        })
    }

    fn tail(fields: Vec<ExtraField>, tail: &[u8], stringency: ValidationStringency) -> Result<Self> {
        if stringency == ValidationStringency::Strict {
            return Err(ZipError::corrupt(
                CorruptionKind::InvalidExtraField,
                None,
                format!("{} trailing bytes do not form an extra field", tail.len()),
            ));
        }
        log::warn!("ignoring {} malformed trailing extra field bytes", tail.len());
        Ok(Self {
            fields,
            malformed_tail: tail.to_vec(),
        })
    }

    /// Bytes that were skipped because they did not form a complete record.
    pub fn malformed_tail(&self) -> &[u8] {
        &self.malformed_tail
    }

    pub fn has_malformed_tail(&self) -> bool {
        !self.malformed_tail.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtraField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First record with `tag`.
    pub fn get(&self, tag: u16) -> Option<&ExtraField> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn contains(&self, tag: u16) -> bool {
        self.get(tag).is_some()
    }

    pub fn push(&mut self, tag: u16, data: Vec<u8>) {
        self.fields.push(ExtraField { tag, data });
    }

    /// Remove every record with `tag`.
    pub fn remove(&mut self, tag: u16) {
        self.fields.retain(|f| f.tag != tag);
    }

    /// Replace every record with `T`'s tag by `value`.
    pub fn insert<T: ExtraFieldType>(&mut self, value: &T, kind: HeaderKind) {
        self.remove(T::TAG);
        self.push(T::TAG, value.encode(kind));
    }

    /// Decode the first well-formed record of type `T`.
    ///
    /// Fields that are not legal in `kind` are never returned. In lenient
    /// mode malformed records are skipped; in strict mode the first
    /// malformed one is an error.
    pub fn find<T: ExtraFieldType>(
        &self,
        kind: HeaderKind,
        stringency: ValidationStringency,
    ) -> Result<Option<T>> {
        if !T::legal_in(kind) {
            return Ok(None);
        }
        for field in self.fields.iter().filter(|f| f.tag == T::TAG) {
            match T::decode(&field.data, kind, stringency) {
                Ok(value) => return Ok(Some(value)),
                Err(e) if stringency == ValidationStringency::Strict => return Err(e),
                Err(e) => log::warn!("skipping extra field: {e}"),
            }
        }
        Ok(None)
    }

    /// Decode the ZIP64 extended information field, whose layout depends on
    /// which raw header fields are saturated.
    pub fn zip64(
        &self,
        kind: HeaderKind,
        slots: Zip64Slots,
        stringency: ValidationStringency,
    ) -> Result<Option<Zip64ExtendedInfo>> {
        for field in self.fields.iter().filter(|f| f.tag == Zip64ExtendedInfo::TAG) {
            match Zip64ExtendedInfo::decode(&field.data, kind, slots, stringency) {
                Ok(value) => return Ok(Some(value)),
                Err(e) if stringency == ValidationStringency::Strict => return Err(e),
                Err(e) => log::warn!("skipping extra field: {e}"),
            }
        }
        Ok(None)
    }

    /// Size of the serialized blob. The malformed tail is not written back.
    pub fn encoded_len(&self) -> usize {
        self.fields.iter().map(|f| 4 + f.data.len()).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for field in &self.fields {
            out.extend_from_slice(&field.tag.to_le_bytes());
            out.extend_from_slice(&(field.data.len() as u16).to_le_bytes());
            out.extend_from_slice(&field.data);
        }
        out
    }
}

/// A typed view over one extra field tag.
pub trait ExtraFieldType: Sized {
    const TAG: u16;

    /// Whether the field may appear in headers of `kind`.
    fn legal_in(_kind: HeaderKind) -> bool {
        true
    }

    fn decode(payload: &[u8], kind: HeaderKind, stringency: ValidationStringency) -> Result<Self>;

    fn encode(&self, kind: HeaderKind) -> Vec<u8>;
}

/// Which raw header fields were saturated and therefore have a slot in the
/// ZIP64 extended information payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Slots {
    pub size: bool,
    pub packed_size: bool,
    pub offset: bool,
    pub disk: bool,
}

impl Zip64Slots {
    pub fn any(&self) -> bool {
        self.size || self.packed_size || self.offset || self.disk
    }

    /// Payload length when exactly the saturated fields are present.
    pub fn payload_len(&self, kind: HeaderKind) -> usize {
        let mut len = 8 * (self.size as usize + self.packed_size as usize);
        if kind == HeaderKind::Central {
            len += 8 * self.offset as usize + 4 * self.disk as usize;
        }
        len
    }
}

/// ZIP64 extended information (tag `0x0001`).
///
/// In a central header the payload holds, in order, size, packed size,
/// local header offset and disk number, each one only if the matching raw
/// field is saturated. In a local header only the two sizes exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64ExtendedInfo {
    pub size: Option<u64>,
    pub packed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
    pub disk_start: Option<u32>,
}

impl Zip64ExtendedInfo {
    pub const TAG: u16 = 0x0001;

    pub fn decode(
        payload: &[u8],
        kind: HeaderKind,
        slots: Zip64Slots,
        stringency: ValidationStringency,
    ) -> Result<Self> {
        let strict = stringency == ValidationStringency::Strict;
        let mut info = Self::default();
        let mut cursor = Cursor::new(payload);

        if kind == HeaderKind::Local {
            // Local headers are meant to carry both sizes whenever the field
            // is present at all.
            let exact = slots.payload_len(kind);
            if strict && payload.len() != 16 && payload.len() != exact {
                return Err(malformed(Self::TAG, format!("local payload of {} bytes", payload.len())));
            }
            if payload.len() >= 16 {
                info.size = cursor.read_u64::<LittleEndian>().ok();
                info.packed_size = cursor.read_u64::<LittleEndian>().ok();
                return Ok(info);
            }
        } else if strict && payload.len() != slots.payload_len(kind) {
            return Err(malformed(
                Self::TAG,
                format!(
                    "central payload of {} bytes, expected {}",
                    payload.len(),
                    slots.payload_len(kind)
                ),
            ));
        }

        if slots.size {
            info.size = cursor.read_u64::<LittleEndian>().ok();
        }
        if slots.packed_size {
            info.packed_size = cursor.read_u64::<LittleEndian>().ok();
        }
        if kind == HeaderKind::Central {
            if slots.offset {
                info.local_header_offset = cursor.read_u64::<LittleEndian>().ok();
            }
            if slots.disk {
                info.disk_start = cursor.read_u32::<LittleEndian>().ok();
            }
        }
        Ok(info)
    }

    /// Serialize the present fields in their fixed order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        for value in [self.size, self.packed_size, self.local_header_offset]
            .into_iter()
            .flatten()
        {
            out.extend_from_slice(&value.to_le_bytes());
        }
        if let Some(disk) = self.disk_start {
            out.extend_from_slice(&disk.to_le_bytes());
        }
        out
    }
}

/// Convert a Windows FILETIME (100ns ticks since 1601) to a calendar value.
pub fn filetime_to_naive(ticks: u64) -> Option<NaiveDateTime> {
    const EPOCH_DIFF_SECS: i64 = 11_644_473_600;
    let secs = (ticks / 10_000_000) as i64 - EPOCH_DIFF_SECS;
    let nanos = (ticks % 10_000_000) as u32 * 100;
    DateTime::from_timestamp(secs, nanos).map(|d| d.naive_utc())
}

/// Inverse of [`filetime_to_naive`]. `None` for dates before 1601 or past
/// the range of a 64-bit tick count.
pub fn naive_to_filetime(value: &NaiveDateTime) -> Option<u64> {
    const EPOCH_DIFF_SECS: i64 = 11_644_473_600;
    let utc = value.and_utc();
    let secs = u64::try_from(utc.timestamp().checked_add(EPOCH_DIFF_SECS)?).ok()?;
    secs.checked_mul(10_000_000)?
        .checked_add((utc.timestamp_subsec_nanos() / 100) as u64)
}

/// NTFS timestamps (tag `0x000a`), as raw FILETIME values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsTimes {
    pub modified: u64,
    pub accessed: u64,
    pub created: u64,
}

impl NtfsTimes {
    const ATTRIBUTE_TIMES: u16 = 0x0001;

    pub fn modified_naive(&self) -> Option<NaiveDateTime> {
        filetime_to_naive(self.modified)
    }
}

impl ExtraFieldType for NtfsTimes {
    const TAG: u16 = 0x000a;

    fn decode(payload: &[u8], _kind: HeaderKind, stringency: ValidationStringency) -> Result<Self> {
        let strict = stringency == ValidationStringency::Strict;
        let mut cursor = Cursor::new(payload);
        cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| malformed(Self::TAG, "missing reserved word"))?;

        while payload.len() - cursor.position() as usize >= 4 {
            let tag = cursor.read_u16::<LittleEndian>()?;
            let size = cursor.read_u16::<LittleEndian>()? as usize;
            let left = payload.len() - cursor.position() as usize;
            if tag == Self::ATTRIBUTE_TIMES {
                if size != 24 && strict {
                    return Err(malformed(Self::TAG, format!("time attribute of {size} bytes")));
                }
                if left < 24 {
                    break;
                }
                return Ok(Self {
                    modified: cursor.read_u64::<LittleEndian>()?,
                    accessed: cursor.read_u64::<LittleEndian>()?,
                    created: cursor.read_u64::<LittleEndian>()?,
                });
            }
            if size > left {
                break;
            }
            cursor.set_position(cursor.position() + size as u64);
        }
        Err(malformed(Self::TAG, "no complete time attribute"))
    }

    fn encode(&self, _kind: HeaderKind) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&Self::ATTRIBUTE_TIMES.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        for value in [self.modified, self.accessed, self.created] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

/// Info-ZIP extended timestamp (tag `0x5455`), Unix seconds.
///
/// The local variant carries every time announced in `flags`; the central
/// variant keeps the same flags but only the modification time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedTimestamp {
    pub flags: u8,
    pub modified: Option<i32>,
    pub accessed: Option<i32>,
    pub created: Option<i32>,
}

impl ExtendedTimestamp {
    const MODIFIED: u8 = 1;
    const ACCESSED: u8 = 2;
    const CREATED: u8 = 4;

    pub fn from_modified(unix_secs: i32) -> Self {
        Self {
            flags: Self::MODIFIED,
            modified: Some(unix_secs),
            accessed: None,
            created: None,
        }
    }

    pub fn modified_naive(&self) -> Option<NaiveDateTime> {
        DateTime::from_timestamp(self.modified? as i64, 0).map(|d| d.naive_utc())
    }
}

impl ExtraFieldType for ExtendedTimestamp {
    const TAG: u16 = 0x5455;

    fn decode(payload: &[u8], kind: HeaderKind, stringency: ValidationStringency) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let flags = cursor
            .read_u8()
            .map_err(|_| malformed(Self::TAG, "empty payload"))?;
        let mut value = Self {
            flags,
            ..Self::default()
        };

        let announced: &[u8] = match kind {
            HeaderKind::Local => &[Self::MODIFIED, Self::ACCESSED, Self::CREATED],
            HeaderKind::Central => &[Self::MODIFIED],
        };
        let mut expected = 1;
        for bit in announced.iter().copied().filter(|bit| flags & bit != 0) {
            expected += 4;
            let Ok(secs) = cursor.read_i32::<LittleEndian>() else {
                break;
            };
            match bit {
                Self::MODIFIED => value.modified = Some(secs),
                Self::ACCESSED => value.accessed = Some(secs),
                _ => value.created = Some(secs),
            }
        }

        if stringency == ValidationStringency::Strict && payload.len() != expected {
            return Err(malformed(
                Self::TAG,
                format!("{} bytes for flags {flags:#04x}, expected {expected}", payload.len()),
            ));
        }
        Ok(value)
    }

    fn encode(&self, kind: HeaderKind) -> Vec<u8> {
        let mut out = vec![self.flags];
        let times = match kind {
            HeaderKind::Local => vec![self.modified, self.accessed, self.created],
            HeaderKind::Central => vec![self.modified],
        };
        for secs in times.into_iter().flatten() {
            out.extend_from_slice(&secs.to_le_bytes());
        }
        out
    }
}

/// Shared layout of the Info-ZIP Unicode path and comment fields: a version
/// byte, the CRC-32 of the header's own bytes, then UTF-8 text.
fn decode_info_zip_unicode(
    tag: u16,
    payload: &[u8],
    stringency: ValidationStringency,
) -> Result<(u32, String)> {
    let strict = stringency == ValidationStringency::Strict;
    if payload.len() < 5 {
        return Err(malformed(tag, "payload shorter than version and CRC"));
    }
    if strict && payload[0] != 1 {
        return Err(malformed(tag, format!("unknown version {}", payload[0])));
    }
    let crc = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
    let text = match std::str::from_utf8(&payload[5..]) {
        Ok(text) => text.to_string(),
        Err(e) if strict => return Err(malformed(tag, e)),
        Err(_) => String::from_utf8_lossy(&payload[5..]).into_owned(),
    };
    Ok((crc, text))
}

fn encode_info_zip_unicode(crc: u32, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + text.len());
    out.push(1);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out
}

/// Info-ZIP Unicode path (tag `0x7075`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodePath {
    /// CRC-32 of the raw name bytes this field was written for.
    pub header_crc: u32,
    pub name: String,
}

impl UnicodePath {
    pub fn new(name: &str, raw_header_name: &[u8]) -> Self {
        Self {
            header_crc: crc32fast::hash(raw_header_name),
            name: name.to_string(),
        }
    }

    /// The field only applies while the header name is the one it was
    /// written for.
    pub fn applies_to(&self, raw_header_name: &[u8]) -> bool {
        crc32fast::hash(raw_header_name) == self.header_crc
    }
}

impl ExtraFieldType for UnicodePath {
    const TAG: u16 = 0x7075;

    fn decode(payload: &[u8], _kind: HeaderKind, stringency: ValidationStringency) -> Result<Self> {
        let (header_crc, name) = decode_info_zip_unicode(Self::TAG, payload, stringency)?;
        Ok(Self { header_crc, name })
    }

    fn encode(&self, _kind: HeaderKind) -> Vec<u8> {
        encode_info_zip_unicode(self.header_crc, &self.name)
    }
}

/// Info-ZIP Unicode comment (tag `0x6375`); comments only exist in central
/// headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeComment {
    pub header_crc: u32,
    pub comment: String,
}

impl UnicodeComment {
    pub fn new(comment: &str, raw_header_comment: &[u8]) -> Self {
        Self {
            header_crc: crc32fast::hash(raw_header_comment),
            comment: comment.to_string(),
        }
    }

    pub fn applies_to(&self, raw_header_comment: &[u8]) -> bool {
        crc32fast::hash(raw_header_comment) == self.header_crc
    }
}

impl ExtraFieldType for UnicodeComment {
    const TAG: u16 = 0x6375;

    fn legal_in(kind: HeaderKind) -> bool {
        kind == HeaderKind::Central
    }

    fn decode(payload: &[u8], _kind: HeaderKind, stringency: ValidationStringency) -> Result<Self> {
        let (header_crc, comment) = decode_info_zip_unicode(Self::TAG, payload, stringency)?;
        Ok(Self { header_crc, comment })
    }

    fn encode(&self, _kind: HeaderKind) -> Vec<u8> {
        encode_info_zip_unicode(self.header_crc, &self.comment)
    }
}

/// Xceed Unicode field (tag `0x554e`, "NU"): UTF-16LE name, and in the
/// central header also the comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XceedUnicode {
    pub name: String,
    pub comment: Option<String>,
}

impl XceedUnicode {
    const SIGNATURE: u32 = 0x5843_554e;
}

fn read_utf16(
    cursor: &mut Cursor<&[u8]>,
    chars: usize,
    stringency: ValidationStringency,
) -> Result<String> {
    let mut units = Vec::with_capacity(chars);
    for _ in 0..chars {
        match cursor.read_u16::<LittleEndian>() {
            Ok(unit) => units.push(unit),
            Err(_) if stringency == ValidationStringency::Lenient => break,
            Err(_) => return Err(malformed(XceedUnicode::TAG, "text runs past the payload")),
        }
    }
    match String::from_utf16(&units) {
        Ok(text) => Ok(text),
        Err(e) if stringency == ValidationStringency::Strict => {
            Err(malformed(XceedUnicode::TAG, e))
        }
        Err(_) => Ok(String::from_utf16_lossy(&units)),
    }
}

impl ExtraFieldType for XceedUnicode {
    const TAG: u16 = 0x554e;

    fn decode(payload: &[u8], kind: HeaderKind, stringency: ValidationStringency) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let signature = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| malformed(Self::TAG, "missing signature"))?;
        if signature != Self::SIGNATURE {
            return Err(malformed(Self::TAG, format!("bad signature {signature:#010x}")));
        }
        let name_len = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| malformed(Self::TAG, "missing name length"))? as usize;
        let comment_len = match kind {
            HeaderKind::Central => Some(
                cursor
                    .read_u16::<LittleEndian>()
                    .map_err(|_| malformed(Self::TAG, "missing comment length"))?
                    as usize,
            ),
            HeaderKind::Local => None,
        };

        let name = read_utf16(&mut cursor, name_len, stringency)?;
        let comment = comment_len
            .map(|len| read_utf16(&mut cursor, len, stringency))
            .transpose()?;

        if stringency == ValidationStringency::Strict && cursor.position() as usize != payload.len() {
            return Err(malformed(Self::TAG, "trailing bytes after text"));
        }
        Ok(Self { name, comment })
    }

    fn encode(&self, kind: HeaderKind) -> Vec<u8> {
        let name: Vec<u16> = self.name.encode_utf16().collect();
        let comment: Vec<u16> = self
            .comment
            .as_deref()
            .unwrap_or_default()
            .encode_utf16()
            .collect();

        let mut out = Vec::new();
        out.extend_from_slice(&Self::SIGNATURE.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        if kind == HeaderKind::Central {
            out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        }
        for unit in &name {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        if kind == HeaderKind::Central {
            for unit in &comment {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ValidationStringency::{Lenient, Strict};

    fn blob(fields: &[(u16, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (tag, data) in fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    #[test]
    fn filetime_conversion_bounds() {
        let unix_epoch = DateTime::from_timestamp(0, 500).unwrap().naive_utc();
        let ticks = naive_to_filetime(&unix_epoch).unwrap();
        assert_eq!(ticks, 116_444_736_000_000_005);
        assert_eq!(filetime_to_naive(ticks), Some(unix_epoch));

        assert_eq!(naive_to_filetime(&NaiveDateTime::MAX), None);
        assert_eq!(naive_to_filetime(&NaiveDateTime::MIN), None);
        let before_1601 = DateTime::from_timestamp(-11_644_473_601, 0).unwrap().naive_utc();
        assert_eq!(naive_to_filetime(&before_1601), None);
    }

    #[test]
    fn keeps_order_and_duplicates() {
        let raw = blob(&[(0xcafe, b"ab"), (0x0001, &[0; 8]), (0xcafe, b"cd")]);
        let extra = ExtraFieldCollection::parse(&raw, HeaderKind::Central, Strict).unwrap();
        let tags: Vec<u16> = extra.iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![0xcafe, 0x0001, 0xcafe]);
        assert_eq!(extra.get(0xcafe).unwrap().data, b"ab");
        assert_eq!(extra.to_bytes(), raw);
    }

    #[test]
    fn truncated_tail_depends_on_stringency() {
        let mut raw = blob(&[(0xcafe, b"ab")]);
        raw.extend_from_slice(&[0x01, 0x00, 0x10]);

        let err = ExtraFieldCollection::parse(&raw, HeaderKind::Local, Strict).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::InvalidExtraField));

        let extra = ExtraFieldCollection::parse(&raw, HeaderKind::Local, Lenient).unwrap();
        assert_eq!(extra.len(), 1);
        assert!(extra.has_malformed_tail());
    }

    #[test]
    fn illegal_placement_is_rejected_in_strict_mode() {
        let comment = UnicodeComment::new("hé", b"he");
        let raw = blob(&[(UnicodeComment::TAG, &comment.encode(HeaderKind::Central))]);
        assert!(ExtraFieldCollection::parse(&raw, HeaderKind::Local, Strict).is_err());

        let extra = ExtraFieldCollection::parse(&raw, HeaderKind::Local, Lenient).unwrap();
        let found: Option<UnicodeComment> = extra.find(HeaderKind::Local, Lenient).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn absent_field_is_not_fabricated() {
        let extra = ExtraFieldCollection::new();
        let ntfs: Option<NtfsTimes> = extra.find(HeaderKind::Central, Strict).unwrap();
        assert!(ntfs.is_none());
        let zip64 = extra
            .zip64(HeaderKind::Central, Zip64Slots { size: true, ..Default::default() }, Strict)
            .unwrap();
        assert!(zip64.is_none());
    }

    #[test]
    fn zip64_central_consumes_only_saturated_slots() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        payload.extend_from_slice(&7u32.to_le_bytes());
        let slots = Zip64Slots {
            packed_size: true,
            disk: true,
            ..Default::default()
        };
        let info =
            Zip64ExtendedInfo::decode(&payload, HeaderKind::Central, slots, Strict).unwrap();
        assert_eq!(info.size, None);
        assert_eq!(info.packed_size, Some(0x1_0000_0000));
        assert_eq!(info.local_header_offset, None);
        assert_eq!(info.disk_start, Some(7));
        assert_eq!(info.encode(), payload);
    }

    #[test]
    fn zip64_undersized_payload() {
        let payload = 5u64.to_le_bytes();
        let slots = Zip64Slots {
            size: true,
            packed_size: true,
            ..Default::default()
        };
        assert!(Zip64ExtendedInfo::decode(&payload, HeaderKind::Central, slots, Strict).is_err());
        let info =
            Zip64ExtendedInfo::decode(&payload, HeaderKind::Central, slots, Lenient).unwrap();
        assert_eq!(info.size, Some(5));
        assert_eq!(info.packed_size, None);
    }

    #[test]
    fn zip64_local_reads_both_sizes() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&10u64.to_le_bytes());
        payload.extend_from_slice(&20u64.to_le_bytes());
        let slots = Zip64Slots {
            size: true,
            ..Default::default()
        };
        let info = Zip64ExtendedInfo::decode(&payload, HeaderKind::Local, slots, Strict).unwrap();
        assert_eq!(info.size, Some(10));
        assert_eq!(info.packed_size, Some(20));
        assert_eq!(info.local_header_offset, None);
    }

    #[test]
    fn ntfs_times_round_trip() {
        let times = NtfsTimes {
            modified: 132_000_000_000_000_000,
            accessed: 1,
            created: 2,
        };
        let encoded = times.encode(HeaderKind::Local);
        assert_eq!(encoded.len(), 32);
        let decoded = NtfsTimes::decode(&encoded, HeaderKind::Central, Strict).unwrap();
        assert_eq!(decoded, times);
        assert!(decoded.modified_naive().is_some());
    }

    #[test]
    fn extended_timestamp_central_only_has_mtime() {
        let local = ExtendedTimestamp {
            flags: 0b111,
            modified: Some(1_600_000_000),
            accessed: Some(1),
            created: Some(2),
        };
        assert_eq!(local.encode(HeaderKind::Local).len(), 13);
        let central = local.encode(HeaderKind::Central);
        assert_eq!(central.len(), 5);

        let decoded = ExtendedTimestamp::decode(&central, HeaderKind::Central, Strict).unwrap();
        assert_eq!(decoded.modified, Some(1_600_000_000));
        assert_eq!(decoded.accessed, None);

        // A local payload cut short still yields what is there.
        let short = &local.encode(HeaderKind::Local)[..9];
        assert!(ExtendedTimestamp::decode(short, HeaderKind::Local, Strict).is_err());
        let partial = ExtendedTimestamp::decode(short, HeaderKind::Local, Lenient).unwrap();
        assert_eq!(partial.accessed, Some(1));
        assert_eq!(partial.created, None);
    }

    #[test]
    fn unicode_path_checks_header_crc() {
        let path = UnicodePath::new("naïve.txt", b"na?ve.txt");
        let decoded =
            UnicodePath::decode(&path.encode(HeaderKind::Local), HeaderKind::Local, Strict)
                .unwrap();
        assert_eq!(decoded.name, "naïve.txt");
        assert!(decoded.applies_to(b"na?ve.txt"));
        assert!(!decoded.applies_to(b"renamed.txt"));
    }

    #[test]
    fn xceed_layout_differs_by_header_kind() {
        let field = XceedUnicode {
            name: "日本.txt".to_string(),
            comment: Some("c".to_string()),
        };
        let local = field.encode(HeaderKind::Local);
        let central = field.encode(HeaderKind::Central);
        assert_eq!(central.len(), local.len() + 2 + 2);

        let decoded = XceedUnicode::decode(&local, HeaderKind::Local, Strict).unwrap();
        assert_eq!(decoded.name, "日本.txt");
        assert_eq!(decoded.comment, None);
        let decoded = XceedUnicode::decode(&central, HeaderKind::Central, Strict).unwrap();
        assert_eq!(decoded, field);
    }

    #[test]
    fn find_returns_first_valid_duplicate_when_lenient() {
        let good = ExtendedTimestamp::from_modified(42).encode(HeaderKind::Central);
        let raw = blob(&[(ExtendedTimestamp::TAG, &[]), (ExtendedTimestamp::TAG, &good)]);
        let extra = ExtraFieldCollection::parse(&raw, HeaderKind::Central, Lenient).unwrap();

        let found: ExtendedTimestamp = extra.find(HeaderKind::Central, Lenient).unwrap().unwrap();
        assert_eq!(found.modified, Some(42));
        assert!(extra.find::<ExtendedTimestamp>(HeaderKind::Central, Strict).is_err());
    }
}
