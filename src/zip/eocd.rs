//! End of central directory records.
//!
//! The classic record sits at the very end of the last volume and may be
//! followed by a comment of up to 65535 bytes, so it has to be found by
//! scanning backward. When any of its fields is saturated, a ZIP64 locator
//! directly precedes it and points at the ZIP64 record.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use super::structures::ZIP64_COUNT_THR;
use crate::error::{CorruptionKind, Result, ZipError};

/// Maximum ZIP comment size allowed by the format (65535 bytes).
pub const MAX_COMMENT_SIZE: usize = 65535;

fn bad_signature(what: &str) -> ZipError {
    ZipError::corrupt(
        CorruptionKind::BadSignature,
        None,
        format!("invalid {what} signature"),
    )
}

fn truncated(what: &'static str) -> impl FnOnce(std::io::Error) -> ZipError {
    move |_| ZipError::corrupt(CorruptionKind::Truncated, None, format!("{what} ends early"))
}

/// End of Central Directory Record (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub entries_on_disk: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8; 4] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Parse the fixed part and as much of the comment as `buf` holds.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::corrupt(
                CorruptionKind::Truncated,
                None,
                "end of central directory record ends early",
            ));
        }
        if &buf[0..4] != Self::SIGNATURE {
            return Err(bad_signature("end of central directory"));
        }

        let mut cursor = Cursor::new(&buf[4..]);
        let read = |c: &mut Cursor<&[u8]>| -> std::io::Result<_> {
            Ok((
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()?,
                c.read_u32::<LittleEndian>()?,
                c.read_u32::<LittleEndian>()?,
                c.read_u16::<LittleEndian>()? as usize,
            ))
        };
        let (disk_number, cd_start_disk, entries_on_disk, total_entries, cd_size, cd_offset, comment_len) =
            read(&mut cursor).map_err(truncated("end of central directory record"))?;

        let comment_end = (Self::SIZE + comment_len).min(buf.len());
        Ok(Self {
            disk_number,
            cd_start_disk,
            entries_on_disk,
            total_entries,
            cd_size,
            cd_offset,
            comment: buf[Self::SIZE..comment_end].to_vec(),
        })
    }

    /// Check if this is a ZIP64 archive
    pub fn is_zip64(&self) -> bool {
        self.disk_number == u16::MAX
            || self.cd_start_disk == u16::MAX
            || self.entries_on_disk == u16::MAX
            || self.total_entries == u16::MAX
            || self.cd_size == u32::MAX
            || self.cd_offset == u32::MAX
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.comment.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(Self::SIGNATURE);
        for value in [
            self.disk_number,
            self.cd_start_disk,
            self.entries_on_disk,
            self.total_entries,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.cd_size.to_le_bytes());
        out.extend_from_slice(&self.cd_offset.to_le_bytes());
        out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.comment);
        out
    }
}

/// A possible end record found by [`find_candidates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EocdCandidate {
    /// Offset of the signature inside the scanned window.
    pub offset: usize,
    pub record: EndOfCentralDirectory,
}

/// Scan `window` backward for end record signatures.
///
/// Signatures can also occur inside comments, so every hit whose fixed part
/// and announced comment fit inside the window is returned, nearest to the
/// end first. The caller decides which one is real.
pub fn find_candidates(window: &[u8]) -> Vec<EocdCandidate> {
    let size = EndOfCentralDirectory::SIZE;
    if window.len() < size {
        return Vec::new();
    }
    (0..=window.len() - size)
        .rev()
        .filter(|&i| &window[i..i + 4] == EndOfCentralDirectory::SIGNATURE)
        .filter(|&i| {
            let comment_len = u16::from_le_bytes([window[i + 20], window[i + 21]]) as usize;
            i + size + comment_len <= window.len()
        })
        .filter_map(|i| {
            EndOfCentralDirectory::from_bytes(&window[i..])
                .ok()
                .map(|record| EocdCandidate { offset: i, record })
        })
        .collect()
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EndLocator {
    pub eocd64_disk: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EndLocator {
    pub const SIGNATURE: &'static [u8; 4] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(ZipError::corrupt(
                CorruptionKind::Truncated,
                None,
                "zip64 end of central directory locator ends early",
            ));
        }
        if &buf[0..4] != Self::SIGNATURE {
            return Err(bad_signature("zip64 end of central directory locator"));
        }

        let mut cursor = Cursor::new(&buf[4..]);
        let parse = |c: &mut Cursor<&[u8]>| -> std::io::Result<Self> {
            Ok(Self {
                eocd64_disk: c.read_u32::<LittleEndian>()?,
                eocd64_offset: c.read_u64::<LittleEndian>()?,
                total_disks: c.read_u32::<LittleEndian>()?,
            })
        };
        parse(&mut cursor).map_err(truncated("zip64 locator"))
    }

    /// The locator must account for exactly the volumes that are present.
    pub fn check_disk_count(&self, last_disk: u32) -> Result<()> {
        if self.total_disks as u64 != last_disk as u64 + 1 {
            return Err(ZipError::corrupt(
                CorruptionKind::DiskCountMismatch,
                None,
                format!(
                    "zip64 locator announces {} disk(s), but {} are present",
                    self.total_disks,
                    last_disk as u64 + 1
                ),
            ));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(Self::SIGNATURE);
        out.extend_from_slice(&self.eocd64_disk.to_le_bytes());
        out.extend_from_slice(&self.eocd64_offset.to_le_bytes());
        out.extend_from_slice(&self.total_disks.to_le_bytes());
        out
    }
}

/// ZIP64 End of Central Directory Record - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub cd_start_disk: u32,
    pub entries_on_disk: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub extensible_data: Vec<u8>,
}

impl Zip64EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8; 4] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    /// Parse the fixed part; extensible data is kept if `buf` holds it.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::MIN_SIZE {
            return Err(ZipError::corrupt(
                CorruptionKind::Truncated,
                None,
                "zip64 end of central directory record ends early",
            ));
        }
        if &buf[0..4] != Self::SIGNATURE {
            return Err(bad_signature("zip64 end of central directory"));
        }

        let mut cursor = Cursor::new(&buf[4..]);
        let parse = |c: &mut Cursor<&[u8]>| -> std::io::Result<_> {
            let record_size = c.read_u64::<LittleEndian>()?;
            let record = Self {
                version_made_by: c.read_u16::<LittleEndian>()?,
                version_needed: c.read_u16::<LittleEndian>()?,
                disk_number: c.read_u32::<LittleEndian>()?,
                cd_start_disk: c.read_u32::<LittleEndian>()?,
                entries_on_disk: c.read_u64::<LittleEndian>()?,
                total_entries: c.read_u64::<LittleEndian>()?,
                cd_size: c.read_u64::<LittleEndian>()?,
                cd_offset: c.read_u64::<LittleEndian>()?,
                extensible_data: Vec::new(),
            };
            Ok((record_size, record))
        };
        let (record_size, mut record) =
            parse(&mut cursor).map_err(truncated("zip64 end of central directory record"))?;

        // record_size counts everything after itself: 44 fixed bytes plus
        // the extensible data.
        let extensible = (record_size.saturating_sub(44) as usize).min(buf.len() - Self::MIN_SIZE);
        record.extensible_data = buf[Self::MIN_SIZE..Self::MIN_SIZE + extensible].to_vec();
        Ok(record)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::MIN_SIZE + self.extensible_data.len());
        out.extend_from_slice(Self::SIGNATURE);
        out.extend_from_slice(&(44 + self.extensible_data.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.disk_number.to_le_bytes());
        out.extend_from_slice(&self.cd_start_disk.to_le_bytes());
        for value in [
            self.entries_on_disk,
            self.total_entries,
            self.cd_size,
            self.cd_offset,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.extensible_data);
        out
    }
}

/// Whether an end record value needs the ZIP64 records.
pub fn count_needs_zip64(value: u64) -> bool {
    value >= ZIP64_COUNT_THR
}
