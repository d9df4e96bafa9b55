use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Local File Header (LFH) - 30 bytes fixed
pub const LFH_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header (CDFH) - 46 bytes fixed
pub const CDFH_SIGNATURE: &[u8; 4] = b"PK\x01\x02";
pub const CDFH_SIZE: usize = 46;

/// Data descriptor, whose signature is optional
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8; 4] = b"PK\x07\x08";

/// Largest value of a 32-bit size or offset field that is not the ZIP64 sentinel.
pub const ZIP64_BYTES_THR: u64 = u32::MAX as u64;
/// Same for 16-bit count and disk number fields.
pub const ZIP64_COUNT_THR: u64 = u16::MAX as u64;

/// Version needed to extract: stored entries, deflate, ZIP64.
pub const VERSION_STORED: u16 = 10;
pub const VERSION_DEFLATE: u16 = 20;
pub const VERSION_ZIP64: u16 = 45;
/// Newest APPNOTE revision this implementation knows about (6.3).
pub const VERSION_MADE_BY: u16 = 63;

/// Saturate a 64-bit size/offset into its 32-bit header field.
pub fn saturate_u32(value: u64) -> u32 {
    if value >= ZIP64_BYTES_THR {
        u32::MAX
    } else {
        value as u32
    }
}

/// Saturate a count or disk number into its 16-bit header field.
pub fn saturate_u16(value: u64) -> u16 {
    if value >= ZIP64_COUNT_THR {
        u16::MAX
    } else {
        value as u16
    }
}

/// Which of the two per-entry headers a record or extra field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Local,
    Central,
}

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Deflate64,
    Bzip2,
    Lzma,
    Zstd,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            93 => CompressionMethod::Zstd,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// General purpose bit flags of local and central headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeneralPurposeFlags(pub u16);

impl GeneralPurposeFlags {
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Bits 1 and 2 carry codec options (deflate level, LZMA end marker).
    pub const CODEC_OPTIONS: u16 = 0b110;
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    pub const COMPRESSED_PATCHED: u16 = 1 << 5;
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    pub const UNICODE: u16 = 1 << 11;

    /// Bits that must agree between the local and central header.
    pub const PAIRED: u16 = Self::DATA_DESCRIPTOR | Self::UNICODE;

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, bit: u16) -> bool {
        self.0 & bit == bit
    }

    pub fn set(&mut self, bit: u16, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn is_encrypted(self) -> bool {
        self.0 & (Self::ENCRYPTED | Self::STRONG_ENCRYPTION) != 0
    }

    pub fn has_data_descriptor(self) -> bool {
        self.contains(Self::DATA_DESCRIPTOR)
    }

    pub fn is_unicode(self) -> bool {
        self.contains(Self::UNICODE)
    }

    pub fn is_compressed_patched(self) -> bool {
        self.contains(Self::COMPRESSED_PATCHED)
    }

    pub fn codec_options(self) -> u16 {
        self.0 & Self::CODEC_OPTIONS
    }
}

/// Operating system that produced an entry, from the high byte of
/// "version made by"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostSystem {
    MsDos,
    Unix,
    Ntfs,
    Vfat,
    MacOsX,
    Other(u8),
}

impl HostSystem {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HostSystem::MsDos,
            3 => HostSystem::Unix,
            10 => HostSystem::Ntfs,
            14 => HostSystem::Vfat,
            19 => HostSystem::MacOsX,
            other => HostSystem::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HostSystem::MsDos => 0,
            HostSystem::Unix => 3,
            HostSystem::Ntfs => 10,
            HostSystem::Vfat => 14,
            HostSystem::MacOsX => 19,
            HostSystem::Other(v) => *v,
        }
    }

    /// The host this binary runs on.
    pub fn current() -> Self {
        if cfg!(unix) {
            HostSystem::Unix
        } else {
            HostSystem::MsDos
        }
    }

    /// Whether external attributes hold Unix mode bits in their high half.
    pub fn uses_unix_mode(&self) -> bool {
        matches!(self, HostSystem::Unix | HostSystem::MacOsX)
    }

    /// Whether external attributes hold DOS attribute bits in their low byte.
    pub fn uses_dos_attributes(&self) -> bool {
        matches!(
            self,
            HostSystem::MsDos | HostSystem::Ntfs | HostSystem::Vfat | HostSystem::Other(6)
        )
    }
}

/// DOS directory attribute bit in the low byte of external attributes.
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;
pub const UNIX_FILE_TYPE_MASK: u32 = 0o170000;
pub const UNIX_DIRECTORY: u32 = 0o040000;
pub const UNIX_REGULAR_FILE: u32 = 0o100000;

/// Packed MS-DOS date and time as stored in headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// `None` when both words are zero, which writers use for "no timestamp".
    pub fn from_raw(time: u16, date: u16) -> Option<Self> {
        if time == 0 && date == 0 {
            None
        } else {
            Some(Self { time, date })
        }
    }

    /// Parse modification date to (year, month, day)
    pub fn ymd(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn hms(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Calendar value, or `None` when the packed fields are out of range.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        let (year, month, day) = self.ymd();
        let (hour, minute, second) = self.hms();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_opt(
            hour as u32,
            minute as u32,
            second as u32,
        )
    }

    /// Encode a calendar value, clamping to the 1980..=2107 DOS range and
    /// rounding seconds down to even.
    pub fn from_naive(value: &NaiveDateTime) -> Self {
        let year = value.year().clamp(1980, 2107) as u16;
        let date = ((year - 1980) << 9) | ((value.month() as u16) << 5) | value.day() as u16;
        let time = ((value.hour() as u16) << 11)
            | ((value.minute() as u16) << 5)
            | (value.second() as u16 / 2);
        Self { time, date }
    }
}
