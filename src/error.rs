//! Error taxonomy shared by every layer of the crate.
//!
//! Errors are split into classes that callers react to differently:
//! structural corruption, unsupported-but-valid features, data integrity
//! failures detected while streaming, caller misuse, cancellation and plain
//! I/O failures. See [`ErrorClass`].

use std::fmt;
use std::io;

use thiserror::Error;

use crate::volume::VolumePosition;

pub type Result<T> = std::result::Result<T, ZipError>;

/// The flavour of structural corruption that was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptionKind {
    /// A record did not start with its expected signature.
    BadSignature,
    /// A local header disagrees with its central directory header.
    HeaderMismatch,
    /// None of the data descriptor layouts matched the central directory.
    UnresolvedDataDescriptor,
    /// A header would have to be read or written across a volume boundary.
    FragmentedHeader,
    /// The end records disagree with the number of volumes present.
    DiskCountMismatch,
    /// No usable end-of-central-directory record was found.
    MissingEndRecord,
    /// An extra field blob or a known extra field payload is malformed.
    InvalidExtraField,
    /// A position or length points outside of the volume set.
    AddressOutOfRange,
    /// A record ends before its fixed part does.
    Truncated,
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorruptionKind::BadSignature => "bad signature",
            CorruptionKind::HeaderMismatch => "local/central header mismatch",
            CorruptionKind::UnresolvedDataDescriptor => "unresolvable data descriptor",
            CorruptionKind::FragmentedHeader => "header fragmented across volumes",
            CorruptionKind::DiskCountMismatch => "disk count mismatch",
            CorruptionKind::MissingEndRecord => "missing end of central directory",
            CorruptionKind::InvalidExtraField => "invalid extra field",
            CorruptionKind::AddressOutOfRange => "address out of range",
            CorruptionKind::Truncated => "truncated record",
        };
        f.write_str(name)
    }
}

/// Valid ZIP features this crate declines to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsupportedFeature {
    Encryption,
    CompressedPatchedData,
    VersionNeeded(u16),
    CompressionMethod(u16),
}

impl fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedFeature::Encryption => f.write_str("encrypted archives are not supported"),
            UnsupportedFeature::CompressedPatchedData => {
                f.write_str("compressed patched data is not supported")
            }
            UnsupportedFeature::VersionNeeded(v) => {
                write!(f, "version needed to extract {}.{} is not supported", v / 10, v % 10)
            }
            UnsupportedFeature::CompressionMethod(m) => {
                write!(f, "compression method {m} is not supported")
            }
        }
    }
}

/// Coarse classification of a [`ZipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Corruption,
    Unsupported,
    DataIntegrity,
    Misuse,
    Cancelled,
    Io,
}

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("corrupt archive: {kind}{}{}: {detail}", fmt_position(.position), fmt_entry(.entry))]
    Corrupt {
        kind: CorruptionKind,
        position: Option<VolumePosition>,
        entry: Option<u64>,
        detail: String,
    },

    #[error("{feature}{}", fmt_position(.position))]
    Unsupported {
        feature: UnsupportedFeature,
        position: Option<VolumePosition>,
    },

    #[error("data integrity error{}: {detail}", fmt_entry(.entry))]
    DataIntegrity { detail: String, entry: Option<u64> },

    /// The codec rejected the compressed bytes it was fed.
    #[error("invalid compressed data: {detail}")]
    InvalidData { detail: String },

    #[error("invalid use: {0}")]
    Misuse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(io::Error),
}

fn fmt_position(position: &Option<VolumePosition>) -> String {
    position.map(|p| format!(" at {p}")).unwrap_or_default()
}

fn fmt_entry(entry: &Option<u64>) -> String {
    entry.map(|i| format!(" (entry #{i})")).unwrap_or_default()
}

impl ZipError {
    pub(crate) fn corrupt(
        kind: CorruptionKind,
        position: Option<VolumePosition>,
        detail: impl Into<String>,
    ) -> Self {
        ZipError::Corrupt {
            kind,
            position,
            entry: None,
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(feature: UnsupportedFeature, position: Option<VolumePosition>) -> Self {
        ZipError::Unsupported { feature, position }
    }

    pub(crate) fn misuse(detail: impl Into<String>) -> Self {
        ZipError::Misuse(detail.into())
    }

    pub(crate) fn integrity(detail: impl Into<String>) -> Self {
        ZipError::DataIntegrity {
            detail: detail.into(),
            entry: None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ZipError::Corrupt { .. } => ErrorClass::Corruption,
            ZipError::Unsupported { .. } => ErrorClass::Unsupported,
            ZipError::DataIntegrity { .. } | ZipError::InvalidData { .. } => {
                ErrorClass::DataIntegrity
            }
            ZipError::Misuse(_) => ErrorClass::Misuse,
            ZipError::Cancelled => ErrorClass::Cancelled,
            ZipError::Io(_) => ErrorClass::Io,
        }
    }

    pub fn corruption_kind(&self) -> Option<CorruptionKind> {
        match self {
            ZipError::Corrupt { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Attach the central directory index of the entry being processed.
    /// An index that is already present is kept.
    pub fn with_entry(mut self, index: u64) -> Self {
        match &mut self {
            ZipError::Corrupt { entry, .. } | ZipError::DataIntegrity { entry, .. } => {
                entry.get_or_insert(index);
            }
            _ => {}
        }
        self
    }

    /// Fill in the position of a corruption error raised by a pure parser
    /// that did not know where its bytes came from.
    pub(crate) fn at(mut self, at: VolumePosition) -> Self {
        if let ZipError::Corrupt { position, .. } = &mut self {
            position.get_or_insert(at);
        }
        self
    }

    /// Wrap this error so it can travel through `std::io` traits.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            ZipError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        let kind = err.kind();
        if !err.get_ref().is_some_and(|inner| inner.is::<ZipError>()) {
            return ZipError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<ZipError>()) {
            Some(Ok(zip)) => *zip,
            Some(Err(other)) => ZipError::Io(io::Error::new(kind, other)),
            None => ZipError::Io(io::Error::from(kind)),
        }
    }
}
