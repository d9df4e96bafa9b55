//! Whole-archive validation.
//!
//! Validation walks every entry, cross-checks its headers and streams its
//! content through the decoder so sizes and CRCs are verified. Structural
//! problems stop the walk; content problems are recorded and the walk moves
//! on to the next entry, since entries are independently addressable.

use std::fmt;

use super::parser::{ArchiveReader, EntryCursor, ZipEntry};
use crate::error::{CorruptionKind, ErrorClass, Result, ZipError};

/// Overall verdict of [`ArchiveReader::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationStatus {
    Ok,
    /// The archive is readable but something looked off.
    Warning,
    Corrupt(CorruptionKind),
    Unsupported,
    DataIntegrity,
}

impl ValidationStatus {
    fn severity(self) -> u8 {
        match self {
            ValidationStatus::Ok => 0,
            ValidationStatus::Warning => 1,
            ValidationStatus::DataIntegrity => 2,
            ValidationStatus::Unsupported => 3,
            ValidationStatus::Corrupt(_) => 4,
        }
    }

    /// The more severe of the two; the first one wins a tie.
    fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_ok(self) -> bool {
        self == ValidationStatus::Ok
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Ok => f.write_str("OK"),
            ValidationStatus::Warning => f.write_str("warning"),
            ValidationStatus::Corrupt(kind) => write!(f, "corrupt ({kind})"),
            ValidationStatus::Unsupported => f.write_str("unsupported"),
            ValidationStatus::DataIntegrity => f.write_str("data integrity error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    /// Entries whose headers were read successfully.
    pub entries_checked: u64,
    /// One line per finding, in the order they were found.
    pub messages: Vec<String>,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            status: ValidationStatus::Ok,
            entries_checked: 0,
            messages: Vec::new(),
        }
    }

    fn record(&mut self, status: ValidationStatus, message: String) {
        self.status = self.status.worst(status);
        self.messages.push(message);
    }

    fn warn(&mut self, message: String) {
        self.record(ValidationStatus::Warning, message);
    }

    /// Record `err` if validation can describe it; anything else (I/O,
    /// cancellation, misuse) is handed back to be propagated.
    fn record_error(&mut self, err: ZipError) -> std::result::Result<ValidationStatus, ZipError> {
        let status = match err.class() {
            ErrorClass::Corruption => match err.corruption_kind() {
                Some(kind) => ValidationStatus::Corrupt(kind),
                None => return Err(err),
            },
            ErrorClass::Unsupported => ValidationStatus::Unsupported,
            ErrorClass::DataIntegrity => ValidationStatus::DataIntegrity,
            ErrorClass::Misuse | ErrorClass::Cancelled | ErrorClass::Io => return Err(err),
        };
        self.record(status, err.to_string());
        Ok(status)
    }
}

impl ArchiveReader {
    /// Check every header and every entry's content.
    ///
    /// Findings are reported in the returned [`ValidationReport`]; only I/O
    /// failures, cancellation and misuse (such as a closed reader) are
    /// returned as errors. Running it twice on an unchanged archive gives the
    /// same report.
    pub fn validate(&mut self) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();
        let mut names = Vec::new();
        let mut cursor = EntryCursor::new(self.directory());

        while let Some(next) = self.next_entry(&mut cursor) {
            let entry = match next {
                Ok(entry) => entry,
                Err(e) => {
                    report.record_error(e)?;
                    log::debug!("validation stopped: {}", report.status);
                    return Ok(report);
                }
            };
            report.entries_checked += 1;
            check_extra_tails(&entry, &mut report);

            if let Err(e) = self.verify_content(&entry) {
                let e = e.with_entry(entry.index());
                if let ValidationStatus::Corrupt(_) = report.record_error(e)? {
                    return Ok(report);
                }
            }
            names.push(entry.name().to_string());
        }

        let span = self.directory_span(cursor.position)?;
        if span != self.directory().size {
            report.warn(format!(
                "central directory occupies {span} bytes but the end record declares {}",
                self.directory().size
            ));
        }
        for name in ArchiveReader::duplicate_names(names.iter().map(String::as_str)) {
            report.warn(format!("duplicate entry name {name:?}"));
        }

        log::debug!(
            "validated {} entries: {}",
            report.entries_checked,
            report.status
        );
        Ok(report)
    }

    fn verify_content(&mut self, entry: &ZipEntry) -> Result<()> {
        let mut reader = self.open_entry(entry)?;
        let mut buf = vec![0u8; 64 * 1024];
        while reader.read_chunk(&mut buf)? > 0 {}
        Ok(())
    }
}

fn check_extra_tails(entry: &ZipEntry, report: &mut ValidationReport) {
    let headers = [
        ("central", entry.central_header()),
        ("local", entry.local_header()),
    ];
    for (kind, header) in headers {
        let tail = header.common.extra.malformed_tail().len();
        if tail > 0 {
            report.warn(format!(
                "entry #{} {:?}: {tail} malformed extra field bytes in the {kind} header",
                entry.index(),
                entry.name()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        use ValidationStatus::*;
        assert_eq!(Ok.worst(Warning), Warning);
        assert_eq!(Warning.worst(DataIntegrity), DataIntegrity);
        assert_eq!(DataIntegrity.worst(Unsupported), Unsupported);
        assert_eq!(
            Unsupported.worst(Corrupt(CorruptionKind::BadSignature)),
            Corrupt(CorruptionKind::BadSignature)
        );
        assert_eq!(
            Corrupt(CorruptionKind::Truncated).worst(Corrupt(CorruptionKind::BadSignature)),
            Corrupt(CorruptionKind::Truncated)
        );
        assert_eq!(DataIntegrity.worst(Warning), DataIntegrity);
    }

    #[test]
    fn io_errors_are_not_findings() {
        let mut report = ValidationReport::new();
        let err = ZipError::Io(std::io::Error::other("disk on fire"));
        assert!(report.record_error(err).is_err());
        assert!(report.messages.is_empty());
        assert_eq!(report.status, ValidationStatus::Ok);

        let err = ZipError::integrity("crc mismatch");
        assert_eq!(report.record_error(err).unwrap(), ValidationStatus::DataIntegrity);
        assert_eq!(report.status, ValidationStatus::DataIntegrity);
        assert_eq!(report.messages.len(), 1);
    }
}
