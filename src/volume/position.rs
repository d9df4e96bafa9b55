//! Logical addressing inside a (possibly split) archive.
//!
//! Every record in a split archive is located by the disk (volume) it lives
//! on and an offset relative to the start of that disk, which is exactly how
//! the ZIP format itself stores local header and central directory offsets.
//! [`VolumePosition`] is that pair. Arithmetic on positions needs to know how
//! long each volume is, so it always takes the volume lengths explicitly.

use std::fmt;

use crate::error::{CorruptionKind, Result, ZipError};

/// A byte address inside a volume set: `(disk, offset within that disk)`.
///
/// Positions order by disk first and offset second, which matches the
/// order of bytes in the logical stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumePosition {
    /// Zero-based index of the volume.
    pub disk: u32,
    /// Offset from the first byte of `disk`.
    pub offset: u64,
}

impl VolumePosition {
    /// The first byte of the first volume.
    pub const START: Self = Self { disk: 0, offset: 0 };

    pub const fn new(disk: u32, offset: u64) -> Self {
        Self { disk, offset }
    }

    /// Move `count` bytes forward through the volume set.
    ///
    /// A position that lands exactly on the end of a volume is normalized to
    /// the first byte of the next one, unless it is the last volume. Landing
    /// beyond the last volume is an addressing error, never a wraparound.
    pub fn checked_add(self, count: u64, lengths: &[u64]) -> Result<Self> {
        let mut disk = self.disk as usize;
        let mut offset = self.offset;
        let mut remaining = count;

        loop {
            let len = *lengths
                .get(disk)
                .ok_or_else(|| out_of_range(self, count, "disk index beyond volume set"))?;
            if offset > len {
                return Err(out_of_range(self, count, "offset beyond end of volume"));
            }

            let available = len - offset;
            if remaining < available {
                return Ok(Self::new(disk as u32, offset + remaining));
            }
            if remaining == available {
                return Ok(if disk + 1 < lengths.len() {
                    Self::new(disk as u32 + 1, 0)
                } else {
                    Self::new(disk as u32, len)
                });
            }

            remaining -= available;
            disk += 1;
            offset = 0;
            if disk >= lengths.len() {
                return Err(out_of_range(self, count, "past the end of the last volume"));
            }
        }
    }

    /// Move `count` bytes backward through the volume set.
    ///
    /// The result is the lowest address on the volume where the walk ends, so
    /// stepping back from the first byte of a volume lands inside the
    /// previous one. Stepping before the first volume is an addressing error.
    pub fn checked_sub(self, count: u64, lengths: &[u64]) -> Result<Self> {
        let mut disk = self.disk as usize;
        let len = *lengths
            .get(disk)
            .ok_or_else(|| out_of_range(self, count, "disk index beyond volume set"))?;
        if self.offset > len {
            return Err(out_of_range(self, count, "offset beyond end of volume"));
        }

        let mut offset = self.offset;
        let mut remaining = count;
        while remaining > offset {
            remaining -= offset;
            if disk == 0 {
                return Err(out_of_range(self, count, "before the first volume"));
            }
            disk -= 1;
            offset = lengths[disk];
        }
        Ok(Self::new(disk as u32, offset - remaining))
    }

    /// Re-express a position so that an end-of-volume address points at the
    /// next volume's first byte. Fails if the position is outside the set.
    pub fn normalize(self, lengths: &[u64]) -> Result<Self> {
        self.checked_add(0, lengths)
    }

    /// Number of logical bytes from `self` up to (not including) `end`.
    pub fn distance_to(self, end: Self, lengths: &[u64]) -> Result<u64> {
        let start = self.normalize(lengths)?;
        let end = end.normalize(lengths)?;
        if end < start {
            return Err(ZipError::corrupt(
                CorruptionKind::AddressOutOfRange,
                Some(end),
                format!("position precedes {start}"),
            ));
        }
        if start.disk == end.disk {
            return Ok(end.offset - start.offset);
        }

        let mut total = lengths[start.disk as usize] - start.offset;
        for len in &lengths[start.disk as usize + 1..end.disk as usize] {
            total += len;
        }
        Ok(total + end.offset)
    }
}

impl fmt::Display for VolumePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk {} offset {:#x}", self.disk, self.offset)
    }
}

fn out_of_range(from: VolumePosition, count: u64, why: &str) -> ZipError {
    ZipError::corrupt(
        CorruptionKind::AddressOutOfRange,
        Some(from),
        format!("cannot move {count} bytes: {why}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENGTHS: [u64; 3] = [100, 50, 80];

    #[test]
    fn orders_by_disk_then_offset() {
        assert!(VolumePosition::new(0, 999) < VolumePosition::new(1, 0));
        assert!(VolumePosition::new(2, 1) > VolumePosition::new(2, 0));
    }

    #[test]
    fn add_within_volume() {
        let pos = VolumePosition::new(0, 10).checked_add(20, &LENGTHS).unwrap();
        assert_eq!(pos, VolumePosition::new(0, 30));
    }

    #[test]
    fn add_across_volumes() {
        let pos = VolumePosition::new(0, 90).checked_add(70, &LENGTHS).unwrap();
        assert_eq!(pos, VolumePosition::new(2, 10));
    }

    #[test]
    fn end_of_volume_rolls_to_next() {
        let pos = VolumePosition::new(0, 90).checked_add(10, &LENGTHS).unwrap();
        assert_eq!(pos, VolumePosition::new(1, 0));
        assert_eq!(
            VolumePosition::new(1, 50).normalize(&LENGTHS).unwrap(),
            VolumePosition::new(2, 0)
        );
    }

    #[test]
    fn end_of_last_volume_is_valid() {
        let pos = VolumePosition::new(2, 0).checked_add(80, &LENGTHS).unwrap();
        assert_eq!(pos, VolumePosition::new(2, 80));
    }

    #[test]
    fn past_last_volume_is_an_error() {
        let err = VolumePosition::new(2, 0).checked_add(81, &LENGTHS).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::AddressOutOfRange));
        assert!(VolumePosition::new(3, 0).checked_add(0, &LENGTHS).is_err());
        assert!(VolumePosition::new(1, 51).checked_add(0, &LENGTHS).is_err());
    }

    #[test]
    fn subtract_steps_back_into_previous_volume() {
        let end = VolumePosition::new(2, 10);
        assert_eq!(end.checked_sub(10, &LENGTHS).unwrap(), VolumePosition::new(2, 0));
        assert_eq!(end.checked_sub(30, &LENGTHS).unwrap(), VolumePosition::new(1, 30));
        assert_eq!(
            VolumePosition::new(1, 0).checked_sub(20, &LENGTHS).unwrap(),
            VolumePosition::new(0, 80)
        );
        assert_eq!(end.checked_sub(160, &LENGTHS).unwrap(), VolumePosition::START);

        let err = end.checked_sub(161, &LENGTHS).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::AddressOutOfRange));
        assert!(VolumePosition::new(1, 51).checked_sub(0, &LENGTHS).is_err());
    }

    #[test]
    fn distance_spans_volumes() {
        let start = VolumePosition::new(0, 90);
        let end = VolumePosition::new(2, 10);
        assert_eq!(start.distance_to(end, &LENGTHS).unwrap(), 70);
        assert_eq!(end.distance_to(end, &LENGTHS).unwrap(), 0);
        assert!(end.distance_to(start, &LENGTHS).is_err());
    }
}
