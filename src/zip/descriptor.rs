//! Data descriptors.
//!
//! A data descriptor may or may not start with its signature and may carry
//! 32-bit or 64-bit sizes, and nothing else in the archive says which. The
//! only reliable way to decode one is to compare every candidate layout
//! against the CRC and sizes the central directory already provides.

use byteorder::{ByteOrder, LittleEndian};

use super::header::EntrySizes;
use super::structures::DATA_DESCRIPTOR_SIGNATURE;
use crate::error::{CorruptionKind, Result, ZipError};
use crate::volume::{SpanningReader, VolumePosition};

/// The four possible shapes of a data descriptor, in the order they are
/// tried when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorLayout {
    /// crc, packed, size as u32: 12 bytes
    Plain32,
    /// signature + 32-bit fields: 16 bytes
    Signed32,
    /// crc as u32, sizes as u64: 20 bytes
    Plain64,
    /// signature + 64-bit sizes: 24 bytes
    Signed64,
}

impl DescriptorLayout {
    pub const RESOLUTION_ORDER: [DescriptorLayout; 4] = [
        DescriptorLayout::Plain32,
        DescriptorLayout::Signed32,
        DescriptorLayout::Plain64,
        DescriptorLayout::Signed64,
    ];

    /// Largest descriptor, and so the window read when resolving.
    pub const MAX_LEN: usize = 24;

    pub fn len(self) -> usize {
        match self {
            DescriptorLayout::Plain32 => 12,
            DescriptorLayout::Signed32 => 16,
            DescriptorLayout::Plain64 => 20,
            DescriptorLayout::Signed64 => 24,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, DescriptorLayout::Signed32 | DescriptorLayout::Signed64)
    }

    pub fn is_zip64(self) -> bool {
        matches!(self, DescriptorLayout::Plain64 | DescriptorLayout::Signed64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc: u32,
    pub packed_size: u64,
    pub size: u64,
    pub layout: DescriptorLayout,
}

impl DataDescriptor {
    pub fn sizes(&self) -> EntrySizes {
        EntrySizes {
            crc: self.crc,
            packed_size: self.packed_size,
            size: self.size,
        }
    }

    /// Bytes the descriptor occupies after the entry data.
    pub fn consumed_len(&self) -> u64 {
        self.layout.len() as u64
    }

    /// Decode `window` as `layout`. `None` when the window is too short or a
    /// signed layout lacks its signature.
    pub fn decode(window: &[u8], layout: DescriptorLayout) -> Option<Self> {
        if window.len() < layout.len() {
            return None;
        }
        let body = if layout.is_signed() {
            if &window[..4] != DATA_DESCRIPTOR_SIGNATURE {
                return None;
            }
            &window[4..]
        } else {
            window
        };

        let crc = LittleEndian::read_u32(&body[0..4]);
        let (packed_size, size) = if layout.is_zip64() {
            (LittleEndian::read_u64(&body[4..12]), LittleEndian::read_u64(&body[12..20]))
        } else {
            (
                LittleEndian::read_u32(&body[4..8]) as u64,
                LittleEndian::read_u32(&body[8..12]) as u64,
            )
        };
        Some(Self {
            crc,
            packed_size,
            size,
            layout,
        })
    }

    /// Pick the first layout whose three fields all equal `expected`.
    ///
    /// The plain 32-bit layout is only considered when both sizes fit in 32
    /// bits. A matching signature alone never decides.
    pub fn resolve(window: &[u8], expected: &EntrySizes) -> Option<Self> {
        let fits_32 = expected.size <= u32::MAX as u64 && expected.packed_size <= u32::MAX as u64;
        DescriptorLayout::RESOLUTION_ORDER
            .into_iter()
            .filter(|layout| fits_32 || *layout != DescriptorLayout::Plain32)
            .filter_map(|layout| Self::decode(window, layout))
            .find(|candidate| candidate.sizes() == *expected)
    }

    /// Read and resolve the descriptor that starts at `position`.
    ///
    /// The window is read under a volume lock, so a descriptor can never be
    /// assembled from two volumes.
    pub fn read(
        reader: &mut SpanningReader,
        position: VolumePosition,
        expected: &EntrySizes,
    ) -> Result<Self> {
        let position = position.normalize(reader.lengths())?;
        reader.seek(position)?;
        let mut lock = reader.lock_volume_disk()?;
        let available = lock.remaining_in_volume().min(DescriptorLayout::MAX_LEN as u64) as usize;
        let window = lock.read_vec(available)?;
        drop(lock);

        match Self::resolve(&window, expected) {
            Some(descriptor) => {
                log::trace!("data descriptor at {position} is {:?}", descriptor.layout);
                Ok(descriptor)
            }
            None => Err(ZipError::corrupt(
                CorruptionKind::UnresolvedDataDescriptor,
                Some(position),
                format!(
                    "no layout in {available} bytes matches crc {:#010x}, packed {}, size {}",
                    expected.crc, expected.packed_size, expected.size
                ),
            )),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.layout.len());
        if self.layout.is_signed() {
            out.extend_from_slice(DATA_DESCRIPTOR_SIGNATURE);
        }
        out.extend_from_slice(&self.crc.to_le_bytes());
        if self.layout.is_zip64() {
            out.extend_from_slice(&self.packed_size.to_le_bytes());
            out.extend_from_slice(&self.size.to_le_bytes());
        } else {
            out.extend_from_slice(&(self.packed_size as u32).to_le_bytes());
            out.extend_from_slice(&(self.size as u32).to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryVolume;
    use crate::volume::VolumeSet;

    const EXPECTED: EntrySizes = EntrySizes {
        crc: 0x1234_5678,
        packed_size: 40,
        size: 90,
    };

    fn descriptor(layout: DescriptorLayout) -> DataDescriptor {
        DataDescriptor {
            crc: EXPECTED.crc,
            packed_size: EXPECTED.packed_size,
            size: EXPECTED.size,
            layout,
        }
    }

    #[test]
    fn every_layout_resolves_to_itself() {
        for layout in DescriptorLayout::RESOLUTION_ORDER {
            let mut window = descriptor(layout).to_bytes();
            assert_eq!(window.len(), layout.len());
            // Bytes of whatever follows the descriptor.
            window.extend_from_slice(b"PK\x03\x04 and more");
            let resolved = DataDescriptor::resolve(&window, &EXPECTED).unwrap();
            assert_eq!(resolved.layout, layout, "{layout:?}");
            assert_eq!(resolved.sizes(), EXPECTED);
        }
    }

    #[test]
    fn signature_alone_is_not_trusted() {
        // Plain 32-bit descriptor whose CRC happens to equal the signature.
        let expected = EntrySizes {
            crc: u32::from_le_bytes(*DATA_DESCRIPTOR_SIGNATURE),
            packed_size: 7,
            size: 9,
        };
        let mut window = DataDescriptor {
            crc: expected.crc,
            packed_size: 7,
            size: 9,
            layout: DescriptorLayout::Plain32,
        }
        .to_bytes();
        window.extend_from_slice(&[0xaa; 12]);
        let resolved = DataDescriptor::resolve(&window, &expected).unwrap();
        assert_eq!(resolved.layout, DescriptorLayout::Plain32);
    }

    #[test]
    fn large_sizes_skip_plain_32() {
        let expected = EntrySizes {
            crc: 1,
            packed_size: 1 << 33,
            size: 1 << 34,
        };
        let window = DataDescriptor {
            crc: 1,
            packed_size: 1 << 33,
            size: 1 << 34,
            layout: DescriptorLayout::Plain64,
        }
        .to_bytes();
        let resolved = DataDescriptor::resolve(&window, &expected).unwrap();
        assert_eq!(resolved.layout, DescriptorLayout::Plain64);
        assert_eq!(resolved.consumed_len(), 20);
    }

    #[test]
    fn nothing_matches() {
        let window = descriptor(DescriptorLayout::Signed64).to_bytes();
        let wrong = EntrySizes {
            size: 91,
            ..EXPECTED
        };
        assert!(DataDescriptor::resolve(&window, &wrong).is_none());
    }

    #[test]
    fn read_stays_inside_one_volume() {
        let bytes = descriptor(DescriptorLayout::Signed32).to_bytes();
        let (head, tail) = bytes.split_at(10);
        let mut first = vec![0u8; 6];
        first.extend_from_slice(head);
        let set = VolumeSet::from_memory([
            MemoryVolume::from_bytes(first),
            MemoryVolume::from_bytes(tail),
        ])
        .unwrap();
        let mut reader = SpanningReader::new(set);

        let err = DataDescriptor::read(&mut reader, VolumePosition::new(0, 6), &EXPECTED)
            .unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::UnresolvedDataDescriptor));
        assert!(!reader.is_locked());
    }

    #[test]
    fn read_at_end_of_volume_moves_to_next() {
        let bytes = descriptor(DescriptorLayout::Signed32).to_bytes();
        let set = VolumeSet::from_memory([
            MemoryVolume::from_bytes(b"data"),
            MemoryVolume::from_bytes(bytes),
        ])
        .unwrap();
        let mut reader = SpanningReader::new(set);
        let resolved = DataDescriptor::read(&mut reader, VolumePosition::new(0, 4), &EXPECTED)
            .unwrap();
        assert_eq!(resolved.layout, DescriptorLayout::Signed32);
    }
}
