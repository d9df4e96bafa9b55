use proptest::prelude::*;
use spanzip::zip::CompressionMethod;
use spanzip::{
    ArchiveReader, ArchiveWriter, CorruptionKind, EntryOptions, ReadOptions, VolumePosition,
    WriteOptions,
};

fn filled(len: usize, byte: u8) -> Vec<u8> {
    (0..len).map(|i| byte.wrapping_add(i as u8)).collect()
}

#[test]
fn header_near_volume_end_moves_to_next_volume() {
    let long_name = format!("{}.bin", "n".repeat(60));
    let first = filled(920, 1);
    let second = filled(300, 2);

    let (mut writer, factory) =
        ArchiveWriter::in_memory(WriteOptions::new().volume_size(1024)).unwrap();
    writer
        .add_entry(
            EntryOptions::file("a.bin").method(CompressionMethod::Stored),
            &first,
        )
        .unwrap();
    // 30 byte fixed header plus the name, then the content
    assert_eq!(writer.position(), VolumePosition::new(0, 1024 - 69));

    writer
        .add_entry(
            EntryOptions::file(long_name.clone()).method(CompressionMethod::Stored),
            &second,
        )
        .unwrap();
    let summary = writer.finish().unwrap();
    assert_eq!(summary.volumes, 2);

    let volumes = factory.volumes();
    assert_eq!(volumes[0].to_vec().len(), 1024 - 69);

    let mut archive =
        ArchiveReader::open(factory.volume_set().unwrap(), ReadOptions::default()).unwrap();
    let entries = archive.read_all_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].local_header_position(), VolumePosition::new(0, 0));
    assert_eq!(entries[1].local_header_position(), VolumePosition::new(1, 0));
    assert_eq!(entries[1].name(), long_name);
    assert_eq!(archive.read_entry_to_vec(&entries[0]).unwrap(), first);
    assert_eq!(archive.read_entry_to_vec(&entries[1]).unwrap(), second);
    assert!(archive.validate().unwrap().status.is_ok());
}

#[test]
fn entry_data_crosses_volumes() {
    let data = filled(5000, 9);
    let (mut writer, factory) =
        ArchiveWriter::in_memory(WriteOptions::new().volume_size(1000)).unwrap();
    writer
        .add_entry(
            EntryOptions::file("wide").method(CompressionMethod::Stored),
            &data,
        )
        .unwrap();
    let summary = writer.finish().unwrap();
    assert!(summary.volumes >= 6);
    for volume in &factory.volumes() {
        assert!(volume.to_vec().len() <= 1000);
    }

    let mut archive =
        ArchiveReader::open(factory.volume_set().unwrap(), ReadOptions::default()).unwrap();
    let entry = archive.find_entry("wide").unwrap().unwrap();
    assert_eq!(archive.read_entry_to_vec(&entry).unwrap(), data);
}

#[test]
fn header_larger_than_a_volume_is_refused() {
    let (mut writer, _factory) =
        ArchiveWriter::in_memory(WriteOptions::new().volume_size(64)).unwrap();
    let err = writer
        .add_entry(EntryOptions::file("x".repeat(40)), b"data")
        .err()
        .unwrap();
    assert_eq!(err.corruption_kind(), Some(CorruptionKind::FragmentedHeader));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn headers_never_straddle_volumes(
        volume_size in 128u64..700,
        sizes in prop::collection::vec(0usize..900, 1..6),
        deflate in any::<bool>(),
    ) {
        let method = if deflate { CompressionMethod::Deflate } else { CompressionMethod::Stored };
        let contents: Vec<Vec<u8>> = sizes
            .iter()
            .enumerate()
            .map(|(i, len)| filled(*len, i as u8 * 31))
            .collect();

        let (mut writer, factory) =
            ArchiveWriter::in_memory(WriteOptions::new().volume_size(volume_size)).unwrap();
        for (i, content) in contents.iter().enumerate() {
            writer
                .add_entry(EntryOptions::file(format!("entry-{i}.bin")).method(method), content)
                .unwrap();
        }
        writer.finish().unwrap();

        let lengths: Vec<u64> = factory
            .volumes()
            .iter()
            .map(|v| v.to_vec().len() as u64)
            .collect();
        for len in &lengths {
            prop_assert!(*len <= volume_size);
        }

        let mut archive =
            ArchiveReader::open(factory.volume_set().unwrap(), ReadOptions::default()).unwrap();
        let entries = archive.read_all_entries().unwrap();
        prop_assert_eq!(entries.len(), contents.len());
        for (entry, content) in entries.iter().zip(&contents) {
            let at = entry.local_header_position();
            let header_len = entry.local_header().stored_len() as u64;
            prop_assert!(at.offset + header_len <= lengths[at.disk as usize]);
            prop_assert_eq!(&archive.read_entry_to_vec(entry).unwrap(), content);
        }
    }
}
