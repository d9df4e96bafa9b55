use spanzip::zip::{CompressionMethod, HostSystem};
use spanzip::{
    ArchiveReader, ArchiveWriter, CancelFlag, CoderOption, DeflateLevel, EntryOptions, ErrorClass,
    ReadOptions, ValidationStatus, WriteOptions,
};

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

fn reopen(factory: &spanzip::MemoryFactory) -> ArchiveReader {
    ArchiveReader::open(factory.volume_set().unwrap(), ReadOptions::default()).unwrap()
}

#[test]
fn hundred_stored_bytes() {
    let data = pseudo_random(100, 7);
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    writer
        .add_entry(
            EntryOptions::file("payload.bin").method(CompressionMethod::Stored),
            &data,
        )
        .unwrap();
    let summary = writer.finish().unwrap();
    assert_eq!(summary.volumes, 1);
    assert_eq!(summary.entries, 1);
    assert!(!summary.zip64);

    let mut archive = reopen(&factory);
    assert_eq!(archive.entry_count(), 1);
    let entries = archive.read_all_entries().unwrap();
    let entry = &entries[0];
    assert_eq!(entry.size(), 100);
    assert_eq!(entry.packed_size(), 100);
    assert_eq!(entry.crc32(), crc32fast::hash(&data));
    assert_eq!(entry.method(), CompressionMethod::Stored);
    assert_eq!(archive.read_entry_to_vec(entry).unwrap(), data);
    assert_eq!(archive.validate().unwrap().status, ValidationStatus::Ok);
}

#[test]
fn mixed_methods_and_metadata() {
    let text = b"the quick brown fox jumps over the lazy dog\n".repeat(200);
    let noise = pseudo_random(3000, 11);
    let modified = chrono::NaiveDate::from_ymd_opt(2021, 6, 15)
        .and_then(|d| d.and_hms_opt(12, 30, 10))
        .unwrap();

    let (mut writer, factory) =
        ArchiveWriter::in_memory(WriteOptions::new().comment("nightly build")).unwrap();
    writer.add_directory("docs").unwrap();
    writer
        .add_entry(
            EntryOptions::file("docs/fox.txt")
                .option(CoderOption::Deflate(DeflateLevel::Maximum))
                .modified(modified)
                .comment("repeated"),
            &text,
        )
        .unwrap();
    writer
        .add_entry(
            EntryOptions::file("noise.bin")
                .method(CompressionMethod::Stored)
                .host(HostSystem::Unix)
                .unix_mode(0o100600),
            &noise,
        )
        .unwrap();
    writer.finish().unwrap();

    let mut archive = reopen(&factory);
    assert_eq!(archive.comment(), "nightly build");
    let entries = archive.read_all_entries().unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name().to_string()).collect();
    assert_eq!(names, ["docs/", "docs/fox.txt", "noise.bin"]);

    assert!(entries[0].is_directory());
    assert_eq!(entries[0].size(), 0);

    let fox = &entries[1];
    assert_eq!(fox.method(), CompressionMethod::Deflate);
    assert!(fox.packed_size() < fox.size());
    assert_eq!(fox.comment(), "repeated");
    assert_eq!(fox.modified(), Some(modified));
    assert_eq!(archive.read_entry_to_vec(fox).unwrap(), text);

    let noise_entry = &entries[2];
    assert_eq!(noise_entry.unix_mode(), Some(0o100600));
    assert_eq!(archive.read_entry_to_vec(noise_entry).unwrap(), noise);

    let found = archive.find_entry("noise.bin").unwrap().unwrap();
    assert_eq!(found.index(), 2);
    assert!(archive.find_entry("missing").unwrap().is_none());
}

#[test]
fn streaming_entry_without_declared_size() {
    let data = pseudo_random(70_000, 3);
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    {
        let mut entry = writer
            .start_entry(EntryOptions::file("stream.bin").data_descriptor(true))
            .unwrap();
        for chunk in data.chunks(4096) {
            entry.write_all(chunk).unwrap();
        }
        assert_eq!(entry.unpacked_bytes(), data.len() as u64);
        entry.finish().unwrap();
    }
    writer.finish().unwrap();

    let mut archive = reopen(&factory);
    let entry = archive.find_entry("stream.bin").unwrap().unwrap();
    assert!(entry.flags().has_data_descriptor());
    assert!(entry.data_descriptor().is_some());
    assert_eq!(archive.read_entry_to_vec(&entry).unwrap(), data);
}

#[test]
fn entry_reader_reports_progress_counts() {
    let data = pseudo_random(10_000, 5);
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    writer
        .add_entry(EntryOptions::file("a").method(CompressionMethod::Stored), &data)
        .unwrap();
    writer.finish().unwrap();

    let mut archive = reopen(&factory);
    let entry = archive.find_entry("a").unwrap().unwrap();
    let mut content = archive.open_entry(&entry).unwrap();
    let mut out = Vec::new();
    let copied = content.copy_to(&mut out).unwrap();
    assert_eq!(copied, 10_000);
    assert_eq!(content.unpacked_bytes(), 10_000);
    assert_eq!(content.packed_bytes(), entry.packed_size());
    assert_eq!(out, data);
}

#[test]
fn split_archive_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.zip");
    let contents: Vec<Vec<u8>> = (0..3).map(|i| pseudo_random(5000, i)).collect();

    let mut writer =
        ArchiveWriter::create_path(&path, WriteOptions::new().volume_size(4096)).unwrap();
    for (i, content) in contents.iter().enumerate() {
        writer
            .add_entry(
                EntryOptions::file(format!("part{i}.bin")).method(CompressionMethod::Stored),
                content,
            )
            .unwrap();
    }
    let summary = writer.finish().unwrap();
    assert!(summary.volumes >= 4);

    assert!(path.exists());
    assert!(dir.path().join("backup.z01").exists());
    assert!(!dir.path().join(format!("backup.z{:02}", summary.volumes)).exists());
    for disk in 0..summary.volumes - 1 {
        let volume = spanzip::volume::split_volume_path(&path, disk);
        assert!(std::fs::metadata(&volume).unwrap().len() <= 4096);
    }

    let mut archive = ArchiveReader::open_path(&path, ReadOptions::default()).unwrap();
    assert_eq!(archive.volume_count().unwrap(), summary.volumes as usize);
    let entries = archive.read_all_entries().unwrap();
    assert_eq!(entries.len(), 3);
    for (entry, content) in entries.iter().zip(&contents) {
        assert_eq!(&archive.read_entry_to_vec(entry).unwrap(), content);
    }
    assert!(archive.validate().unwrap().status.is_ok());
}

#[test]
fn unicode_names_survive() {
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    writer
        .add_entry(EntryOptions::file("résumé.txt"), b"cv")
        .unwrap();
    writer
        .add_entry(EntryOptions::file("データ.txt").unicode(true), b"data")
        .unwrap();
    writer.finish().unwrap();

    let mut archive = reopen(&factory);
    let names: Vec<_> = archive
        .entries()
        .unwrap()
        .map(|e| e.map(|e| e.name().to_string()))
        .collect::<spanzip::Result<_>>()
        .unwrap();
    assert_eq!(names, ["résumé.txt", "データ.txt"]);
}

#[test]
fn large_file_entries_read_back() {
    let data = pseudo_random(2048, 9);
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    writer
        .add_entry(EntryOptions::file("big").large_file(true), &data)
        .unwrap();
    writer.finish().unwrap();

    let mut archive = reopen(&factory);
    let entry = archive.find_entry("big").unwrap().unwrap();
    assert_eq!(entry.size(), 2048);
    assert_eq!(archive.read_entry_to_vec(&entry).unwrap(), data);
}

fn many_empty_entries(count: u64) -> (spanzip::WriteSummary, ArchiveReader) {
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    for i in 0..count {
        writer
            .add_entry(
                EntryOptions::file(format!("{i}")).method(CompressionMethod::Stored),
                &[],
            )
            .unwrap();
    }
    let summary = writer.finish().unwrap();
    (summary, reopen(&factory))
}

#[test]
fn entry_count_below_zip64_threshold() {
    let (summary, archive) = many_empty_entries(0xFFFE);
    assert!(!summary.zip64);
    assert!(!archive.directory().zip64);
    assert_eq!(archive.entry_count(), 0xFFFE);
}

#[test]
fn entry_count_at_zip64_threshold() {
    let (summary, mut archive) = many_empty_entries(0xFFFF);
    assert!(summary.zip64);
    assert!(archive.directory().zip64);
    assert_eq!(archive.entry_count(), 0xFFFF);
    let last = archive.find_entry("65534").unwrap().unwrap();
    assert_eq!(last.index(), 0xFFFE);
}

#[test]
fn cancelled_read_stops_and_can_resume() {
    let data = pseudo_random(1000, 1);
    let (mut writer, factory) = ArchiveWriter::in_memory(WriteOptions::new()).unwrap();
    writer.add_entry(EntryOptions::file("a"), &data).unwrap();
    writer.finish().unwrap();

    let cancel = CancelFlag::new();
    let mut archive = ArchiveReader::open(
        factory.volume_set().unwrap(),
        ReadOptions::new().cancel(cancel.clone()),
    )
    .unwrap();
    let entry = archive.find_entry("a").unwrap().unwrap();

    cancel.cancel();
    let err = archive.read_entry_to_vec(&entry).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Cancelled);

    cancel.reset();
    assert_eq!(archive.read_entry_to_vec(&entry).unwrap(), data);
}
