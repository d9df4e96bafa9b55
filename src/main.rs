//! Main entry point for the spanzip CLI application.
//!
//! Lists, tests and extracts local (optionally split) archives and remote
//! archives over HTTP, and creates new archives with `-c`.

use anyhow::{Result, bail};
use clap::Parser;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use spanzip::zip::CompressionMethod;
use spanzip::{
    Cli, CoderOption, DeflateLevel, EntryOptions, HttpRangeReader, ReadOptions, ValidationStatus,
    ValidationStringency, WriteOptions, ZipArchiver, ZipEntry, ZipExtractor,
};

/// Application entry point.
///
/// Parses command-line arguments and dispatches to archive creation or to
/// reading a local or remote archive.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    if cli.create {
        return create_archive(&cli).await;
    }

    let stringency = if cli.strict {
        ValidationStringency::Strict
    } else {
        ValidationStringency::Lenient
    };
    let options = ReadOptions::new().stringency(stringency);

    if cli.is_http_url() {
        // Remote archives are read through HTTP Range requests
        let reader = Arc::new(HttpRangeReader::new(cli.file.clone()).await?);
        let transferred_before = reader.transferred_bytes();

        let extractor = ZipExtractor::open_source(reader.clone(), options).await?;
        process_zip(extractor, &cli).await?;

        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let extractor = ZipExtractor::open_path(&cli.file, options).await?;
        process_zip(extractor, &cli).await?;
    }

    Ok(())
}

/// List, test or extract, depending on the CLI flags.
async fn process_zip(mut extractor: ZipExtractor, cli: &Cli) -> Result<()> {
    if cli.list || cli.verbose {
        return list_files(&mut extractor, cli.verbose).await;
    }
    if cli.test {
        return test_archive(&mut extractor, cli).await;
    }

    let entries = extractor.list_files().await?;

    // Directories are created on demand while extracting files
    let files_to_extract: Vec<_> = entries
        .iter()
        .filter(|e| !e.is_directory())
        .filter(|e| cli.files.is_empty() || cli.files.iter().any(|f| selects(f, e.name())))
        .filter(|e| {
            !cli
                .exclude
                .iter()
                .any(|x| e.name().contains(x.as_str()) || glob_match(x, e.name()))
        })
        .collect();

    let multiple_files = cli.pipe && files_to_extract.len() > 1;
    for entry in files_to_extract {
        extract_file(&mut extractor, entry, cli, multiple_files).await?;
    }

    Ok(())
}

/// Whether a FILES argument selects the entry `name`: glob patterns match
/// the full path, plain names match the full path or the base name.
fn selects(pattern: &str, name: &str) -> bool {
    if has_glob_chars(pattern) {
        return glob_match(pattern, name);
    }
    let basename = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    name == pattern || basename == pattern
}

/// List files in the archive, as bare names or as a table with `-v`.
async fn list_files(extractor: &mut ZipExtractor, verbose: bool) -> Result<()> {
    let entries = extractor.list_files().await?;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  {:>8}  Name",
            "Length", "Size", "Cmpr", "Date", "Time", "CRC-32"
        );
        println!("{}", "-".repeat(80));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if !verbose {
            println!("{}", entry.name());
            continue;
        }

        let stamp = entry
            .modified()
            .map(|t| t.format("%Y-%m-%d  %H:%M").to_string())
            .unwrap_or_else(|| format!("{:>10}  {:>5}", "-", "-"));
        println!(
            "{:>10}  {:>10}  {}  {}  {:08x}  {}",
            entry.size(),
            entry.packed_size(),
            ratio(entry.packed_size(), entry.size()),
            stamp,
            entry.crc32(),
            entry.name()
        );

        if !entry.is_directory() {
            total_uncompressed += entry.size();
            total_compressed += entry.packed_size();
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(80));
        println!(
            "{:>10}  {:>10}  {}  {:>31}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }

    Ok(())
}

/// Compression ratio as percentage saved
fn ratio(packed: u64, size: u64) -> String {
    if size == 0 || packed >= size {
        return "  0%".to_string();
    }
    format!("{:>4}%", 100 - (packed * 100 / size))
}

/// Validate every entry and report the findings.
async fn test_archive(extractor: &mut ZipExtractor, cli: &Cli) -> Result<()> {
    let report = extractor.validate().await?;
    if !cli.is_very_quiet() {
        for message in &report.messages {
            println!("  {message}");
        }
    }

    match report.status {
        ValidationStatus::Ok | ValidationStatus::Warning => {
            if !cli.is_quiet() {
                println!(
                    "No errors detected in compressed data of {} ({} entries).",
                    cli.file, report.entries_checked
                );
            }
            Ok(())
        }
        status => bail!("{}: {status}", cli.file),
    }
}

/// Extract a single entry to stdout (`-p`) or to disk.
async fn extract_file(
    extractor: &mut ZipExtractor,
    entry: &ZipEntry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        if show_filename {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("--- {} ---\n", entry.name()).as_bytes())
                .await?;
        }
        extractor.extract_to_stdout(entry).await?;
        return Ok(());
    }

    let file_name = if cli.junk_paths {
        Path::new(entry.name())
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.name().to_string())
    } else {
        entry.name().to_string()
    };
    let output_path = match &cli.extract_dir {
        Some(dir) => PathBuf::from(dir).join(&file_name),
        None => PathBuf::from(&file_name),
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name());
            }
            return Ok(());
        }
        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name());
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.name());
    }
    extractor.extract_to_file(entry, &output_path).await?;

    Ok(())
}

/// Create `cli.file` from the files and directories in `cli.files`.
async fn create_archive(cli: &Cli) -> Result<()> {
    if cli.is_http_url() {
        bail!("cannot create an archive at a URL");
    }
    if cli.files.is_empty() {
        bail!("nothing to add: name the files to put into {}", cli.file);
    }

    let mut inputs = Vec::new();
    for file in &cli.files {
        collect_inputs(Path::new(file), &mut inputs)?;
    }

    let mut options = WriteOptions::new();
    options.volume_size = cli.split_size;
    let mut archiver = ZipArchiver::create_path(&cli.file, options).await?;

    for (path, metadata) in inputs {
        let name = entry_name(&path);
        if name.is_empty() {
            continue;
        }
        if !cli.is_quiet() {
            println!("  adding: {name}");
        }
        if metadata.is_dir() {
            archiver.add_directory(name).await?;
        } else {
            let options = entry_options(name, &metadata, cli);
            archiver.add_file(options, path).await?;
        }
    }

    let summary = archiver.finish().await?;
    if !cli.is_quiet() {
        let size: u64 = if summary.volumes > 1 {
            (0..summary.volumes)
                .filter_map(|disk| {
                    let base = Path::new(&cli.file);
                    let path = if disk + 1 == summary.volumes {
                        base.to_path_buf()
                    } else {
                        spanzip::volume::split_volume_path(base, disk)
                    };
                    std::fs::metadata(path).ok().map(|m| m.len())
                })
                .sum()
        } else {
            std::fs::metadata(&cli.file).map(|m| m.len()).unwrap_or(0)
        };
        println!(
            "{} entries, {} in {} volume(s)",
            summary.entries,
            format_size(size),
            summary.volumes
        );
    }
    Ok(())
}

/// Walk `path`, directories before their contents.
fn collect_inputs(path: &Path, out: &mut Vec<(PathBuf, Metadata)>) -> Result<()> {
    let metadata = std::fs::metadata(path)?;
    let is_dir = metadata.is_dir();
    out.push((path.to_path_buf(), metadata));
    if is_dir {
        let mut children: Vec<_> = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        children.sort();
        for child in children {
            collect_inputs(&child, out)?;
        }
    }
    Ok(())
}

/// Archive name for a local path: forward slashes, no root or `.`/`..`.
fn entry_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_options(name: String, metadata: &Metadata, cli: &Cli) -> EntryOptions {
    let mut options = EntryOptions::file(name);
    if cli.store {
        options = options.method(CompressionMethod::Stored);
    } else if cli.best {
        options = options.option(CoderOption::Deflate(DeflateLevel::Maximum));
    }
    if let Ok(modified) = metadata.modified() {
        options = options.modified(chrono::DateTime::<chrono::Local>::from(modified).naive_local());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_mode(metadata.permissions().mode());
    }
    options
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one and stays
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(selects("b.txt", "a/b.txt"));
        assert!(!selects("a", "a/b.txt"));
    }

    #[test]
    fn names_from_paths() {
        assert_eq!(entry_name(Path::new("./docs/a.txt")), "docs/a.txt");
        assert_eq!(entry_name(Path::new("/abs/dir")), "abs/dir");
        assert_eq!(entry_name(Path::new("../up/x")), "up/x");
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(ratio(50, 100), "  50%");
        assert_eq!(ratio(120, 100), "  0%");
    }
}
