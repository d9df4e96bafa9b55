use clap::Parser;

/// Parse a volume size such as `65536`, `640k`, `100m` or `2g`.
pub fn parse_size(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => value.split_at(at),
        None => (value, ""),
    };
    let number: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {value:?}"))?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        other => return Err(format!("unknown size unit {other:?}")),
    };
    match number.checked_mul(multiplier) {
        Some(0) => Err("size must be greater than zero".to_string()),
        Some(size) => Ok(size),
        None => Err(format!("size {value:?} is too large")),
    }
}

#[derive(Parser, Debug)]
#[command(name = "spanzip")]
#[command(version)]
#[command(about = "A ZIP/ZIP64 tool with split archive support", long_about = None)]
#[command(after_help = "Examples:\n  \
  spanzip data1.zip -x joe             extract all files except joe from data1.zip\n  \
  spanzip -p foo.zip | more            send contents of foo.zip via pipe into more\n  \
  spanzip -t backup.zip                test backup.zip and its .z01, .z02, ... volumes\n  \
  spanzip -c -s 100m backup.zip dir    create backup.zip split into 100 MiB volumes\n  \
  spanzip -l https://example.com/archive.zip   list files from remote ZIP")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all), or files to add with -c
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Test archive integrity
    #[arg(short = 't')]
    pub test: bool,

    /// Create FILE from FILES
    #[arg(short = 'c')]
    pub create: bool,

    /// Split the created archive into volumes of SIZE bytes (k, m, g suffixes)
    #[arg(short = 's', value_name = "SIZE", value_parser = parse_size, requires = "create")]
    pub split_size: Option<u64>,

    /// Store entries without compression
    #[arg(short = '0', requires = "create", conflicts_with = "best")]
    pub store: bool,

    /// Compress better
    #[arg(short = '9', requires = "create")]
    pub best: bool,

    /// Reject malformed extra fields instead of skipping them
    #[arg(short = 'S')]
    pub strict: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log level when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match self.quiet {
            0 => "warn",
            1 => "error",
            _ => "off",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_with_units() {
        assert_eq!(parse_size("1024"), Ok(1024));
        assert_eq!(parse_size("64k"), Ok(64 * 1024));
        assert_eq!(parse_size("100M"), Ok(100 << 20));
        assert_eq!(parse_size("2gb"), Ok(2 << 30));
        assert!(parse_size("0").is_err());
        assert!(parse_size("12q").is_err());
        assert!(parse_size("k").is_err());
    }

    #[test]
    fn create_flags() {
        let cli = Cli::try_parse_from(["spanzip", "-c", "-s", "1m", "-9", "out.zip", "a", "b"])
            .unwrap();
        assert!(cli.create && cli.best && !cli.store);
        assert_eq!(cli.split_size, Some(1 << 20));
        assert_eq!(cli.files, vec!["a", "b"]);

        assert!(Cli::try_parse_from(["spanzip", "-s", "1m", "out.zip"]).is_err());
        assert!(Cli::try_parse_from(["spanzip", "-c", "-0", "-9", "out.zip"]).is_err());
    }
}
