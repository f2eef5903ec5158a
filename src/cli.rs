//! Command-line surface (spec.md §6).

use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "wsfs", about = "Mount a remote workspace namespace over FUSE", disable_version_flag = true)]
pub struct Cli {
    /// Local directory to mount the remote workspace onto.
    pub mountpoint: Option<PathBuf>,

    /// Print `wsfs <ver> (commit: <hash>, built: <date>)` and exit.
    #[arg(long)]
    pub version: bool,

    /// Enable debug log level and kernel-bridge verbose mode.
    #[arg(long)]
    pub debug: bool,

    /// Log verbosity.
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Allow other local users to access the mount; enables the owner-UID gate.
    #[arg(long)]
    pub allow_other: bool,

    /// Enable the on-disk payload cache.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub cache: bool,

    /// Directory used to store cached file payloads. Defaults to `<tmp>/wsfs-cache`.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum cache size in GiB, in (0, 1000].
    #[arg(long, default_value_t = 10.0)]
    pub cache_size: f64,

    /// Cache entry time-to-live, e.g. "24h", "30m".
    #[arg(long, default_value = "24h")]
    pub cache_ttl: String,
}

impl clap::ValueEnum for LogLevel {
    fn value_variants<'a>() -> &'a [Self] {
        &[LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            LogLevel::Debug => clap::builder::PossibleValue::new("debug"),
            LogLevel::Info => clap::builder::PossibleValue::new("info"),
            LogLevel::Warn => clap::builder::PossibleValue::new("warn"),
            LogLevel::Error => clap::builder::PossibleValue::new("error"),
        })
    }
}

impl clap::builder::ValueParserFactory for LogLevel {
    type Parser = clap::builder::EnumValueParser<LogLevel>;

    fn value_parser() -> Self::Parser {
        clap::builder::EnumValueParser::new()
    }
}

/// `"wsfs <ver> (commit: <hash>, built: <date>)"` (spec.md §6 `--version`).
/// Commit hash and build date are baked in by `build.rs` from `git` and
/// `date` at compile time; both fall back to `"unknown"` outside a git
/// checkout or without a working `date` binary.
pub fn version_string() -> String {
    format!(
        "wsfs {} (commit: {}, built: {})",
        env!("CARGO_PKG_VERSION"),
        env!("WSFS_COMMIT_HASH"),
        env!("WSFS_BUILD_DATE"),
    )
}

/// Parses a duration string such as `"24h"`, `"30m"`, `"45s"`.
///
/// Supports a single trailing unit suffix (`s`, `m`, `h`, `d`); a bare
/// integer is interpreted as seconds.
pub fn parse_duration(input: &str) -> Result<std::time::Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    let (num_part, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&input[..input.len() - 1], c),
        _ => (input, 's'),
    };
    let value: u64 = num_part
        .parse()
        .map_err(|_| format!("invalid duration: {input}"))?;
    let seconds = match unit {
        's' => value,
        'm' => value * 60,
        'h' => value * 3600,
        'd' => value * 86400,
        other => return Err(format!("unknown duration unit: {other}")),
    };
    if seconds == 0 {
        return Err("duration must be positive".to_string());
    }
    Ok(std::time::Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_matches_expected_shape() {
        let v = version_string();
        assert!(v.starts_with("wsfs "));
        assert!(v.contains("(commit: "));
        assert!(v.contains(", built: "));
    }

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration("45").unwrap().as_secs(), 45);
    }

    #[test]
    fn parses_units() {
        assert_eq!(parse_duration("24h").unwrap().as_secs(), 24 * 3600);
        assert_eq!(parse_duration("30m").unwrap().as_secs(), 30 * 60);
        assert_eq!(parse_duration("2d").unwrap().as_secs(), 2 * 86400);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(parse_duration("0h").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("").is_err());
    }
}
