//! Level-filtered structured logging, installed once at startup.
//!
//! The log level is the one piece of global mutable state this crate allows
//! to change after construction (see DESIGN.md); everything else is fixed
//! at mount time.

use log::LevelFilter;

/// Parsed form of the `--log-level` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("invalid log level: {other}")),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Installs the global logger at the given level. `debug` forces
/// [`LogLevel::Debug`] regardless of `level` (mirrors `--debug`'s effect on
/// kernel-bridge verbosity too; callers enable FUSE debug mode separately).
pub fn init(level: LogLevel, debug: bool) {
    let effective = if debug { LogLevel::Debug } else { level };
    let filter: LevelFilter = effective.into();
    env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp_millis()
        .init();
    log::set_max_level(filter);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("bogus".parse::<LogLevel>().is_err());
    }
}
