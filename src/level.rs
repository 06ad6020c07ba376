use std::fmt;
use std::str::FromStr;

use colored::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const SOURCE_FILE: &str = file!();

/// Log level enum with numeric ordering for filtering.
///
/// The scale is fixed: names and values are both unique and the mapping is
/// bijective. Worker levels sit below `detail` so that per-worker chatter
/// can be filtered out independently of ordinary debug output.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Serialize, Deserialize, Default,
)]
pub enum Level {
    WorkerDetail = 3,
    WorkerSummary = 5,
    Detail = 8,
    Debug = 10,
    #[default]
    Info = 20,
    Warning = 30,
    Error = 40,
    Critical = 50,
    Exception = 60,
}

/// All levels in ascending severity order.
pub const ALL_LEVELS: [Level; 9] = [
    Level::WorkerDetail,
    Level::WorkerSummary,
    Level::Detail,
    Level::Debug,
    Level::Info,
    Level::Warning,
    Level::Error,
    Level::Critical,
    Level::Exception,
];

impl Level {
    /// Get numeric value for comparison
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Level::WorkerDetail => "w_detail",
            Level::WorkerSummary => "w_summary",
            Level::Detail => "detail",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
            Level::Exception => "exception",
        }
    }

    /// Uppercase name as it appears in the `[LEVELNAME]` output token
    pub fn upper_name(self) -> &'static str {
        match self {
            Level::WorkerDetail => "W_DETAIL",
            Level::WorkerSummary => "W_SUMMARY",
            Level::Detail => "DETAIL",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Exception => "EXCEPTION",
        }
    }

    /// Look up a level by numeric value
    pub fn from_value(v: u8) -> Result<Level, LevelLookupError> {
        match v {
            3 => Ok(Level::WorkerDetail),
            5 => Ok(Level::WorkerSummary),
            8 => Ok(Level::Detail),
            10 => Ok(Level::Debug),
            20 => Ok(Level::Info),
            30 => Ok(Level::Warning),
            40 => Ok(Level::Error),
            50 => Ok(Level::Critical),
            60 => Ok(Level::Exception),
            other => Err(LevelLookupError(other)),
        }
    }

    /// Get associated color for terminal output (plain palette)
    pub fn color(self) -> Color {
        match self {
            Level::WorkerDetail => Color::BrightBlack,
            Level::WorkerSummary => Color::BrightCyan,
            Level::Detail => Color::Cyan,
            Level::Debug => Color::Blue,
            Level::Info => Color::Green,
            Level::Warning => Color::Yellow,
            Level::Error => Color::Red,
            Level::Critical => Color::BrightRed,
            Level::Exception => Color::Magenta,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_level_name(s)
    }
}

/// Error returned for a name that does not match any canonical level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level name: {0:?}")]
pub struct LevelParseError(pub String);

/// Error returned for a numeric value outside the fixed level table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no log level with value {0}")]
pub struct LevelLookupError(pub u8);

/// Parse a level name, case-insensitively, after trimming surrounding
/// whitespace.
pub fn parse_level_name(name: &str) -> Result<Level, LevelParseError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "w_detail" => Ok(Level::WorkerDetail),
        "w_summary" => Ok(Level::WorkerSummary),
        "detail" => Ok(Level::Detail),
        "debug" => Ok(Level::Debug),
        "info" => Ok(Level::Info),
        "warning" => Ok(Level::Warning),
        "error" => Ok(Level::Error),
        "critical" => Ok(Level::Critical),
        "exception" => Ok(Level::Exception),
        _ => Err(LevelParseError(name.to_string())),
    }
}

/// Canonical name for a numeric level value.
pub fn level_name(value: u8) -> Result<&'static str, LevelLookupError> {
    Level::from_value(value).map(Level::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_levels() {
        for level in ALL_LEVELS {
            assert_eq!(parse_level_name(level.as_str()), Ok(level));
        }
    }

    #[test]
    fn test_parse_is_inverse_of_name() {
        for level in ALL_LEVELS {
            let name = level_name(level.value()).unwrap();
            assert_eq!(parse_level_name(name), Ok(level));
            assert_eq!(parse_level_name(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn test_parse_case_and_whitespace() {
        assert_eq!(parse_level_name("INFO"), Ok(Level::Info));
        assert_eq!(parse_level_name("  Warning \t"), Ok(Level::Warning));
        assert_eq!(parse_level_name("W_DETAIL"), Ok(Level::WorkerDetail));
    }

    #[test]
    fn test_parse_unknown() {
        assert!(parse_level_name("invalid_level").is_err());
        assert!(parse_level_name("").is_err());
        assert_eq!(
            parse_level_name("verbose"),
            Err(LevelParseError("verbose".to_string()))
        );
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Level::from_value(20), Ok(Level::Info));
        assert_eq!(Level::from_value(60), Ok(Level::Exception));
        assert_eq!(Level::from_value(4), Err(LevelLookupError(4)));
        assert_eq!(Level::from_value(0), Err(LevelLookupError(0)));
    }

    #[test]
    fn test_values_are_ascending_and_unique() {
        let values: Vec<u8> = ALL_LEVELS.iter().map(|l| l.value()).collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(values, sorted);
    }

    #[test]
    fn test_ordering() {
        assert!(Level::WorkerDetail < Level::WorkerSummary);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Critical < Level::Exception);
    }

    #[test]
    fn test_display_roundtrip() {
        let parsed: Level = "critical".parse().unwrap();
        assert_eq!(parsed.to_string(), "critical");
        assert_eq!(parsed.upper_name(), "CRITICAL");
    }
}
