use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Verbosity requested from the server when the log broadcast starts.
///
/// The rendered form is the level name the broadcast service expects in its
/// `logLevelStr` field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    #[default]
    All,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::All => "All",
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
            LogLevel::Off => "Off",
        };
        f.write_str(s)
    }
}

/// Raised when a level name is not recognised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log level {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "FATAL" | "CRITICAL" => Ok(Self::Fatal),
            "OFF" => Ok(Self::Off),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}

impl LogLevel {
    pub fn parse_or_all(s: &str) -> Self {
        s.parse().unwrap_or(Self::All)
    }
}
