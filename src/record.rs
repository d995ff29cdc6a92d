//! Decoded log records delivered by the feed.
//!
//! Each delimiter-bounded span on the wire holds one JSON object. Known fields
//! are lifted into [`Record`]; anything else the server sends is preserved in
//! [`Record::extra`] so observers never lose data.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::level::LogLevel;

/// Error raised when a span cannot be decoded into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The span is not a JSON object matching the record shape.
    #[error("malformed record payload ({len} bytes): {source}")]
    Json {
        len: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Types that can be decoded from one framed span.
///
/// [`RecordFramer`](crate::framer::RecordFramer) is generic over this trait so
/// framing stays independent of the payload format.
pub trait DecodeRecord: Sized {
    /// Decode a single complete span.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;
}

/// One application-level log message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Time the server produced the message, as sent.
    #[serde(default)]
    pub date: Option<String>,
    /// Level name as sent by the server.
    #[serde(default)]
    pub level: Option<String>,
    /// Name of the server-side logger.
    #[serde(default)]
    pub logger: Option<String>,
    /// Message text.
    #[serde(default)]
    pub message: Option<String>,
    /// Server thread that produced the message.
    #[serde(default)]
    pub thread: Option<String>,
    /// Rendered exception, if any.
    #[serde(default)]
    pub exception: Option<String>,
    /// Fields not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Parse [`Record::date`] as an RFC 3339 timestamp.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.date
            .as_deref()
            .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
    }

    /// Parse [`Record::level`] into a [`LogLevel`].
    pub fn log_level(&self) -> Option<LogLevel> {
        self.level.as_deref().and_then(|level| level.parse().ok())
    }

    /// Message text, or an empty string when absent.
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

impl DecodeRecord for Record {
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|source| DecodeError::Json {
            len: bytes.len(),
            source,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {}",
            self.date.as_deref().unwrap_or("-"),
            self.level.as_deref().unwrap_or("-"),
            self.text()
        )
    }
}
