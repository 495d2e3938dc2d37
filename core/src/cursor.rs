/// Pagination cursor: millisecond-epoch timestamp of the oldest loaded message,
/// sent to the backend as an ISO-8601 string.
use crate::error::{ChatError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Encode as `YYYY-MM-DDTHH:MM:SS.mmmZ`, the form the backend expects
    pub fn to_iso(&self) -> Result<String> {
        let dt = DateTime::<Utc>::from_timestamp_millis(self.0)
            .ok_or_else(|| ChatError::InvalidCursor(format!("{} ms is out of range", self.0)))?;
        Ok(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Parse an ISO-8601 / RFC 3339 timestamp back into a cursor
    pub fn from_iso(s: &str) -> Result<Self> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| ChatError::InvalidCursor(format!("{}: {}", s, e)))?;
        Ok(Self(dt.with_timezone(&Utc).timestamp_millis()))
    }
}

impl From<DateTime<Utc>> for Cursor {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_iso() {
            Ok(iso) => write!(f, "{}", iso),
            Err(_) => write!(f, "{}ms", self.0),
        }
    }
}
