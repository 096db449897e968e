//! Datetime data type implementation

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Datetime value, normalized to microseconds since the Unix epoch.
/// No timezone; MySQL DATETIME semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Datetime {
    micros: i64,
}

impl Datetime {
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub fn from_secs(secs: i64) -> Self {
        Self {
            micros: secs * 1_000_000,
        }
    }

    pub fn as_micros(&self) -> i64 {
        self.micros
    }

    pub fn as_secs(&self) -> i64 {
        self.micros / 1_000_000
    }

    /// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS[.ffffff]`, or the same with
    /// a `T` separator. Returns `None` for anything malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let parsed = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })?;
        Some(Self {
            micros: parsed.and_utc().timestamp_micros(),
        })
    }
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp_micros(self.micros) {
            Some(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}", self.micros),
        }
    }
}
