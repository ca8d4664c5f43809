//! Query parameters and their validation

use serde::Deserialize;
use thiserror::Error;

use crate::stats::{DEFAULT_HOURS, DEFAULT_TOP_N, MAX_HOURS, MAX_TOP_N};

pub const DEFAULT_DEDUP_SECONDS: i64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: i64,
        value: i64,
    },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
}

#[derive(Debug, Deserialize)]
pub struct WhoamiQuery {
    #[serde(default = "default_dedup_seconds")]
    pub dedup_seconds: i64,
}

fn default_dedup_seconds() -> i64 {
    DEFAULT_DEDUP_SECONDS
}

impl WhoamiQuery {
    /// Dedup window in seconds; 0 disables deduplication
    pub fn validate(&self) -> Result<u64, ValidationError> {
        u64::try_from(self.dedup_seconds).map_err(|_| ValidationError::TooSmall {
            field: "dedup_seconds",
            min: 0,
            value: self.dedup_seconds,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_top_n")]
    pub top_n: i64,
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_top_n() -> i64 {
    i64::from(DEFAULT_TOP_N)
}

fn default_hours() -> i64 {
    i64::from(DEFAULT_HOURS)
}

impl StatsQuery {
    /// Returns `(top_n, hours)`
    pub fn validate(&self) -> Result<(u32, u32), ValidationError> {
        let top_n = in_range("top_n", self.top_n, 1, MAX_TOP_N)?;
        let hours = in_range("hours", self.hours, 1, MAX_HOURS)?;
        Ok((top_n, hours))
    }
}

fn in_range(field: &'static str, value: i64, min: u32, max: u32) -> Result<u32, ValidationError> {
    if value < i64::from(min) || value > i64::from(max) {
        return Err(ValidationError::OutOfRange {
            field,
            min: i64::from(min),
            max: i64::from(max),
            value,
        });
    }
    // Bounded by `max` above
    Ok(value as u32)
}
