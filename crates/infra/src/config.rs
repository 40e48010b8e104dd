//! Configuration loading and representation.
//!
//! Everything comes from environment variables with defaults:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `SOCIALSTORE_UTC_OFFSET_MINUTES` | `0` | local calendar used for "not in the past" |
//! | `SOCIALSTORE_MAX_CONFLICT_RETRIES` | `3` | re-load/re-decide attempts on a version conflict |
//! | `SOCIALSTORE_LOG_FORMAT` | `json` | `json` or `pretty` |

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use thiserror::Error;

use socialstore_observability::LogFormat;

pub const UTC_OFFSET_VAR: &str = "SOCIALSTORE_UTC_OFFSET_MINUTES";
pub const MAX_CONFLICT_RETRIES_VAR: &str = "SOCIALSTORE_MAX_CONFLICT_RETRIES";
pub const LOG_FORMAT_VAR: &str = "SOCIALSTORE_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be an integer number of minutes, got '{value}'")]
    InvalidOffset { var: &'static str, value: String },

    #[error("{var} is out of range: {minutes} minutes")]
    OffsetOutOfRange { var: &'static str, minutes: i32 },

    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidRetries { var: &'static str, value: String },

    #[error("{var}: {message}")]
    InvalidLogFormat { var: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub utc_offset: FixedOffset,
    pub max_conflict_retries: u32,
    pub log_format: LogFormat,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            max_conflict_retries: 3,
            log_format: LogFormat::Json,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(UTC_OFFSET_VAR) {
            let minutes: i32 = raw.trim().parse().map_err(|_| ConfigError::InvalidOffset {
                var: UTC_OFFSET_VAR,
                value: raw.clone(),
            })?;
            config.utc_offset = minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or(ConfigError::OffsetOutOfRange {
                    var: UTC_OFFSET_VAR,
                    minutes,
                })?;
        }

        if let Some(raw) = lookup(MAX_CONFLICT_RETRIES_VAR) {
            config.max_conflict_retries =
                raw.trim().parse().map_err(|_| ConfigError::InvalidRetries {
                    var: MAX_CONFLICT_RETRIES_VAR,
                    value: raw.clone(),
                })?;
        }

        if let Some(raw) = lookup(LOG_FORMAT_VAR) {
            config.log_format = raw.parse().map_err(|e: socialstore_observability::ParseLogFormatError| {
                ConfigError::InvalidLogFormat {
                    var: LOG_FORMAT_VAR,
                    message: e.to_string(),
                }
            })?;
        }

        Ok(config)
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        if let Some(offset) = minutes.checked_mul(60).and_then(FixedOffset::east_opt) {
            self.utc_offset = offset;
        }
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Today's date on the store's local calendar.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }

    /// Install the global tracing subscriber in the configured format (once per process).
    pub fn init_tracing(&self) {
        socialstore_observability::init(self.log_format);
    }
}
