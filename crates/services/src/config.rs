use std::str::FromStr;
use std::time::Duration;

use progress_core::BigDecimal;
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_DB_URL: &str = "sqlite:course.sqlite3";
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;
pub const DEFAULT_QUIZ_PASS_RATIO: &str = "0.6";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid {var} value: {raw}")]
    Invalid { var: &'static str, raw: String },
    #[error("{var} must be between {min} and {max}, got {raw}")]
    OutOfRange {
        var: &'static str,
        raw: String,
        min: &'static str,
        max: &'static str,
    },
}

/// Runtime settings for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_url: String,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    /// Minimum share of the attainable score that counts as passing a quiz.
    pub quiz_pass_ratio: BigDecimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DB_URL.to_owned(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            quiz_pass_ratio: BigDecimal::from_str(DEFAULT_QUIZ_PASS_RATIO)
                .unwrap_or_else(|_| BigDecimal::from(1)),
        }
    }
}

impl EngineConfig {
    /// Reads `COURSE_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("COURSE_DB_URL") {
            if raw.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    var: "COURSE_DB_URL",
                    raw,
                });
            }
            config.database_url = raw;
        }

        if let Some(raw) = lookup("COURSE_RETRY_ATTEMPTS") {
            let attempts: u32 = parse("COURSE_RETRY_ATTEMPTS", &raw)?;
            if attempts == 0 {
                return Err(ConfigError::OutOfRange {
                    var: "COURSE_RETRY_ATTEMPTS",
                    raw,
                    min: "1",
                    max: "u32::MAX",
                });
            }
            config.retry_attempts = attempts;
        }

        if let Some(raw) = lookup("COURSE_RETRY_BACKOFF_MS") {
            let millis: u64 = parse("COURSE_RETRY_BACKOFF_MS", &raw)?;
            config.retry_backoff = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("COURSE_QUIZ_PASS_RATIO") {
            let ratio: BigDecimal = parse("COURSE_QUIZ_PASS_RATIO", &raw)?;
            if ratio < BigDecimal::from(0) || ratio > BigDecimal::from(1) {
                return Err(ConfigError::OutOfRange {
                    var: "COURSE_QUIZ_PASS_RATIO",
                    raw,
                    min: "0",
                    max: "1",
                });
            }
            config.quiz_pass_ratio = ratio;
        }

        Ok(config)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_backoff)
    }
}

fn parse<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        raw: raw.to_owned(),
    })
}
