// ⚙️ Configuration - built once at process start, passed by reference
//
// No module-level singletons: the binary builds a Settings value and hands
// it (or the Clock it owns) to whatever needs a connection or a timestamp.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::env;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "banking.db";
const DEFAULT_LOG_LEVEL: &str = "info";

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now" for column defaults (UTC only)
///
/// Tests pin it with `Clock::fixed` so defaulted timestamps are predictable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    fixed: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn system() -> Self {
        Clock { fixed: None }
    }

    pub fn fixed(at: DateTime<Utc>) -> Self {
        Clock { fixed: Some(at) }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Log filter directive (e.g. "info", "banking_app=debug")
    pub log_level: String,

    /// Log every rendered statement at debug level
    pub db_echo: bool,

    pub clock: Clock,
}

impl Settings {
    /// Load settings from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine; real environment variables still apply
        let _ = dotenvy::dotenv();

        let db_path = env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let db_echo = match env::var("DB_ECHO") {
            Ok(raw) => parse_bool(&raw).with_context(|| format!("DB_ECHO has invalid value '{}'", raw))?,
            Err(_) => false,
        };

        Ok(Settings {
            db_path: PathBuf::from(db_path),
            log_level,
            db_echo,
            clock: Clock::system(),
        })
    }

    /// Settings for an explicit database path, everything else defaulted
    pub fn for_path(db_path: impl Into<PathBuf>) -> Self {
        Settings {
            db_path: db_path.into(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            db_echo: false,
            clock: Clock::system(),
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}
