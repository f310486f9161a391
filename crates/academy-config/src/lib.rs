//! # Academy Config
//!
//! Configuration structures loaded from environment variables:
//!
//! - [`database`]: PostgreSQL connection settings
//! - [`email`]: SMTP settings for event notification mail
//! - [`policy`]: business-rule switches (level mismatch, overpayment, passing threshold)
//! - [`logging`]: log level, format, and optional log directory
//!
//! Every type has a `from_env()` constructor and a `from_lookup()` variant that
//! takes any `Fn(&str) -> Option<String>`, which is what the tests use.
//!
//! # Example
//!
//! ```ignore
//! use academy_config::{DatabaseConfig, PolicyConfig};
//!
//! let database = DatabaseConfig::from_env()?;
//! let policy = PolicyConfig::from_env()?;
//! ```

pub mod database;
pub mod email;
pub mod logging;
pub mod policy;

use thiserror::Error;

pub use database::DatabaseConfig;
pub use email::EmailConfig;
pub use logging::{LogConfig, LogFormat};
pub use policy::{LevelMismatchPolicy, OverpaymentPolicy, PolicyConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Reads `key` and parses it, falling back to `default` when unset or unparsable.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
