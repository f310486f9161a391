//! Business-rule switches.
//!
//! # Environment Variables
//!
//! - `LEVEL_MISMATCH_POLICY`: `advise` (default) or `block`
//! - `OVERPAYMENT_POLICY`: `allow` (default), `reject`, or `cap`
//! - `DEFAULT_PASSING_PERCENT`: threshold for levels without one (default: 50)

use std::str::FromStr;

use crate::{ConfigError, env_lookup};

/// What to do when a student's level differs from the batch's level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevelMismatchPolicy {
    /// Assign anyway and attach an advisory to the result.
    #[default]
    Advise,
    /// Refuse the assignment.
    Block,
}

impl FromStr for LevelMismatchPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "advise" => Ok(Self::Advise),
            "block" => Ok(Self::Block),
            _ => Err(()),
        }
    }
}

/// What to do when an approved payment would push a fee past its amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverpaymentPolicy {
    /// Credit the full payment; the fee is PAID with a surplus.
    #[default]
    Allow,
    /// Fail the approval.
    Reject,
    /// Credit only up to the outstanding balance.
    Cap,
}

impl FromStr for OverpaymentPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "reject" => Ok(Self::Reject),
            "cap" => Ok(Self::Cap),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolicyConfig {
    pub level_mismatch: LevelMismatchPolicy,
    pub overpayment: OverpaymentPolicy,
    pub default_passing_percent: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            level_mismatch: LevelMismatchPolicy::Advise,
            overpayment: OverpaymentPolicy::Allow,
            default_passing_percent: 50.0,
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Unlike the other configs, unrecognized values are errors rather than
    /// silently replaced by defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let level_mismatch = match lookup("LEVEL_MISMATCH_POLICY") {
            None => defaults.level_mismatch,
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "LEVEL_MISMATCH_POLICY",
                value: value.clone(),
                reason: "expected advise or block",
            })?,
        };

        let overpayment = match lookup("OVERPAYMENT_POLICY") {
            None => defaults.overpayment,
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "OVERPAYMENT_POLICY",
                value: value.clone(),
                reason: "expected allow, reject or cap",
            })?,
        };

        let default_passing_percent = match lookup("DEFAULT_PASSING_PERCENT") {
            None => defaults.default_passing_percent,
            Some(value) => value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|p| (0.0..=100.0).contains(p))
                .ok_or_else(|| ConfigError::Invalid {
                    key: "DEFAULT_PASSING_PERCENT",
                    value: value.clone(),
                    reason: "expected a number between 0 and 100",
                })?,
        };

        Ok(Self {
            level_mismatch,
            overpayment,
            default_passing_percent,
        })
    }
}
