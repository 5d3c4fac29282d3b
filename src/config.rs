// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-executor configuration (§6).
//!
//! CLI parsing, environment variables, and on-disk formats are out of this
//! crate's scope (§1); `Config` only needs to be constructible and, for a
//! driver that does want to load it from JSON/TOML/env, (de)serializable.

use serde::{Deserialize, Serialize};

use crate::queue::MAX_SHARE_LIMIT;

/// Whether a scheduler instance drives dispatching (`Broker`) or executes
/// thunks (`Executor`); both share the same [`crate::scheduler::Scheduler`]
/// state type (§2).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Executor,
    Broker,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    pub role: Role,
    #[serde(default = "default_share_limit")]
    pub share_limit: usize,
    pub help_threshold: usize,
    #[serde(default)]
    pub debug: bool,
}

fn default_share_limit() -> usize {
    1024
}

/// Errors validating a [`Config`] before it is used to construct a
/// scheduler.
#[derive(Debug, Eq, PartialEq)]
pub enum ConfigError {
    EmptyName,
    ShareLimitTooLarge { share_limit: usize, max: usize },
    HelpThresholdAboveShareLimit { help_threshold: usize, share_limit: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => f.write_str("executor name must not be empty"),
            Self::ShareLimitTooLarge { share_limit, max } => {
                write!(f, "share_limit {share_limit} exceeds hard capacity {max}")
            }
            Self::HelpThresholdAboveShareLimit { help_threshold, share_limit } => write!(
                f,
                "help_threshold {help_threshold} must not exceed share_limit {share_limit}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.share_limit > MAX_SHARE_LIMIT {
            return Err(ConfigError::ShareLimitTooLarge {
                share_limit: self.share_limit,
                max: MAX_SHARE_LIMIT,
            });
        }
        if self.help_threshold > self.share_limit {
            return Err(ConfigError::HelpThresholdAboveShareLimit {
                help_threshold: self.help_threshold,
                share_limit: self.share_limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            name: "executor1".into(),
            role: Role::Executor,
            share_limit: 1024,
            help_threshold: 256,
            debug: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let mut c = config();
        c.name.clear();
        assert_eq!(c.validate(), Err(ConfigError::EmptyName));
    }

    #[test]
    fn help_threshold_above_share_limit_rejected() {
        let mut c = config();
        c.help_threshold = 2000;
        assert!(c.validate().is_err());
    }
}
