// SPDX-License-Identifier: Apache-2.0

//! The on-disk JSON configuration schema (spec §6) and its validation.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::address::{AddressError, NextHopSelector};
use crate::fib::{FibError, FibPolicy};
use crate::health::HealthCheckerError;
use crate::prefix::{IPPrefix, PrefixError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file '{0}': {1}")]
    Io(String, std::io::Error),

    #[error("failed to parse configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("advertise.interval must be positive, got {0}")]
    InvalidInterval(f64),

    #[error("invalid advertise.next_hop '{value}': {source}")]
    InvalidNextHop {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("advertise.prefixes is empty; at least one prefix is required")]
    NoPrefixes,

    #[error("invalid advertise prefix '{0}': {1}")]
    InvalidPrefix(String, PrefixError),

    #[error("invalid health checker for prefix '{prefix}': {source}")]
    InvalidChecker {
        prefix: String,
        #[source]
        source: HealthCheckerError,
    },

    #[error("learn.fibs: {0}")]
    Fib(#[from] FibError),
}

fn default_next_hop() -> String {
    NextHopSelector::SelfAddress.to_string()
}

fn default_use_sudo() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct HealthCheckerConfig {
    pub class: String,
    #[serde(default)]
    pub kwargs: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdvertiseConfig {
    pub interval: f64,
    #[serde(default = "default_next_hop")]
    pub next_hop: String,
    pub prefixes: BTreeMap<String, Vec<HealthCheckerConfig>>,
    #[serde(default)]
    pub withdraw_on_exit: bool,
}

impl AdvertiseConfig {
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.interval.max(0.0))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LearnConfig {
    #[serde(default)]
    pub fibs: Vec<String>,
    /// Spec §6 documents two defaults for this one key: `true` when read by
    /// the FIB backend's own policy, `false` when read by the internal
    /// filter. Left unset, both readings below apply; setting it
    /// explicitly pins both to the same value.
    #[serde(default)]
    pub allow_default: Option<bool>,
    #[serde(default)]
    pub allow_ll_nexthop: bool,
    #[serde(default)]
    pub prefix_limit: u32,
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            fibs: Vec::new(),
            allow_default: None,
            allow_ll_nexthop: false,
            prefix_limit: 0,
            use_sudo: true,
        }
    }
}

impl LearnConfig {
    pub fn fib_policy(&self) -> FibPolicy {
        FibPolicy {
            allow_default: self.allow_default.unwrap_or(true),
            allow_ll_nexthop: self.allow_ll_nexthop,
            prefix_limit: self.prefix_limit,
            use_sudo: self.use_sudo,
        }
    }

    /// The internal-network filter's default-route exception (spec §4.5).
    pub fn filter_allow_default(&self) -> bool {
        self.allow_default.unwrap_or(false)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub advertise: AdvertiseConfig,
    #[serde(default)]
    pub learn: LearnConfig,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validates every field spec §7 classifies as a startup configuration
    /// error: next-hop syntax, non-empty prefix set, prefix parseability,
    /// known checker classes, positive interval, known FIB names, and
    /// `prefix_limit` only where a backend can honor it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.advertise.interval <= 0.0 {
            return Err(ConfigError::InvalidInterval(self.advertise.interval));
        }

        NextHopSelector::parse(&self.advertise.next_hop).map_err(|source| {
            ConfigError::InvalidNextHop {
                value: self.advertise.next_hop.clone(),
                source,
            }
        })?;

        if self.advertise.prefixes.is_empty() {
            return Err(ConfigError::NoPrefixes);
        }

        for (prefix_text, checkers) in &self.advertise.prefixes {
            IPPrefix::parse(prefix_text)
                .map_err(|e| ConfigError::InvalidPrefix(prefix_text.clone(), e))?;
            for checker in checkers {
                crate::health::build_checker(&checker.class, &checker.kwargs).map_err(
                    |source| ConfigError::InvalidChecker {
                        prefix: prefix_text.clone(),
                        source,
                    },
                )?;
            }
        }

        for fib_name in &self.learn.fibs {
            let fib = crate::fib::build_fib(fib_name, self.learn.fib_policy())?;
            if self.learn.prefix_limit != 0 && fib.check_prefix_limit() == 0 {
                return Err(ConfigError::Fib(FibError::PrefixLimitUnsupported(
                    fib_name.clone(),
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "advertise": {
                "interval": 5.0,
                "next_hop": "self",
                "prefixes": {
                    "69::/32": [ { "class": "PingChecker", "kwargs": { "target": "127.0.0.1" } } ]
                }
            },
            "learn": {
                "fibs": ["Linux"]
            }
        }"#
    }

    #[test]
    fn parses_and_validates_a_well_formed_config() {
        let config = Config::from_json(sample_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.advertise.next_hop, "self");
        assert_eq!(config.learn.use_sudo, true);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn rejects_non_positive_interval() {
        let config = Config::from_json(
            r#"{"advertise": {"interval": 0.0, "prefixes": {"69::/32": []}}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInterval(_))
        ));
    }

    #[test]
    fn rejects_invalid_next_hop() {
        let config = Config::from_json(
            r#"{"advertise": {"interval": 1.0, "next_hop": "garbage", "prefixes": {"69::/32": []}}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNextHop { .. })
        ));
    }

    #[test]
    fn rejects_empty_prefixes() {
        let config =
            Config::from_json(r#"{"advertise": {"interval": 1.0, "prefixes": {}}}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoPrefixes)));
    }

    #[test]
    fn rejects_unknown_checker_class() {
        let config = Config::from_json(
            r#"{"advertise": {"interval": 1.0, "prefixes": {"69::/32": [{"class": "Nonsense", "kwargs": {}}]}}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChecker { .. })
        ));
    }

    #[test]
    fn rejects_unknown_fib_name() {
        let config = Config::from_json(
            r#"{"advertise": {"interval": 1.0, "prefixes": {"69::/32": []}}, "learn": {"fibs": ["Nonsense"]}}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Fib(_))));
    }

    #[test]
    fn prefix_limit_defaults_are_distinct_for_fib_and_filter() {
        let config = Config::from_json(sample_json()).unwrap();
        assert_eq!(config.learn.fib_policy().allow_default, true);
        assert_eq!(config.learn.filter_allow_default(), false);
    }

    #[test]
    fn rejects_nonzero_prefix_limit_against_a_backend_that_cannot_enforce_it() {
        let config = Config::from_json(
            r#"{"advertise": {"interval": 1.0, "prefixes": {"69::/32": []}}, "learn": {"fibs": ["Linux"], "prefix_limit": 10}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Fib(FibError::PrefixLimitUnsupported(_)))
        ));
    }
}
