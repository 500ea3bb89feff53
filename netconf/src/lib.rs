// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Plugin configuration parsing and validation.
//!
//! Each plugin recognizes a closed set of option names carried as free-form
//! `(name, value)` pairs on the pod's network config. Unknown names are
//! ignored for forward compatibility; recognized names are validated for
//! type, range, and cross-field consistency, and any violation surfaces as
//! a [`ConfigError`] (the parameter error class: not retried until the
//! config changes).
//!
//! The same machinery parses the Init-time plugin options (port window,
//! block-list) in [`options`].

mod conf;
mod hash;
pub mod health;
pub mod options;

pub use conf::names;
pub use conf::{
    AutoLbConf, LbGroup, LbNetworkConf, MultiLbConf, NatGwConf, PortProtocol, ProtoKind,
};
pub use hash::config_hash;
pub use health::HealthCheck;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One free-form configuration pair from the workload template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfPair {
    pub name: String,
    pub value: String,
}

impl ConfPair {
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

/// The reasons a plugin configuration is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("option {option}: bad value '{value}': {reason}")]
    BadValue {
        option: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("option {0} is required")]
    Missing(&'static str),
    #[error("MinPort {min} exceeds MaxPort {max}")]
    InvertedPortWindow { min: u16, max: u16 },
    #[error("load-balancer group '{group}' has {got} ids, expected {expected}")]
    UnbalancedLbGroups {
        group: String,
        got: usize,
        expected: usize,
    },
    #[error("health check uri '{0}' is not a valid absolute path")]
    BadHealthUri(String),
    #[error("health check domain '{0}' is not a valid domain name")]
    BadHealthDomain(String),
    #[error("failed to fingerprint config: {0}")]
    Fingerprint(String),
}

/// Case-sensitive lookup of a recognized option. Unknown pairs simply never
/// get looked up.
#[must_use]
pub fn lookup<'a>(pairs: &'a [ConfPair], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.value.as_str())
}

pub(crate) fn parse_bool(option: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::BadValue {
            option,
            value: value.to_owned(),
            reason: "expected true or false",
        }),
    }
}

pub(crate) fn parse_u16(option: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::BadValue {
        option,
        value: value.to_owned(),
        reason: "expected a port number",
    })
}

pub(crate) fn parse_u32(option: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::BadValue {
        option,
        value: value.to_owned(),
        reason: "expected an unsigned integer",
    })
}

pub(crate) fn parse_port_csv(
    option: &'static str,
    value: &str,
) -> Result<Vec<u16>, ConfigError> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_u16(option, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_options_are_ignored_by_lookup() {
        let pairs = vec![
            ConfPair::new("SomeFutureKnob", "whatever"),
            ConfPair::new("Fixed", "true"),
        ];
        assert_eq!(lookup(&pairs, "Fixed"), Some("true"));
        assert_eq!(lookup(&pairs, "NotThere"), None);
    }

    #[test]
    fn port_csv_tolerates_spaces_and_rejects_junk() {
        assert_eq!(
            parse_port_csv("BlockPorts", "8001, 8005").unwrap(),
            vec![8001, 8005]
        );
        assert!(parse_port_csv("BlockPorts", "80,nope").is_err());
    }
}
