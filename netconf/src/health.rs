// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Load-balancer health-check options.
//!
//! HTTP-only fields (uri, domain, method) are only consulted when the check
//! type is `http`; with a `tcp` check they are reset to defaults so they
//! never leak into the fingerprint or the service annotations.

use crate::{lookup, parse_u16, parse_u32, ConfPair, ConfigError};
use api::keys;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use strum::{Display, EnumString};

pub const SWITCH: &str = "LBHealthCheckSwitch";
pub const TYPE: &str = "LBHealthCheckType";
pub const CONNECT_PORT: &str = "LBHealthCheckConnectPort";
pub const CONNECT_TIMEOUT: &str = "LBHealthCheckConnectTimeout";
pub const INTERVAL: &str = "LBHealthCheckInterval";
pub const URI: &str = "LBHealthCheckUri";
pub const DOMAIN: &str = "LBHealthCheckDomain";
pub const METHOD: &str = "LBHealthCheckMethod";
pub const HEALTHY_THRESHOLD: &str = "LBHealthyThreshold";
pub const UNHEALTHY_THRESHOLD: &str = "LBUnhealthyThreshold";

static URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[0-9a-zA-Z./%?#&=_~-]*$").unwrap());
static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$").unwrap()
});

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    #[default]
    Tcp,
    Http,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub switch: bool,
    pub kind: HealthCheckType,
    /// 0 means "probe the backend port".
    pub connect_port: u16,
    pub connect_timeout_s: u32,
    pub interval_s: u32,
    pub uri: String,
    pub domain: String,
    pub method: HttpMethod,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            switch: true,
            kind: HealthCheckType::Tcp,
            connect_port: 0,
            connect_timeout_s: 5,
            interval_s: 10,
            uri: String::new(),
            domain: String::new(),
            method: HttpMethod::Get,
            healthy_threshold: 3,
            unhealthy_threshold: 3,
        }
    }
}

fn in_range(
    option: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<u32, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::BadValue {
            option,
            value: value.to_string(),
            reason: "out of range",
        })
    }
}

impl HealthCheck {
    pub fn parse(pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let mut hc = Self::default();

        if let Some(raw) = lookup(pairs, SWITCH) {
            hc.switch = match raw.trim().to_ascii_lowercase().as_str() {
                "on" => true,
                "off" => false,
                _ => {
                    return Err(ConfigError::BadValue {
                        option: SWITCH,
                        value: raw.to_owned(),
                        reason: "expected on or off",
                    });
                }
            };
        }
        if let Some(raw) = lookup(pairs, TYPE) {
            hc.kind = HealthCheckType::from_str(raw.trim()).map_err(|_| {
                ConfigError::BadValue {
                    option: TYPE,
                    value: raw.to_owned(),
                    reason: "expected tcp or http",
                }
            })?;
        }
        if let Some(raw) = lookup(pairs, CONNECT_PORT) {
            hc.connect_port = parse_u16(CONNECT_PORT, raw)?;
        }
        if let Some(raw) = lookup(pairs, CONNECT_TIMEOUT) {
            hc.connect_timeout_s = in_range(CONNECT_TIMEOUT, parse_u32(CONNECT_TIMEOUT, raw)?, 1, 300)?;
        }
        if let Some(raw) = lookup(pairs, INTERVAL) {
            hc.interval_s = in_range(INTERVAL, parse_u32(INTERVAL, raw)?, 1, 50)?;
        }
        if let Some(raw) = lookup(pairs, HEALTHY_THRESHOLD) {
            hc.healthy_threshold =
                in_range(HEALTHY_THRESHOLD, parse_u32(HEALTHY_THRESHOLD, raw)?, 2, 10)?;
        }
        if let Some(raw) = lookup(pairs, UNHEALTHY_THRESHOLD) {
            hc.unhealthy_threshold =
                in_range(UNHEALTHY_THRESHOLD, parse_u32(UNHEALTHY_THRESHOLD, raw)?, 2, 10)?;
        }

        match hc.kind {
            HealthCheckType::Http => {
                let uri = lookup(pairs, URI).unwrap_or_default().trim().to_owned();
                if !URI_RE.is_match(&uri) {
                    return Err(ConfigError::BadHealthUri(uri));
                }
                hc.uri = uri;
                let domain = lookup(pairs, DOMAIN).unwrap_or_default().trim().to_owned();
                if !DOMAIN_RE.is_match(&domain) {
                    return Err(ConfigError::BadHealthDomain(domain));
                }
                hc.domain = domain;
                if let Some(raw) = lookup(pairs, METHOD) {
                    hc.method = HttpMethod::from_str(raw.trim()).map_err(|_| {
                        ConfigError::BadValue {
                            option: METHOD,
                            value: raw.to_owned(),
                            reason: "expected get or head",
                        }
                    })?;
                }
            }
            HealthCheckType::Tcp => {
                // http-only fields stay at their defaults regardless of input
            }
        }
        Ok(hc)
    }

    /// Render the service annotations for this check. Empty when switched
    /// off (only the switch itself is stamped).
    #[must_use]
    pub fn annotations(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![(
            keys::HEALTH_SWITCH,
            if self.switch { "on" } else { "off" }.to_owned(),
        )];
        if !self.switch {
            return out;
        }
        out.push((keys::HEALTH_TYPE, self.kind.to_string()));
        out.push((keys::HEALTH_CONNECT_PORT, self.connect_port.to_string()));
        out.push((keys::HEALTH_CONNECT_TIMEOUT, self.connect_timeout_s.to_string()));
        out.push((keys::HEALTH_INTERVAL, self.interval_s.to_string()));
        out.push((keys::HEALTH_HEALTHY_THRESHOLD, self.healthy_threshold.to_string()));
        out.push((keys::HEALTH_UNHEALTHY_THRESHOLD, self.unhealthy_threshold.to_string()));
        if self.kind == HealthCheckType::Http {
            out.push((keys::HEALTH_URI, self.uri.clone()));
            out.push((keys::HEALTH_DOMAIN, self.domain.clone()));
            out.push((keys::HEALTH_METHOD, self.method.to_string()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_a_tcp_check() {
        let hc = HealthCheck::parse(&[]).unwrap();
        assert!(hc.switch);
        assert_eq!(hc.kind, HealthCheckType::Tcp);
        assert_eq!(hc.interval_s, 10);
    }

    #[test]
    fn http_check_requires_valid_uri_and_domain() {
        let pairs = vec![
            ConfPair::new(TYPE, "http"),
            ConfPair::new(URI, "/healthz"),
            ConfPair::new(DOMAIN, "game.example.com"),
            ConfPair::new(METHOD, "head"),
        ];
        let hc = HealthCheck::parse(&pairs).unwrap();
        assert_eq!(hc.uri, "/healthz");
        assert_eq!(hc.domain, "game.example.com");
        assert_eq!(hc.method, HttpMethod::Head);

        let bad_uri = vec![
            ConfPair::new(TYPE, "http"),
            ConfPair::new(URI, "healthz"),
            ConfPair::new(DOMAIN, "game.example.com"),
        ];
        assert_eq!(
            HealthCheck::parse(&bad_uri).unwrap_err(),
            ConfigError::BadHealthUri("healthz".to_owned())
        );

        let bad_domain = vec![
            ConfPair::new(TYPE, "http"),
            ConfPair::new(URI, "/healthz"),
            ConfPair::new(DOMAIN, "not_a_domain"),
        ];
        assert!(matches!(
            HealthCheck::parse(&bad_domain),
            Err(ConfigError::BadHealthDomain(_))
        ));
    }

    #[test]
    fn http_fields_are_ignored_for_tcp_checks() {
        let pairs = vec![
            ConfPair::new(TYPE, "tcp"),
            ConfPair::new(URI, "not-even-a-path"),
            ConfPair::new(DOMAIN, "%%%"),
        ];
        let hc = HealthCheck::parse(&pairs).unwrap();
        assert_eq!(hc.uri, "");
        assert_eq!(hc.domain, "");
    }

    #[test]
    fn numeric_options_are_range_checked() {
        let pairs = vec![ConfPair::new(INTERVAL, "51")];
        assert!(HealthCheck::parse(&pairs).is_err());
        let pairs = vec![ConfPair::new(HEALTHY_THRESHOLD, "1")];
        assert!(HealthCheck::parse(&pairs).is_err());
        let pairs = vec![ConfPair::new(CONNECT_TIMEOUT, "300")];
        assert_eq!(HealthCheck::parse(&pairs).unwrap().connect_timeout_s, 300);
    }

    #[test]
    fn annotations_follow_the_switch() {
        let mut hc = HealthCheck::default();
        hc.switch = false;
        assert_eq!(hc.annotations().len(), 1);

        hc.switch = true;
        hc.kind = HealthCheckType::Http;
        hc.uri = "/ping".to_owned();
        hc.domain = "example.org".to_owned();
        let annotations = hc.annotations();
        assert!(annotations.iter().any(|(k, v)| *k == api::keys::HEALTH_URI && v == "/ping"));
    }
}
