// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Per-pod plugin configurations parsed from `(name, value)` pairs.

use crate::health::HealthCheck;
use crate::{lookup, parse_bool, parse_u16, ConfPair, ConfigError};
use api::ExternalTrafficPolicy;
use api::Protocol;
use portalloc::LbId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

/// Recognized option names. Anything else in the pair list is ignored.
pub mod names {
    pub const LB_IDS: &str = "LbIds";
    pub const SLB_IDS: &str = "SlbIds";
    pub const NLB_IDS: &str = "NlbIds";
    pub const NLB_ID_NAMES: &str = "NlbIdNames";
    pub const PORT_PROTOCOLS: &str = "PortProtocols";
    pub const FIXED: &str = "Fixed";
    pub const BLOCK_PORTS: &str = "BlockPorts";
    pub const MIN_PORT: &str = "MinPort";
    pub const MAX_PORT: &str = "MaxPort";
    pub const ALLOW_NOT_READY: &str = "AllowNotReadyContainers";
    pub const EXTERNAL_TRAFFIC_POLICY: &str = "ExternalTrafficPolicyType";
    pub const RESERVE_LBS: &str = "ReserveLbNum";
    pub const ISPS: &str = "Isps";
    pub const PORTS: &str = "Ports";
    pub const PROTOCOL: &str = "Protocol";
}

/// Protocol of one exposed port. `TCPUDP` fans out into a TCP and a UDP
/// service port sharing one external port number.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtoKind {
    #[default]
    Tcp,
    Udp,
    TcpUdp,
}

impl ProtoKind {
    /// The wire protocols this expands to on the service.
    #[must_use]
    pub fn wire(&self) -> Vec<Protocol> {
        match self {
            ProtoKind::Tcp => vec![Protocol::Tcp],
            ProtoKind::Udp => vec![Protocol::Udp],
            ProtoKind::TcpUdp => vec![Protocol::Tcp, Protocol::Udp],
        }
    }
}

/// One `port[/protocol]` entry of the `PortProtocols` option; the port is
/// the container-side target port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProtocol {
    pub port: u16,
    pub kind: ProtoKind,
}

impl PortProtocol {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let (port, kind) = match raw.split_once('/') {
            Some((port, proto)) => (
                parse_u16(names::PORT_PROTOCOLS, port)?,
                ProtoKind::from_str(proto).map_err(|_| ConfigError::BadValue {
                    option: names::PORT_PROTOCOLS,
                    value: raw.to_owned(),
                    reason: "protocol must be TCP, UDP or TCPUDP",
                })?,
            ),
            None => (parse_u16(names::PORT_PROTOCOLS, raw)?, ProtoKind::default()),
        };
        Ok(Self { port, kind })
    }
}

fn parse_port_protocols(value: &str) -> Result<Vec<PortProtocol>, ConfigError> {
    let ports: Vec<PortProtocol> = value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(PortProtocol::parse)
        .collect::<Result<_, _>>()?;
    if ports.is_empty() {
        return Err(ConfigError::Missing(names::PORT_PROTOCOLS));
    }
    Ok(ports)
}

fn parse_lb_ids(value: &str) -> Vec<LbId> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(LbId::from)
        .collect()
}

fn parse_traffic_policy(pairs: &[ConfPair]) -> Result<ExternalTrafficPolicy, ConfigError> {
    match lookup(pairs, names::EXTERNAL_TRAFFIC_POLICY) {
        None => Ok(ExternalTrafficPolicy::Local),
        Some(raw) => {
            ExternalTrafficPolicy::from_str(raw.trim()).map_err(|_| ConfigError::BadValue {
                option: names::EXTERNAL_TRAFFIC_POLICY,
                value: raw.to_owned(),
                reason: "expected Local or Cluster",
            })
        }
    }
}

fn parse_fixed(pairs: &[ConfPair]) -> Result<bool, ConfigError> {
    lookup(pairs, names::FIXED).map_or(Ok(false), |raw| parse_bool(names::FIXED, raw))
}

fn parse_allow_not_ready(pairs: &[ConfPair]) -> Result<bool, ConfigError> {
    lookup(pairs, names::ALLOW_NOT_READY)
        .map_or(Ok(false), |raw| parse_bool(names::ALLOW_NOT_READY, raw))
}

/// Configuration of the LB-backed plugins (direct, shared, node-port,
/// host-port). Everything that reaches the materialized service lives here,
/// so the fingerprint covers it all.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LbNetworkConf {
    pub lb_ids: Vec<LbId>,
    pub ports: Vec<PortProtocol>,
    pub fixed: bool,
    pub allow_not_ready: bool,
    pub external_traffic_policy: ExternalTrafficPolicy,
    pub health: HealthCheck,
}

impl LbNetworkConf {
    /// Parse requiring a non-empty LB id set (`LbIds`, `SlbIds` and
    /// `NlbIds` are all accepted).
    pub fn parse(pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let conf = Self::parse_unbound(pairs)?;
        if conf.lb_ids.is_empty() {
            return Err(ConfigError::Missing(names::LB_IDS));
        }
        Ok(conf)
    }

    /// Parse without requiring LB ids; the node-port and host-port plugins
    /// allocate from a cluster- or node-scoped window instead.
    pub fn parse_unbound(pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let lb_ids = [names::LB_IDS, names::SLB_IDS, names::NLB_IDS]
            .iter()
            .find_map(|name| lookup(pairs, name))
            .map(parse_lb_ids)
            .unwrap_or_default();
        let ports = lookup(pairs, names::PORT_PROTOCOLS)
            .ok_or(ConfigError::Missing(names::PORT_PROTOCOLS))
            .and_then(parse_port_protocols)?;
        Ok(Self {
            lb_ids,
            ports,
            fixed: parse_fixed(pairs)?,
            allow_not_ready: parse_allow_not_ready(pairs)?,
            external_traffic_policy: parse_traffic_policy(pairs)?,
            health: HealthCheck::parse(pairs)?,
        })
    }

    /// Distinct external ports this pod needs.
    #[must_use]
    pub fn ports_needed(&self) -> usize {
        self.ports.len()
    }
}

/// One named group of the multi-LB configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LbGroup {
    pub name: String,
    pub lb_ids: Vec<LbId>,
}

/// Multi-ISP configuration: `{LBid}/{groupName}` pairs. The k-th LB of each
/// group forms bank k; a port chosen in a bank is programmed on every LB in
/// it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MultiLbConf {
    pub groups: Vec<LbGroup>,
    pub ports: Vec<PortProtocol>,
    pub fixed: bool,
    pub allow_not_ready: bool,
    pub external_traffic_policy: ExternalTrafficPolicy,
    pub health: HealthCheck,
}

impl MultiLbConf {
    pub fn parse(pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let raw = lookup(pairs, names::NLB_ID_NAMES)
            .ok_or(ConfigError::Missing(names::NLB_ID_NAMES))?;
        let mut groups: Vec<LbGroup> = Vec::new();
        for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
            let (id, name) = entry
                .trim()
                .split_once('/')
                .ok_or(ConfigError::BadValue {
                    option: names::NLB_ID_NAMES,
                    value: entry.to_owned(),
                    reason: "expected {lbId}/{groupName}",
                })?;
            let name = name.trim();
            match groups.iter_mut().find(|g| g.name == name) {
                Some(group) => group.lb_ids.push(LbId::from(id)),
                None => groups.push(LbGroup {
                    name: name.to_owned(),
                    lb_ids: vec![LbId::from(id)],
                }),
            }
        }
        if groups.is_empty() {
            return Err(ConfigError::Missing(names::NLB_ID_NAMES));
        }
        // Banks only form when every group is the same depth.
        let expected = groups[0].lb_ids.len();
        for group in &groups[1..] {
            if group.lb_ids.len() != expected {
                return Err(ConfigError::UnbalancedLbGroups {
                    group: group.name.clone(),
                    got: group.lb_ids.len(),
                    expected,
                });
            }
        }

        let ports = lookup(pairs, names::PORT_PROTOCOLS)
            .ok_or(ConfigError::Missing(names::PORT_PROTOCOLS))
            .and_then(parse_port_protocols)?;
        Ok(Self {
            groups,
            ports,
            fixed: parse_fixed(pairs)?,
            allow_not_ready: parse_allow_not_ready(pairs)?,
            external_traffic_policy: parse_traffic_policy(pairs)?,
            health: HealthCheck::parse(pairs)?,
        })
    }

    /// Number of banks (depth of every group).
    #[must_use]
    pub fn bank_count(&self) -> usize {
        self.groups.first().map_or(0, |g| g.lb_ids.len())
    }

    /// The LBs of bank `k`, one per group, in group order.
    #[must_use]
    pub fn bank(&self, k: usize) -> Vec<(&str, &LbId)> {
        self.groups
            .iter()
            .filter_map(|g| g.lb_ids.get(k).map(|lb| (g.name.as_str(), lb)))
            .collect()
    }
}

/// Configuration of the auto-scaled LB pool plugin.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AutoLbConf {
    pub ports: Vec<PortProtocol>,
    /// ISP variants; empty means a single default carrier.
    pub isps: Vec<String>,
    pub fixed: bool,
    pub allow_not_ready: bool,
    pub external_traffic_policy: ExternalTrafficPolicy,
    pub health: HealthCheck,
}

impl AutoLbConf {
    pub fn parse(pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let ports = lookup(pairs, names::PORT_PROTOCOLS)
            .ok_or(ConfigError::Missing(names::PORT_PROTOCOLS))
            .and_then(parse_port_protocols)?;
        let isps = lookup(pairs, names::ISPS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            ports,
            isps,
            fixed: parse_fixed(pairs)?,
            allow_not_ready: parse_allow_not_ready(pairs)?,
            external_traffic_policy: parse_traffic_policy(pairs)?,
            health: HealthCheck::parse(pairs)?,
        })
    }
}

/// Configuration of the NAT-gateway DNAT plugin. No allocation window; the
/// gateway controller owns the translation table.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NatGwConf {
    pub ports: Vec<u16>,
    pub protocol: ProtoKind,
    pub fixed: bool,
}

impl NatGwConf {
    pub fn parse(pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let ports = lookup(pairs, names::PORTS)
            .ok_or(ConfigError::Missing(names::PORTS))
            .and_then(|raw| crate::parse_port_csv(names::PORTS, raw))?;
        if ports.is_empty() {
            return Err(ConfigError::Missing(names::PORTS));
        }
        let protocol = match lookup(pairs, names::PROTOCOL) {
            None => ProtoKind::default(),
            Some(raw) => ProtoKind::from_str(raw.trim()).map_err(|_| ConfigError::BadValue {
                option: names::PROTOCOL,
                value: raw.to_owned(),
                reason: "protocol must be TCP, UDP or TCPUDP",
            })?,
        };
        Ok(Self {
            ports,
            protocol,
            fixed: parse_fixed(pairs)?,
        })
    }
}
