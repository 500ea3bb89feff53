// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Service model: the load-balancer-typed objects the plugins materialize.

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Wire protocol of a service or container port.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    Display, EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum ServiceType {
    #[default]
    #[strum(serialize = "ClusterIP")]
    #[serde(rename = "ClusterIP")]
    ClusterIp,
    NodePort,
    LoadBalancer,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum ExternalTrafficPolicy {
    #[default]
    Local,
    Cluster,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
    #[serde(default)]
    pub status: ServiceStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub external_traffic_policy: ExternalTrafficPolicy,
    #[serde(default)]
    pub load_balancer_class: Option<String>,
    #[serde(default)]
    pub publish_not_ready_addresses: bool,
    #[serde(default)]
    pub allocate_load_balancer_node_ports: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    /// External port on the load balancer.
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Container port the traffic lands on.
    pub target_port: u16,
    #[serde(default)]
    pub node_port: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerIngress {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

impl Service {
    #[must_use]
    pub fn key(&self) -> String {
        self.meta.key()
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta.annotation(key)
    }

    /// UID of the controlling owner, used for straggler detection.
    #[must_use]
    pub fn owner_uid(&self) -> Option<&str> {
        self.meta.controller_owner().map(|r| r.uid.as_str())
    }

    /// First published ingress, the address every translated status uses.
    #[must_use]
    pub fn first_ingress(&self) -> Option<&LoadBalancerIngress> {
        self.status.load_balancer.ingress.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn protocol_round_trips_upper_and_lower_case() {
        assert_eq!(Protocol::from_str("TCP").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::from_str("udp").unwrap(), Protocol::Udp);
        assert_eq!(Protocol::Tcp.to_string(), "TCP");
    }

    #[test]
    fn service_type_uses_cluster_ip_spelling() {
        assert_eq!(ServiceType::ClusterIp.to_string(), "ClusterIP");
        assert_eq!(
            ServiceType::from_str("LoadBalancer").unwrap(),
            ServiceType::LoadBalancer
        );
    }
}
