// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Pod model: the slice the network plugins read and mutate.

use crate::keys;
use crate::meta::ObjectMeta;
use crate::service::Protocol;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub readiness_gates: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerPort {
    #[serde(default)]
    pub name: Option<String>,
    pub container_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Pod {
    #[must_use]
    pub fn key(&self) -> String {
        self.meta.key()
    }

    /// Plugin selection annotation; absence disables dispatch entirely.
    #[must_use]
    pub fn network_type(&self) -> Option<&str> {
        self.meta.annotation(keys::NETWORK_TYPE)
    }

    #[must_use]
    pub fn network_disabled(&self) -> bool {
        self.meta
            .annotation(keys::NETWORK_DISABLED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Name of the owning workload, from the label the host stamps on every
    /// managed pod.
    #[must_use]
    pub fn owner_workload(&self) -> Option<&str> {
        self.meta.label(keys::OWNER_WORKLOAD)
    }

    /// Ordinal index parsed from the trailing `-<n>` of the pod name.
    #[must_use]
    pub fn ordinal(&self) -> Option<usize> {
        self.meta
            .name
            .rsplit_once('-')
            .and_then(|(_, tail)| tail.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str) -> Pod {
        Pod {
            meta: ObjectMeta::named("game", name),
            ..Pod::default()
        }
    }

    #[test]
    fn ordinal_comes_from_name_suffix() {
        assert_eq!(pod("ranked-12").ordinal(), Some(12));
        assert_eq!(pod("ranked").ordinal(), None);
        assert_eq!(pod("ranked-x").ordinal(), None);
    }

    #[test]
    fn network_disabled_parses_annotation() {
        let mut p = pod("ranked-0");
        assert!(!p.network_disabled());
        p.meta.set_annotation(keys::NETWORK_DISABLED, "true");
        assert!(p.network_disabled());
        p.meta.set_annotation(keys::NETWORK_DISABLED, "false");
        assert!(!p.network_disabled());
    }
}
