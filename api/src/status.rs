// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Published network status, carried as a JSON annotation on the pod and
//! mirrored onto the game-server custom resource by the host.

use crate::keys;
use crate::pod::Pod;
use crate::service::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum NetworkState {
    /// No observation yet; the first reconcile pass has not run.
    #[default]
    Waiting,
    /// Exposure is being built or has drifted; addresses are not usable.
    NotReady,
    /// The external address set is published and authoritative.
    Ready,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub network_type: String,
    #[serde(default)]
    pub internal_addresses: Vec<NetworkAddress>,
    #[serde(default)]
    pub external_addresses: Vec<NetworkAddress>,
    #[serde(default)]
    pub desired_state: NetworkState,
    #[serde(default)]
    pub current_state: NetworkState,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// One address with its ports. Either an IP or an opaque endpoint
/// (hostname-only ingress) is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAddress {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub ports: Vec<NetworkPort>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPort {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl NetworkStatus {
    #[must_use]
    pub fn new(network_type: &str) -> Self {
        Self {
            network_type: network_type.to_owned(),
            desired_state: NetworkState::Ready,
            create_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Move to `state`, stamping the transition time only on actual change.
    pub fn transition(&mut self, state: NetworkState) {
        if self.current_state != state {
            self.current_state = state;
            self.last_transition_time = Some(Utc::now());
        }
    }
}

impl Pod {
    /// Parse the status annotation; `None` when absent or unparsable.
    #[must_use]
    pub fn network_status(&self) -> Option<NetworkStatus> {
        let raw = self.meta.annotation(keys::NETWORK_STATUS)?;
        serde_json::from_str(raw).ok()
    }

    /// Serialize `status` back onto the pod annotation.
    pub fn set_network_status(&mut self, status: &NetworkStatus) {
        if let Ok(raw) = serde_json::to_string(status) {
            self.meta.set_annotation(keys::NETWORK_STATUS, raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ObjectMeta;

    #[test]
    fn transition_updates_timestamp_only_on_change() {
        let mut status = NetworkStatus::new("L4-LB");
        status.transition(NetworkState::NotReady);
        let first = status.last_transition_time;
        assert!(first.is_some());

        status.transition(NetworkState::NotReady);
        assert_eq!(status.last_transition_time, first);

        status.transition(NetworkState::Ready);
        assert_ne!(status.last_transition_time, first);
    }

    #[test]
    fn status_round_trips_through_annotation() {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", "ranked-0"),
            ..Pod::default()
        };
        assert!(pod.network_status().is_none());

        let mut status = NetworkStatus::new("L4-LB");
        status.external_addresses.push(NetworkAddress {
            ip: Some("203.0.113.9".to_owned()),
            endpoint: None,
            ports: vec![NetworkPort {
                name: "80-tcp".to_owned(),
                port: 512,
                protocol: Protocol::Tcp,
            }],
        });
        pod.set_network_status(&status);

        let back = pod.network_status().expect("status annotation");
        assert_eq!(back.external_addresses, status.external_addresses);
        assert_eq!(back.network_type, "L4-LB");
    }
}
