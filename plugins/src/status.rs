// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Translation of materialized services into the pod's network status.
//!
//! State machine: `Waiting -> NotReady -> Ready`, re-entering `NotReady` on
//! fingerprint drift or disable. Transition timestamps move only on actual
//! state change.

use api::{
    NetworkAddress, NetworkPort, NetworkState, NetworkStatus, Pod, Service, ServiceType,
};

/// Internal addresses: the pod IP with the container-side ports.
#[must_use]
pub fn internal_addresses(pod: &Pod, svc: &Service) -> Vec<NetworkAddress> {
    let Some(pod_ip) = &pod.status.pod_ip else {
        return Vec::new();
    };
    vec![NetworkAddress {
        ip: Some(pod_ip.clone()),
        endpoint: None,
        ports: svc
            .spec
            .ports
            .iter()
            .map(|p| NetworkPort {
                name: p.name.clone(),
                port: p.target_port,
                protocol: p.protocol,
            })
            .collect(),
    }]
}

/// External addresses from the service's first ingress (IP preferred,
/// hostname becomes an opaque endpoint). NodePort services expose through
/// the pod's host instead.
#[must_use]
pub fn external_addresses(pod: &Pod, svc: &Service) -> Vec<NetworkAddress> {
    if svc.spec.service_type == ServiceType::NodePort {
        let Some(host_ip) = &pod.status.host_ip else {
            return Vec::new();
        };
        return vec![NetworkAddress {
            ip: Some(host_ip.clone()),
            endpoint: None,
            ports: svc
                .spec
                .ports
                .iter()
                .filter_map(|p| {
                    p.node_port.map(|node_port| NetworkPort {
                        name: p.name.clone(),
                        port: node_port,
                        protocol: p.protocol,
                    })
                })
                .collect(),
        }];
    }

    let Some(ingress) = svc.first_ingress() else {
        return Vec::new();
    };
    let ports: Vec<NetworkPort> = svc
        .spec
        .ports
        .iter()
        .map(|p| NetworkPort {
            name: p.name.clone(),
            port: p.port,
            protocol: p.protocol,
        })
        .collect();
    vec![NetworkAddress {
        ip: ingress.ip.clone(),
        endpoint: if ingress.ip.is_none() {
            ingress.hostname.clone()
        } else {
            None
        },
        ports,
    }]
}

/// Publish a bare state change, keeping whatever addresses are already
/// recorded.
pub fn publish_state(pod: &mut Pod, plugin: &'static str, state: NetworkState) {
    publish(pod, plugin, state, Vec::new(), Vec::new());
}

/// Publish state and, when non-empty, fresh address lists.
pub fn publish(
    pod: &mut Pod,
    plugin: &'static str,
    state: NetworkState,
    internal: Vec<NetworkAddress>,
    external: Vec<NetworkAddress>,
) {
    let mut status = pod
        .network_status()
        .unwrap_or_else(|| NetworkStatus::new(plugin));
    status.network_type = plugin.to_owned();
    status.desired_state = if pod.network_disabled() {
        NetworkState::NotReady
    } else {
        NetworkState::Ready
    };
    if !internal.is_empty() {
        status.internal_addresses = internal;
    }
    if !external.is_empty() {
        status.external_addresses = external;
    }
    status.transition(state);
    pod.set_network_status(&status);
}
