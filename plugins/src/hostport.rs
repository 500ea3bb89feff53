// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Host-port plugin: no service at all. Ports come from a shared host-port
//! window (allocated before scheduling, so they are safe on whichever node
//! the pod lands), are stamped onto the pod as `containerPort:hostPort`
//! assignments, and exposure goes through the node address.

use crate::common::{fan_out_record, release_scope, ReleaseScope};
use crate::errors::PluginResult;
use crate::plugin::{network_conf, NetworkPlugin};
use crate::status::{publish, publish_state};
use api::keys;
use api::{ClusterApi, NetworkAddress, NetworkPort, NetworkState, Pod};
use async_trait::async_trait;
use netconf::options::AllocOptions;
use netconf::{ConfPair, LbNetworkConf};
use portalloc::{AllocationRecord, LbAllocator, LbId};
use std::sync::RwLock;
use tracing::{info, warn};

fn pool() -> LbId {
    LbId::from("hostports")
}

pub struct HostPortPlugin {
    state: RwLock<LbAllocator>,
}

impl Default for HostPortPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPortPlugin {
    #[must_use]
    pub fn new() -> Self {
        let defaults = AllocOptions::host_port_defaults();
        Self {
            state: RwLock::new(LbAllocator::new(defaults.range, defaults.block_ports)),
        }
    }

    /// Parse a `target:host,...` annotation back into pairs.
    fn parse_assignments(raw: &str) -> Option<Vec<(u16, u16)>> {
        raw.split(',')
            .map(|entry| {
                let (target, host) = entry.split_once(':')?;
                Some((target.trim().parse().ok()?, host.trim().parse().ok()?))
            })
            .collect()
    }
}

#[async_trait]
impl NetworkPlugin for HostPortPlugin {
    fn name(&self) -> &'static str {
        "Cluster-HostPort"
    }

    fn alias(&self) -> &'static str {
        "hostport"
    }

    /// Host-port state has no service to replay; the pods themselves carry
    /// the assignments.
    async fn init(&self, cluster: &dyn ClusterApi, options: &[ConfPair]) -> PluginResult<()> {
        let opts = AllocOptions::host_port_defaults().overlay(options)?;
        let pods = cluster.list_pods(keys::MANAGED_BY, self.name()).await?;
        let mut alloc = LbAllocator::new(opts.range, opts.block_ports.iter().copied());
        for pod in &pods {
            let Some(raw) = pod.meta.annotation(keys::HOST_PORTS) else {
                continue;
            };
            let Some(assignments) = Self::parse_assignments(raw) else {
                warn!(pod = %pod.key(), "unparsable host-port annotation, skipping");
                continue;
            };
            if assignments
                .iter()
                .any(|(_, host)| !opts.range.contains(*host))
            {
                // Window changed since the assignment; externally managed.
                continue;
            }
            let conf = LbNetworkConf::parse_unbound(&network_conf(pod)).ok();
            let protocols = conf.map(|c| c.ports).unwrap_or_default();
            let record = if protocols.len() == assignments.len() {
                let hosts: Vec<u16> = assignments.iter().map(|(_, h)| *h).collect();
                fan_out_record(vec![pool()], None, &protocols, &hosts)
            } else {
                AllocationRecord {
                    lb_ids: vec![pool()],
                    ports: assignments.iter().map(|(_, h)| *h).collect(),
                    protocols: Vec::new(),
                    target_ports: assignments.iter().map(|(t, _)| *t).collect(),
                    bank: None,
                }
            };
            alloc.restore(&pod.key(), record);
        }
        info!(
            plugin = self.name(),
            pods = pods.len(),
            records = alloc.ledger().len(),
            "rebuilt host-port state from live pods"
        );
        *self.state.write().unwrap() = alloc;
        Ok(())
    }

    /// Allocation happens at admission so the ports are settled before the
    /// pod schedules.
    async fn on_pod_added(&self, _cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.meta.annotation(keys::HOST_PORTS).is_some() {
            return Ok(pod);
        }
        let conf = LbNetworkConf::parse_unbound(&network_conf(&pod))?;
        let assignments = {
            let mut state = self.state.write().unwrap();
            let (_, ports) = state.reserve(&[pool()], conf.ports_needed(), &pod.key())?;
            state.upsert(
                &pod.key(),
                fan_out_record(vec![pool()], None, &conf.ports, &ports),
            );
            conf.ports
                .iter()
                .zip(&ports)
                .map(|(pp, host)| format!("{}:{host}", pp.port))
                .collect::<Vec<_>>()
                .join(",")
        };
        pod.meta.set_annotation(keys::HOST_PORTS, assignments);
        pod.meta.set_label(keys::MANAGED_BY, self.name());
        Ok(pod)
    }

    async fn on_pod_updated(&self, _cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.network_status().is_none() {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        }
        let conf = LbNetworkConf::parse_unbound(&network_conf(&pod))?;
        let assignments = pod
            .meta
            .annotation(keys::HOST_PORTS)
            .and_then(Self::parse_assignments);
        let (Some(assignments), Some(pod_ip), Some(host_ip)) = (
            assignments,
            pod.status.pod_ip.clone(),
            pod.status.host_ip.clone(),
        ) else {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        };

        let mut internal_ports = Vec::new();
        let mut external_ports = Vec::new();
        for (pp, (target, host)) in conf.ports.iter().zip(&assignments) {
            for protocol in pp.kind.wire() {
                let name = format!("{target}-{}", protocol.to_string().to_ascii_lowercase());
                internal_ports.push(NetworkPort {
                    name: name.clone(),
                    port: *target,
                    protocol,
                });
                external_ports.push(NetworkPort {
                    name,
                    port: *host,
                    protocol,
                });
            }
        }
        publish(
            &mut pod,
            self.name(),
            NetworkState::Ready,
            vec![NetworkAddress {
                ip: Some(pod_ip),
                endpoint: None,
                ports: internal_ports,
            }],
            vec![NetworkAddress {
                ip: Some(host_ip),
                endpoint: None,
                ports: external_ports,
            }],
        );
        Ok(pod)
    }

    async fn on_pod_deleted(&self, cluster: &dyn ClusterApi, pod: &Pod) -> PluginResult<()> {
        let fixed = LbNetworkConf::parse_unbound(&network_conf(pod))
            .map(|c| c.fixed)
            .unwrap_or(false);
        match release_scope(cluster, pod, fixed).await? {
            ReleaseScope::Keep => {}
            ReleaseScope::Pod(key) => self.state.write().unwrap().release(&key),
            ReleaseScope::Workload(prefix) => {
                self.state.write().unwrap().release_owned_by(&prefix);
            }
        }
        Ok(())
    }
}
