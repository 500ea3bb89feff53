// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Cluster node-port plugin: allocates from the cluster-wide node-port
//! window with the same bitmap semantics as the LB families, materializes a
//! NodePort service, and exposes through the pod's host address.

use crate::common::{fan_out_record, release_scope, resolve_owner, ReleaseScope};
use crate::ensure::{converge_service, Converge};
use crate::errors::PluginResult;
use crate::plugin::{network_conf, NetworkPlugin};
use crate::service::ServiceBlueprint;
use crate::status::{external_addresses, internal_addresses, publish, publish_state};
use api::keys;
use api::{ClusterApi, NetworkState, Pod, ServiceType};
use async_trait::async_trait;
use netconf::options::AllocOptions;
use netconf::{config_hash, ConfPair, LbNetworkConf};
use portalloc::{LbAllocator, LbId};
use std::sync::RwLock;
use tracing::info;

/// The single shared pool key: node ports are cluster-scoped.
fn pool() -> LbId {
    LbId::from("cluster")
}

pub struct NodePortPlugin {
    state: RwLock<LbAllocator>,
}

impl Default for NodePortPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NodePortPlugin {
    #[must_use]
    pub fn new() -> Self {
        let defaults = AllocOptions::node_port_defaults();
        Self {
            state: RwLock::new(LbAllocator::new(defaults.range, defaults.block_ports)),
        }
    }

    fn allocate(&self, conf: &LbNetworkConf, pod_key: &str) -> PluginResult<Vec<u16>> {
        let mut state = self.state.write().unwrap();
        let needed = conf.ports_needed();
        if let Some(record) = state.lookup(pod_key)
            && record.distinct_ports().len() != needed
        {
            state.release(pod_key);
        }
        let (_, ports) = state.reserve(&[pool()], needed, pod_key)?;
        state.upsert(
            pod_key,
            fan_out_record(vec![pool()], None, &conf.ports, &ports),
        );
        Ok(ports)
    }
}

#[async_trait]
impl NetworkPlugin for NodePortPlugin {
    fn name(&self) -> &'static str {
        "Cluster-NodePort"
    }

    fn alias(&self) -> &'static str {
        "nodeport"
    }

    async fn init(&self, cluster: &dyn ClusterApi, options: &[ConfPair]) -> PluginResult<()> {
        let opts = AllocOptions::node_port_defaults().overlay(options)?;
        let services = cluster.list_services(keys::MANAGED_BY, self.name()).await?;
        let mut alloc = LbAllocator::new(opts.range, opts.block_ports.iter().copied());
        alloc.rebuild(&services);
        info!(
            plugin = self.name(),
            services = services.len(),
            "rebuilt node-port state from live services"
        );
        *self.state.write().unwrap() = alloc;
        Ok(())
    }

    async fn on_pod_added(&self, _cluster: &dyn ClusterApi, pod: Pod) -> PluginResult<Pod> {
        Ok(pod)
    }

    async fn on_pod_updated(&self, cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.network_status().is_none() {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        }
        let conf = LbNetworkConf::parse_unbound(&network_conf(&pod))?;
        let fingerprint = config_hash(&conf)?;
        let ports = self.allocate(&conf, &pod.key())?;

        let mut blueprint = ServiceBlueprint::for_pod(&pod, self.name());
        blueprint.owner = resolve_owner(cluster, &pod, conf.fixed).await?;
        blueprint.service_type = ServiceType::NodePort;
        blueprint.node_port_allocation = true;
        blueprint.lb_id = Some(pool().to_string());
        blueprint.external_ports = ports;
        blueprint.port_protocols = conf.ports.clone();
        blueprint.fingerprint = fingerprint;
        blueprint.external_traffic_policy = conf.external_traffic_policy;
        blueprint.allow_not_ready = conf.allow_not_ready;

        let outcome =
            converge_service(cluster, &pod, blueprint.render(), ServiceType::NodePort).await?;
        if let Converge::Ready(svc) = outcome {
            // Host address published by the kubelet; without it there is
            // nothing to expose yet.
            let external = external_addresses(&pod, &svc);
            if external.is_empty() {
                publish_state(&mut pod, self.name(), NetworkState::NotReady);
            } else {
                let internal = internal_addresses(&pod, &svc);
                publish(&mut pod, self.name(), NetworkState::Ready, internal, external);
            }
        } else {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
        }
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
