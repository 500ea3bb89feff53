// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Direct load-balancer plugin: one service per pod, ports allocated from a
//! caller-specified LB pool. Pods share the LBs but every pod holds its own
//! disjoint external ports.

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
use tracing::{debug, info};

pub struct DirectLbPlugin {
    state: RwLock<LbAllocator>,
}

impl Default for DirectLbPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectLbPlugin {
    #[must_use]
    pub fn new() -> Self {
        let defaults = AllocOptions::lb_defaults();
        Self {
            state: RwLock::new(LbAllocator::new(defaults.range, defaults.block_ports)),
        }
    }

    /// Reserve (or re-find) this pod's ports. Locked section only; no I/O.
    fn allocate(&self, conf: &LbNetworkConf, pod_key: &str) -> PluginResult<(LbId, Vec<u16>)> {
        let mut state = self.state.write().unwrap();
        let needed = conf.ports_needed();
        if let Some(record) = state.lookup(pod_key)
            && record.distinct_ports().len() != needed
        {
            // Config changed shape; start the allocation over.
            state.release(pod_key);
        }
        let (lb, ports) = state.reserve(&conf.lb_ids, needed, pod_key)?;
        state.upsert(
            pod_key,
            fan_out_record(vec![lb.clone()], None, &conf.ports, &ports),
        );
        Ok((lb, ports))
    }
}

#[async_trait]
impl NetworkPlugin for DirectLbPlugin {
    fn name(&self) -> &'static str {
        "Cloud-LB"
    }

    fn alias(&self) -> &'static str {
        "lb"
    }

    async fn init(&self, cluster: &dyn ClusterApi, options: &[ConfPair]) -> PluginResult<()> {
        let opts = AllocOptions::lb_defaults().overlay(options)?;
        let services = cluster.list_services(keys::MANAGED_BY, self.name()).await?;
        let mut alloc = LbAllocator::new(opts.range, opts.block_ports.iter().copied());
        alloc.rebuild(&services);
        info!(
            plugin = self.name(),
            services = services.len(),
            records = alloc.ledger().len(),
            "rebuilt allocation state from live services"
        );
        *self.state.write().unwrap() = alloc;
        Ok(())
    }

    async fn on_pod_added(&self, _cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if let Ok(conf) = LbNetworkConf::parse(&network_conf(&pod))
            && conf.allow_not_ready
            && !pod
                .spec
                .readiness_gates
                .iter()
                .any(|g| g == keys::READINESS_GATE)
        {
            pod.spec.readiness_gates.push(keys::READINESS_GATE.to_owned());
        }
        Ok(pod)
    }

    async fn on_pod_updated(&self, cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.network_status().is_none() {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        }
        let conf = LbNetworkConf::parse(&network_conf(&pod))?;
        let fingerprint = config_hash(&conf)?;
        let (lb, ports) = self.allocate(&conf, &pod.key())?;

        let mut blueprint = ServiceBlueprint::for_pod(&pod, self.name());
        blueprint.owner = resolve_owner(cluster, &pod, conf.fixed).await?;
        blueprint.lb_id = Some(lb.to_string());
        blueprint.external_ports = ports;
        blueprint.port_protocols = conf.ports.clone();
        blueprint.fingerprint = fingerprint;
        blueprint.external_traffic_policy = conf.external_traffic_policy;
        blueprint.allow_not_ready = conf.allow_not_ready;
        blueprint.health = Some(conf.health.clone());

        let outcome =
            converge_service(cluster, &pod, blueprint.render(), ServiceType::LoadBalancer).await?;
        if let Converge::Ready(svc) = outcome {
            let internal = internal_addresses(&pod, &svc);
            let external = external_addresses(&pod, &svc);
            publish(&mut pod, self.name(), NetworkState::Ready, internal, external);
        } else {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
        }
        Ok(pod)
    }

    async fn on_pod_deleted(&self, cluster: &dyn ClusterApi, pod: &Pod) -> PluginResult<()> {
        let fixed = LbNetworkConf::parse(&network_conf(pod))
            .map(|c| c.fixed)
            .unwrap_or(false);
        match release_scope(cluster, pod, fixed).await? {
            ReleaseScope::Keep => {
                debug!(pod = %pod.key(), "fixed lifecycle, keeping allocation");
            }
            ReleaseScope::Pod(key) => {
                self.state.write().unwrap().release(&key);
            }
            ReleaseScope::Workload(prefix) => {
                let released = self.state.write().unwrap().release_owned_by(&prefix);
                debug!(%prefix, released, "workload torn down, released its allocations");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::testing::FakeCluster;
    use api::{LoadBalancerIngress, ObjectMeta, Protocol, Workload};
    use pretty_assertions::assert_eq;

    fn pod_with_conf(name: &str, conf: &str) -> Pod {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", name),
            ..Pod::default()
        };
        pod.meta.uid = format!("uid-{name}");
        pod.meta.set_annotation(keys::NETWORK_TYPE, "Cloud-LB");
        pod.meta.set_annotation(keys::NETWORK_CONF, conf);
        pod.status.pod_ip = Some("10.0.0.12".to_owned());
        pod
    }

    fn window_options() -> Vec<ConfPair> {
        vec![
            ConfPair::new("MinPort", "512"),
            ConfPair::new("MaxPort", "712"),
        ]
    }

    const SIMPLE_CONF: &str =
        r#"[{"name":"SlbIds","value":"lb-A"},{"name":"PortProtocols","value":"80"}]"#;

    #[tokio::test]
    async fn allocates_lowest_port_and_materializes_the_service() {
        let cluster = FakeCluster::new();
        let plugin = DirectLbPlugin::new();
        plugin.init(&cluster, &window_options()).await.unwrap();

        let pod = pod_with_conf("p-0", SIMPLE_CONF);
        // First pass only initializes the status annotation.
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        assert_eq!(
            pod.network_status().unwrap().current_state,
            NetworkState::NotReady
        );

        // Second pass allocates and creates the service.
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let svc = cluster.service("game", "p-0").expect("service created");
        assert_eq!(svc.spec.ports.len(), 1);
        assert_eq!(svc.spec.ports[0].port, 512);
        assert_eq!(svc.spec.ports[0].protocol, Protocol::Tcp);
        assert_eq!(svc.spec.ports[0].target_port, 80);
        assert_eq!(svc.annotation(keys::LB_ID), Some("lb-A"));

        // Ingress published: the pod turns Ready with translated addresses.
        cluster.publish_ingress(
            "game",
            "p-0",
            LoadBalancerIngress {
                ip: Some("203.0.113.9".to_owned()),
                hostname: None,
            },
        );
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let status = pod.network_status().unwrap();
        assert_eq!(status.current_state, NetworkState::Ready);
        assert_eq!(
            status.external_addresses[0].ip.as_deref(),
            Some("203.0.113.9")
        );
        assert_eq!(status.external_addresses[0].ports[0].port, 512);
        assert_eq!(
            status.internal_addresses[0].ip.as_deref(),
            Some("10.0.0.12")
        );
        assert_eq!(status.internal_addresses[0].ports[0].port, 80);
    }

    #[tokio::test]
    async fn block_list_produces_no_available_ports() {
        let cluster = FakeCluster::new();
        let plugin = DirectLbPlugin::new();
        plugin
            .init(
                &cluster,
                &[
                    ConfPair::new("MinPort", "8000"),
                    ConfPair::new("MaxPort", "8002"),
                    ConfPair::new("BlockPorts", "8001"),
                ],
            )
            .await
            .unwrap();

        // Three target ports cannot fit the two unblocked slots.
        let conf = r#"[{"name":"SlbIds","value":"lb-A"},{"name":"PortProtocols","value":"80,81,82"}]"#;
        let pod = pod_with_conf("p-0", conf);
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let err = plugin.on_pod_updated(&cluster, pod).await.unwrap_err();
        assert!(matches!(err, crate::errors::PluginError::Parameter(_)));
        assert!(err.to_string().contains("no available ports"));

        // Two ports fit, skipping the blocked one.
        let conf =
            r#"[{"name":"SlbIds","value":"lb-A"},{"name":"PortProtocols","value":"80/TCP,80/UDP"}]"#;
        let pod = pod_with_conf("p-1", conf);
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let svc = cluster.service("game", "p-1").unwrap();
        let ports: Vec<u16> = svc.spec.ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![8000, 8002]);
    }

    #[tokio::test]
    async fn config_drift_rebuilds_and_goes_not_ready() {
        let cluster = FakeCluster::new();
        let plugin = DirectLbPlugin::new();
        plugin.init(&cluster, &window_options()).await.unwrap();

        let pod = pod_with_conf("p-0", SIMPLE_CONF);
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        cluster.publish_ingress(
            "game",
            "p-0",
            LoadBalancerIngress {
                ip: Some("203.0.113.9".to_owned()),
                hostname: None,
            },
        );
        let mut pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        assert_eq!(
            pod.network_status().unwrap().current_state,
            NetworkState::Ready
        );

        // A different traffic policy reaches the service: fingerprint moves.
        pod.meta.set_annotation(
            keys::NETWORK_CONF,
            r#"[{"name":"SlbIds","value":"lb-A"},{"name":"PortProtocols","value":"80"},{"name":"ExternalTrafficPolicyType","value":"Cluster"}]"#,
        );
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        assert_eq!(
            pod.network_status().unwrap().current_state,
            NetworkState::NotReady
        );
        let svc = cluster.service("game", "p-0").unwrap();
        assert_eq!(
            svc.spec.external_traffic_policy,
            api::ExternalTrafficPolicy::Cluster
        );
    }

    #[tokio::test]
    async fn fixed_lifecycle_release_follows_the_owner() {
        let cluster = FakeCluster::new();
        let plugin = DirectLbPlugin::new();
        plugin.init(&cluster, &window_options()).await.unwrap();
        cluster.seed_workload(Workload {
            meta: ObjectMeta::named("game", "ranked"),
            replicas: 2,
        });

        let conf = r#"[{"name":"SlbIds","value":"lb-A"},{"name":"PortProtocols","value":"80"},{"name":"Fixed","value":"true"}]"#;
        let mut pod = pod_with_conf("ranked-0", conf);
        pod.meta.set_label(keys::OWNER_WORKLOAD, "ranked");
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        assert!(plugin.state.read().unwrap().lookup("game/ranked-0").is_some());

        // Owner alive: deletion keeps the allocation.
        plugin.on_pod_deleted(&cluster, &pod).await.unwrap();
        assert!(plugin.state.read().unwrap().lookup("game/ranked-0").is_some());

        // Owner deleting: the whole prefix is swept.
        let mut workload = Workload {
            meta: ObjectMeta::named("game", "ranked"),
            replicas: 2,
        };
        workload.meta.deletion_timestamp = Some(chrono::Utc::now());
        cluster.seed_workload(workload);
        plugin.on_pod_deleted(&cluster, &pod).await.unwrap();
        assert!(plugin.state.read().unwrap().lookup("game/ranked-0").is_none());
    }

    #[tokio::test]
    async fn init_rebuild_reclaims_live_allocations() {
        let cluster = FakeCluster::new();
        let plugin = DirectLbPlugin::new();
        plugin.init(&cluster, &window_options()).await.unwrap();

        // Materialize a service, then simulate a restart.
        let pod = pod_with_conf("p-0", SIMPLE_CONF);
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        plugin.on_pod_updated(&cluster, pod).await.unwrap();

        let restarted = DirectLbPlugin::new();
        restarted.init(&cluster, &window_options()).await.unwrap();
        let record = restarted
            .state
            .read()
            .unwrap()
            .lookup("game/p-0")
            .cloned()
            .expect("record rebuilt from service");
        assert_eq!(record.ports, vec![512]);
        assert_eq!(record.lb_ids, vec![LbId::from("lb-A")]);

        // The rebuilt bitmap keeps 512 used: a new pod gets 513.
        let pod = pod_with_conf("p-1", SIMPLE_CONF);
        let pod = restarted.on_pod_updated(&cluster, pod).await.unwrap();
        restarted.on_pod_updated(&cluster, pod).await.unwrap();
        let svc = cluster.service("game", "p-1").unwrap();
        assert_eq!(svc.spec.ports[0].port, 513);
    }
}
