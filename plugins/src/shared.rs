// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Shared-LB plugin: every pod of a workload shares one load balancer's
//! listeners. The plugin tracks a backend counter per LB instead of ports;
//! each pod is labeled with its chosen LB so the per-LB service selector
//! enrolls it.

use crate::common::{release_scope, resolve_owner, ReleaseScope};
use crate::ensure::{converge_service, Converge};
use crate::errors::{PluginError, PluginResult};
use crate::plugin::{network_conf, NetworkPlugin};
use crate::service::ServiceBlueprint;
use crate::status::{external_addresses, internal_addresses, publish, publish_state};
use ahash::AHashMap;
use api::keys;
use api::{ClusterApi, NetworkState, Pod, ServiceType};
use async_trait::async_trait;
use netconf::{config_hash, ConfPair, LbNetworkConf};
use portalloc::LbId;
use std::sync::RwLock;
use tracing::{debug, info};

/// Listener backends one load balancer can take.
const MAX_BACKENDS: usize = 200;

#[derive(Default)]
struct SharedState {
    backends: AHashMap<LbId, usize>,
}

pub struct SharedLbPlugin {
    state: RwLock<SharedState>,
}

impl Default for SharedLbPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedLbPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SharedState::default()),
        }
    }

    /// Lowest-count LB under the cap, ties broken by caller order.
    fn pick(&self, lb_set: &[LbId]) -> PluginResult<LbId> {
        let mut state = self.state.write().unwrap();
        let chosen = lb_set
            .iter()
            .map(|lb| (lb, state.backends.get(lb).copied().unwrap_or(0)))
            .filter(|(_, count)| *count < MAX_BACKENDS)
            .min_by_key(|(_, count)| *count)
            .map(|(lb, _)| lb.clone());
        let Some(lb) = chosen else {
            return Err(PluginError::Parameter(format!(
                "upper limit: every load balancer already carries {MAX_BACKENDS} backends"
            )));
        };
        *state.backends.entry(lb.clone()).or_insert(0) += 1;
        Ok(lb)
    }

    fn unpick(&self, lb: &LbId) {
        let mut state = self.state.write().unwrap();
        if let Some(count) = state.backends.get_mut(lb) {
            *count = count.saturating_sub(1);
        }
    }

    fn service_name(lb: &LbId) -> String {
        format!("shared-{lb}")
    }
}

#[async_trait]
impl NetworkPlugin for SharedLbPlugin {
    fn name(&self) -> &'static str {
        "Cloud-LB-SharedPort"
    }

    fn alias(&self) -> &'static str {
        "lb-sp"
    }

    async fn init(&self, cluster: &dyn ClusterApi, _options: &[ConfPair]) -> PluginResult<()> {
        let services = cluster.list_services(keys::MANAGED_BY, self.name()).await?;
        let mut backends = AHashMap::new();
        for svc in &services {
            let Some(lb) = svc.annotation(keys::LB_ID) else {
                continue;
            };
            let enrolled = cluster.list_pods(keys::SHARED_LB, lb).await?;
            backends.insert(LbId::from(lb), enrolled.len());
        }
        info!(
            plugin = self.name(),
            lbs = backends.len(),
            "rebuilt backend counters from live services"
        );
        self.state.write().unwrap().backends = backends;
        Ok(())
    }

    async fn on_pod_added(&self, _cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.meta.label(keys::SHARED_LB).is_some() {
            return Ok(pod);
        }
        let conf = LbNetworkConf::parse(&network_conf(&pod))?;
        let lb = self.pick(&conf.lb_ids)?;
        debug!(pod = %pod.key(), %lb, "enrolled on shared load balancer");
        pod.meta.set_label(keys::SHARED_LB, lb.as_str());
        Ok(pod)
    }

    async fn on_pod_updated(&self, cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.network_status().is_none() {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        }
        let conf = LbNetworkConf::parse(&network_conf(&pod))?;
        let Some(lb) = pod.meta.label(keys::SHARED_LB).map(LbId::from) else {
            // Not enrolled yet; the add hook runs first.
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        };
        let fingerprint = config_hash(&conf)?;

        let mut blueprint = ServiceBlueprint::for_pod(&pod, self.name());
        blueprint.name = Self::service_name(&lb);
        blueprint.selector.clear();
        blueprint
            .selector
            .insert(keys::SHARED_LB.to_owned(), lb.as_str().to_owned());
        // The shared service outlives any single pod; it belongs to the
        // workload whenever one is resolvable.
        blueprint.owner = resolve_owner(cluster, &pod, true).await?;
        blueprint.lb_id = Some(lb.to_string());
        // Shared listeners: the external port is the listener port itself.
        blueprint.external_ports = conf.ports.iter().map(|pp| pp.port).collect();
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
        let Some(lb) = pod.meta.label(keys::SHARED_LB).map(LbId::from) else {
            return Ok(());
        };
        let fixed = LbNetworkConf::parse(&network_conf(pod))
            .map(|c| c.fixed)
            .unwrap_or(false);
        match release_scope(cluster, pod, fixed).await? {
            ReleaseScope::Keep => {}
            ReleaseScope::Pod(_) | ReleaseScope::Workload(_) => self.unpick(&lb),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::testing::FakeCluster;
    use api::{LoadBalancerIngress, ObjectMeta};
    use pretty_assertions::assert_eq;

    const CONF: &str =
        r#"[{"name":"SlbIds","value":"lb-A,lb-B"},{"name":"PortProtocols","value":"7000,7001/UDP"}]"#;

    fn pod_with_conf(name: &str) -> Pod {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", name),
            ..Pod::default()
        };
        pod.meta.uid = format!("uid-{name}");
        pod.meta.set_annotation(keys::NETWORK_TYPE, "Cloud-LB-SharedPort");
        pod.meta.set_annotation(keys::NETWORK_CONF, CONF);
        pod.status.pod_ip = Some("10.0.0.12".to_owned());
        pod
    }

    #[tokio::test]
    async fn enrollment_balances_across_the_lb_set() {
        let cluster = FakeCluster::new();
        let plugin = SharedLbPlugin::new();
        plugin.init(&cluster, &[]).await.unwrap();

        let a = plugin
            .on_pod_added(&cluster, pod_with_conf("p-0"))
            .await
            .unwrap();
        let b = plugin
            .on_pod_added(&cluster, pod_with_conf("p-1"))
            .await
            .unwrap();
        // First pod fills lb-A to 1; second balances onto lb-B.
        assert_eq!(a.meta.label(keys::SHARED_LB), Some("lb-A"));
        assert_eq!(b.meta.label(keys::SHARED_LB), Some("lb-B"));

        // Re-running the hook never re-enrolls.
        let again = plugin.on_pod_added(&cluster, a.clone()).await.unwrap();
        assert_eq!(again.meta.label(keys::SHARED_LB), Some("lb-A"));
    }

    #[tokio::test]
    async fn the_backend_cap_is_an_upper_limit_error() {
        let cluster = FakeCluster::new();
        let plugin = SharedLbPlugin::new();
        {
            let mut state = plugin.state.write().unwrap();
            state.backends.insert(LbId::from("lb-A"), MAX_BACKENDS);
            state.backends.insert(LbId::from("lb-B"), MAX_BACKENDS);
        }
        let err = plugin
            .on_pod_added(&cluster, pod_with_conf("p-0"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upper limit"));
    }

    #[tokio::test]
    async fn shared_service_selects_by_the_lb_label() {
        let cluster = FakeCluster::new();
        let plugin = SharedLbPlugin::new();
        let pod = plugin
            .on_pod_added(&cluster, pod_with_conf("p-0"))
            .await
            .unwrap();
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();

        let svc = cluster.service("game", "shared-lb-A").expect("shared service");
        assert_eq!(
            svc.spec.selector.get(keys::SHARED_LB),
            Some(&"lb-A".to_owned())
        );
        // Listener ports pass straight through.
        let ports: Vec<u16> = svc.spec.ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![7000, 7001]);

        cluster.publish_ingress(
            "game",
            "shared-lb-A",
            LoadBalancerIngress {
                ip: Some("203.0.113.20".to_owned()),
                hostname: None,
            },
        );
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let status = pod.network_status().unwrap();
        assert_eq!(status.current_state, NetworkState::Ready);
        assert_eq!(status.external_addresses[0].ports[0].port, 7000);
    }

    #[tokio::test]
    async fn deletion_decrements_the_backend_counter() {
        let cluster = FakeCluster::new();
        let plugin = SharedLbPlugin::new();
        let pod = plugin
            .on_pod_added(&cluster, pod_with_conf("p-0"))
            .await
            .unwrap();
        assert_eq!(
            plugin.state.read().unwrap().backends.get(&LbId::from("lb-A")),
            Some(&1)
        );
        plugin.on_pod_deleted(&cluster, &pod).await.unwrap();
        assert_eq!(
            plugin.state.read().unwrap().backends.get(&LbId::from("lb-A")),
            Some(&0)
        );
        // Idempotent on the floor.
        plugin.on_pod_deleted(&cluster, &pod).await.unwrap();
        assert_eq!(
            plugin.state.read().unwrap().backends.get(&LbId::from("lb-A")),
            Some(&0)
        );
    }
}
