// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Auto-scaled LB pool plugin.
//!
//! Instead of a caller-specified LB list, the pool size is computed from
//! the workload's largest observed ordinal and the per-LB port capacity.
//! The plugin grows the pool by creating provider-native LB instance
//! custom resources; it never shrinks automatically. Pod-to-LB and
//! pod-to-port mapping is purely deterministic, so no ledger is needed.

use crate::ensure::{converge_service, Converge};
use crate::errors::{PluginError, PluginResult};
use crate::plugin::{network_conf, NetworkPlugin};
use crate::service::ServiceBlueprint;
use crate::status::{external_addresses, internal_addresses, publish, publish_state};
use ahash::AHashMap;
use api::keys;
use api::{
    ClusterApi, LbInstance, LbInstanceSpec, NetworkAddress, NetworkState, ObjectMeta, Pod,
    ServiceType,
};
use async_trait::async_trait;
use netconf::options::AutoLbOptions;
use netconf::{config_hash, AutoLbConf, ConfPair};
use std::sync::RwLock;
use tracing::{debug, info};

struct AutoState {
    options: AutoLbOptions,
    /// Largest ordinal ever observed per workload key. Only ratchets up,
    /// so the expected pool size never oscillates on scale-down; shrinking
    /// is an operator action.
    max_pod_index: AHashMap<String, usize>,
}

pub struct AutoLbPlugin {
    state: RwLock<AutoState>,
}

impl Default for AutoLbPlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool size for a given high-water ordinal: enough LBs for every pod up
/// to it, plus the reserve, plus one warm spare.
fn expected_instances(max_pod_index: usize, pods_per_lb: usize, reserve: usize) -> usize {
    max_pod_index / pods_per_lb + reserve + 1
}

fn instance_name(workload: &str, isp: Option<&str>, index: usize) -> String {
    match isp {
        Some(isp) => format!("{workload}-{isp}-{index}"),
        None => format!("{workload}-{index}"),
    }
}

impl AutoLbPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AutoState {
                options: AutoLbOptions::default(),
                max_pod_index: AHashMap::new(),
            }),
        }
    }

    /// Ratchet the workload's high-water ordinal and capture everything the
    /// deterministic mapping needs, under one short lock.
    fn plan(
        &self,
        workload_key: &str,
        ordinal: usize,
        ports_per_pod: usize,
    ) -> PluginResult<PoolPlan> {
        let mut state = self.state.write().unwrap();
        let usable: Vec<u16> = {
            let opts = &state.options.alloc;
            opts.range
                .iter()
                .filter(|p| !opts.block_ports.contains(p))
                .collect()
        };
        let pods_per_lb = usable.len() / ports_per_pod;
        if pods_per_lb == 0 {
            return Err(PluginError::Parameter(format!(
                "allocation window fits no pod: {} usable ports for {ports_per_pod} targets",
                usable.len()
            )));
        }
        let reserve = state.options.reserve_lbs;
        let high_water = state
            .max_pod_index
            .entry(workload_key.to_owned())
            .or_insert(0);
        *high_water = (*high_water).max(ordinal);
        let expected = expected_instances(*high_water, pods_per_lb, reserve);

        let slot = ordinal % pods_per_lb;
        Ok(PoolPlan {
            expected,
            lb_index: ordinal / pods_per_lb,
            ports: usable[slot * ports_per_pod..(slot + 1) * ports_per_pod].to_vec(),
        })
    }
}

struct PoolPlan {
    expected: usize,
    lb_index: usize,
    ports: Vec<u16>,
}

#[async_trait]
impl NetworkPlugin for AutoLbPlugin {
    fn name(&self) -> &'static str {
        "Cloud-AutoLB"
    }

    fn alias(&self) -> &'static str {
        "auto-lb"
    }

    async fn init(&self, _cluster: &dyn ClusterApi, options: &[ConfPair]) -> PluginResult<()> {
        let opts = AutoLbOptions::default().overlay(options)?;
        info!(plugin = self.name(), "pool options loaded");
        let mut state = self.state.write().unwrap();
        state.options = opts;
        // The ordinal ratchet regrows as pods reconcile; pool size only
        // ever moves up from what the instances already materialize.
        state.max_pod_index.clear();
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
        let conf = AutoLbConf::parse(&network_conf(&pod))?;
        let fingerprint = config_hash(&conf)?;
        let Some(ordinal) = pod.ordinal() else {
            return Err(PluginError::Parameter(format!(
                "pod name {} carries no ordinal suffix",
                pod.meta.name
            )));
        };
        let Some(workload) = pod.owner_workload().map(ToOwned::to_owned) else {
            return Err(PluginError::Parameter(
                "pod carries no owner-workload label".to_owned(),
            ));
        };

        let group = format!("{}-{}", pod.meta.namespace, workload);
        let plan = self.plan(&group, ordinal, conf.ports.len())?;

        // Grow the pool to the expected size, every ISP variant.
        let variants: Vec<Option<&str>> = if conf.isps.is_empty() {
            vec![None]
        } else {
            conf.isps.iter().map(|isp| Some(isp.as_str())).collect()
        };
        let instances = cluster.list_lb_instances(&group).await?;
        for variant in &variants {
            for index in 0..plan.expected {
                let name = instance_name(&workload, *variant, index);
                if !instances.iter().any(|i| i.meta.name == name) {
                    debug!(%group, instance = %name, "growing load-balancer pool");
                    cluster
                        .create_lb_instance(LbInstance {
                            meta: ObjectMeta::named(&pod.meta.namespace, &name),
                            spec: LbInstanceSpec {
                                group: group.clone(),
                                isp: variant.map(ToOwned::to_owned),
                            },
                            ..LbInstance::default()
                        })
                        .await?;
                }
            }
        }

        // Every variant's instance for this pod must be fulfilled.
        let mut bound = Vec::with_capacity(variants.len());
        for variant in &variants {
            let name = instance_name(&workload, *variant, plan.lb_index);
            let lb_id = instances
                .iter()
                .find(|i| i.meta.name == name && i.status.ready)
                .and_then(|i| i.status.lb_id.clone());
            match lb_id {
                Some(lb_id) => bound.push((*variant, lb_id)),
                None => {
                    publish_state(&mut pod, self.name(), NetworkState::NotReady);
                    return Ok(pod);
                }
            }
        }

        let mut ready_services = Vec::with_capacity(bound.len());
        for (variant, lb_id) in &bound {
            let mut blueprint = ServiceBlueprint::for_pod(&pod, self.name());
            if let Some(isp) = variant {
                blueprint.name = format!("{}-{isp}", pod.meta.name);
                blueprint.extra_annotations = vec![(keys::LB_GROUP, (*isp).to_owned())];
            }
            blueprint.lb_id = Some(lb_id.clone());
            blueprint.external_ports = plan.ports.clone();
            blueprint.port_protocols = conf.ports.clone();
            blueprint.fingerprint = fingerprint.clone();
            blueprint.external_traffic_policy = conf.external_traffic_policy;
            blueprint.allow_not_ready = conf.allow_not_ready;
            blueprint.health = Some(conf.health.clone());

            let outcome = converge_service(
                cluster,
                &pod,
                blueprint.render(),
                ServiceType::LoadBalancer,
            )
            .await?;
            if let Converge::Ready(svc) = outcome {
                ready_services.push(svc);
            }
        }

        if ready_services.len() == variants.len() {
            let internal = internal_addresses(&pod, &ready_services[0]);
            let external: Vec<NetworkAddress> = ready_services
                .iter()
                .flat_map(|svc| external_addresses(&pod, svc))
                .collect();
            publish(&mut pod, self.name(), NetworkState::Ready, internal, external);
        } else {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
        }
        Ok(pod)
    }

    async fn on_pod_deleted(&self, cluster: &dyn ClusterApi, pod: &Pod) -> PluginResult<()> {
        // Mapping is deterministic, nothing per-pod to free. Drop the
        // ratchet once the owning workload is gone.
        let Some(workload) = pod.owner_workload() else {
            return Ok(());
        };
        let gone = match cluster.get_workload(&pod.meta.namespace, workload).await? {
            None => true,
            Some(w) => w.is_deleting(),
        };
        if gone {
            let group = format!("{}-{}", pod.meta.namespace, workload);
            self.state.write().unwrap().max_pod_index.remove(&group);
        }
        Ok(())
    }
}
