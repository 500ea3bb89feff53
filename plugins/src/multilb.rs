// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Multi-LB plugin for multi-ISP exposure.
//!
//! The config names `{LBid}/{groupName}` pairs; the k-th LB of every group
//! forms bank k. Ports are chosen once per bank and programmed on every LB
//! in it, so a pod is reachable on the same external ports through each
//! carrier. One service is materialized per (pod, group).

use crate::common::{fan_out_record, release_scope, resolve_owner, ReleaseScope};
use crate::ensure::{converge_service, Converge};
use crate::errors::PluginResult;
use crate::plugin::{network_conf, NetworkPlugin};
use crate::service::ServiceBlueprint;
use crate::status::{external_addresses, internal_addresses, publish, publish_state};
use api::keys;
use api::{ClusterApi, NetworkAddress, NetworkState, Pod, ServiceType};
use async_trait::async_trait;
use netconf::options::AllocOptions;
use netconf::{config_hash, ConfPair, MultiLbConf};
use portalloc::{Ledger, LbId, PortSpace};
use std::sync::RwLock;
use tracing::{info, warn};

struct MultiState {
    space: PortSpace<usize>,
    ledger: Ledger,
}

impl MultiState {
    fn new(opts: &AllocOptions) -> Self {
        Self {
            space: PortSpace::new(opts.range, opts.block_ports.iter().copied()),
            ledger: Ledger::new(),
        }
    }

    fn release_key(&mut self, pod_key: &str) {
        if let Some(record) = self.ledger.delete(pod_key) {
            match record.bank {
                Some(bank) => self.space.release(&bank, &record.distinct_ports()),
                None => warn!(pod = pod_key, "record without a bank index, nothing to free"),
            }
        }
    }

    fn release_prefix(&mut self, prefix: &str) -> usize {
        let keys = self.ledger.keys_with_prefix(prefix);
        let released = keys.len();
        for key in keys {
            self.release_key(&key);
        }
        released
    }
}

pub struct MultiLbPlugin {
    state: RwLock<MultiState>,
}

impl Default for MultiLbPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiLbPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MultiState::new(&AllocOptions::lb_defaults())),
        }
    }

    /// Reserve (or re-find) a bank and its ports for this pod.
    fn allocate(&self, conf: &MultiLbConf, pod_key: &str) -> PluginResult<(usize, Vec<u16>)> {
        let mut state = self.state.write().unwrap();
        let needed = conf.ports.len();
        if let Some(record) = state.ledger.lookup(pod_key) {
            if let Some(bank) = record.bank
                && record.distinct_ports().len() == needed
                && bank < conf.bank_count()
            {
                return Ok((bank, record.distinct_ports()));
            }
            state.release_key(pod_key);
        }
        let banks: Vec<usize> = (0..conf.bank_count()).collect();
        let (bank, ports) = state.space.reserve_first_fit(&banks, needed)?;
        let lbs: Vec<LbId> = conf
            .bank(bank)
            .into_iter()
            .map(|(_, lb)| lb.clone())
            .collect();
        state
            .ledger
            .upsert(pod_key, fan_out_record(lbs, Some(bank), &conf.ports, &ports));
        Ok((bank, ports))
    }
}

#[async_trait]
impl NetworkPlugin for MultiLbPlugin {
    fn name(&self) -> &'static str {
        "Cloud-MultiLB"
    }

    fn alias(&self) -> &'static str {
        "multi-lb"
    }

    async fn init(&self, cluster: &dyn ClusterApi, options: &[ConfPair]) -> PluginResult<()> {
        let opts = AllocOptions::lb_defaults().overlay(options)?;
        let services = cluster.list_services(keys::MANAGED_BY, self.name()).await?;
        let mut state = MultiState::new(&opts);
        state.ledger = Ledger::rebuild(&services, opts.range);
        let marks: Vec<(usize, Vec<u16>)> = state
            .ledger
            .iter()
            .filter_map(|(_, rec)| rec.bank.map(|b| (b, rec.distinct_ports())))
            .collect();
        for (bank, ports) in marks {
            state.space.mark_used(&bank, &ports);
        }
        info!(
            plugin = self.name(),
            services = services.len(),
            records = state.ledger.len(),
            "rebuilt bank allocations from live services"
        );
        *self.state.write().unwrap() = state;
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
        let conf = MultiLbConf::parse(&network_conf(&pod))?;
        let fingerprint = config_hash(&conf)?;
        let (bank, ports) = self.allocate(&conf, &pod.key())?;
        let owner = resolve_owner(cluster, &pod, conf.fixed).await?;

        let mut ready_services = Vec::with_capacity(conf.groups.len());
        for group in &conf.groups {
            let lb = &group.lb_ids[bank];
            let mut blueprint = ServiceBlueprint::for_pod(&pod, self.name());
            blueprint.name = format!("{}-{}", pod.meta.name, group.name);
            blueprint.owner = owner.clone();
            blueprint.lb_id = Some(lb.to_string());
            blueprint.external_ports = ports.clone();
            blueprint.port_protocols = conf.ports.clone();
            blueprint.fingerprint = fingerprint.clone();
            blueprint.external_traffic_policy = conf.external_traffic_policy;
            blueprint.allow_not_ready = conf.allow_not_ready;
            blueprint.health = Some(conf.health.clone());
            blueprint.extra_annotations = vec![
                (keys::LB_BANK, bank.to_string()),
                (keys::LB_GROUP, group.name.clone()),
            ];

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

        if ready_services.len() == conf.groups.len() {
            let internal = internal_addresses(&pod, &ready_services[0]);
            // Exposure through every carrier: the external list is the
            // union over the group services.
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
        let fixed = MultiLbConf::parse(&network_conf(pod))
            .map(|c| c.fixed)
            .unwrap_or(false);
        match release_scope(cluster, pod, fixed).await? {
            ReleaseScope::Keep => {}
            ReleaseScope::Pod(key) => self.state.write().unwrap().release_key(&key),
            ReleaseScope::Workload(prefix) => {
                self.state.write().unwrap().release_prefix(&prefix);
            }
        }
        Ok(())
    }
}
