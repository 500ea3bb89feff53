// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! In-memory [`ClusterApi`] used by the plugin tests.
//!
//! Behaves like a very small apiserver: objects are keyed `namespace/name`,
//! uids are assigned on create, node ports are filled in for NodePort
//! services, and tests publish load-balancer ingress explicitly.

use crate::client::{ApiError, ClusterApi};
use crate::dnat::DnatRule;
use crate::lbinstance::LbInstance;
use crate::pod::Pod;
use crate::service::{LoadBalancerIngress, Service, ServiceType};
use crate::workload::Workload;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    services: BTreeMap<String, Service>,
    pods: BTreeMap<String, Pod>,
    workloads: BTreeMap<String, Workload>,
    dnat_rules: BTreeMap<String, DnatRule>,
    lb_instances: BTreeMap<String, LbInstance>,
    next_uid: u64,
    next_node_port: u16,
}

#[derive(Debug)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_node_port: 31000,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a service verbatim, keeping any uid already set. Used to stage
    /// pre-existing state for rebuild tests.
    pub fn seed_service(&self, service: Service) {
        let mut inner = self.lock();
        inner.services.insert(service.key(), service);
    }

    pub fn seed_pod(&self, pod: Pod) {
        let mut inner = self.lock();
        inner.pods.insert(pod.key(), pod);
    }

    pub fn seed_workload(&self, workload: Workload) {
        let mut inner = self.lock();
        inner.workloads.insert(workload.key(), workload);
    }

    pub fn seed_dnat_rule(&self, rule: DnatRule) {
        let mut inner = self.lock();
        inner.dnat_rules.insert(rule.key(), rule);
    }

    /// Publish load-balancer ingress on a service, as the provider would.
    pub fn publish_ingress(&self, namespace: &str, name: &str, ingress: LoadBalancerIngress) {
        let mut inner = self.lock();
        if let Some(svc) = inner.services.get_mut(&format!("{namespace}/{name}")) {
            svc.status.load_balancer.ingress = vec![ingress];
        }
    }

    /// Mark an LB instance fulfilled with a provider id.
    pub fn fulfil_lb_instance(&self, namespace: &str, name: &str, lb_id: &str) {
        let mut inner = self.lock();
        if let Some(instance) = inner.lb_instances.get_mut(&format!("{namespace}/{name}")) {
            instance.status.lb_id = Some(lb_id.to_owned());
            instance.status.ready = true;
        }
    }

    /// Current copy of a service, if present.
    #[must_use]
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.lock().services.get(&format!("{namespace}/{name}")).cloned()
    }

    #[must_use]
    pub fn service_count(&self) -> usize {
        self.lock().services.len()
    }

    #[must_use]
    pub fn lb_instance_count(&self) -> usize {
        self.lock().lb_instances.len()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ApiError> {
        Ok(self.lock().services.get(&format!("{namespace}/{name}")).cloned())
    }

    async fn list_services(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<Service>, ApiError> {
        Ok(self
            .lock()
            .services
            .values()
            .filter(|s| s.meta.label(label_key) == Some(label_value))
            .cloned()
            .collect())
    }

    async fn create_service(&self, mut service: Service) -> Result<Service, ApiError> {
        let mut inner = self.lock();
        let key = service.key();
        if inner.services.contains_key(&key) {
            return Err(ApiError::Conflict(key));
        }
        if service.meta.uid.is_empty() {
            inner.next_uid += 1;
            service.meta.uid = format!("svc-uid-{}", inner.next_uid);
        }
        if service.spec.service_type == ServiceType::NodePort {
            for port in &mut service.spec.ports {
                if port.node_port.is_none() {
                    inner.next_node_port += 1;
                    port.node_port = Some(inner.next_node_port);
                }
            }
        }
        inner.services.insert(key, service.clone());
        Ok(service)
    }

    async fn update_service(&self, service: Service) -> Result<Service, ApiError> {
        let mut inner = self.lock();
        let key = service.key();
        if !inner.services.contains_key(&key) {
            return Err(ApiError::NotFound {
                kind: "service",
                key,
            });
        }
        inner.services.insert(key, service.clone());
        Ok(service)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.lock().services.remove(&format!("{namespace}/{name}"));
        Ok(())
    }

    async fn list_pods(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<Pod>, ApiError> {
        Ok(self
            .lock()
            .pods
            .values()
            .filter(|p| p.meta.label(label_key) == Some(label_value))
            .cloned()
            .collect())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workload>, ApiError> {
        Ok(self.lock().workloads.get(&format!("{namespace}/{name}")).cloned())
    }

    async fn get_dnat_rule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DnatRule>, ApiError> {
        Ok(self.lock().dnat_rules.get(&format!("{namespace}/{name}")).cloned())
    }

    async fn list_lb_instances(&self, group: &str) -> Result<Vec<LbInstance>, ApiError> {
        Ok(self
            .lock()
            .lb_instances
            .values()
            .filter(|i| i.spec.group == group)
            .cloned()
            .collect())
    }

    async fn create_lb_instance(&self, mut instance: LbInstance) -> Result<LbInstance, ApiError> {
        let mut inner = self.lock();
        let key = instance.meta.key();
        if inner.lb_instances.contains_key(&key) {
            return Err(ApiError::Conflict(key));
        }
        inner.next_uid += 1;
        instance.meta.uid = format!("lbi-uid-{}", inner.next_uid);
        inner.lb_instances.insert(key, instance.clone());
        Ok(instance)
    }
}
