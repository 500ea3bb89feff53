// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! The seam between the plugins and the orchestrator.
//!
//! The host wires its informer-backed client in behind this trait; tests use
//! [`crate::testing::FakeCluster`]. Every method is async and cancelled by
//! dropping the future, so no explicit cancellation token is threaded
//! through.

use crate::dnat::DnatRule;
use crate::lbinstance::LbInstance;
use crate::pod::Pod;
use crate::service::Service;
use crate::workload::Workload;
use async_trait::async_trait;
use thiserror::Error;

/// Transient upstream failures. Reconciliation re-entry is the retry path;
/// nothing here is terminal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },
    #[error("conflict writing {0}, retry on next reconcile")]
    Conflict(String),
    #[error("api unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_service(&self, namespace: &str, name: &str)
    -> Result<Option<Service>, ApiError>;

    /// Services carrying `label_key = label_value`, in name order.
    async fn list_services(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<Service>, ApiError>;

    async fn create_service(&self, service: Service) -> Result<Service, ApiError>;

    async fn update_service(&self, service: Service) -> Result<Service, ApiError>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError>;

    /// Pods carrying `label_key = label_value`, in name order.
    async fn list_pods(&self, label_key: &str, label_value: &str)
    -> Result<Vec<Pod>, ApiError>;

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workload>, ApiError>;

    async fn get_dnat_rule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DnatRule>, ApiError>;

    /// Instances of one pool group, in name order.
    async fn list_lb_instances(&self, group: &str) -> Result<Vec<LbInstance>, ApiError>;

    async fn create_lb_instance(&self, instance: LbInstance) -> Result<LbInstance, ApiError>;
}
