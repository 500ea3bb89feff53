// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Object model and cluster-API seam for the gameplane control plane.
//!
//! This crate carries the statically-typed slice of the orchestrator API that
//! the network plugins read and write: pods, services, the owning workload,
//! DNAT rules, and provider-native load-balancer instances. The real client
//! library (watches, informers, caching) is the host's business; plugins talk
//! to the cluster exclusively through the [`ClusterApi`] trait.
//!
//! The `testing` feature exposes [`testing::FakeCluster`], an in-memory
//! implementation used throughout the plugin tests.

mod client;
mod dnat;
pub mod keys;
mod lbinstance;
mod meta;
mod pod;
mod service;
mod status;
mod workload;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ApiError, ClusterApi};
pub use dnat::{DnatEntry, DnatRule, DnatRuleSpec, DnatRuleStatus};
pub use lbinstance::{LbInstance, LbInstanceSpec, LbInstanceStatus};
pub use meta::{ObjectMeta, OwnerReference};
pub use pod::{Container, ContainerPort, Pod, PodSpec, PodStatus};
pub use service::{
    ExternalTrafficPolicy, LoadBalancerIngress, LoadBalancerStatus, Protocol, Service,
    ServicePort, ServiceSpec, ServiceStatus, ServiceType,
};
pub use status::{NetworkAddress, NetworkPort, NetworkState, NetworkStatus};
pub use workload::Workload;
