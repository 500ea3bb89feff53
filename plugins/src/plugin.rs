// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! The network-plugin protocol.

use crate::errors::PluginResult;
use api::keys;
use api::{ClusterApi, Pod};
use async_trait::async_trait;
use netconf::ConfPair;

/// Capability set every network plugin implements.
///
/// Plugins are process-wide singletons. Their methods are called
/// concurrently from workers handling different pods; events for one pod
/// are serialized by the host's work queue. Implementations keep their
/// state behind one `RwLock` and never hold it across an API call.
#[async_trait]
pub trait NetworkPlugin: Send + Sync {
    /// Primary name, matched against the pod's `network-type` annotation.
    fn name(&self) -> &'static str;

    /// Short alias, also accepted by the dispatcher.
    fn alias(&self) -> &'static str;

    /// Synchronous warm-up: list the plugin's materialized objects and
    /// rebuild in-memory state. After `init` returns, state equals the
    /// cluster state.
    async fn init(&self, cluster: &dyn ClusterApi, options: &[ConfPair]) -> PluginResult<()>;

    /// A new pod appeared. May mutate the pod (labels, annotations,
    /// readiness gates); the host persists the returned copy.
    async fn on_pod_added(&self, cluster: &dyn ClusterApi, pod: Pod) -> PluginResult<Pod>;

    /// Drive convergence for a live pod: materialize or repair the service
    /// and translate its status into the pod's network status.
    async fn on_pod_updated(&self, cluster: &dyn ClusterApi, pod: Pod) -> PluginResult<Pod>;

    /// The pod is going away. Release its allocation, honoring the
    /// fixed-lifecycle rule.
    async fn on_pod_deleted(&self, cluster: &dyn ClusterApi, pod: &Pod) -> PluginResult<()>;
}

/// The pod's `(name, value)` config pairs, from the network-conf
/// annotation. Absent or malformed payloads parse as empty; individual
/// plugins then fail on their required options with a parameter error.
#[must_use]
pub fn network_conf(pod: &Pod) -> Vec<ConfPair> {
    pod.meta
        .annotation(keys::NETWORK_CONF)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}
