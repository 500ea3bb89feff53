// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! The shared convergence routine for plugins that materialize a service.
//!
//! One call drives the observed service one step closer to the desired
//! state and reports what happened; the host's next reconcile pass resumes
//! from there. Re-entry is always safe.

use crate::errors::PluginResult;
use api::keys;
use api::{ClusterApi, Pod, Service, ServiceType};
use tracing::debug;

/// What one convergence step did. Everything except `Ready` leaves the
/// network status `NotReady`.
#[derive(Clone, Debug)]
pub enum Converge {
    /// No service existed; the desired one was created.
    Created,
    /// The observed service belongs to a previous pod with the same name.
    /// Touching it would steal ports from a live resource; wait for the
    /// orchestrator to finalize its deletion.
    Straggler,
    /// Stored fingerprint differed; the service was rebuilt and updated.
    Drifted,
    /// Network is disabled; the service is (now) ClusterIP.
    Disabled,
    /// Network was re-enabled; the service type was restored.
    Enabled,
    /// The load balancer has not published ingress yet.
    Pending,
    /// The service is settled; translate its status.
    Ready(Service),
}

impl Converge {
    #[must_use]
    pub fn ready(self) -> Option<Service> {
        match self {
            Converge::Ready(svc) => Some(svc),
            _ => None,
        }
    }
}

/// Drive the service named by `desired` one step toward it.
///
/// `enabled_type` is what the service is when exposure is on (LoadBalancer
/// for the LB families, NodePort for the cluster-port family); disabling
/// flips to ClusterIP preserving ports, re-enabling flips back.
pub async fn converge_service(
    cluster: &dyn ClusterApi,
    pod: &Pod,
    desired: Service,
    enabled_type: ServiceType,
) -> PluginResult<Converge> {
    let fingerprint = desired
        .annotation(keys::CONFIG_HASH)
        .unwrap_or_default()
        .to_owned();

    let existing = cluster
        .get_service(&desired.meta.namespace, &desired.meta.name)
        .await?;
    let Some(mut svc) = existing else {
        debug!(service = %desired.key(), "materializing service");
        cluster.create_service(desired).await?;
        return Ok(Converge::Created);
    };

    if let Some(owner) = svc.meta.controller_owner()
        && owner.kind == "Pod"
        && owner.uid != pod.meta.uid
    {
        debug!(service = %svc.key(), "straggler from previous pod, waiting for finalization");
        return Ok(Converge::Straggler);
    }

    if svc.annotation(keys::CONFIG_HASH) != Some(fingerprint.as_str()) {
        debug!(service = %svc.key(), "config fingerprint drifted, rebuilding");
        let mut updated = desired;
        updated.meta.uid = svc.meta.uid.clone();
        updated.meta.resource_version = svc.meta.resource_version.clone();
        cluster.update_service(updated).await?;
        return Ok(Converge::Drifted);
    }

    if pod.network_disabled() {
        if svc.spec.service_type == ServiceType::ClusterIp {
            return Ok(Converge::Disabled);
        }
        svc.spec.service_type = ServiceType::ClusterIp;
        cluster.update_service(svc).await?;
        return Ok(Converge::Disabled);
    }
    if svc.spec.service_type == ServiceType::ClusterIp && enabled_type != ServiceType::ClusterIp {
        svc.spec.service_type = enabled_type;
        cluster.update_service(svc).await?;
        return Ok(Converge::Enabled);
    }

    if svc.spec.service_type == ServiceType::LoadBalancer && svc.first_ingress().is_none() {
        return Ok(Converge::Pending);
    }
    Ok(Converge::Ready(svc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::testing::FakeCluster;
    use api::{LoadBalancerIngress, ObjectMeta};

    fn pod() -> Pod {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", "ranked-0"),
            ..Pod::default()
        };
        pod.meta.uid = "pod-uid-1".to_owned();
        pod
    }

    fn desired(pod: &Pod, fingerprint: &str) -> Service {
        let mut svc = Service {
            meta: ObjectMeta::named("game", "ranked-0"),
            ..Service::default()
        };
        svc.spec.service_type = ServiceType::LoadBalancer;
        svc.meta.set_annotation(keys::CONFIG_HASH, fingerprint);
        svc.meta
            .owner_references
            .push(crate::service::pod_owner(pod));
        svc
    }

    #[tokio::test]
    async fn create_then_pending_then_ready() {
        let cluster = FakeCluster::new();
        let pod = pod();

        let outcome = converge_service(
            &cluster,
            &pod,
            desired(&pod, "f1"),
            ServiceType::LoadBalancer,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Converge::Created));

        let outcome = converge_service(
            &cluster,
            &pod,
            desired(&pod, "f1"),
            ServiceType::LoadBalancer,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Converge::Pending));

        cluster.publish_ingress(
            "game",
            "ranked-0",
            LoadBalancerIngress {
                ip: Some("203.0.113.9".to_owned()),
                hostname: None,
            },
        );
        let outcome = converge_service(
            &cluster,
            &pod,
            desired(&pod, "f1"),
            ServiceType::LoadBalancer,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Converge::Ready(_)));
    }

    #[tokio::test]
    async fn drift_rebuilds_the_service() {
        let cluster = FakeCluster::new();
        let pod = pod();
        converge_service(&cluster, &pod, desired(&pod, "f1"), ServiceType::LoadBalancer)
            .await
            .unwrap();

        let outcome =
            converge_service(&cluster, &pod, desired(&pod, "f2"), ServiceType::LoadBalancer)
                .await
                .unwrap();
        assert!(matches!(outcome, Converge::Drifted));
        let stored = cluster.service("game", "ranked-0").unwrap();
        assert_eq!(stored.annotation(keys::CONFIG_HASH), Some("f2"));
    }

    #[tokio::test]
    async fn straggler_services_are_left_alone() {
        let cluster = FakeCluster::new();
        let old_pod = pod();
        converge_service(&cluster, &old_pod, desired(&old_pod, "f1"), ServiceType::LoadBalancer)
            .await
            .unwrap();

        // Same name, new pod incarnation.
        let mut new_pod = pod();
        new_pod.meta.uid = "pod-uid-2".to_owned();
        let outcome = converge_service(
            &cluster,
            &new_pod,
            desired(&new_pod, "f1"),
            ServiceType::LoadBalancer,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Converge::Straggler));
        // The stored service still belongs to the old incarnation.
        let stored = cluster.service("game", "ranked-0").unwrap();
        assert_eq!(stored.owner_uid(), Some("pod-uid-1"));
    }

    #[tokio::test]
    async fn disable_and_enable_flip_the_service_type() {
        let cluster = FakeCluster::new();
        let mut pod = pod();
        converge_service(&cluster, &pod, desired(&pod, "f1"), ServiceType::LoadBalancer)
            .await
            .unwrap();

        pod.meta.set_annotation(keys::NETWORK_DISABLED, "true");
        let outcome =
            converge_service(&cluster, &pod, desired(&pod, "f1"), ServiceType::LoadBalancer)
                .await
                .unwrap();
        assert!(matches!(outcome, Converge::Disabled));
        let stored = cluster.service("game", "ranked-0").unwrap();
        assert_eq!(stored.spec.service_type, ServiceType::ClusterIp);

        pod.meta.set_annotation(keys::NETWORK_DISABLED, "false");
        let outcome =
            converge_service(&cluster, &pod, desired(&pod, "f1"), ServiceType::LoadBalancer)
                .await
                .unwrap();
        assert!(matches!(outcome, Converge::Enabled));
        let stored = cluster.service("game", "ranked-0").unwrap();
        assert_eq!(stored.spec.service_type, ServiceType::LoadBalancer);
    }
}
