// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Helpers shared by the plugin families: allocation fan-out, ownership
//! resolution, and the fixed-lifecycle release policy.

use crate::errors::PluginResult;
use crate::service::{pod_owner, workload_owner};
use api::{ClusterApi, OwnerReference, Pod};
use netconf::PortProtocol;
use portalloc::{AllocationRecord, LbId};

/// Expand an allocation into the parallel record arrays: one element per
/// service port, so a `TCPUDP` target contributes two entries sharing its
/// external port.
#[must_use]
pub fn fan_out_record(
    lb_ids: Vec<LbId>,
    bank: Option<usize>,
    port_protocols: &[PortProtocol],
    allocated: &[u16],
) -> AllocationRecord {
    let mut ports = Vec::new();
    let mut protocols = Vec::new();
    let mut target_ports = Vec::new();
    for (pp, external) in port_protocols.iter().zip(allocated) {
        for protocol in pp.kind.wire() {
            ports.push(*external);
            protocols.push(protocol);
            target_ports.push(pp.port);
        }
    }
    AllocationRecord {
        lb_ids,
        ports,
        protocols,
        target_ports,
        bank,
    }
}

/// Who owns the materialized service: the pod by default, the owning
/// workload when the config asks for fixed lifecycle (so the service
/// survives pod re-creation).
pub async fn resolve_owner(
    cluster: &dyn ClusterApi,
    pod: &Pod,
    fixed: bool,
) -> PluginResult<OwnerReference> {
    if fixed && let Some(name) = pod.owner_workload() {
        if let Some(workload) = cluster.get_workload(&pod.meta.namespace, name).await? {
            return Ok(workload_owner(&workload));
        }
    }
    Ok(pod_owner(pod))
}

/// What a pod deletion should release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseScope {
    /// Fixed lifecycle and the owning workload is alive: ports stay with
    /// the workload identity.
    Keep,
    /// Release this pod's record.
    Pod(String),
    /// The owning workload is going away: release every record under this
    /// pod-key prefix.
    Workload(String),
}

/// Apply the fixed-lifecycle rule to a pod deletion.
pub async fn release_scope(
    cluster: &dyn ClusterApi,
    pod: &Pod,
    fixed: bool,
) -> PluginResult<ReleaseScope> {
    if !fixed {
        return Ok(ReleaseScope::Pod(pod.key()));
    }
    let Some(workload) = pod.owner_workload() else {
        // Fixed without a resolvable owner degrades to pod lifecycle.
        return Ok(ReleaseScope::Pod(pod.key()));
    };
    match cluster.get_workload(&pod.meta.namespace, workload).await? {
        Some(w) if !w.is_deleting() => Ok(ReleaseScope::Keep),
        _ => Ok(ReleaseScope::Workload(format!(
            "{}/{}-",
            pod.meta.namespace, workload
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::keys;
    use api::testing::FakeCluster;
    use api::{ObjectMeta, Protocol, Workload};
    use netconf::ProtoKind;
    use pretty_assertions::assert_eq;

    fn owned_pod() -> Pod {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", "ranked-0"),
            ..Pod::default()
        };
        pod.meta.set_label(keys::OWNER_WORKLOAD, "ranked");
        pod
    }

    #[test]
    fn fan_out_builds_parallel_arrays() {
        let record = fan_out_record(
            vec![LbId::from("lb-A")],
            None,
            &[
                PortProtocol { port: 80, kind: ProtoKind::TcpUdp },
                PortProtocol { port: 81, kind: ProtoKind::Tcp },
            ],
            &[8000, 8002],
        );
        assert_eq!(record.ports, vec![8000, 8000, 8002]);
        assert_eq!(
            record.protocols,
            vec![Protocol::Tcp, Protocol::Udp, Protocol::Tcp]
        );
        assert_eq!(record.target_ports, vec![80, 80, 81]);
        assert_eq!(record.distinct_ports(), vec![8000, 8002]);
    }

    #[tokio::test]
    async fn fixed_keeps_ports_while_the_workload_lives() {
        let cluster = FakeCluster::new();
        cluster.seed_workload(Workload {
            meta: ObjectMeta::named("game", "ranked"),
            replicas: 3,
        });
        let pod = owned_pod();

        assert_eq!(
            release_scope(&cluster, &pod, true).await.unwrap(),
            ReleaseScope::Keep
        );
        assert_eq!(
            release_scope(&cluster, &pod, false).await.unwrap(),
            ReleaseScope::Pod("game/ranked-0".to_owned())
        );
    }

    #[tokio::test]
    async fn fixed_releases_the_workload_prefix_once_it_is_deleting() {
        let cluster = FakeCluster::new();
        let mut workload = Workload {
            meta: ObjectMeta::named("game", "ranked"),
            replicas: 3,
        };
        workload.meta.deletion_timestamp = Some(chrono::Utc::now());
        cluster.seed_workload(workload);

        assert_eq!(
            release_scope(&cluster, &owned_pod(), true).await.unwrap(),
            ReleaseScope::Workload("game/ranked-".to_owned())
        );
    }
}
