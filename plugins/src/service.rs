// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Declarative construction of the materialized services.

use api::keys;
use api::{
    ExternalTrafficPolicy, ObjectMeta, OwnerReference, Pod, Service, ServicePort, ServiceType,
    Workload,
};
use netconf::health::HealthCheck;
use netconf::PortProtocol;
use std::collections::BTreeMap;

/// Everything a plugin decides about one service, rendered into the
/// declarative object by [`ServiceBlueprint::render`].
#[derive(Clone, Debug)]
pub struct ServiceBlueprint {
    pub namespace: String,
    pub name: String,
    /// Plugin name, stamped as the managed-by label for init's list filter.
    pub plugin: &'static str,
    pub selector: BTreeMap<String, String>,
    pub owner: OwnerReference,
    pub service_type: ServiceType,
    /// Provider LB binding; absent for node-port services bound to the
    /// cluster pool.
    pub lb_id: Option<String>,
    /// External ports, parallel to `port_protocols`.
    pub external_ports: Vec<u16>,
    pub port_protocols: Vec<PortProtocol>,
    /// NodePort services carry the allocation in `node_port` as well.
    pub node_port_allocation: bool,
    pub fingerprint: String,
    pub external_traffic_policy: ExternalTrafficPolicy,
    pub allow_not_ready: bool,
    pub health: Option<HealthCheck>,
    pub load_balancer_class: Option<String>,
    pub extra_annotations: Vec<(&'static str, String)>,
}

impl ServiceBlueprint {
    /// Blueprint selecting a single pod by the statefulset-style pod-name
    /// label, owned by that pod.
    #[must_use]
    pub fn for_pod(pod: &Pod, plugin: &'static str) -> Self {
        let mut selector = BTreeMap::new();
        selector.insert(keys::POD_NAME.to_owned(), pod.meta.name.clone());
        Self {
            namespace: pod.meta.namespace.clone(),
            name: pod.meta.name.clone(),
            plugin,
            selector,
            owner: pod_owner(pod),
            service_type: ServiceType::LoadBalancer,
            lb_id: None,
            external_ports: Vec::new(),
            port_protocols: Vec::new(),
            node_port_allocation: false,
            fingerprint: String::new(),
            external_traffic_policy: ExternalTrafficPolicy::Local,
            allow_not_ready: false,
            health: None,
            load_balancer_class: None,
            extra_annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn render(&self) -> Service {
        let mut meta = ObjectMeta::named(&self.namespace, &self.name);
        meta.set_label(keys::MANAGED_BY, self.plugin);
        meta.owner_references.push(self.owner.clone());
        if let Some(lb) = &self.lb_id {
            meta.set_annotation(keys::LB_ID, lb.clone());
        }
        meta.set_annotation(keys::LB_LISTENER_OVERRIDE, "true");
        meta.set_annotation(keys::CONFIG_HASH, self.fingerprint.clone());
        if self.allow_not_ready {
            meta.set_annotation(keys::ALLOW_NOT_READY, "true");
        }
        if let Some(health) = &self.health {
            for (key, value) in health.annotations() {
                meta.set_annotation(key, value);
            }
        }
        for (key, value) in &self.extra_annotations {
            meta.set_annotation(key, value.clone());
        }

        let mut service = Service {
            meta,
            ..Service::default()
        };
        service.spec.service_type = self.service_type;
        service.spec.selector.clone_from(&self.selector);
        service.spec.external_traffic_policy = self.external_traffic_policy;
        service.spec.publish_not_ready_addresses = self.allow_not_ready;
        service.spec.load_balancer_class.clone_from(&self.load_balancer_class);
        if self.service_type == ServiceType::LoadBalancer {
            // Listeners come from the provider LB, not from node ports.
            service.spec.allocate_load_balancer_node_ports = Some(false);
        }
        service.spec.ports = self.render_ports();
        service
    }

    /// One service port per wire protocol. A `TCPUDP` entry fans out into
    /// two ports sharing the external port number, `<target>-tcp` and
    /// `<target>-udp`.
    fn render_ports(&self) -> Vec<ServicePort> {
        let mut out = Vec::with_capacity(self.port_protocols.len());
        for (pp, external) in self.port_protocols.iter().zip(&self.external_ports) {
            for protocol in pp.kind.wire() {
                out.push(ServicePort {
                    name: format!("{}-{}", pp.port, protocol.to_string().to_ascii_lowercase()),
                    port: *external,
                    protocol,
                    target_port: pp.port,
                    node_port: self.node_port_allocation.then_some(*external),
                });
            }
        }
        out
    }
}

/// Controller reference to the pod itself, the default service owner.
#[must_use]
pub fn pod_owner(pod: &Pod) -> OwnerReference {
    OwnerReference {
        api_version: "v1".to_owned(),
        kind: "Pod".to_owned(),
        name: pod.meta.name.clone(),
        uid: pod.meta.uid.clone(),
        controller: true,
        block_owner_deletion: true,
    }
}

/// Controller reference to the owning workload, used when the config asks
/// for fixed lifecycle: the service then outlives any one pod.
#[must_use]
pub fn workload_owner(workload: &Workload) -> OwnerReference {
    OwnerReference {
        api_version: "gameplane.io/v1".to_owned(),
        kind: "GameServerSet".to_owned(),
        name: workload.meta.name.clone(),
        uid: workload.meta.uid.clone(),
        controller: true,
        block_owner_deletion: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::Protocol;
    use netconf::ProtoKind;
    use pretty_assertions::assert_eq;

    fn pod() -> Pod {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", "ranked-0"),
            ..Pod::default()
        };
        pod.meta.uid = "pod-uid-1".to_owned();
        pod
    }

    #[test]
    fn tcpudp_fans_out_into_two_ports() {
        let mut blueprint = ServiceBlueprint::for_pod(&pod(), "Cloud-LB");
        blueprint.lb_id = Some("lb-A".to_owned());
        blueprint.external_ports = vec![600];
        blueprint.port_protocols = vec![PortProtocol {
            port: 8080,
            kind: ProtoKind::TcpUdp,
        }];
        let service = blueprint.render();

        assert_eq!(service.spec.ports.len(), 2);
        assert_eq!(service.spec.ports[0].name, "8080-tcp");
        assert_eq!(service.spec.ports[0].protocol, Protocol::Tcp);
        assert_eq!(service.spec.ports[1].name, "8080-udp");
        assert_eq!(service.spec.ports[1].protocol, Protocol::Udp);
        assert_eq!(service.spec.ports[0].port, 600);
        assert_eq!(service.spec.ports[1].port, 600);
        assert_eq!(service.spec.ports[0].target_port, 8080);
    }

    #[test]
    fn rendered_service_carries_binding_and_fingerprint() {
        let mut blueprint = ServiceBlueprint::for_pod(&pod(), "Cloud-LB");
        blueprint.lb_id = Some("lb-A".to_owned());
        blueprint.external_ports = vec![512];
        blueprint.port_protocols = vec![PortProtocol {
            port: 80,
            kind: ProtoKind::Tcp,
        }];
        blueprint.fingerprint = "abcd".to_owned();
        let service = blueprint.render();

        assert_eq!(service.annotation(keys::LB_ID), Some("lb-A"));
        assert_eq!(service.annotation(keys::CONFIG_HASH), Some("abcd"));
        assert_eq!(service.annotation(keys::LB_LISTENER_OVERRIDE), Some("true"));
        assert_eq!(service.meta.label(keys::MANAGED_BY), Some("Cloud-LB"));
        assert_eq!(
            service.spec.selector.get(keys::POD_NAME),
            Some(&"ranked-0".to_owned())
        );
        let owner = &service.meta.owner_references[0];
        assert_eq!(owner.uid, "pod-uid-1");
        assert!(owner.controller && owner.block_owner_deletion);
    }
}
