// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! NAT-gateway DNAT plugin.
//!
//! No load balancer and no port bitmap: the plugin annotates the pod with
//! the desired translations and a sibling DNAT rule (owned by the gateway
//! controller) publishes `internal -> external` entries. Network is Ready
//! only once every configured port appears in the rule's status.

use crate::errors::PluginResult;
use crate::plugin::{network_conf, NetworkPlugin};
use crate::status::{publish, publish_state};
use api::keys;
use api::{ClusterApi, NetworkAddress, NetworkPort, NetworkState, Pod};
use async_trait::async_trait;
use netconf::{ConfPair, NatGwConf};
use tracing::debug;

pub struct NatGwPlugin;

impl Default for NatGwPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NatGwPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetworkPlugin for NatGwPlugin {
    fn name(&self) -> &'static str {
        "Cloud-NATGW"
    }

    fn alias(&self) -> &'static str {
        "natgw"
    }

    async fn init(&self, _cluster: &dyn ClusterApi, _options: &[ConfPair]) -> PluginResult<()> {
        // Stateless: the DNAT rule status is the only source of truth.
        Ok(())
    }

    /// Stamp the translation request; the gateway controller picks it up.
    async fn on_pod_added(&self, _cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        let conf = NatGwConf::parse(&network_conf(&pod))?;
        let ports_csv = conf
            .ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        pod.meta.set_annotation(keys::DNAT_PORTS, ports_csv);
        pod.meta
            .set_annotation(keys::DNAT_PROTOCOL, conf.protocol.to_string());
        pod.meta
            .set_annotation(keys::DNAT_FIXED, conf.fixed.to_string());
        Ok(pod)
    }

    async fn on_pod_updated(&self, cluster: &dyn ClusterApi, mut pod: Pod) -> PluginResult<Pod> {
        if pod.network_status().is_none() {
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        }
        let conf = NatGwConf::parse(&network_conf(&pod))?;
        let rule = cluster
            .get_dnat_rule(&pod.meta.namespace, &pod.meta.name)
            .await?;
        let Some(rule) = rule else {
            debug!(pod = %pod.key(), "waiting for the DNAT rule to appear");
            publish_state(&mut pod, self.name(), NetworkState::NotReady);
            return Ok(pod);
        };

        // Ready only when every configured port has a published entry.
        let mut external_ports = Vec::with_capacity(conf.ports.len());
        let mut external_ip = None;
        for port in &conf.ports {
            match rule.entry_for(*port) {
                Some(entry) => {
                    external_ip = Some(entry.external_ip.clone());
                    for protocol in conf.protocol.wire() {
                        external_ports.push(NetworkPort {
                            name: format!(
                                "{port}-{}",
                                protocol.to_string().to_ascii_lowercase()
                            ),
                            port: entry.external_port,
                            protocol,
                        });
                    }
                }
                None => {
                    publish_state(&mut pod, self.name(), NetworkState::NotReady);
                    return Ok(pod);
                }
            }
        }

        let internal = pod.status.pod_ip.as_ref().map(|ip| NetworkAddress {
            ip: Some(ip.clone()),
            endpoint: None,
            ports: conf
                .ports
                .iter()
                .flat_map(|port| {
                    conf.protocol.wire().into_iter().map(move |protocol| NetworkPort {
                        name: format!("{port}-{}", protocol.to_string().to_ascii_lowercase()),
                        port: *port,
                        protocol,
                    })
                })
                .collect(),
        });
        let external = external_ip.map(|ip| NetworkAddress {
            ip: Some(ip),
            endpoint: None,
            ports: external_ports,
        });
        publish(
            &mut pod,
            self.name(),
            NetworkState::Ready,
            internal.into_iter().collect(),
            external.into_iter().collect(),
        );
        Ok(pod)
    }

    async fn on_pod_deleted(&self, _cluster: &dyn ClusterApi, _pod: &Pod) -> PluginResult<()> {
        // Translations die with the DNAT rule; nothing held here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::testing::FakeCluster;
    use api::{DnatEntry, DnatRule, ObjectMeta};
    use pretty_assertions::assert_eq;

    const CONF: &str = r#"[{"name":"Ports","value":"7777,7778"},{"name":"Protocol","value":"UDP"},{"name":"Fixed","value":"true"}]"#;

    fn pod_with_conf(name: &str) -> Pod {
        let mut pod = Pod {
            meta: ObjectMeta::named("game", name),
            ..Pod::default()
        };
        pod.meta.set_annotation(keys::NETWORK_TYPE, "Cloud-NATGW");
        pod.meta.set_annotation(keys::NETWORK_CONF, CONF);
        pod.status.pod_ip = Some("10.0.0.12".to_owned());
        pod
    }

    fn entry(internal: u16, external: u16) -> DnatEntry {
        DnatEntry {
            internal_ip: "10.0.0.12".to_owned(),
            internal_port: internal,
            external_ip: "198.51.100.4".to_owned(),
            external_port: external,
        }
    }

    #[tokio::test]
    async fn added_hook_stamps_the_translation_request() {
        let cluster = FakeCluster::new();
        let plugin = NatGwPlugin::new();
        let pod = plugin
            .on_pod_added(&cluster, pod_with_conf("p-0"))
            .await
            .unwrap();
        assert_eq!(pod.meta.annotation(keys::DNAT_PORTS), Some("7777,7778"));
        assert_eq!(pod.meta.annotation(keys::DNAT_PROTOCOL), Some("UDP"));
        assert_eq!(pod.meta.annotation(keys::DNAT_FIXED), Some("true"));
    }

    #[tokio::test]
    async fn ready_only_when_every_port_is_published() {
        let cluster = FakeCluster::new();
        let plugin = NatGwPlugin::new();
        let pod = pod_with_conf("p-0");
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();

        // Rule exists but covers one of the two ports.
        let mut rule = DnatRule {
            meta: ObjectMeta::named("game", "p-0"),
            ..DnatRule::default()
        };
        rule.status.entries = vec![entry(7777, 31777)];
        cluster.seed_dnat_rule(rule.clone());
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        assert_eq!(
            pod.network_status().unwrap().current_state,
            NetworkState::NotReady
        );

        rule.status.entries.push(entry(7778, 31778));
        cluster.seed_dnat_rule(rule);
        let pod = plugin.on_pod_updated(&cluster, pod).await.unwrap();
        let status = pod.network_status().unwrap();
        assert_eq!(status.current_state, NetworkState::Ready);
        assert_eq!(
            status.external_addresses[0].ip.as_deref(),
            Some("198.51.100.4")
        );
        let external: Vec<u16> = status.external_addresses[0]
            .ports
            .iter()
            .map(|p| p.port)
            .collect();
        assert_eq!(external, vec![31777, 31778]);
        assert_eq!(status.internal_addresses[0].ports[0].port, 7777);
    }
}
