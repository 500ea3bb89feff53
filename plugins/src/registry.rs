// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Process-wide plugin registry.
//!
//! Plugins install at startup; the table is read-only afterwards. Dispatch
//! selects by the pod's `network-type` annotation against plugin name or
//! alias; a pod without the annotation is not dispatched at all.

use crate::autolb::AutoLbPlugin;
use crate::direct::DirectLbPlugin;
use crate::errors::{PluginError, PluginResult};
use crate::hostport::HostPortPlugin;
use crate::multilb::MultiLbPlugin;
use crate::natgw::NatGwPlugin;
use crate::nodeport::NodePortPlugin;
use crate::plugin::NetworkPlugin;
use crate::shared::SharedLbPlugin;
use api::Pod;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub struct PluginRegistry {
    table: RwLock<HashMap<&'static str, Arc<dyn NetworkPlugin>>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in plugin families installed.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let builtins: Vec<Arc<dyn NetworkPlugin>> = vec![
            Arc::new(DirectLbPlugin::new()),
            Arc::new(SharedLbPlugin::new()),
            Arc::new(MultiLbPlugin::new()),
            Arc::new(AutoLbPlugin::new()),
            Arc::new(NatGwPlugin::new()),
            Arc::new(NodePortPlugin::new()),
            Arc::new(HostPortPlugin::new()),
        ];
        for plugin in builtins {
            // Built-in names never collide.
            let _ = registry.install(plugin);
        }
        registry
    }

    /// Install once; re-registering a name is an internal error.
    pub fn install(&self, plugin: Arc<dyn NetworkPlugin>) -> PluginResult<()> {
        let mut table = self.table.write().unwrap();
        let name = plugin.name();
        if table.contains_key(name) {
            return Err(PluginError::Internal(format!(
                "plugin {name} registered twice"
            )));
        }
        table.insert(name, plugin);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn NetworkPlugin>> {
        let table = self.table.read().unwrap();
        if let Some(plugin) = table.get(name) {
            return Some(Arc::clone(plugin));
        }
        table.values().find(|p| p.alias() == name).map(Arc::clone)
    }

    /// Plugin chosen by the pod's network-type annotation.
    #[must_use]
    pub fn select(&self, pod: &Pod) -> Option<Arc<dyn NetworkPlugin>> {
        self.get(pod.network_type()?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The default process-wide registry.
pub fn global() -> &'static PluginRegistry {
    static GLOBAL: Lazy<PluginRegistry> = Lazy::new(PluginRegistry::with_defaults);
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::keys;
    use api::ObjectMeta;

    #[test]
    fn selection_follows_the_annotation() {
        let registry = PluginRegistry::with_defaults();
        let mut pod = Pod {
            meta: ObjectMeta::named("game", "ranked-0"),
            ..Pod::default()
        };
        assert!(registry.select(&pod).is_none());

        pod.meta.set_annotation(keys::NETWORK_TYPE, "Cloud-LB");
        assert_eq!(registry.select(&pod).unwrap().name(), "Cloud-LB");

        // Alias works too.
        pod.meta.set_annotation(keys::NETWORK_TYPE, "lb");
        assert_eq!(registry.select(&pod).unwrap().name(), "Cloud-LB");

        pod.meta.set_annotation(keys::NETWORK_TYPE, "no-such-plugin");
        assert!(registry.select(&pod).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = PluginRegistry::with_defaults();
        let err = registry
            .install(Arc::new(crate::natgw::NatGwPlugin::new()))
            .unwrap_err();
        assert!(matches!(err, crate::errors::PluginError::Internal(_)));
    }
}
