// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Object metadata shared by every modeled cluster object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata carried by every cluster object: identity, labels, annotations,
/// ownership, and deletion state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    #[must_use]
    pub fn named(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            ..Self::default()
        }
    }

    /// `namespace/name`, the key every ledger and map in this workspace uses.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn set_label(&mut self, key: &str, value: impl Into<String>) {
        self.labels.insert(key.to_owned(), value.into());
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.annotations.insert(key.to_owned(), value.into());
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// The controlling owner reference, if any.
    #[must_use]
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references
            .iter()
            .find(|r| r.controller)
            .or_else(|| self.owner_references.first())
    }
}

/// A reference to an owning object. `controller` and `block_owner_deletion`
/// are always set together by the service builder so cascade deletion cleans
/// up materialized services.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_is_namespace_slash_name() {
        let meta = ObjectMeta::named("game", "ranked-3");
        assert_eq!(meta.key(), "game/ranked-3");
    }

    #[test]
    fn controller_owner_prefers_controller_flag() {
        let mut meta = ObjectMeta::named("game", "ranked-3");
        meta.owner_references.push(OwnerReference {
            name: "bystander".to_owned(),
            ..OwnerReference::default()
        });
        meta.owner_references.push(OwnerReference {
            name: "boss".to_owned(),
            controller: true,
            ..OwnerReference::default()
        });
        assert_eq!(meta.controller_owner().map(|r| r.name.as_str()), Some("boss"));
    }
}
