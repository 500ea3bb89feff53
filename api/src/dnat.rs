// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! DNAT rule custom resource, published by the NAT-gateway controller.
//!
//! The NAT-gateway plugin never allocates anything itself; it annotates the
//! pod and waits for the sibling rule's status to list a translation entry
//! for every configured port.

use crate::meta::ObjectMeta;
use crate::service::Protocol;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DnatRule {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: DnatRuleSpec,
    #[serde(default)]
    pub status: DnatRuleStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DnatRuleSpec {
    #[serde(default)]
    pub external_ip: Option<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub fixed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DnatRuleStatus {
    #[serde(default)]
    pub entries: Vec<DnatEntry>,
}

/// One published translation: `internal_ip:internal_port` is reachable at
/// `external_ip:external_port`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DnatEntry {
    pub internal_ip: String,
    pub internal_port: u16,
    pub external_ip: String,
    pub external_port: u16,
}

impl DnatRule {
    #[must_use]
    pub fn key(&self) -> String {
        self.meta.key()
    }

    /// Look up the published entry for one internal port, if any.
    #[must_use]
    pub fn entry_for(&self, internal_port: u16) -> Option<&DnatEntry> {
        self.status
            .entries
            .iter()
            .find(|e| e.internal_port == internal_port)
    }
}
