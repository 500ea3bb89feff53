// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! The owning workload (game-server set). Plugins only care about its
//! identity, its deletion state, and its declared size.

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub replicas: u32,
}

impl Workload {
    #[must_use]
    pub fn key(&self) -> String {
        self.meta.key()
    }

    /// Fixed-lifecycle allocations are released only once this turns true.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.meta.is_deleting()
    }
}
