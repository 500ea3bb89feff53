// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Provider-native load-balancer instance custom resource.
//!
//! The auto-scaling plugin grows its pool by creating these; the provider
//! controller fulfils them and publishes the resulting load-balancer id.

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LbInstance {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: LbInstanceSpec,
    #[serde(default)]
    pub status: LbInstanceStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LbInstanceSpec {
    /// Pool the instance belongs to; one pool per owning workload.
    pub group: String,
    /// ISP variant, when the pool exposes through several carriers.
    #[serde(default)]
    pub isp: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LbInstanceStatus {
    #[serde(default)]
    pub lb_id: Option<String>,
    #[serde(default)]
    pub ready: bool,
}
