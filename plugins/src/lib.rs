// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Network plugins for the gameplane control plane.
//!
//! Each plugin family wires game-server pods to external L4 exposure in its
//! own way: direct load balancers, shared listeners, multi-ISP banks, an
//! auto-scaled LB pool, NAT-gateway DNAT, node ports and host ports. They
//! all speak the same protocol ([`NetworkPlugin`]) and are selected per pod
//! by the `network-type` annotation through the [`registry`].
//!
//! The reconciliation style is level-triggered: every hook is idempotent
//! and safe to re-enter, and one call only needs to move the world closer
//! to the desired state (see [`ensure`]).

mod autolb;
mod common;
mod direct;
mod ensure;
mod errors;
mod hostport;
mod multilb;
mod natgw;
mod nodeport;
mod plugin;
mod registry;
mod service;
mod shared;
mod status;

pub use autolb::AutoLbPlugin;
pub use common::{ReleaseScope, release_scope, resolve_owner};
pub use direct::DirectLbPlugin;
pub use ensure::{Converge, converge_service};
pub use errors::{PluginError, PluginResult};
pub use hostport::HostPortPlugin;
pub use multilb::MultiLbPlugin;
pub use natgw::NatGwPlugin;
pub use nodeport::NodePortPlugin;
pub use plugin::{NetworkPlugin, network_conf};
pub use registry::{PluginRegistry, global};
pub use service::{ServiceBlueprint, pod_owner, workload_owner};
pub use shared::SharedLbPlugin;
pub use status::{external_addresses, internal_addresses, publish, publish_state};
