// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Port allocation for the gameplane network plugins.
//!
//! Every load balancer exposes one port window `[min, max]` minus a
//! block-list. Plugins reserve disjoint ports per pod out of that window and
//! the allocation ledger remembers who holds what. Nothing here is
//! persisted: after a restart the ledger and the bitmaps are rebuilt from
//! the services observed live in the cluster, which are the source of truth.
//!
//! Layering, smallest first:
//!
//! - [`PortRange`]: a checked `[min, max]` window.
//! - [`PortBitmap`]: in-use flags over one window, block-list pre-marked.
//! - [`PortSpace`]: lazily-created bitmaps keyed by load balancer (or by
//!   bank index for the multi-LB plugins), with first-fit reservation.
//! - [`Ledger`]: `pod key -> allocation record`.
//! - [`LbAllocator`]: the facade plugins hold behind their lock, combining a
//!   [`PortSpace`] keyed by [`LbId`] with a [`Ledger`], including
//!   reconstruction from live services.
//!
//! None of these types lock; the owning plugin serializes access with one
//! `RwLock` and keeps I/O outside the critical section.

mod allocator;
mod bitmap;
mod ledger;
mod range;
mod space;

pub use allocator::LbAllocator;
pub use bitmap::PortBitmap;
pub use ledger::{AllocationRecord, Ledger};
pub use range::PortRange;
pub use space::PortSpace;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque provider-scoped load-balancer identity.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LbId(String);

impl LbId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LbId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_owned())
    }
}

impl From<String> for LbId {
    fn from(value: String) -> Self {
        Self(value.trim().to_owned())
    }
}

impl std::fmt::Display for LbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocation failures. `NoAvailablePorts` is structural: the caller's LB
/// set is exhausted and only a config change (wider window, more LBs) fixes
/// it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("invalid port range [{min}, {max}]")]
    InvalidRange { min: u16, max: u16 },
    #[error("no available ports: {requested} wanted on load balancers [{lb_set}]")]
    NoAvailablePorts { requested: usize, lb_set: String },
}
