// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Init-time plugin options: the allocation window and block-list each
//! plugin family is configured with by the host, parsed from the same
//! `(name, value)` shape as the per-pod configs.

use crate::conf::names;
use crate::{lookup, parse_port_csv, parse_u16, parse_u32, ConfPair, ConfigError};
use portalloc::PortRange;
use serde::Serialize;

/// Allocation window shared by all LBs (or nodes) a plugin manages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocOptions {
    pub range: PortRange,
    pub block_ports: Vec<u16>,
}

impl AllocOptions {
    fn with_window(min: u16, max: u16) -> Self {
        Self {
            // Windows built from constants below are always valid.
            range: PortRange::new_checked(min, max)
                .unwrap_or_else(|_| unreachable!()),
            block_ports: Vec::new(),
        }
    }

    /// Default window of the LB-backed families.
    #[must_use]
    pub fn lb_defaults() -> Self {
        Self::with_window(500, 700)
    }

    /// Default node-port window, matching the orchestrator's own.
    #[must_use]
    pub fn node_port_defaults() -> Self {
        Self::with_window(30000, 32767)
    }

    /// Default host-port window.
    #[must_use]
    pub fn host_port_defaults() -> Self {
        Self::with_window(8000, 9000)
    }

    /// Default window of the auto-scaled pool.
    #[must_use]
    pub fn auto_lb_defaults() -> Self {
        Self::with_window(1000, 1499)
    }

    /// Overlay `MinPort`, `MaxPort` and `BlockPorts` from `pairs` on top of
    /// `self`.
    pub fn overlay(mut self, pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        let min = match lookup(pairs, names::MIN_PORT) {
            Some(raw) => parse_u16(names::MIN_PORT, raw)?,
            None => self.range.min(),
        };
        let max = match lookup(pairs, names::MAX_PORT) {
            Some(raw) => parse_u16(names::MAX_PORT, raw)?,
            None => self.range.max(),
        };
        if min == 0 {
            return Err(ConfigError::BadValue {
                option: names::MIN_PORT,
                value: "0".to_owned(),
                reason: "port must be nonzero",
            });
        }
        if min > max {
            return Err(ConfigError::InvertedPortWindow { min, max });
        }
        self.range = PortRange::new_checked(min, max)
            .map_err(|_| ConfigError::InvertedPortWindow { min, max })?;
        if let Some(raw) = lookup(pairs, names::BLOCK_PORTS) {
            self.block_ports = parse_port_csv(names::BLOCK_PORTS, raw)?;
        }
        Ok(self)
    }
}

/// Options of the auto-scaled LB pool plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AutoLbOptions {
    pub alloc: AllocOptions,
    /// Instances kept on top of the computed demand.
    pub reserve_lbs: usize,
}

impl Default for AutoLbOptions {
    fn default() -> Self {
        Self {
            alloc: AllocOptions::auto_lb_defaults(),
            reserve_lbs: 1,
        }
    }
}

impl AutoLbOptions {
    pub fn overlay(mut self, pairs: &[ConfPair]) -> Result<Self, ConfigError> {
        self.alloc = self.alloc.overlay(pairs)?;
        if let Some(raw) = lookup(pairs, names::RESERVE_LBS) {
            self.reserve_lbs = parse_u32(names::RESERVE_LBS, raw)? as usize;
        }
        Ok(self)
    }
}
