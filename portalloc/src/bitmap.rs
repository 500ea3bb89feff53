// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

use crate::range::PortRange;
use roaring::RoaringBitmap;
use std::collections::BTreeSet;

/// In-use flags over one port window.
///
/// Created with the block-list already marked used, so allocation can never
/// hand out a blocked port, even right after a release. Iteration order is a
/// linear scan from `min` upward; callers depend on the lowest free port
/// being picked first.
#[derive(Clone, Debug)]
pub struct PortBitmap {
    range: PortRange,
    used: RoaringBitmap,
}

impl PortBitmap {
    #[must_use]
    pub fn new(range: PortRange, blocked: &BTreeSet<u16>) -> Self {
        let mut used = RoaringBitmap::new();
        for port in blocked {
            if range.contains(*port) {
                used.insert(u32::from(*port));
            }
        }
        Self { range, used }
    }

    #[must_use]
    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Ports still allocatable.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.range.len() - usize::try_from(self.used.len()).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn is_used(&self, port: u16) -> bool {
        self.used.contains(u32::from(port))
    }

    /// Lowest `n` free ports, or `None` when fewer than `n` remain. Does not
    /// mutate.
    #[must_use]
    pub fn first_free(&self, n: usize) -> Option<Vec<u16>> {
        if n == 0 || self.free_count() < n {
            return None;
        }
        let mut out = Vec::with_capacity(n);
        for port in self.range.iter() {
            if !self.used.contains(u32::from(port)) {
                out.push(port);
                if out.len() == n {
                    return Some(out);
                }
            }
        }
        None
    }

    pub fn mark(&mut self, ports: &[u16]) {
        for port in ports {
            if self.range.contains(*port) {
                self.used.insert(u32::from(*port));
            }
        }
    }

    /// Clear `ports` and re-mark the block-list. Re-marking keeps blocked
    /// ports unallocatable even if a stale record listed one.
    pub fn clear(&mut self, ports: &[u16], blocked: &BTreeSet<u16>) {
        for port in ports {
            self.used.remove(u32::from(*port));
        }
        for port in blocked {
            if self.range.contains(*port) {
                self.used.insert(u32::from(*port));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: u16, max: u16) -> PortRange {
        PortRange::new_checked(min, max).unwrap()
    }

    #[test]
    fn lowest_free_ports_skip_the_block_list() {
        let blocked = BTreeSet::from([8001]);
        let bitmap = PortBitmap::new(range(8000, 8002), &blocked);
        assert_eq!(bitmap.first_free(2), Some(vec![8000, 8002]));
        assert_eq!(bitmap.first_free(3), None);
    }

    #[test]
    fn clear_reapplies_the_block_list() {
        let blocked = BTreeSet::from([8001]);
        let mut bitmap = PortBitmap::new(range(8000, 8002), &blocked);
        bitmap.mark(&[8000, 8002]);
        assert_eq!(bitmap.free_count(), 0);

        // A corrupt record claiming the blocked port must not free it.
        bitmap.clear(&[8000, 8001], &blocked);
        assert_eq!(bitmap.first_free(1), Some(vec![8000]));
        assert!(bitmap.is_used(8001));
    }

    #[test]
    fn mark_ignores_out_of_range_ports() {
        let blocked = BTreeSet::new();
        let mut bitmap = PortBitmap::new(range(8000, 8002), &blocked);
        bitmap.mark(&[7999, 9000]);
        assert_eq!(bitmap.free_count(), 3);
    }
}
