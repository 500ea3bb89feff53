// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

use crate::bitmap::PortBitmap;
use crate::range::PortRange;
use crate::AllocError;
use ahash::AHashMap;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::hash::Hash;

/// Bitmaps keyed by load balancer (or bank index), sharing one window and
/// block-list.
///
/// A bitmap is created on first touch of a key and lives until process exit;
/// the per-key cost is bounded by the window width.
#[derive(Clone, Debug)]
pub struct PortSpace<K>
where
    K: Clone + Eq + Hash + Display,
{
    range: PortRange,
    blocked: BTreeSet<u16>,
    maps: AHashMap<K, PortBitmap>,
}

impl<K> PortSpace<K>
where
    K: Clone + Eq + Hash + Display,
{
    #[must_use]
    pub fn new(range: PortRange, blocked: impl IntoIterator<Item = u16>) -> Self {
        Self {
            range,
            blocked: blocked.into_iter().collect(),
            maps: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn range(&self) -> PortRange {
        self.range
    }

    #[must_use]
    pub fn blocked(&self) -> &BTreeSet<u16> {
        &self.blocked
    }

    /// Allocatable slots per key, block-list taken out. Identical for every
    /// key since they share one window.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.range.capacity(&self.blocked)
    }

    #[must_use]
    pub fn free_count(&mut self, key: &K) -> usize {
        self.bitmap(key).free_count()
    }

    #[must_use]
    pub fn is_used(&mut self, key: &K, port: u16) -> bool {
        self.bitmap(key).is_used(port)
    }

    /// First-fit reservation: the first key in `keys` (caller order) with at
    /// least `n` free ports wins, and hands out its `n` lowest free ports.
    /// No mutation happens on failure.
    pub fn reserve_first_fit(
        &mut self,
        keys: &[K],
        n: usize,
    ) -> Result<(K, Vec<u16>), AllocError> {
        for key in keys {
            if let Some(ports) = self.bitmap(key).first_free(n) {
                self.bitmap(key).mark(&ports);
                return Ok((key.clone(), ports));
            }
        }
        Err(AllocError::NoAvailablePorts {
            requested: n,
            lb_set: keys
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Mark ports in use without going through reservation; the rebuild
    /// path, replaying live services.
    pub fn mark_used(&mut self, key: &K, ports: &[u16]) {
        self.bitmap(key).mark(ports);
    }

    /// Free `ports` under `key`. Unknown keys are a warning, not an error:
    /// a restart with a different window can leave records pointing at
    /// bitmaps that were never touched since.
    pub fn release(&mut self, key: &K, ports: &[u16]) {
        if let Some(bitmap) = self.maps.get_mut(key) {
            bitmap.clear(ports, &self.blocked);
        } else {
            tracing::warn!(%key, "release for untracked load balancer, ignoring");
        }
    }

    fn bitmap(&mut self, key: &K) -> &mut PortBitmap {
        self.maps
            .entry(key.clone())
            .or_insert_with(|| PortBitmap::new(self.range, &self.blocked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LbId;
    use pretty_assertions::assert_eq;

    fn space(min: u16, max: u16, blocked: &[u16]) -> PortSpace<LbId> {
        PortSpace::new(
            PortRange::new_checked(min, max).unwrap(),
            blocked.iter().copied(),
        )
    }

    #[test]
    fn first_fit_walks_the_caller_order() {
        let mut space = space(512, 514, &[]);
        let lbs = [LbId::from("lb-A"), LbId::from("lb-B")];

        let (lb, ports) = space.reserve_first_fit(&lbs, 2).unwrap();
        assert_eq!(lb, lbs[0]);
        assert_eq!(ports, vec![512, 513]);

        // lb-A has one slot left; asking for two skips to lb-B.
        let (lb, ports) = space.reserve_first_fit(&lbs, 2).unwrap();
        assert_eq!(lb, lbs[1]);
        assert_eq!(ports, vec![512, 513]);
    }

    #[test]
    fn exhaustion_reports_the_lb_set_without_mutation() {
        let mut space = space(8000, 8002, &[8001]);
        let lbs = [LbId::from("lb-A")];

        let err = space.reserve_first_fit(&lbs, 3).unwrap_err();
        assert_eq!(
            err,
            AllocError::NoAvailablePorts {
                requested: 3,
                lb_set: "lb-A".to_owned()
            }
        );
        // The failed attempt left everything free.
        assert_eq!(space.free_count(&lbs[0]), 2);
    }

    #[tracing_test::traced_test]
    #[test]
    fn release_for_unknown_key_warns_and_does_nothing() {
        let mut space = space(512, 514, &[]);
        space.release(&LbId::from("never-seen"), &[512]);
        assert_eq!(space.free_count(&LbId::from("never-seen")), 3);
        assert!(logs_contain("release for untracked load balancer"));
    }
}
