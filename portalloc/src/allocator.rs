// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

use crate::ledger::{AllocationRecord, Ledger};
use crate::range::PortRange;
use crate::space::PortSpace;
use crate::{AllocError, LbId};
use api::Service;
use std::collections::BTreeSet;

/// The allocator facade the LB-backed plugins hold behind their lock: a
/// [`PortSpace`] keyed by load balancer plus the [`Ledger`].
///
/// Not synchronized; the owning plugin wraps it in a `RwLock` and performs
/// cluster I/O outside the critical section.
#[derive(Clone, Debug)]
pub struct LbAllocator {
    space: PortSpace<LbId>,
    ledger: Ledger,
}

impl LbAllocator {
    #[must_use]
    pub fn new(range: PortRange, blocked: impl IntoIterator<Item = u16>) -> Self {
        Self {
            space: PortSpace::new(range, blocked),
            ledger: Ledger::new(),
        }
    }

    #[must_use]
    pub fn range(&self) -> PortRange {
        self.space.range()
    }

    #[must_use]
    pub fn blocked(&self) -> &BTreeSet<u16> {
        self.space.blocked()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.space.capacity()
    }

    #[must_use]
    pub fn free_count(&mut self, lb: &LbId) -> usize {
        self.space.free_count(lb)
    }

    #[must_use]
    pub fn lookup(&self, pod_key: &str) -> Option<&AllocationRecord> {
        self.ledger.lookup(pod_key)
    }

    /// Enrich or replace a record. The ports must already be reserved; this
    /// only touches the ledger.
    pub fn upsert(&mut self, pod_key: &str, record: AllocationRecord) {
        self.ledger.upsert(pod_key, record);
    }

    /// Reserve `n` ports for `pod_key` on the first load balancer in
    /// `lb_set` with room. Re-entrant: an existing record is returned as-is
    /// so a repeated reconcile never double-allocates.
    pub fn reserve(
        &mut self,
        lb_set: &[LbId],
        n: usize,
        pod_key: &str,
    ) -> Result<(LbId, Vec<u16>), AllocError> {
        if let Some(existing) = self.ledger.lookup(pod_key) {
            let lb = existing.lb_ids.first().cloned().unwrap_or_else(|| {
                // A record always names at least one LB at reserve time.
                LbId::from("")
            });
            return Ok((lb, existing.distinct_ports()));
        }

        let (lb, ports) = self.space.reserve_first_fit(lb_set, n)?;
        self.ledger.upsert(
            pod_key,
            AllocationRecord {
                lb_ids: vec![lb.clone()],
                ports: ports.clone(),
                protocols: Vec::new(),
                target_ports: Vec::new(),
                bank: None,
            },
        );
        Ok((lb, ports))
    }

    /// Free whatever `pod_key` holds. Idempotent; missing keys do nothing.
    pub fn release(&mut self, pod_key: &str) {
        if let Some(record) = self.ledger.delete(pod_key) {
            let ports = record.distinct_ports();
            for lb in &record.lb_ids {
                self.space.release(lb, &ports);
            }
        }
    }

    /// Free every record whose pod key starts with `prefix`; the
    /// fixed-lifecycle teardown path when the owning workload goes away.
    /// Returns how many records were released.
    pub fn release_owned_by(&mut self, prefix: &str) -> usize {
        let keys = self.ledger.keys_with_prefix(prefix);
        let released = keys.len();
        for key in keys {
            self.release(&key);
        }
        released
    }

    /// Adopt a record reconstructed from an external carrier (e.g. pod
    /// annotations): ledger entry plus bitmap marks in one step.
    pub fn restore(&mut self, pod_key: &str, record: AllocationRecord) {
        let ports = record.distinct_ports();
        for lb in &record.lb_ids {
            self.space.mark_used(lb, &ports);
        }
        self.ledger.upsert(pod_key, record);
    }

    /// Startup reconstruction from the services observed live in the
    /// cluster. Replaces the ledger and re-marks the bitmaps atomically
    /// with respect to the caller's lock.
    pub fn rebuild(&mut self, services: &[Service]) {
        self.ledger = Ledger::rebuild(services, self.space.range());
        let marks: Vec<(Vec<LbId>, Vec<u16>)> = self
            .ledger
            .iter()
            .map(|(_, rec)| (rec.lb_ids.clone(), rec.distinct_ports()))
            .collect();
        for (lbs, ports) in marks {
            for lb in lbs {
                self.space.mark_used(&lb, &ports);
            }
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}
