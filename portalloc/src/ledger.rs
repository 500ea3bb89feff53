// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

use crate::range::PortRange;
use crate::LbId;
use ahash::AHashMap;
use api::keys;
use api::{Protocol, Service};

/// What one pod holds: which load balancers, which external ports, and how
/// they map onto the pod's container ports.
///
/// `ports`, `protocols` and `target_ports` are parallel, one element per
/// materialized service port. A TCP+UDP fan-out therefore contributes two
/// elements sharing one external port; [`AllocationRecord::distinct_ports`]
/// is what the bitmaps track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationRecord {
    pub lb_ids: Vec<LbId>,
    pub ports: Vec<u16>,
    pub protocols: Vec<Protocol>,
    pub target_ports: Vec<u16>,
    /// Bank the ports were chosen in, multi-LB plugins only.
    pub bank: Option<usize>,
}

impl AllocationRecord {
    /// External ports in first-seen order, fan-out duplicates removed.
    #[must_use]
    pub fn distinct_ports(&self) -> Vec<u16> {
        let mut out: Vec<u16> = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            if !out.contains(port) {
                out.push(*port);
            }
        }
        out
    }
}

/// `pod key -> allocation`. The authoritative in-memory map, derivable at
/// any time from the set of materialized services.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    records: AHashMap<String, AllocationRecord>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, pod_key: &str) -> Option<&AllocationRecord> {
        self.records.get(pod_key)
    }

    pub fn upsert(&mut self, pod_key: &str, record: AllocationRecord) {
        self.records.insert(pod_key.to_owned(), record);
    }

    pub fn delete(&mut self, pod_key: &str) -> Option<AllocationRecord> {
        self.records.remove(pod_key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AllocationRecord)> {
        self.records.iter()
    }

    /// Pod keys starting with `prefix`, for fixed-lifecycle teardown of a
    /// whole workload.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Initial population from live services.
    ///
    /// Each service must carry the pod-name selector and the LB-id
    /// annotation to count; services with any port outside `range` are
    /// treated as externally managed and skipped entirely. Two services for
    /// the same pod (the multi-LB case) coalesce: the extra LB id is
    /// appended in service-iteration order, ports are taken from the first.
    #[must_use]
    pub fn rebuild(services: &[Service], range: PortRange) -> Self {
        let mut ledger = Self::new();
        for svc in services {
            let Some(pod_name) = svc.spec.selector.get(keys::POD_NAME) else {
                continue;
            };
            let Some(lb_id) = svc.annotation(keys::LB_ID) else {
                continue;
            };
            if svc.spec.ports.is_empty()
                || svc.spec.ports.iter().any(|p| !range.contains(p.port))
            {
                tracing::debug!(
                    service = %svc.key(),
                    "ports outside the allocation window, treating as externally managed"
                );
                continue;
            }

            let pod_key = format!("{}/{}", svc.meta.namespace, pod_name);
            if let Some(existing) = ledger.records.get_mut(&pod_key) {
                existing.lb_ids.push(LbId::from(lb_id));
                continue;
            }

            let bank = svc
                .annotation(keys::LB_BANK)
                .and_then(|raw| raw.parse().ok());
            let record = AllocationRecord {
                lb_ids: vec![LbId::from(lb_id)],
                ports: svc.spec.ports.iter().map(|p| p.port).collect(),
                protocols: svc.spec.ports.iter().map(|p| p.protocol).collect(),
                target_ports: svc.spec.ports.iter().map(|p| p.target_port).collect(),
                bank,
            };
            ledger.records.insert(pod_key, record);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{ObjectMeta, ServicePort};
    use pretty_assertions::assert_eq;

    fn service(ns: &str, pod: &str, lb: &str, ports: &[u16]) -> Service {
        let mut svc = Service {
            meta: ObjectMeta::named(ns, pod),
            ..Service::default()
        };
        svc.meta.set_annotation(keys::LB_ID, lb);
        svc.spec.selector.insert(keys::POD_NAME.to_owned(), pod.to_owned());
        svc.spec.ports = ports
            .iter()
            .map(|p| ServicePort {
                name: p.to_string(),
                port: *p,
                protocol: Protocol::Tcp,
                target_port: 80,
                node_port: None,
            })
            .collect();
        svc
    }

    #[test]
    fn rebuild_recovers_records_from_services() {
        let range = PortRange::new_checked(512, 712).unwrap();
        let services = vec![
            service("ns-0", "name-0", "lb-A", &[666]),
            service("ns-1", "name-1", "lb-B", &[555]),
        ];
        let ledger = Ledger::rebuild(&services, range);

        assert_eq!(ledger.len(), 2);
        let rec = ledger.lookup("ns-0/name-0").unwrap();
        assert_eq!(rec.lb_ids, vec![LbId::from("lb-A")]);
        assert_eq!(rec.ports, vec![666]);
        let rec = ledger.lookup("ns-1/name-1").unwrap();
        assert_eq!(rec.lb_ids, vec![LbId::from("lb-B")]);
        assert_eq!(rec.ports, vec![555]);
    }

    #[test]
    fn rebuild_skips_out_of_range_services() {
        let range = PortRange::new_checked(512, 712).unwrap();
        let services = vec![service("ns-0", "name-0", "lb-A", &[80])];
        let ledger = Ledger::rebuild(&services, range);
        assert!(ledger.is_empty());
    }

    #[test]
    fn rebuild_coalesces_multi_lb_services_in_order() {
        let range = PortRange::new_checked(512, 712).unwrap();
        let mut first = service("ns-0", "name-0", "lb-A", &[600]);
        first.meta.name = "name-0-isp1".to_owned();
        first.meta.set_annotation(keys::LB_BANK, "0");
        let mut second = service("ns-0", "name-0", "lb-B", &[600]);
        second.meta.name = "name-0-isp2".to_owned();

        let ledger = Ledger::rebuild(&[first, second], range);
        let rec = ledger.lookup("ns-0/name-0").unwrap();
        assert_eq!(rec.lb_ids, vec![LbId::from("lb-A"), LbId::from("lb-B")]);
        assert_eq!(rec.bank, Some(0));
        assert_eq!(rec.ports, vec![600]);
    }

    #[test]
    fn distinct_ports_folds_fan_out_entries() {
        let record = AllocationRecord {
            lb_ids: vec![LbId::from("lb-A")],
            ports: vec![8000, 8000, 8002],
            protocols: vec![Protocol::Tcp, Protocol::Udp, Protocol::Tcp],
            target_ports: vec![80, 80, 81],
            bank: None,
        };
        assert_eq!(record.distinct_ports(), vec![8000, 8002]);
    }
}
