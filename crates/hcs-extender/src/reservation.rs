//! The cluster-scoped reservation table.
//!
//! Reserve is the commit point of a scheduling cycle: capacity claimed here
//! is subtracted from availability until the pod is unreserved or an
//! external "pod bound" signal clears it. The table never holds its lock
//! across I/O; callers fetch node records first and only then take the lock
//! to read-and-mutate.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Capacity claimed by one pod on one node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reservation {
    pub vram_bytes: u64,
    pub fp16_tflops: u64,
}

/// `node → (namespace/name → reservation)`, guarded by a single
/// read/write lock.
#[derive(Default)]
pub struct ReservationTable {
    inner: RwLock<HashMap<String, HashMap<String, Reservation>>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        ReservationTable::default()
    }

    /// Atomically check capacity and insert a reservation.
    ///
    /// `available_vram` is the node's availability before any reservation is
    /// subtracted (total capacity minus device-observed usage). Returns
    /// `true` when the reservation now exists: either it was already present
    /// (idempotent re-reserve, nothing double-counted) or there was room and
    /// it was inserted.
    pub fn try_reserve(
        &self,
        node: &str,
        pod_key: &str,
        reservation: Reservation,
        available_vram: u64,
    ) -> bool {
        let mut inner = self.inner.write();
        let entries = inner.entry(node.to_string()).or_default();
        if entries.contains_key(pod_key) {
            return true;
        }
        let reserved: u64 = entries.values().map(|r| r.vram_bytes).sum();
        if available_vram.saturating_sub(reserved) < reservation.vram_bytes {
            if entries.is_empty() {
                inner.remove(node);
            }
            return false;
        }
        entries.insert(pod_key.to_string(), reservation);
        true
    }

    /// Remove one pod's reservation from one node.
    pub fn unreserve(&self, node: &str, pod_key: &str) {
        let mut inner = self.inner.write();
        if let Some(entries) = inner.get_mut(node) {
            entries.remove(pod_key);
            if entries.is_empty() {
                inner.remove(node);
            }
        }
    }

    /// Remove a pod's reservation wherever it is; the external "pod bound"
    /// signal funnels through here.
    pub fn clear_pod_reservation(&self, pod_key: &str) {
        let mut inner = self.inner.write();
        inner.retain(|_, entries| {
            entries.remove(pod_key);
            !entries.is_empty()
        });
    }

    /// Total VRAM reserved on a node.
    pub fn reserved_vram(&self, node: &str) -> u64 {
        self.inner
            .read()
            .get(node)
            .map(|entries| entries.values().map(|r| r.vram_bytes).sum())
            .unwrap_or(0)
    }

    pub fn get(&self, node: &str, pod_key: &str) -> Option<Reservation> {
        self.inner.read().get(node)?.get(pod_key).copied()
    }

    pub fn contains(&self, node: &str, pod_key: &str) -> bool {
        self.get(node, pod_key).is_some()
    }

    /// Number of reservations held on a node.
    pub fn count(&self, node: &str) -> usize {
        self.inner.read().get(node).map_or(0, HashMap::len)
    }

    /// Nodes currently holding a reservation for the pod.
    pub fn nodes_for(&self, pod_key: &str) -> Vec<String> {
        self.inner
            .read()
            .iter()
            .filter(|(_, entries)| entries.contains_key(pod_key))
            .map(|(node, _)| node.clone())
            .collect()
    }
}
