//! The compute plugin: PreFilter, Filter, Score, NormalizeScore, Reserve.

use crate::framework::{CycleState, Status};
use crate::reservation::{Reservation, ReservationTable};
use hcs_calculator::Calculator;
use hcs_core::{ComputeNodeStore, ComputeRequest, LinkKind, NodePhase, StoreError};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound of the per-node score range.
pub const MAX_SCORE: i64 = 100;

/// Cycle-state key under which PreFilter caches the parsed request.
pub const REQUEST_STATE_KEY: &str = "compute/request";

const COMPUTE_BAND: f64 = 25.0;
const MEMORY_BAND: f64 = 15.0;
const HEALTH_BAND_WEIGHT: f64 = 0.3;
const FIT_BAND: f64 = 20.0;
const FIT_FALLBACK: f64 = 10.0;
const NVLINK_BONUS: f64 = 10.0;
const UNKNOWN_HARDWARE_BAND: f64 = 40.0;

/// `namespace/name` identity used for reservations.
pub fn pod_key(pod: &Pod) -> String {
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .unwrap_or("default");
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    format!("{namespace}/{name}")
}

/// The extender's single plugin. Stateless across cycles except for the
/// reservation table.
pub struct ComputePlugin {
    store: Arc<dyn ComputeNodeStore>,
    calculator: Arc<Calculator>,
    reservations: Arc<ReservationTable>,
}

impl ComputePlugin {
    pub fn new(
        store: Arc<dyn ComputeNodeStore>,
        calculator: Arc<Calculator>,
        reservations: Arc<ReservationTable>,
    ) -> Self {
        ComputePlugin {
            store,
            calculator,
            reservations,
        }
    }

    pub fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    /// Parse the pod's compute request into cycle state. An opaque pod (no
    /// `ai.compute/*` request) succeeds without writing anything.
    pub fn pre_filter(&self, state: &mut CycleState, pod: &Pod) -> Status {
        match ComputeRequest::from_pod(pod) {
            Ok(Some(request)) => {
                debug!(pod = %pod_key(pod), ?request, "compute request parsed");
                state.write(REQUEST_STATE_KEY, request);
                Status::success()
            }
            Ok(None) => Status::success(),
            Err(e) => Status::error(format!("parsing compute request: {e}")),
        }
    }

    /// Evaluate one candidate node against the cached request.
    pub async fn filter(&self, state: &CycleState, _pod: &Pod, node_name: &str) -> Status {
        let Some(request) = state.read::<ComputeRequest>(REQUEST_STATE_KEY) else {
            return Status::success();
        };

        let node = match self.store.get(node_name).await {
            Ok(node) => node,
            Err(StoreError::NotFound(_)) => {
                return Status::unresolvable(format!("no compute record on node {node_name}"));
            }
            Err(e) => {
                warn!(node = node_name, error = %e, "node record lookup failed");
                return Status::unresolvable(format!("fetching compute record: {e}"));
            }
        };

        let phase = node.phase();
        if phase != NodePhase::Ready {
            return Status::unresolvable(format!("node {node_name} not ready (phase {phase:?})"));
        }

        let available = node.available_vram();
        if available < request.vram_bytes {
            return Status::unschedulable(format!(
                "insufficient VRAM on {node_name}: requested {}, available {}",
                request.vram_bytes, available
            ));
        }

        let capacity_fp16 = node.spec.total_capacity.fp16_tflops;
        if capacity_fp16 < request.fp16_tflops as f64 {
            return Status::unschedulable(format!(
                "insufficient FP16 on {node_name}: requested {} TFLOPS, capacity {} TFLOPS",
                request.fp16_tflops, capacity_fp16
            ));
        }

        Status::success()
    }

    /// Score one node in `[0, MAX_SCORE]`. Errors degrade to zero rather
    /// than dropping the node.
    pub async fn score(&self, state: &CycleState, _pod: &Pod, node_name: &str) -> i64 {
        let request = state.read::<ComputeRequest>(REQUEST_STATE_KEY);
        let node = match self.store.get(node_name).await {
            Ok(node) => node,
            Err(e) => {
                warn!(node = node_name, error = %e, "scoring fell back to zero");
                return 0;
            }
        };

        let devices = node
            .status
            .as_ref()
            .map(|s| s.devices.as_slice())
            .unwrap_or_default();

        // Normalized compute and memory through the calculator; unknown
        // hardware falls back to a raw VRAM-availability band of the same
        // total weight.
        let normalized = devices.first().and_then(|first| {
            self.calculator
                .normalize_compute(&node.spec.vendor, &first.model, devices.len())
                .ok()
        });
        let mut score = match normalized {
            Some(n) => COMPUTE_BAND * n.tflops.min(1.0) + MEMORY_BAND * n.vram.min(1.0),
            None => {
                let capacity = node.spec.total_capacity.vram.max(1);
                let ratio = node.available_vram() as f64 / capacity as f64;
                UNKNOWN_HARDWARE_BAND * ratio
            }
        };

        if !devices.is_empty() {
            let mean_health =
                devices.iter().map(|d| d.health_score).sum::<f64>() / devices.len() as f64;
            score += HEALTH_BAND_WEIGHT * mean_health;
        }

        let capacity_fp16 = node.spec.total_capacity.fp16_tflops;
        let requested_fp16 = request.map(|r| r.fp16_tflops as f64).unwrap_or(0.0);
        score += if requested_fp16 > 0.0 && requested_fp16 <= capacity_fp16 {
            FIT_BAND * requested_fp16 / capacity_fp16
        } else {
            FIT_FALLBACK
        };

        if devices
            .iter()
            .any(|d| d.interconnect_type == LinkKind::NvLink)
        {
            score += NVLINK_BONUS;
        }

        (score.round() as i64).clamp(0, MAX_SCORE)
    }

    /// Linearly rescale a score list into `[0, MAX_SCORE]`; an all-equal
    /// list lands on the midpoint.
    pub fn normalize_scores(scores: &mut [(String, i64)]) {
        let Some(&(_, first)) = scores.first() else {
            return;
        };
        let min = scores.iter().map(|&(_, s)| s).min().unwrap_or(first);
        let max = scores.iter().map(|&(_, s)| s).max().unwrap_or(first);
        if min == max {
            for (_, score) in scores.iter_mut() {
                *score = MAX_SCORE / 2;
            }
            return;
        }
        for (_, score) in scores.iter_mut() {
            *score = (*score - min) * MAX_SCORE / (max - min);
        }
    }

    /// Commit the cycle: claim capacity on the selected node.
    pub async fn reserve(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Status {
        let Some(request) = state.read::<ComputeRequest>(REQUEST_STATE_KEY) else {
            return Status::success();
        };
        let key = pod_key(pod);

        // Fetch outside the table lock, then check-and-insert atomically.
        let node = match self.store.get(node_name).await {
            Ok(node) => node,
            Err(e) => return Status::error(format!("fetching compute record: {e}")),
        };
        let available = node.available_vram();

        let reservation = Reservation {
            vram_bytes: request.vram_bytes,
            fp16_tflops: request.fp16_tflops,
        };
        if self
            .reservations
            .try_reserve(node_name, &key, reservation, available)
        {
            debug!(pod = %key, node = node_name, "capacity reserved");
            Status::success()
        } else {
            let reserved = self.reservations.reserved_vram(node_name);
            Status::unschedulable(format!(
                "cannot reserve on {node_name}: requested {}, available {} with {} already reserved",
                request.vram_bytes,
                available.saturating_sub(reserved),
                reserved
            ))
        }
    }

    /// Roll back a reservation made this cycle.
    pub fn unreserve(&self, pod: &Pod, node_name: &str) {
        self.reservations.unreserve(node_name, &pod_key(pod));
    }

    /// External "pod bound" signal: drop the pod's reservation everywhere.
    pub fn clear_pod_reservation(&self, pod_key: &str) {
        self.reservations.clear_pod_reservation(pod_key);
    }
}
