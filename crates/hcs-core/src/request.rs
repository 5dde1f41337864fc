//! Extraction of abstract compute requests from pod specs.

use crate::error::Result;
use crate::quantity::parse_k8s_quantity;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Abstract VRAM request, in bytes (binary units accepted).
pub const RESOURCE_VRAM: &str = "ai.compute/vram";
/// Abstract FP16 throughput request, in integer TFLOPS.
pub const RESOURCE_TFLOPS_FP16: &str = "ai.compute/tflops-fp16";
/// Abstract FP32 throughput request, in integer TFLOPS (optional).
pub const RESOURCE_TFLOPS_FP32: &str = "ai.compute/tflops-fp32";

/// Prefix shared by all abstract compute resource names.
pub const ABSTRACT_RESOURCE_PREFIX: &str = "ai.compute/";

/// A pod's abstract compute request, summed across all containers
/// (init containers included).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub vram_bytes: u64,
    pub fp16_tflops: u64,
    pub fp32_tflops: Option<u64>,
}

impl ComputeRequest {
    pub fn is_empty(&self) -> bool {
        self.vram_bytes == 0 && self.fp16_tflops == 0 && self.fp32_tflops.unwrap_or(0) == 0
    }

    /// Extract the compute request from a pod. Returns `Ok(None)` for a pod
    /// with no `ai.compute/*` request at all; such pods are opaque to the
    /// scheduler extension.
    pub fn from_pod(pod: &Pod) -> Result<Option<ComputeRequest>> {
        let mut request = ComputeRequest::default();
        let mut saw_fp32 = false;

        for container in all_containers(pod) {
            if let Some(q) = container_resource(container, RESOURCE_VRAM) {
                request.vram_bytes += parse_k8s_quantity(q)?;
            }
            if let Some(q) = container_resource(container, RESOURCE_TFLOPS_FP16) {
                request.fp16_tflops += parse_k8s_quantity(q)?;
            }
            if let Some(q) = container_resource(container, RESOURCE_TFLOPS_FP32) {
                saw_fp32 = true;
                request.fp32_tflops =
                    Some(request.fp32_tflops.unwrap_or(0) + parse_k8s_quantity(q)?);
            }
        }

        if request.is_empty() && !saw_fp32 {
            return Ok(None);
        }
        Ok(Some(request))
    }
}

/// The maximum `ai.compute/vram` quantity across containers, in the original
/// string form. This is the quota value the memory interceptor observes.
pub fn max_vram_quantity(pod: &Pod) -> Result<Option<String>> {
    let mut best: Option<(u64, String)> = None;
    for container in all_containers(pod) {
        if let Some(q) = container_resource(container, RESOURCE_VRAM) {
            let bytes = parse_k8s_quantity(q)?;
            if best.as_ref().is_none_or(|(b, _)| bytes > *b) {
                best = Some((bytes, q.0.clone()));
            }
        }
    }
    Ok(best.map(|(_, s)| s))
}

/// Every resource name that appears in any container's requests or limits.
pub fn all_resource_names(pod: &Pod) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for container in all_containers(pod) {
        if let Some(resources) = &container.resources {
            for map in [&resources.requests, &resources.limits] {
                if let Some(map) = map {
                    names.extend(map.keys().cloned());
                }
            }
        }
    }
    names
}

/// All containers of a pod, main containers first, then init containers.
pub fn all_containers(pod: &Pod) -> impl Iterator<Item = &Container> {
    let spec = pod.spec.as_ref();
    let main = spec.map(|s| s.containers.iter()).into_iter().flatten();
    let init = spec
        .and_then(|s| s.init_containers.as_ref())
        .map(|c| c.iter())
        .into_iter()
        .flatten();
    main.chain(init)
}

/// A container's quantity for `name`: the request when present, otherwise the
/// limit.
fn container_resource<'a>(container: &'a Container, name: &str) -> Option<&'a Quantity> {
    let resources = container.resources.as_ref()?;
    resources
        .requests
        .as_ref()
        .and_then(|r| r.get(name))
        .or_else(|| resources.limits.as_ref().and_then(|l| l.get(name)))
}
