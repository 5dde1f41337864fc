//! The `ComputeNode` declarative record.
//!
//! A cluster-scoped custom resource, one per compute node, owned by the node
//! agent and read by the scheduling extender. The spec carries identity and
//! total capacity; the status carries per-device observations, conditions and
//! the derived phase.

use crate::fingerprint::LinkKind;
use crate::vendor::Vendor;
use chrono::Utc;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Node-level capacity totals, as exposed to the scheduler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TotalCapacity {
    /// Total VRAM across all devices, in bytes.
    pub vram: u64,
    pub fp16_tflops: f64,
    pub fp32_tflops: f64,
}

/// Spec of the `ComputeNode` record.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "hetero.zrs.io",
    version = "v1alpha1",
    kind = "ComputeNode",
    plural = "computenodes",
    status = "ComputeNodeStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNodeSpec {
    pub node_name: String,
    #[schemars(with = "String")]
    pub vendor: Vendor,
    pub total_capacity: TotalCapacity,
}

/// Per-device slice of the node status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub id: String,
    pub model: String,
    pub vram_total: u64,
    pub vram_used: u64,
    pub health_score: f64,
    #[serde(rename = "pcieBusID")]
    pub pcie_bus_id: String,
    #[serde(rename = "interconnectType")]
    #[schemars(with = "String")]
    pub interconnect_type: LinkKind,
}

/// The lifecycle phase of a compute node, derived from observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NodePhase {
    #[default]
    Initializing,
    Ready,
    Unhealthy,
    Terminating,
}

/// Aggregate health below which a node is considered unhealthy.
pub const UNHEALTHY_THRESHOLD: f64 = 30.0;

impl NodePhase {
    /// Derive the phase from the current observation.
    ///
    /// `collected` is false until the agent's first successful collection.
    /// Health data absent or an aggregate score below
    /// [`UNHEALTHY_THRESHOLD`] forces `Unhealthy`; otherwise the node is
    /// `Ready` when the driver and at least one device are present.
    pub fn derive(
        collected: bool,
        driver_available: bool,
        devices_present: bool,
        aggregate_health: Option<f64>,
    ) -> NodePhase {
        if !collected {
            return NodePhase::Initializing;
        }
        match aggregate_health {
            None => NodePhase::Unhealthy,
            Some(score) if score < UNHEALTHY_THRESHOLD => NodePhase::Unhealthy,
            Some(_) if driver_available && devices_present => NodePhase::Ready,
            Some(_) => NodePhase::Unhealthy,
        }
    }
}

/// Condition kinds reported on every node record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionKind {
    DriverAvailable,
    DevicesReady,
    Healthy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(b: bool) -> Self {
        if b {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: String,
}

impl NodeCondition {
    pub fn new(
        kind: ConditionKind,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        NodeCondition {
            kind,
            status: status.into(),
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now().to_rfc3339(),
        }
    }
}

/// Status of the `ComputeNode` record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNodeStatus {
    pub phase: NodePhase,
    pub devices: Vec<DeviceStatus>,
    pub conditions: Vec<NodeCondition>,
}

impl ComputeNode {
    /// VRAM still unclaimed by running workloads: total capacity minus the
    /// per-device used bytes from the last observation.
    pub fn available_vram(&self) -> u64 {
        let used: u64 = self
            .status
            .as_ref()
            .map(|s| s.devices.iter().map(|d| d.vram_used).sum())
            .unwrap_or(0);
        self.spec.total_capacity.vram.saturating_sub(used)
    }

    pub fn phase(&self) -> NodePhase {
        self.status.as_ref().map_or(NodePhase::Initializing, |s| s.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_derivation() {
        assert_eq!(
            NodePhase::derive(false, true, true, Some(100.0)),
            NodePhase::Initializing
        );
        assert_eq!(
            NodePhase::derive(true, true, true, Some(95.0)),
            NodePhase::Ready
        );
        assert_eq!(
            NodePhase::derive(true, true, true, Some(29.9)),
            NodePhase::Unhealthy
        );
        assert_eq!(NodePhase::derive(true, true, true, None), NodePhase::Unhealthy);
        assert_eq!(
            NodePhase::derive(true, false, true, Some(90.0)),
            NodePhase::Unhealthy
        );
        assert_eq!(
            NodePhase::derive(true, true, false, Some(90.0)),
            NodePhase::Unhealthy
        );
    }

    #[test]
    fn status_json_casing_matches_contract() {
        let status = ComputeNodeStatus {
            phase: NodePhase::Ready,
            devices: vec![DeviceStatus {
                id: "gpu-0".into(),
                model: "A100-80GB".into(),
                vram_total: 80,
                vram_used: 10,
                health_score: 95.0,
                pcie_bus_id: "0000:3b:00.0".into(),
                interconnect_type: LinkKind::NvLink,
            }],
            conditions: vec![NodeCondition::new(
                ConditionKind::DriverAvailable,
                true,
                "DriverFound",
                "nvml initialized",
            )],
        };
        let json = serde_json::to_value(&status).unwrap();
        let device = &json["devices"][0];
        assert!(device.get("vramTotal").is_some());
        assert!(device.get("vramUsed").is_some());
        assert!(device.get("healthScore").is_some());
        assert!(device.get("pcieBusID").is_some());
        assert_eq!(device["interconnectType"], "NVLink");
        let condition = &json["conditions"][0];
        assert_eq!(condition["type"], "DriverAvailable");
        assert_eq!(condition["status"], "True");
        assert!(condition.get("lastTransitionTime").is_some());
    }

    #[test]
    fn available_vram_subtracts_device_usage() {
        let mut node = ComputeNode::new(
            "node-a",
            ComputeNodeSpec {
                node_name: "node-a".into(),
                vendor: Vendor::Nvidia,
                total_capacity: TotalCapacity {
                    vram: 100,
                    fp16_tflops: 624.0,
                    fp32_tflops: 39.0,
                },
            },
        );
        assert_eq!(node.available_vram(), 100);

        node.status = Some(ComputeNodeStatus {
            phase: NodePhase::Ready,
            devices: vec![
                DeviceStatus {
                    vram_used: 10,
                    ..Default::default()
                },
                DeviceStatus {
                    vram_used: 25,
                    ..Default::default()
                },
            ],
            conditions: vec![],
        });
        assert_eq!(node.available_vram(), 65);
        assert_eq!(node.phase(), NodePhase::Ready);
    }

    #[test]
    fn spec_json_casing() {
        let spec = ComputeNodeSpec {
            node_name: "node-a".into(),
            vendor: Vendor::Huawei,
            total_capacity: TotalCapacity {
                vram: 1,
                fp16_tflops: 2.0,
                fp32_tflops: 3.0,
            },
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["nodeName"], "node-a");
        assert_eq!(json["vendor"], "huawei");
        assert!(json["totalCapacity"].get("fp16Tflops").is_some());
    }
}
