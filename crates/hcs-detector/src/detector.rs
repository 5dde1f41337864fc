//! The detector contract consumed by the node agent.

use crate::error::Result;
use async_trait::async_trait;
use hcs_core::{DeviceRecord, Topology, Vendor};

/// Result of probing a node for a vendor driver.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub vendor: Vendor,
    pub driver_available: bool,
    pub driver_version: String,
}

/// One full observation pulled from a detector, as consumed by the agent's
/// collector pipeline. Topology is optional: a probe that cannot enumerate
/// links still produces a usable observation.
#[derive(Clone, Debug)]
pub struct DetectorOutput {
    pub detection: Detection,
    pub devices: Vec<DeviceRecord>,
    pub topology: Option<Topology>,
}

/// A hardware backend.
///
/// Implementations perform syscalls or FFI and are therefore async; they must
/// be safe to call from concurrent tasks. `close` is called exactly once,
/// after both agent loops have drained.
#[async_trait]
pub trait HardwareDetector: Send + Sync {
    /// Registry key, e.g. `nvidia` or `mock`.
    fn name(&self) -> &str;

    /// Probe for the vendor driver.
    async fn detect(&self) -> Result<Detection>;

    /// Enumerate devices, ordered by stable device id.
    async fn devices(&self) -> Result<Vec<DeviceRecord>>;

    /// Enumerate inter-device links.
    async fn topology(&self) -> Result<Topology>;

    /// Release driver handles.
    async fn close(&self) -> Result<()>;
}
