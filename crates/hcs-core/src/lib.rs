//! Core data model for the heterogeneous compute scheduler.
//!
//! This crate holds the leaf types shared by every HCS component: the
//! per-node compute fingerprint, the `ComputeNode` declarative record, the
//! abstract compute request extracted from pods, and the node-record store
//! abstraction. It deliberately knows nothing about detectors, scheduling
//! or admission; those crates depend on this one, never the reverse.

pub mod error;
pub mod fingerprint;
pub mod health_events;
pub mod quantity;
pub mod record;
pub mod request;
pub mod store;
pub mod vendor;

pub use error::{Error, Result};
pub use fingerprint::{
    AggregateCapacity, ComputeCapability, ComputeFingerprint, DeviceRecord, LinkKind, PciAddress,
    Topology, TopologyLink, TopologyVertex,
};
pub use record::{
    ComputeNode, ComputeNodeSpec, ComputeNodeStatus, ConditionKind, ConditionStatus, DeviceStatus,
    NodeCondition, NodePhase, TotalCapacity,
};
pub use request::ComputeRequest;
pub use store::{ComputeNodeStore, KubeStore, MemoryStore, StoreError};
pub use vendor::Vendor;
