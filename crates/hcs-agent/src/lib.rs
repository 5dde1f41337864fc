//! The node agent.
//!
//! One instance runs on every compute node. A collect loop asks the selected
//! hardware detector for devices and topology and runs the collector
//! pipeline; a report loop mirrors the latest snapshot into the node's
//! `ComputeNode` record. The two loops share the snapshot through a
//! read/write lock and stop together.

pub mod agent;
pub mod collector;
pub mod error;
pub mod health;
pub mod reporter;
pub mod topology;

pub use agent::{Agent, AgentConfig};
pub use collector::{
    Collector, DeviceMetrics, FingerprintCollector, HealthCollector, Metrics, NodeHealthMetrics,
    TopologyCollector, TopologyMetrics,
};
pub use error::{AgentError, Result};
