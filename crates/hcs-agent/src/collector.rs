//! The collector pipeline.
//!
//! Each collector fills its own section of the [`Metrics`] snapshot from one
//! detector observation. Collectors are isolated: a failing collector logs
//! and never cancels its peers. The tick as a whole still fails when any
//! collector failed, so a partial snapshot is never published.

use crate::error::{AgentError, Result};
use crate::health;
pub use crate::topology::TopologyMetrics;
use hcs_core::{ComputeFingerprint, LinkKind};
use hcs_detector::DetectorOutput;
use std::collections::HashMap;
use tracing::warn;

/// Node-level health section.
#[derive(Clone, Debug, Default)]
pub struct NodeHealthMetrics {
    /// Mean of per-device scores; `None` when no device reported health.
    pub aggregate_score: Option<f64>,
    pub per_device: HashMap<String, f64>,
}

/// Flattened per-device row, ready for the node record.
#[derive(Clone, Debug)]
pub struct DeviceMetrics {
    pub id: String,
    pub model: String,
    pub vram_total: u64,
    pub vram_used: u64,
    pub pcie_bus_id: String,
    pub health_score: f64,
    pub interconnect: LinkKind,
}

/// One collection tick's worth of observations.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// `None` only while the pipeline is still assembling the tick; a
    /// published snapshot always carries a fingerprint.
    pub fingerprint: Option<ComputeFingerprint>,
    pub health: NodeHealthMetrics,
    pub topology: TopologyMetrics,
    pub devices: Vec<DeviceMetrics>,
}

/// One stage of the pipeline.
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    fn collect(&self, observation: &DetectorOutput, metrics: &mut Metrics) -> Result<()>;
}

/// Builds the compute fingerprint from the raw observation.
pub struct FingerprintCollector;

impl Collector for FingerprintCollector {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    fn collect(&self, observation: &DetectorOutput, metrics: &mut Metrics) -> Result<()> {
        for device in &observation.devices {
            device.validate().map_err(|e| AgentError::Collector {
                collector: self.name().to_string(),
                detail: e.to_string(),
            })?;
        }
        metrics.fingerprint = Some(ComputeFingerprint::new(
            observation.detection.vendor.clone(),
            observation.detection.driver_available,
            observation.detection.driver_version.clone(),
            observation.devices.clone(),
            observation.topology.clone().unwrap_or_default(),
        ));
        Ok(())
    }
}

/// Scores each device and aggregates the node health.
pub struct HealthCollector;

impl Collector for HealthCollector {
    fn name(&self) -> &'static str {
        "health"
    }

    fn collect(&self, observation: &DetectorOutput, metrics: &mut Metrics) -> Result<()> {
        let mut per_device = HashMap::with_capacity(observation.devices.len());
        let mut scores = Vec::with_capacity(observation.devices.len());
        for device in &observation.devices {
            let score = health::score_device(
                device.temperature_c,
                device.ecc_errors,
                Some(device.health_score),
            );
            per_device.insert(device.id.clone(), score);
            scores.push(score);
        }
        metrics.health = NodeHealthMetrics {
            aggregate_score: health::aggregate(&scores),
            per_device,
        };
        Ok(())
    }
}

/// Aggregates the interconnect topology.
pub struct TopologyCollector;

impl Collector for TopologyCollector {
    fn name(&self) -> &'static str {
        "topology"
    }

    fn collect(&self, observation: &DetectorOutput, metrics: &mut Metrics) -> Result<()> {
        match &observation.topology {
            Some(topology) => {
                metrics.topology = TopologyMetrics::from_topology(topology);
            }
            None => {
                warn!("no topology in observation, reporting unknown interconnect");
                metrics.topology = TopologyMetrics::default();
            }
        }
        Ok(())
    }
}

/// The standard pipeline, in execution order.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(FingerprintCollector),
        Box::new(HealthCollector),
        Box::new(TopologyCollector),
    ]
}

/// Run the pipeline over one observation.
///
/// Every collector runs even when an earlier one failed, so one bad
/// collector cannot starve its peers of a tick. Any failure still fails the
/// tick afterwards: the caller keeps its previous snapshot and a partial
/// `Metrics` is never published. The per-device rows are assembled last.
pub fn run_pipeline(
    collectors: &[Box<dyn Collector>],
    observation: &DetectorOutput,
) -> Result<Metrics> {
    let mut metrics = Metrics::default();
    let mut first_failure = None;
    for collector in collectors {
        if let Err(e) = collector.collect(observation, &mut metrics) {
            warn!(
                collector = collector.name(),
                error = %e,
                "collector failed, continuing with remaining collectors"
            );
            first_failure.get_or_insert(e);
        }
    }
    if let Some(e) = first_failure {
        return Err(e);
    }

    metrics.devices = observation
        .devices
        .iter()
        .map(|device| DeviceMetrics {
            id: device.id.clone(),
            model: device.model.clone(),
            vram_total: device.vram_total,
            vram_used: device.vram_used,
            pcie_bus_id: device.pcie_bus_id.clone(),
            health_score: metrics
                .health
                .per_device
                .get(&device.id)
                .copied()
                .unwrap_or(device.health_score),
            interconnect: metrics.topology.link_for(&device.id),
        })
        .collect();

    Ok(metrics)
}
