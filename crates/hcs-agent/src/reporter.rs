//! Mirrors the latest snapshot into the `ComputeNode` record.

use crate::collector::Metrics;
use crate::error::Result;
use hcs_core::{
    ComputeNode, ComputeNodeSpec, ComputeNodeStatus, ComputeNodeStore, ConditionKind,
    DeviceStatus, NodeCondition, NodePhase, StoreError, TotalCapacity, Vendor,
    record::UNHEALTHY_THRESHOLD,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Build the record spec and status for one snapshot.
pub fn build_record(node_name: &str, metrics: &Metrics) -> (ComputeNodeSpec, ComputeNodeStatus) {
    let (vendor, driver_available, capacity) = match &metrics.fingerprint {
        Some(fp) => (
            fp.vendor.clone(),
            fp.driver_available,
            TotalCapacity {
                vram: fp.capacity.vram_bytes,
                fp16_tflops: fp.capacity.fp16_tflops,
                fp32_tflops: fp.capacity.fp32_tflops,
            },
        ),
        None => (Vendor::Custom("unknown".into()), false, TotalCapacity::default()),
    };

    let spec = ComputeNodeSpec {
        node_name: node_name.to_string(),
        vendor,
        total_capacity: capacity,
    };

    let devices: Vec<DeviceStatus> = metrics
        .devices
        .iter()
        .map(|d| DeviceStatus {
            id: d.id.clone(),
            model: d.model.clone(),
            vram_total: d.vram_total,
            vram_used: d.vram_used,
            health_score: d.health_score,
            pcie_bus_id: d.pcie_bus_id.clone(),
            interconnect_type: d.interconnect,
        })
        .collect();

    let aggregate = metrics.health.aggregate_score;
    let healthy = aggregate.is_some_and(|s| s >= UNHEALTHY_THRESHOLD);
    let phase = NodePhase::derive(
        metrics.fingerprint.is_some(),
        driver_available,
        !devices.is_empty(),
        aggregate,
    );

    let conditions = vec![
        NodeCondition::new(
            ConditionKind::DriverAvailable,
            driver_available,
            if driver_available { "DriverFound" } else { "DriverMissing" },
            match &metrics.fingerprint {
                Some(fp) if fp.driver_available => {
                    format!("driver {} responding", fp.driver_version)
                }
                _ => "no vendor driver detected".to_string(),
            },
        ),
        NodeCondition::new(
            ConditionKind::DevicesReady,
            !devices.is_empty(),
            if devices.is_empty() { "NoDevices" } else { "DevicesEnumerated" },
            format!("{} device(s) enumerated", devices.len()),
        ),
        NodeCondition::new(
            ConditionKind::Healthy,
            healthy,
            if healthy { "HealthAboveThreshold" } else { "HealthDegraded" },
            match aggregate {
                Some(score) => format!("aggregate health score {score:.1}"),
                None => "no health data".to_string(),
            },
        ),
    ];

    let status = ComputeNodeStatus {
        phase,
        devices,
        conditions,
    };
    (spec, status)
}

/// Keep previous transition timestamps for conditions whose status did not
/// change.
fn carry_transition_times(previous: &ComputeNodeStatus, next: &mut ComputeNodeStatus) {
    for condition in &mut next.conditions {
        if let Some(old) = previous.conditions.iter().find(|c| c.kind == condition.kind) {
            if old.status == condition.status {
                condition.last_transition_time = old.last_transition_time.clone();
            }
        }
    }
}

/// Upsert the node record: create on first report, update spec and status in
/// separate calls afterwards.
pub async fn report(
    store: &Arc<dyn ComputeNodeStore>,
    node_name: &str,
    metrics: &Metrics,
) -> Result<()> {
    let (spec, mut status) = build_record(node_name, metrics);

    match store.get(node_name).await {
        Ok(existing) => {
            if let Some(previous) = &existing.status {
                carry_transition_times(previous, &mut status);
            }
            store.update_spec(node_name, &spec).await?;
            store.update_status(node_name, &status).await?;
            debug!(node = node_name, phase = ?status.phase, "node record updated");
        }
        Err(StoreError::NotFound(_)) => {
            let mut record = ComputeNode::new(node_name, spec);
            record.status = Some(status.clone());
            match store.create(&record).await {
                Ok(()) => {
                    info!(node = node_name, phase = ?status.phase, "node record created");
                    // Status subresources are not writable at create time on
                    // the real API server.
                    store.update_status(node_name, &status).await?;
                }
                Err(StoreError::AlreadyExists(_)) => {
                    warn!(node = node_name, "record appeared concurrently, retrying next tick");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{default_collectors, run_pipeline};
    use hcs_core::MemoryStore;
    use hcs_detector::{DetectorOutput, HardwareDetector, MockConfig, MockDetector};

    async fn metrics_from(mock: &MockDetector) -> Metrics {
        let observation = DetectorOutput {
            detection: mock.detect().await.unwrap(),
            devices: mock.devices().await.unwrap(),
            topology: mock.topology().await.ok(),
        };
        run_pipeline(&default_collectors(), &observation).unwrap()
    }

    #[tokio::test]
    async fn first_report_creates_then_updates() {
        let store: Arc<dyn ComputeNodeStore> = Arc::new(MemoryStore::new());
        let mock = MockDetector::default();
        let metrics = metrics_from(&mock).await;

        report(&store, "node-a", &metrics).await.unwrap();
        let record = store.get("node-a").await.unwrap();
        assert_eq!(record.phase(), NodePhase::Ready);
        assert_eq!(record.spec.total_capacity.vram, 160 << 30);
        assert_eq!(record.status.as_ref().unwrap().devices.len(), 2);

        // Second report goes down the update path.
        report(&store, "node-a", &metrics).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn driver_unavailable_reports_unhealthy() {
        let store: Arc<dyn ComputeNodeStore> = Arc::new(MemoryStore::new());
        let metrics = metrics_from(&MockDetector::degraded()).await;

        report(&store, "node-b", &metrics).await.unwrap();
        let record = store.get("node-b").await.unwrap();
        assert_eq!(record.phase(), NodePhase::Unhealthy);
        let status = record.status.unwrap();
        let driver = status
            .conditions
            .iter()
            .find(|c| c.kind == ConditionKind::DriverAvailable)
            .unwrap();
        assert_eq!(driver.status, hcs_core::ConditionStatus::False);
    }

    #[tokio::test]
    async fn unhealthy_when_aggregate_below_threshold() {
        let store: Arc<dyn ComputeNodeStore> = Arc::new(MemoryStore::new());
        let mock = MockDetector::new(MockConfig {
            temperature_c: 105.0,
            ecc_errors: 1000,
            ..MockConfig::default()
        });
        let metrics = metrics_from(&mock).await;
        assert!(metrics.health.aggregate_score.unwrap() < 30.0);

        report(&store, "node-c", &metrics).await.unwrap();
        assert_eq!(store.get("node-c").await.unwrap().phase(), NodePhase::Unhealthy);
    }

    #[tokio::test]
    async fn transition_times_survive_steady_state() {
        let store: Arc<dyn ComputeNodeStore> = Arc::new(MemoryStore::new());
        let mock = MockDetector::default();
        let metrics = metrics_from(&mock).await;

        report(&store, "node-d", &metrics).await.unwrap();
        let first = store.get("node-d").await.unwrap().status.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        report(&store, "node-d", &metrics).await.unwrap();
        let second = store.get("node-d").await.unwrap().status.unwrap();

        for (a, b) in first.conditions.iter().zip(second.conditions.iter()) {
            assert_eq!(a.last_transition_time, b.last_transition_time);
        }
    }
}
