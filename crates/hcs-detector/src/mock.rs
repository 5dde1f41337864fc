//! A configurable in-process detector.
//!
//! Contractually equivalent to a real probe: the agent, extender and their
//! tests cannot tell the difference. Failure injection flags let tests drive
//! the per-collector isolation paths.

use crate::detector::{Detection, HardwareDetector};
use crate::error::{DetectorError, Result};
use async_trait::async_trait;
use hcs_core::{
    ComputeCapability, DeviceRecord, LinkKind, Topology, TopologyLink, TopologyVertex, Vendor,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// Shape of the synthetic hardware the mock reports.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub vendor: Vendor,
    pub model: String,
    pub driver_available: bool,
    pub driver_version: String,
    pub device_count: usize,
    pub vram_per_device: u64,
    pub vram_used_per_device: u64,
    pub fp16_tflops: f64,
    pub fp32_tflops: f64,
    pub temperature_c: f64,
    pub power_watts: f64,
    pub ecc_errors: u64,
    pub health_score: f64,
    pub link_kind: LinkKind,
    pub link_bandwidth_gbps: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        MockConfig {
            vendor: Vendor::Nvidia,
            model: "A100-80GB".to_string(),
            driver_available: true,
            driver_version: "mock-1.0".to_string(),
            device_count: 2,
            vram_per_device: 80 << 30,
            vram_used_per_device: 0,
            fp16_tflops: 312.0,
            fp32_tflops: 19.5,
            temperature_c: 45.0,
            power_watts: 250.0,
            ecc_errors: 0,
            health_score: 100.0,
            link_kind: LinkKind::NvLink,
            link_bandwidth_gbps: 600.0,
        }
    }
}

pub struct MockDetector {
    config: MockConfig,
    fail_devices: AtomicBool,
    fail_topology: AtomicBool,
    corrupt_devices: AtomicBool,
    closed: AtomicBool,
}

impl MockDetector {
    pub fn new(config: MockConfig) -> Self {
        MockDetector {
            config,
            fail_devices: AtomicBool::new(false),
            fail_topology: AtomicBool::new(false),
            corrupt_devices: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The degraded fallback used when no registered probe finds a driver:
    /// no driver, no devices.
    pub fn degraded() -> Self {
        MockDetector::new(MockConfig {
            driver_available: false,
            driver_version: String::new(),
            device_count: 0,
            ..MockConfig::default()
        })
    }

    /// Make subsequent `devices` calls fail.
    pub fn fail_devices(&self, fail: bool) {
        self.fail_devices.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `topology` calls fail.
    pub fn fail_topology(&self, fail: bool) {
        self.fail_topology.store(fail, Ordering::SeqCst);
    }

    /// Make `devices` succeed but hand back records that violate the VRAM
    /// accounting invariant, the way a misbehaving driver would.
    pub fn corrupt_devices(&self, corrupt: bool) {
        self.corrupt_devices.store(corrupt, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn device(&self, index: usize) -> DeviceRecord {
        let mut record = DeviceRecord {
            id: format!("gpu-{index}"),
            uuid: format!("GPU-mock-{index:04}"),
            model: self.config.model.clone(),
            pcie_bus_id: format!("0000:{:02x}:00.0", 0x1a + index),
            temperature_c: self.config.temperature_c,
            power_watts: self.config.power_watts,
            ecc_errors: self.config.ecc_errors,
            health_score: self.config.health_score,
            capability: ComputeCapability {
                fp16_tflops: self.config.fp16_tflops,
                fp32_tflops: self.config.fp32_tflops,
                major: 8,
                minor: 0,
            },
            ..DeviceRecord::default()
        };
        record.set_memory(self.config.vram_per_device, self.config.vram_used_per_device);
        record
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        MockDetector::new(MockConfig::default())
    }
}

#[async_trait]
impl HardwareDetector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn detect(&self) -> Result<Detection> {
        Ok(Detection {
            vendor: self.config.vendor.clone(),
            driver_available: self.config.driver_available,
            driver_version: self.config.driver_version.clone(),
        })
    }

    async fn devices(&self) -> Result<Vec<DeviceRecord>> {
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(DetectorError::Probe {
                probe: "mock".to_string(),
                detail: "injected device enumeration failure".to_string(),
            });
        }
        let mut records: Vec<DeviceRecord> =
            (0..self.config.device_count).map(|i| self.device(i)).collect();
        if self.corrupt_devices.load(Ordering::SeqCst) {
            for record in &mut records {
                record.vram_free = record.vram_total + 1;
            }
        }
        Ok(records)
    }

    async fn topology(&self) -> Result<Topology> {
        if self.fail_topology.load(Ordering::SeqCst) {
            return Err(DetectorError::Probe {
                probe: "mock".to_string(),
                detail: "injected topology failure".to_string(),
            });
        }
        let devices: Vec<DeviceRecord> =
            (0..self.config.device_count).map(|i| self.device(i)).collect();
        let vertices = devices
            .iter()
            .map(|d| TopologyVertex {
                device_id: d.id.clone(),
                bus_address: d.pcie_bus_id.clone(),
            })
            .collect();
        // Full mesh between the synthetic devices.
        let mut links = Vec::new();
        for i in 0..devices.len() {
            for j in (i + 1)..devices.len() {
                links.push(TopologyLink {
                    a: devices[i].id.clone(),
                    b: devices[j].id.clone(),
                    kind: self.config.link_kind,
                    bandwidth_gbps: self.config.link_bandwidth_gbps,
                });
            }
        }
        Ok(Topology { vertices, links })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_configured_devices() {
        let mock = MockDetector::default();
        let detection = mock.detect().await.unwrap();
        assert!(detection.driver_available);
        assert_eq!(detection.vendor, Vendor::Nvidia);

        let devices = mock.devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "gpu-0");
        assert_eq!(devices[0].vram_free, 80 << 30);
        devices.iter().for_each(|d| d.validate().unwrap());

        let topo = mock.topology().await.unwrap();
        assert_eq!(topo.vertices.len(), 2);
        assert_eq!(topo.links.len(), 1);
        assert_eq!(topo.dominant_link(), LinkKind::NvLink);
    }

    #[tokio::test]
    async fn degraded_mock_has_no_driver() {
        let mock = MockDetector::degraded();
        let detection = mock.detect().await.unwrap();
        assert!(!detection.driver_available);
        assert!(mock.devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_injection() {
        let mock = MockDetector::default();
        mock.fail_devices(true);
        assert!(mock.devices().await.is_err());
        mock.fail_devices(false);
        assert!(mock.devices().await.is_ok());

        mock.fail_topology(true);
        assert!(mock.topology().await.is_err());
    }

    #[tokio::test]
    async fn corrupted_devices_fail_validation() {
        let mock = MockDetector::default();
        mock.corrupt_devices(true);
        let devices = mock.devices().await.unwrap();
        assert!(devices.iter().all(|d| d.validate().is_err()));

        mock.corrupt_devices(false);
        let devices = mock.devices().await.unwrap();
        assert!(devices.iter().all(|d| d.validate().is_ok()));
    }

    #[tokio::test]
    async fn close_is_recorded() {
        let mock = MockDetector::default();
        assert!(!mock.is_closed());
        mock.close().await.unwrap();
        assert!(mock.is_closed());
    }
}
