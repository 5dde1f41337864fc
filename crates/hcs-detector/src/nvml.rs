//! NVIDIA probe backed by the NVIDIA Management Library.
//!
//! NVML reports memory, thermals, power and ECC counters but not peak
//! throughput; capability TFLOPS stay zero here and the calculator fills the
//! gap from its profile table. Link enumeration beyond PCIe is left to the
//! external health monitor, so the reported topology is PCIe-only.

use crate::detector::{Detection, HardwareDetector};
use crate::error::Result;
use async_trait::async_trait;
use hcs_core::{DeviceRecord, Topology, TopologyVertex, Vendor};
use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::{EccCounter, MemoryError, TemperatureSensor};
use tracing::warn;

pub struct NvmlDetector {
    nvml: Nvml,
}

impl NvmlDetector {
    pub fn init() -> Result<Self> {
        let nvml = Nvml::init()?;
        Ok(NvmlDetector { nvml })
    }
}

#[async_trait]
impl HardwareDetector for NvmlDetector {
    fn name(&self) -> &str {
        "nvidia"
    }

    async fn detect(&self) -> Result<Detection> {
        let driver_version = self.nvml.sys_driver_version()?;
        Ok(Detection {
            vendor: Vendor::Nvidia,
            driver_available: true,
            driver_version,
        })
    }

    async fn devices(&self) -> Result<Vec<DeviceRecord>> {
        let count = self.nvml.device_count()?;
        let mut records = Vec::with_capacity(count as usize);
        for index in 0..count {
            let device = self.nvml.device_by_index(index)?;

            let memory = device.memory_info()?;
            let temperature = device.temperature(TemperatureSensor::Gpu).unwrap_or(0);
            // Milliwatts; unsupported on some boards.
            let power_mw = device.power_usage().unwrap_or(0);
            let ecc_errors = device
                .total_ecc_errors(MemoryError::Uncorrected, EccCounter::Aggregate)
                .unwrap_or_else(|e| {
                    warn!(index, error = %e, "ECC counters unavailable");
                    0
                });
            let pci = device.pci_info()?;

            let mut record = DeviceRecord {
                id: format!("gpu-{index}"),
                uuid: device.uuid()?,
                model: device.name()?,
                pcie_bus_id: pci.bus_id,
                temperature_c: f64::from(temperature),
                power_watts: f64::from(power_mw) / 1000.0,
                ecc_errors,
                health_score: 100.0,
                ..DeviceRecord::default()
            };
            record.set_memory(memory.total, memory.used);
            records.push(record);
        }
        Ok(records)
    }

    async fn topology(&self) -> Result<Topology> {
        // Vertex set only; NVML link probing needs elevated privileges and
        // the health monitor owns it.
        let vertices = self
            .devices()
            .await?
            .into_iter()
            .map(|d| TopologyVertex {
                device_id: d.id,
                bus_address: d.pcie_bus_id,
            })
            .collect();
        Ok(Topology {
            vertices,
            links: Vec::new(),
        })
    }

    async fn close(&self) -> Result<()> {
        // NVML shuts down when the handle drops.
        Ok(())
    }
}
