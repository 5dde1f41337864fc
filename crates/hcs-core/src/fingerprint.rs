//! The compute fingerprint: the node-scoped value object describing the
//! accelerators a node carries, their interconnect topology, and the
//! aggregate capacity the scheduler reasons about.
//!
//! Fingerprints are rebuilt from scratch on every collection tick; nothing
//! here is long-lived state.

use crate::error::{Error, Result};
use crate::vendor::Vendor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Inter-device link kinds, ordered roughly by desirability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LinkKind {
    #[serde(rename = "NVLink")]
    NvLink,
    #[serde(rename = "HCCS")]
    Hccs,
    #[serde(rename = "xGMI")]
    XGmi,
    #[serde(rename = "PCIe")]
    Pcie,
    #[default]
    Unknown,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkKind::NvLink => "NVLink",
            LinkKind::Hccs => "HCCS",
            LinkKind::XGmi => "xGMI",
            LinkKind::Pcie => "PCIe",
            LinkKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for LinkKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "NVLink" => LinkKind::NvLink,
            "HCCS" => LinkKind::Hccs,
            "xGMI" => LinkKind::XGmi,
            "PCIe" => LinkKind::Pcie,
            _ => LinkKind::Unknown,
        })
    }
}

/// A parsed PCIe bus address (`DDDD:BB:DD.F`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl FromStr for PciAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::InvalidPciAddress(s.to_string());

        let (rest, function) = s.rsplit_once('.').ok_or_else(malformed)?;
        let mut parts = rest.split(':');
        let domain = parts.next().ok_or_else(malformed)?;
        let bus = parts.next().ok_or_else(malformed)?;
        let device = parts.next().ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        Ok(PciAddress {
            domain: u16::from_str_radix(domain, 16).map_err(|_| malformed())?,
            bus: u8::from_str_radix(bus, 16).map_err(|_| malformed())?,
            device: u8::from_str_radix(device, 16).map_err(|_| malformed())?,
            function: u8::from_str_radix(function, 16).map_err(|_| malformed())?,
        })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// Compute throughput and architecture generation of a single device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeCapability {
    pub fp16_tflops: f64,
    pub fp32_tflops: f64,
    pub major: u32,
    pub minor: u32,
}

/// One accelerator as observed by a detector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable per-node identifier, e.g. `gpu-0`.
    pub id: String,
    pub uuid: String,
    pub model: String,
    pub vram_total: u64,
    pub vram_used: u64,
    pub vram_free: u64,
    pub pcie_bus_id: String,
    pub temperature_c: f64,
    pub power_watts: f64,
    pub ecc_errors: u64,
    /// Health score in `[0, 100]`.
    pub health_score: f64,
    pub capability: ComputeCapability,
}

impl DeviceRecord {
    /// Set the memory fields from total and used, keeping the
    /// `total = used + free` invariant by construction.
    pub fn set_memory(&mut self, total: u64, used: u64) {
        self.vram_total = total;
        self.vram_used = used.min(total);
        self.vram_free = total - self.vram_used;
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<()> {
        if self.vram_total != self.vram_used + self.vram_free {
            return Err(Error::VramAccounting {
                id: self.id.clone(),
                total: self.vram_total,
                used: self.vram_used,
                free: self.vram_free,
            });
        }
        if !(0.0..=100.0).contains(&self.health_score) {
            return Err(Error::HealthOutOfRange {
                id: self.id.clone(),
                score: self.health_score,
            });
        }
        Ok(())
    }
}

/// A device vertex in the interconnect graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyVertex {
    pub device_id: String,
    pub bus_address: String,
}

/// An undirected link between two devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopologyLink {
    pub a: String,
    pub b: String,
    pub kind: LinkKind,
    pub bandwidth_gbps: f64,
}

/// The inter-device topology of a node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub vertices: Vec<TopologyVertex>,
    pub links: Vec<TopologyLink>,
}

impl Topology {
    /// The most frequent link kind, or `Unknown` for a linkless topology.
    pub fn dominant_link(&self) -> LinkKind {
        let mut counts: HashMap<LinkKind, usize> = HashMap::new();
        for link in &self.links {
            *counts.entry(link.kind).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by_key(|&(_, count)| count)
            .map_or(LinkKind::Unknown, |(kind, _)| kind)
    }

    /// The maximum link bandwidth in GB/s.
    pub fn max_bandwidth_gbps(&self) -> f64 {
        self.links
            .iter()
            .map(|l| l.bandwidth_gbps)
            .fold(0.0, f64::max)
    }
}

/// Node-level capacity summed over all devices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateCapacity {
    pub vram_bytes: u64,
    pub fp16_tflops: f64,
    pub fp32_tflops: f64,
    pub dominant_link: LinkKind,
}

/// The normalized per-node hardware summary produced by the agent on each
/// collection tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeFingerprint {
    pub vendor: Vendor,
    pub driver_available: bool,
    pub driver_version: String,
    pub devices: Vec<DeviceRecord>,
    pub topology: Topology,
    pub capacity: AggregateCapacity,
}

impl ComputeFingerprint {
    /// Assemble a fingerprint, deriving the aggregate capacity from the
    /// device list and topology.
    pub fn new(
        vendor: Vendor,
        driver_available: bool,
        driver_version: String,
        devices: Vec<DeviceRecord>,
        topology: Topology,
    ) -> Self {
        let capacity = AggregateCapacity {
            vram_bytes: devices.iter().map(|d| d.vram_total).sum(),
            fp16_tflops: devices.iter().map(|d| d.capability.fp16_tflops).sum(),
            fp32_tflops: devices.iter().map(|d| d.capability.fp32_tflops).sum(),
            dominant_link: topology.dominant_link(),
        };
        ComputeFingerprint {
            vendor,
            driver_available,
            driver_version,
            devices,
            topology,
            capacity,
        }
    }

    /// A placeholder fingerprint for nodes where no probe found a driver.
    pub fn degraded(vendor: Vendor) -> Self {
        ComputeFingerprint::new(vendor, false, String::new(), Vec::new(), Topology::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pci_address_round_trip() {
        let addr: PciAddress = "0000:3b:00.0".parse().unwrap();
        assert_eq!(addr.domain, 0);
        assert_eq!(addr.bus, 0x3b);
        assert_eq!(addr.device, 0);
        assert_eq!(addr.function, 0);
        assert_eq!(addr.to_string(), "0000:3b:00.0");

        let addr: PciAddress = "0001:a5:1f.7".parse().unwrap();
        assert_eq!((addr.domain, addr.bus), (1, 0xa5));
        assert_eq!((addr.device, addr.function), (0x1f, 7));
    }

    #[test]
    fn pci_address_rejects_garbage() {
        for bad in ["", "3b:00.0", "0000:3b:00", "zz:zz:zz.z", "0000:3b:00:0.0"] {
            assert!(bad.parse::<PciAddress>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn set_memory_keeps_invariant() {
        let mut dev = DeviceRecord {
            id: "gpu-0".into(),
            ..DeviceRecord::default()
        };
        dev.set_memory(80, 30);
        assert_eq!(dev.vram_free, 50);
        dev.validate().unwrap();

        // used beyond total is clamped rather than underflowing
        dev.set_memory(80, 200);
        assert_eq!((dev.vram_used, dev.vram_free), (80, 0));
        dev.validate().unwrap();
    }

    #[test]
    fn validate_rejects_broken_accounting() {
        let dev = DeviceRecord {
            id: "gpu-0".into(),
            vram_total: 100,
            vram_used: 10,
            vram_free: 10,
            ..DeviceRecord::default()
        };
        assert!(dev.validate().is_err());
    }

    #[test]
    fn dominant_link_is_most_frequent() {
        let topo = Topology {
            vertices: vec![],
            links: vec![
                TopologyLink {
                    a: "gpu-0".into(),
                    b: "gpu-1".into(),
                    kind: LinkKind::NvLink,
                    bandwidth_gbps: 600.0,
                },
                TopologyLink {
                    a: "gpu-0".into(),
                    b: "gpu-2".into(),
                    kind: LinkKind::Pcie,
                    bandwidth_gbps: 64.0,
                },
                TopologyLink {
                    a: "gpu-1".into(),
                    b: "gpu-2".into(),
                    kind: LinkKind::Pcie,
                    bandwidth_gbps: 64.0,
                },
            ],
        };
        assert_eq!(topo.dominant_link(), LinkKind::Pcie);
        assert_eq!(topo.max_bandwidth_gbps(), 600.0);
        assert_eq!(Topology::default().dominant_link(), LinkKind::Unknown);
    }

    #[test]
    fn fingerprint_aggregates_capacity() {
        let mut a = DeviceRecord {
            id: "gpu-0".into(),
            capability: ComputeCapability {
                fp16_tflops: 312.0,
                fp32_tflops: 19.5,
                major: 8,
                minor: 0,
            },
            ..DeviceRecord::default()
        };
        a.set_memory(80, 0);
        let mut b = a.clone();
        b.id = "gpu-1".into();

        let fp = ComputeFingerprint::new(
            Vendor::Nvidia,
            true,
            "550.54".into(),
            vec![a, b],
            Topology::default(),
        );
        assert_eq!(fp.capacity.vram_bytes, 160);
        assert_eq!(fp.capacity.fp16_tflops, 624.0);
        assert_eq!(fp.capacity.dominant_link, LinkKind::Unknown);
    }

    #[test]
    fn link_kind_serde_labels() {
        assert_eq!(serde_json::to_string(&LinkKind::NvLink).unwrap(), "\"NVLink\"");
        assert_eq!(serde_json::to_string(&LinkKind::XGmi).unwrap(), "\"xGMI\"");
        let k: LinkKind = serde_json::from_str("\"HCCS\"").unwrap();
        assert_eq!(k, LinkKind::Hccs);
    }
}
