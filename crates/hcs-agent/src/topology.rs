//! Topology aggregation helpers.

use hcs_core::{LinkKind, PciAddress, Topology};
use std::collections::HashMap;
use tracing::warn;

/// Aggregated view of a node's interconnect, derived once per collection.
#[derive(Clone, Debug, Default)]
pub struct TopologyMetrics {
    pub dominant_link: LinkKind,
    pub max_bandwidth_gbps: f64,
    /// Parsed PCIe addresses by device id; devices with malformed bus ids
    /// are skipped with a warning.
    pub addresses: HashMap<String, PciAddress>,
    /// Best link kind touching each device.
    pub device_links: HashMap<String, LinkKind>,
}

impl TopologyMetrics {
    pub fn from_topology(topology: &Topology) -> Self {
        let mut addresses = HashMap::new();
        for vertex in &topology.vertices {
            match vertex.bus_address.parse::<PciAddress>() {
                Ok(addr) => {
                    addresses.insert(vertex.device_id.clone(), addr);
                }
                Err(e) => {
                    warn!(device = %vertex.device_id, error = %e, "unparseable PCIe bus address");
                }
            }
        }

        let mut device_links: HashMap<String, LinkKind> = HashMap::new();
        for link in &topology.links {
            for end in [&link.a, &link.b] {
                let entry = device_links.entry(end.clone()).or_insert(LinkKind::Unknown);
                if link_rank(link.kind) > link_rank(*entry) {
                    *entry = link.kind;
                }
            }
        }

        TopologyMetrics {
            dominant_link: topology.dominant_link(),
            max_bandwidth_gbps: topology.max_bandwidth_gbps(),
            addresses,
            device_links,
        }
    }

    /// The interconnect to report for one device.
    pub fn link_for(&self, device_id: &str) -> LinkKind {
        self.device_links
            .get(device_id)
            .copied()
            .unwrap_or(self.dominant_link)
    }
}

fn link_rank(kind: LinkKind) -> u8 {
    match kind {
        LinkKind::NvLink => 4,
        LinkKind::Hccs => 3,
        LinkKind::XGmi => 2,
        LinkKind::Pcie => 1,
        LinkKind::Unknown => 0,
    }
}
