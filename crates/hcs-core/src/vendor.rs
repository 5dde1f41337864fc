//! Accelerator vendor identifiers and their pod-facing resource prefixes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The hardware vendors the scheduler understands natively, plus an escape
/// hatch for site-registered backends.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vendor {
    Nvidia,
    Huawei,
    Hygon,
    Cambricon,
    Custom(String),
}

/// Vendor-specific resource-name prefixes recognized in pod requests and
/// limits, in resolution order.
pub const VENDOR_RESOURCE_PREFIXES: &[(&str, &str)] = &[
    ("nvidia.com/", "nvidia"),
    ("huawei.com/", "huawei"),
    ("hygon.com/", "hygon"),
    ("cambricon.com/", "cambricon"),
];

impl Vendor {
    pub fn as_str(&self) -> &str {
        match self {
            Vendor::Nvidia => "nvidia",
            Vendor::Huawei => "huawei",
            Vendor::Hygon => "hygon",
            Vendor::Cambricon => "cambricon",
            Vendor::Custom(name) => name,
        }
    }

    /// Map a vendor-specific resource name (e.g. `nvidia.com/gpu`) to its
    /// vendor. Abstract `ai.compute/*` names map to no vendor.
    pub fn from_resource_name(resource: &str) -> Option<Vendor> {
        VENDOR_RESOURCE_PREFIXES
            .iter()
            .find(|(prefix, _)| resource.starts_with(prefix))
            .map(|(_, vendor)| Vendor::from(*vendor))
    }
}

impl From<&str> for Vendor {
    fn from(s: &str) -> Self {
        match s {
            "nvidia" => Vendor::Nvidia,
            "huawei" => Vendor::Huawei,
            "hygon" => Vendor::Hygon,
            "cambricon" => Vendor::Cambricon,
            other => Vendor::Custom(other.to_string()),
        }
    }
}

impl FromStr for Vendor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Vendor::from(s))
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Vendor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Vendor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Vendor::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_vendors() {
        for name in ["nvidia", "huawei", "hygon", "cambricon"] {
            let vendor = Vendor::from(name);
            assert_eq!(vendor.to_string(), name);
            assert!(!matches!(vendor, Vendor::Custom(_)));
        }
    }

    #[test]
    fn unknown_names_become_custom() {
        let vendor = Vendor::from("biren");
        assert_eq!(vendor, Vendor::Custom("biren".into()));
        assert_eq!(vendor.as_str(), "biren");
    }

    #[test]
    fn resolves_resource_prefixes() {
        assert_eq!(
            Vendor::from_resource_name("nvidia.com/gpu"),
            Some(Vendor::Nvidia)
        );
        assert_eq!(
            Vendor::from_resource_name("cambricon.com/mlu"),
            Some(Vendor::Cambricon)
        );
        assert_eq!(Vendor::from_resource_name("ai.compute/vram"), None);
        assert_eq!(Vendor::from_resource_name("cpu"), None);
    }

    #[test]
    fn serde_uses_plain_strings() {
        let json = serde_json::to_string(&Vendor::Huawei).unwrap();
        assert_eq!(json, "\"huawei\"");
        let back: Vendor = serde_json::from_str("\"hygon\"").unwrap();
        assert_eq!(back, Vendor::Hygon);
    }
}
