//! Vendor runtime profiles.
//!
//! A profile declares everything a container needs to see its vendor's
//! hardware: environment, driver volumes, character devices, runtime class
//! and marker annotations. The four built-ins can be replaced or extended
//! through a TOML file.

use crate::error::Result;
use hcs_core::Vendor;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Environment variables that are colon-prepended instead of skipped when
/// the container already sets them.
pub const PREPEND_VARS: &[&str] = &["PATH", "LD_LIBRARY_PATH"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub host_path: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub host_path: String,
    pub container_path: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub vendor: Vendor,
    #[serde(default)]
    pub env: Vec<EnvVarSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub runtime_class: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

fn env(name: &str, value: &str) -> EnvVarSpec {
    EnvVarSpec {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn volume(name: &str, host: &str, mount: &str) -> VolumeSpec {
    VolumeSpec {
        name: name.to_string(),
        host_path: host.to_string(),
        mount_path: mount.to_string(),
        read_only: true,
    }
}

fn device(path: &str) -> DeviceSpec {
    DeviceSpec {
        host_path: path.to_string(),
        container_path: path.to_string(),
    }
}

fn nvidia() -> VendorProfile {
    VendorProfile {
        vendor: Vendor::Nvidia,
        env: vec![
            env("NVIDIA_VISIBLE_DEVICES", "all"),
            env("NVIDIA_DRIVER_CAPABILITIES", "compute,utility"),
            env("LD_LIBRARY_PATH", "/usr/local/nvidia/lib64:/usr/local/cuda/lib64"),
            env("PATH", "/usr/local/nvidia/bin:/usr/local/cuda/bin"),
        ],
        volumes: vec![volume("nvidia-driver", "/usr/local/nvidia", "/usr/local/nvidia")],
        devices: vec![device("/dev/nvidiactl"), device("/dev/nvidia-uvm")],
        runtime_class: Some("nvidia".to_string()),
        annotations: BTreeMap::new(),
    }
}

fn huawei() -> VendorProfile {
    VendorProfile {
        vendor: Vendor::Huawei,
        env: vec![
            env("ASCEND_VISIBLE_DEVICES", "all"),
            env(
                "LD_LIBRARY_PATH",
                "/usr/local/Ascend/driver/lib64:/usr/local/Ascend/ascend-toolkit/latest/lib64",
            ),
            env("ASCEND_AICPU_PATH", "/usr/local/Ascend/ascend-toolkit/latest"),
            env("ASCEND_OPP_PATH", "/usr/local/Ascend/ascend-toolkit/latest/opp"),
            env("ASCEND_HOME_PATH", "/usr/local/Ascend/ascend-toolkit/latest"),
        ],
        volumes: vec![volume(
            "ascend-driver",
            "/usr/local/Ascend/driver",
            "/usr/local/Ascend/driver",
        )],
        devices: vec![
            device("/dev/davinci_manager"),
            device("/dev/devmm_svm"),
            device("/dev/hisi_hdc"),
        ],
        runtime_class: None,
        annotations: BTreeMap::new(),
    }
}

fn hygon() -> VendorProfile {
    VendorProfile {
        vendor: Vendor::Hygon,
        env: vec![
            env("DCU_VISIBLE_DEVICES", "all"),
            env("LD_LIBRARY_PATH", "/opt/hygon/lib:/opt/dtk/lib"),
            env("HIP_PLATFORM", "hcc"),
        ],
        volumes: vec![volume("hygon-driver", "/opt/hygon", "/opt/hygon")],
        devices: vec![device("/dev/kfd"), device("/dev/mkfd")],
        runtime_class: None,
        annotations: BTreeMap::new(),
    }
}

fn cambricon() -> VendorProfile {
    VendorProfile {
        vendor: Vendor::Cambricon,
        env: vec![
            env("MLU_VISIBLE_DEVICES", "all"),
            env("LD_LIBRARY_PATH", "/usr/local/neuware/lib64"),
            env("NEUWARE_HOME", "/usr/local/neuware"),
        ],
        volumes: vec![volume("neuware", "/usr/local/neuware", "/usr/local/neuware")],
        devices: vec![device("/dev/cambricon_ctl")],
        runtime_class: None,
        annotations: BTreeMap::new(),
    }
}

/// Registry of vendor profiles; read-mostly after startup.
pub struct ProfileRegistry {
    inner: RwLock<HashMap<String, VendorProfile>>,
}

impl ProfileRegistry {
    /// Registry preloaded with the four built-in vendors.
    pub fn with_defaults() -> Self {
        let mut map = HashMap::new();
        for profile in [nvidia(), huawei(), hygon(), cambricon()] {
            map.insert(profile.vendor.as_str().to_string(), profile);
        }
        ProfileRegistry {
            inner: RwLock::new(map),
        }
    }

    pub fn get(&self, vendor: &Vendor) -> Option<VendorProfile> {
        self.inner.read().get(vendor.as_str()).cloned()
    }

    pub fn insert(&self, profile: VendorProfile) {
        self.inner
            .write()
            .insert(profile.vendor.as_str().to_string(), profile);
    }

    /// Load profile overrides from a TOML file; entries replace any
    /// registered profile for the same vendor.
    pub fn apply_file(&self, path: &Path) -> Result<usize> {
        #[derive(Deserialize)]
        struct ProfileFile {
            #[serde(default)]
            profiles: Vec<VendorProfile>,
        }
        let raw = std::fs::read_to_string(path)?;
        let parsed: ProfileFile = toml::from_str(&raw)?;
        let count = parsed.profiles.len();
        for profile in parsed.profiles {
            self.insert(profile);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_four_vendors() {
        let registry = ProfileRegistry::with_defaults();
        for vendor in [Vendor::Nvidia, Vendor::Huawei, Vendor::Hygon, Vendor::Cambricon] {
            let profile = registry.get(&vendor).unwrap();
            assert_eq!(profile.vendor, vendor);
            assert!(!profile.env.is_empty());
        }
        assert!(registry.get(&Vendor::Custom("biren".into())).is_none());
    }

    #[test]
    fn nvidia_profile_matches_canonical_surface() {
        let profile = ProfileRegistry::with_defaults().get(&Vendor::Nvidia).unwrap();
        let visible = profile
            .env
            .iter()
            .find(|e| e.name == "NVIDIA_VISIBLE_DEVICES")
            .unwrap();
        assert_eq!(visible.value, "all");
        assert_eq!(profile.runtime_class.as_deref(), Some("nvidia"));
    }

    #[test]
    fn huawei_profile_has_no_runtime_class() {
        let profile = ProfileRegistry::with_defaults().get(&Vendor::Huawei).unwrap();
        assert!(profile.runtime_class.is_none());
        assert!(
            profile
                .env
                .iter()
                .any(|e| e.name == "LD_LIBRARY_PATH"
                    && e.value.starts_with("/usr/local/Ascend/driver/lib64"))
        );
    }

    #[test]
    fn file_overrides_replace_profiles() {
        let registry = ProfileRegistry::with_defaults();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write as _;
        writeln!(
            file,
            r#"
[[profiles]]
vendor = "nvidia"
runtime_class = "nvidia-legacy"

[[profiles.env]]
name = "NVIDIA_VISIBLE_DEVICES"
value = "all"
"#
        )
        .unwrap();
        let count = registry.apply_file(file.path()).unwrap();
        assert_eq!(count, 1);
        let profile = registry.get(&Vendor::Nvidia).unwrap();
        assert_eq!(profile.runtime_class.as_deref(), Some("nvidia-legacy"));
        assert!(profile.volumes.is_empty());
    }
}
