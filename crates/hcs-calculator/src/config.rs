//! File-based profile overrides.
//!
//! Sites carrying hardware the built-in table does not know (or disagreeing
//! with its datasheet numbers) drop a TOML file next to the extender:
//!
//! ```toml
//! base_model = "A100-80GB"
//!
//! [[profiles]]
//! vendor = "nvidia"
//! model = "L40S"
//! fp16_tflops = 362.0
//! fp32_tflops = 91.6
//! vram_bytes = 48318382080
//! memory_bandwidth_gbps = 864.0
//! tdp_watts = 350.0
//! ```
//!
//! Custom entries override built-ins with the same `(vendor, model)` key; an
//! unknown base model fails validation.

use crate::calculator::Calculator;
use crate::error::Result;
use crate::profile::{DEFAULT_BASE_MODEL, HardwareProfile, builtin_profiles};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfilesConfig {
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub profiles: Vec<HardwareProfile>,
}

impl ProfilesConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ProfilesConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Merge the overrides into the built-in table and build a calculator.
    pub fn build_calculator(&self) -> Result<Calculator> {
        let mut profiles = builtin_profiles();
        for custom in &self.profiles {
            custom.validate()?;
            if let Some(existing) = profiles
                .iter_mut()
                .find(|p| p.vendor == custom.vendor && p.model == custom.model)
            {
                *existing = custom.clone();
            } else {
                profiles.push(custom.clone());
            }
        }
        let base = self.base_model.as_deref().unwrap_or(DEFAULT_BASE_MODEL);
        info!(
            base,
            overrides = self.profiles.len(),
            "building calculator from profile config"
        );
        Calculator::with_profiles(profiles, base)
    }
}

/// Build the calculator from an optional config path. No path, or no file,
/// means the built-in table alone.
pub fn load_calculator(path: Option<&Path>) -> Result<Calculator> {
    match path {
        Some(path) if path.exists() => ProfilesConfig::from_path(path)?.build_calculator(),
        _ => Ok(Calculator::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalculatorError;
    use hcs_core::Vendor;
    use std::io::Write;

    #[test]
    fn overrides_replace_builtin_entries() {
        let config = ProfilesConfig {
            base_model: None,
            profiles: vec![HardwareProfile {
                vendor: Vendor::Nvidia,
                model: "RTX4090".into(),
                fp16_tflops: 330.0,
                fp32_tflops: 82.6,
                vram_bytes: 24 << 30,
                memory_bandwidth_gbps: 1008.0,
                tdp_watts: 450.0,
            }],
        };
        let calc = config.build_calculator().unwrap();
        let profile = calc.profile(&Vendor::Nvidia, "RTX4090").unwrap();
        assert_eq!(profile.fp16_tflops, 330.0);
    }

    #[test]
    fn unknown_base_model_fails_validation() {
        let config = ProfilesConfig {
            base_model: Some("NotARealCard".into()),
            profiles: vec![],
        };
        assert!(matches!(
            config.build_calculator(),
            Err(CalculatorError::UnknownBaseModel(_))
        ));
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_model = "H100-80GB"

[[profiles]]
vendor = "cambricon"
model = "MLU590"
fp16_tflops = 128.0
vram_bytes = 85899345920
"#
        )
        .unwrap();
        let calc = load_calculator(Some(file.path())).unwrap();
        assert_eq!(calc.base_model(), "H100-80GB");
        assert!(calc.profile(&Vendor::Cambricon, "MLU590").is_ok());
    }

    #[test]
    fn missing_path_uses_builtins() {
        let calc = load_calculator(None).unwrap();
        assert_eq!(calc.base_model(), DEFAULT_BASE_MODEL);
        let calc = load_calculator(Some(Path::new("/nonexistent/profiles.toml"))).unwrap();
        assert_eq!(calc.base_model(), DEFAULT_BASE_MODEL);
    }
}
