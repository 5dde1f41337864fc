//! Hardware profiles: the per-model datasheet facts normalization runs on.

use crate::error::{CalculatorError, Result};
use hcs_core::Vendor;
use serde::{Deserialize, Serialize};

/// The model every other model is expressed against unless configured
/// otherwise.
pub const DEFAULT_BASE_MODEL: &str = "A100-80GB";

const GIB: u64 = 1 << 30;

/// Datasheet facts for one accelerator model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub vendor: Vendor,
    pub model: String,
    #[serde(default)]
    pub fp16_tflops: f64,
    #[serde(default)]
    pub fp32_tflops: f64,
    pub vram_bytes: u64,
    #[serde(default)]
    pub memory_bandwidth_gbps: f64,
    #[serde(default)]
    pub tdp_watts: f64,
}

impl HardwareProfile {
    pub fn validate(&self) -> Result<()> {
        if self.vendor.as_str().is_empty() {
            return Err(CalculatorError::InvalidProfile {
                model: self.model.clone(),
                reason: "empty vendor".to_string(),
            });
        }
        if self.model.is_empty() {
            return Err(CalculatorError::InvalidProfile {
                model: self.model.clone(),
                reason: "empty model".to_string(),
            });
        }
        if self.vram_bytes == 0 {
            return Err(CalculatorError::InvalidProfile {
                model: self.model.clone(),
                reason: "VRAM must be positive".to_string(),
            });
        }
        if self.fp16_tflops <= 0.0 && self.fp32_tflops <= 0.0 {
            return Err(CalculatorError::InvalidProfile {
                model: self.model.clone(),
                reason: "at least one compute metric required".to_string(),
            });
        }
        Ok(())
    }
}

fn profile(
    vendor: Vendor,
    model: &str,
    fp16: f64,
    fp32: f64,
    vram_gib: u64,
    bandwidth: f64,
    tdp: f64,
) -> HardwareProfile {
    HardwareProfile {
        vendor,
        model: model.to_string(),
        fp16_tflops: fp16,
        fp32_tflops: fp32,
        vram_bytes: vram_gib * GIB,
        memory_bandwidth_gbps: bandwidth,
        tdp_watts: tdp,
    }
}

/// The built-in profile table. Site configuration may override any entry by
/// `(vendor, model)` key.
pub fn builtin_profiles() -> Vec<HardwareProfile> {
    vec![
        profile(Vendor::Nvidia, "A100-80GB", 312.0, 19.5, 80, 2039.0, 400.0),
        profile(Vendor::Nvidia, "A100-40GB", 312.0, 19.5, 40, 1555.0, 400.0),
        profile(Vendor::Nvidia, "H100-80GB", 989.0, 67.0, 80, 3350.0, 700.0),
        profile(Vendor::Nvidia, "V100-32GB", 125.0, 15.7, 32, 900.0, 300.0),
        profile(Vendor::Nvidia, "RTX4090", 165.0, 82.6, 24, 1008.0, 450.0),
        profile(Vendor::Huawei, "Ascend-910B", 376.0, 94.0, 64, 1600.0, 310.0),
        profile(Vendor::Hygon, "DCU-Z100", 49.0, 24.5, 32, 1024.0, 350.0),
        profile(Vendor::Cambricon, "MLU370-X8", 96.0, 24.0, 48, 614.0, 250.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_all_validate() {
        for p in builtin_profiles() {
            p.validate().unwrap();
        }
    }

    #[test]
    fn base_model_is_builtin() {
        assert!(
            builtin_profiles()
                .iter()
                .any(|p| p.model == DEFAULT_BASE_MODEL)
        );
    }

    #[test]
    fn validation_rejects_bad_profiles() {
        let mut p = profile(Vendor::Nvidia, "X", 1.0, 1.0, 1, 0.0, 0.0);
        p.vram_bytes = 0;
        assert!(p.validate().is_err());

        let p = profile(Vendor::Nvidia, "", 1.0, 1.0, 1, 0.0, 0.0);
        assert!(p.validate().is_err());

        let p = profile(Vendor::Nvidia, "X", 0.0, 0.0, 1, 0.0, 0.0);
        assert!(p.validate().is_err());

        let p = profile(Vendor::Custom(String::new()), "X", 1.0, 0.0, 1, 0.0, 0.0);
        assert!(p.validate().is_err());
    }
}
