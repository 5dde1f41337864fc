//! Exchange rates between hardware models.

use crate::error::{CalculatorError, Result};
use crate::profile::HardwareProfile;
use serde::{Deserialize, Serialize};

/// How one model converts into another: compute as
/// `target_fp16 / base_fp16` (FP32 fallback when FP16 is absent on either
/// side), memory as the plain bytes ratio `target_vram / base_vram`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base_model: String,
    pub target_model: String,
    pub compute_ratio: f64,
    pub memory_ratio: f64,
}

impl ExchangeRate {
    /// Identity rate for a model against itself.
    pub fn identity(model: &str) -> Self {
        ExchangeRate {
            base_model: model.to_string(),
            target_model: model.to_string(),
            compute_ratio: 1.0,
            memory_ratio: 1.0,
        }
    }

    /// Derive the rate from `base` to `target`.
    pub fn derive(base: &HardwareProfile, target: &HardwareProfile) -> Result<Self> {
        let compute_ratio = if base.fp16_tflops > 0.0 && target.fp16_tflops > 0.0 {
            target.fp16_tflops / base.fp16_tflops
        } else if base.fp32_tflops > 0.0 && target.fp32_tflops > 0.0 {
            target.fp32_tflops / base.fp32_tflops
        } else {
            return Err(CalculatorError::MissingComputeMetric {
                model: target.model.clone(),
            });
        };
        Ok(ExchangeRate {
            base_model: base.model.clone(),
            target_model: target.model.clone(),
            compute_ratio,
            memory_ratio: target.vram_bytes as f64 / base.vram_bytes as f64,
        })
    }

    /// The algebraic reciprocal: swaps direction.
    pub fn inverse(&self) -> Self {
        ExchangeRate {
            base_model: self.target_model.clone(),
            target_model: self.base_model.clone(),
            compute_ratio: 1.0 / self.compute_ratio,
            memory_ratio: 1.0 / self.memory_ratio,
        }
    }

    /// Compose `self: A → B` with `next: B → C` into `A → C`.
    pub fn then(&self, next: &ExchangeRate) -> Self {
        ExchangeRate {
            base_model: self.base_model.clone(),
            target_model: next.target_model.clone(),
            compute_ratio: self.compute_ratio * next.compute_ratio,
            memory_ratio: self.memory_ratio * next.memory_ratio,
        }
    }
}
