//! The calculator: profile map, base model, and the precomputed rate table.

use crate::error::{CalculatorError, Result};
use crate::profile::{DEFAULT_BASE_MODEL, HardwareProfile, builtin_profiles};
use crate::rate::ExchangeRate;
use hcs_core::Vendor;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// A node's hardware expressed as a multiple of the base model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedCompute {
    /// Compute as a multiple of the base model's FP16 throughput.
    pub tflops: f64,
    /// VRAM as a multiple of the base model's VRAM.
    pub vram: f64,
}

struct Inner {
    /// `(vendor, model)` → profile.
    profiles: HashMap<(String, String), HardwareProfile>,
    base_model: String,
    /// Precomputed `base → model` rates, keyed by target model.
    rates: HashMap<String, ExchangeRate>,
}

impl Inner {
    fn profile_by_model(&self, model: &str) -> Option<&HardwareProfile> {
        self.profiles.values().find(|p| p.model == model)
    }

    fn rebuild_rates(&mut self) -> Result<()> {
        let base = self
            .profile_by_model(&self.base_model)
            .ok_or_else(|| CalculatorError::UnknownBaseModel(self.base_model.clone()))?
            .clone();
        let mut rates = HashMap::with_capacity(self.profiles.len());
        for profile in self.profiles.values() {
            rates.insert(profile.model.clone(), ExchangeRate::derive(&base, profile)?);
        }
        self.rates = rates;
        Ok(())
    }
}

/// Thread-safe cross-vendor equivalence calculator.
///
/// Reads (rate lookup, normalization, scoring) take the read lock and run
/// concurrently; profile additions and base changes take the write lock and
/// re-derive the whole rate table.
pub struct Calculator {
    inner: RwLock<Inner>,
}

impl Calculator {
    /// Calculator over the built-in profile table with the default base.
    pub fn new() -> Self {
        Calculator::with_profiles(builtin_profiles(), DEFAULT_BASE_MODEL)
            .expect("built-in profile table is valid")
    }

    /// Calculator over an explicit profile set and base model.
    pub fn with_profiles(
        profiles: Vec<HardwareProfile>,
        base_model: &str,
    ) -> Result<Self> {
        let mut map = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            profile.validate()?;
            map.insert(
                (profile.vendor.as_str().to_string(), profile.model.clone()),
                profile,
            );
        }
        let mut inner = Inner {
            profiles: map,
            base_model: base_model.to_string(),
            rates: HashMap::new(),
        };
        inner.rebuild_rates()?;
        Ok(Calculator {
            inner: RwLock::new(inner),
        })
    }

    /// Register or replace a profile and re-derive the rate table.
    pub fn add_profile(&self, profile: HardwareProfile) -> Result<()> {
        profile.validate()?;
        let mut inner = self.inner.write();
        let key = (profile.vendor.as_str().to_string(), profile.model.clone());
        let previous = inner.profiles.insert(key.clone(), profile);
        if let Err(e) = inner.rebuild_rates() {
            // Roll back so a bad profile cannot poison the table.
            match previous {
                Some(p) => {
                    inner.profiles.insert(key, p);
                }
                None => {
                    inner.profiles.remove(&key);
                }
            }
            inner.rebuild_rates()?;
            return Err(e);
        }
        debug!(model = %key.1, "profile registered, rate table rebuilt");
        Ok(())
    }

    /// Change the base model and re-derive the rate table.
    pub fn set_base_model(&self, model: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.profile_by_model(model).is_none() {
            return Err(CalculatorError::UnknownBaseModel(model.to_string()));
        }
        let previous = std::mem::replace(&mut inner.base_model, model.to_string());
        if let Err(e) = inner.rebuild_rates() {
            inner.base_model = previous;
            inner.rebuild_rates()?;
            return Err(e);
        }
        Ok(())
    }

    pub fn base_model(&self) -> String {
        self.inner.read().base_model.clone()
    }

    pub fn profile(&self, vendor: &Vendor, model: &str) -> Result<HardwareProfile> {
        self.inner
            .read()
            .profiles
            .get(&(vendor.as_str().to_string(), model.to_string()))
            .cloned()
            .ok_or_else(|| CalculatorError::UnknownModel {
                vendor: vendor.to_string(),
                model: model.to_string(),
            })
    }

    /// The exchange rate from one model to another.
    ///
    /// Same model is the identity; rates involving the base are direct table
    /// lookups (or their inverses); anything else composes through the base.
    pub fn get_rate(&self, from: &str, to: &str) -> Result<ExchangeRate> {
        if from == to {
            return Ok(ExchangeRate::identity(from));
        }
        let inner = self.inner.read();
        let lookup = |model: &str| {
            inner
                .rates
                .get(model)
                .cloned()
                .ok_or_else(|| CalculatorError::UnknownModel {
                    vendor: String::new(),
                    model: model.to_string(),
                })
        };
        if from == inner.base_model {
            return lookup(to);
        }
        if to == inner.base_model {
            return Ok(lookup(from)?.inverse());
        }
        Ok(lookup(from)?.inverse().then(&lookup(to)?))
    }

    /// Express `count` devices of the given model as multiples of the base
    /// model's compute and VRAM.
    pub fn normalize_compute(
        &self,
        vendor: &Vendor,
        model: &str,
        count: usize,
    ) -> Result<NormalizedCompute> {
        let profile = self.profile(vendor, model)?;
        let base_model = self.base_model();
        let rate = self.get_rate(&base_model, &profile.model)?;
        Ok(NormalizedCompute {
            tflops: count as f64 * rate.compute_ratio,
            vram: count as f64 * rate.memory_ratio,
        })
    }

    /// Utility score in `[0, 1]`: 0.7 weight on normalized compute, 0.3 on
    /// the node's available VRAM against the base model's VRAM.
    pub fn score_node(
        &self,
        vendor: &Vendor,
        model: &str,
        count: usize,
        avail_vram_bytes: u64,
    ) -> Result<f64> {
        let normalized = self.normalize_compute(vendor, model, count)?;
        let base_vram = {
            let inner = self.inner.read();
            let base_model = inner.base_model.clone();
            inner
                .profile_by_model(&base_model)
                .map(|p| p.vram_bytes)
                .unwrap_or(1)
        };
        let compute_part = normalized.tflops.min(1.0);
        let memory_part = (avail_vram_bytes as f64 / base_vram as f64).min(1.0);
        Ok(0.7 * compute_part + 0.3 * memory_part)
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Calculator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rate() {
        let calc = Calculator::new();
        let rate = calc.get_rate("RTX4090", "RTX4090").unwrap();
        assert_eq!(rate.compute_ratio, 1.0);
        assert_eq!(rate.memory_ratio, 1.0);
    }

    #[test]
    fn inverse_matches_reverse_lookup() {
        let calc = Calculator::new();
        let ab = calc.get_rate("A100-80GB", "RTX4090").unwrap();
        let ba = calc.get_rate("RTX4090", "A100-80GB").unwrap();
        assert!((ab.compute_ratio * ba.compute_ratio - 1.0).abs() < 1e-12);
        assert!((ab.memory_ratio * ba.memory_ratio - 1.0).abs() < 1e-12);
        let inv = ab.inverse();
        assert!((inv.compute_ratio - ba.compute_ratio).abs() < 1e-12);
        assert!((inv.memory_ratio - ba.memory_ratio).abs() < 1e-12);
    }

    #[test]
    fn cross_rate_composes_through_base() {
        let calc = Calculator::new();
        let rate = calc.get_rate("RTX4090", "H100-80GB").unwrap();
        assert!((rate.compute_ratio - 989.0 / 165.0).abs() < 1e-9);
        assert!((rate.memory_ratio - 80.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_fails_with_kind() {
        let calc = Calculator::new();
        assert!(matches!(
            calc.get_rate("A100-80GB", "TPUv5"),
            Err(CalculatorError::UnknownModel { .. })
        ));
        assert!(matches!(
            calc.normalize_compute(&Vendor::Nvidia, "TPUv5", 1),
            Err(CalculatorError::UnknownModel { .. })
        ));
    }

    #[test]
    fn normalizes_rtx4090_against_a100() {
        // One RTX4090 relative to the A100-80GB base.
        let calc = Calculator::new();
        let n = calc.normalize_compute(&Vendor::Nvidia, "RTX4090", 1).unwrap();
        assert!((n.tflops - 0.529).abs() < 1e-3);
        assert!((n.vram - 0.3).abs() < 1e-9);

        // The 4090 node scores strictly below a one-A100 node.
        let a100 = calc
            .score_node(&Vendor::Nvidia, "A100-80GB", 1, 80 << 30)
            .unwrap();
        let rtx = calc.score_node(&Vendor::Nvidia, "RTX4090", 1, 24 << 30).unwrap();
        assert!(rtx < a100);
    }

    #[test]
    fn add_profile_rebuilds_rates() {
        let calc = Calculator::new();
        calc.add_profile(HardwareProfile {
            vendor: Vendor::Custom("biren".into()),
            model: "BR104".into(),
            fp16_tflops: 156.0,
            fp32_tflops: 0.0,
            vram_bytes: 32 << 30,
            memory_bandwidth_gbps: 819.0,
            tdp_watts: 300.0,
        })
        .unwrap();
        let rate = calc.get_rate("A100-80GB", "BR104").unwrap();
        assert!((rate.compute_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bad_profile_is_rejected_and_table_survives(){
        let calc = Calculator::new();
        let err = calc.add_profile(HardwareProfile {
            vendor: Vendor::Nvidia,
            model: "broken".into(),
            fp16_tflops: 0.0,
            fp32_tflops: 0.0,
            vram_bytes: 1,
            memory_bandwidth_gbps: 0.0,
            tdp_watts: 0.0,
        });
        assert!(err.is_err());
        assert!(calc.get_rate("A100-80GB", "RTX4090").is_ok());
    }

    #[test]
    fn set_base_model_rederives() {
        let calc = Calculator::new();
        calc.set_base_model("H100-80GB").unwrap();
        let rate = calc.get_rate("H100-80GB", "A100-80GB").unwrap();
        assert!((rate.compute_ratio - 312.0 / 989.0).abs() < 1e-9);
        assert!(matches!(
            calc.set_base_model("nope"),
            Err(CalculatorError::UnknownBaseModel(_))
        ));
    }
}
