//! Cross-vendor compute equivalence.
//!
//! Unlike devices are compared on a common yardstick: every known hardware
//! model gets a [`HardwareProfile`], and an [`ExchangeRate`] expresses a
//! model's compute and memory as ratios of a configurable base model
//! (`A100-80GB` by default). The scheduler's scoring plugin asks this crate
//! "how much A100 is this node", nothing more.

pub mod calculator;
pub mod config;
pub mod error;
pub mod profile;
pub mod rate;

pub use calculator::{Calculator, NormalizedCompute};
pub use config::ProfilesConfig;
pub use error::{CalculatorError, Result};
pub use profile::{DEFAULT_BASE_MODEL, HardwareProfile, builtin_profiles};
pub use rate::ExchangeRate;
