//! Hardware detection for the node agent.
//!
//! Every accelerator backend implements [`HardwareDetector`]; a
//! [`DetectorRegistry`] holds the registered probes and picks one with a
//! first-available policy. The [`MockDetector`] is contractually equivalent
//! to a real probe and backs most of the test suite; the NVML probe ships
//! behind the `nvml` feature.

pub mod detector;
pub mod error;
pub mod mock;
#[cfg(feature = "nvml")]
pub mod nvml;
pub mod registry;

pub use detector::{Detection, DetectorOutput, HardwareDetector};
pub use error::{DetectorError, Result};
pub use mock::{MockConfig, MockDetector};
#[cfg(feature = "nvml")]
pub use nvml::NvmlDetector;
pub use registry::DetectorRegistry;
