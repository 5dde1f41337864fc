//! The pod-mutating admission hook.
//!
//! When a pod requests accelerator resources, the mutator resolves the
//! target vendor and injects that vendor's runtime surface: environment
//! variables, driver volumes, device mounts, runtime class and annotations.
//! Orthogonally, pods requesting `ai.compute/vram` get the memory-quota
//! interceptor preloaded. Both injections are idempotent; re-admitting an
//! already-mutated pod is a no-op patch.

pub mod annotations;
pub mod error;
pub mod profile;
pub mod quota;
pub mod server;
pub mod validate;
pub mod vendor;

pub use error::{MutatorError, Result};
pub use profile::{DeviceSpec, EnvVarSpec, ProfileRegistry, VendorProfile, VolumeSpec};
pub use quota::QuotaConfig;
pub use vendor::InjectionResult;
