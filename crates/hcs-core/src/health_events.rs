//! Contract for the optional kernel-probe health monitor.
//!
//! The monitor itself ships separately; the core only fixes the event
//! vocabulary and the sink it publishes into. Scores delivered through
//! [`HealthEvent::Score`] are on the same `[0, 100]` scale as detector
//! health and are merged with collector-derived scores by averaging.

use crate::fingerprint::LinkKind;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HealthEvent {
    /// A device crossed a thermal threshold.
    Thermal { device_id: String, temperature_c: f64 },
    /// Uncorrected ECC errors were observed.
    EccError { device_id: String, count: u64 },
    /// An inter-device link went down.
    LinkDown { device_id: String, link: LinkKind },
    /// The vendor driver stopped responding.
    DriverLost { detail: String },
    /// An externally computed health score in `[0, 100]`.
    Score { device_id: String, score: f64 },
}

/// Receiver side of the health-event stream.
pub trait HealthSink: Send + Sync {
    fn publish(&self, event: HealthEvent);
}
