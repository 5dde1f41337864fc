//! The compute-aware scheduling extender.
//!
//! The generic scheduler consults this service over HTTP on filter and
//! prioritize, and commits a placement through bind. Internally the three
//! calls drive a framework-style plugin: PreFilter parses the pod's abstract
//! compute request into per-cycle state, Filter eliminates nodes, Score
//! ranks the survivors through the cross-vendor calculator, and Reserve is
//! the commit point into the process-wide reservation table.

pub mod api;
pub mod error;
pub mod framework;
pub mod plugin;
pub mod reservation;
pub mod server;

pub use error::{ExtenderError, Result};
pub use framework::{Code, CycleState, Status};
pub use plugin::{ComputePlugin, MAX_SCORE, REQUEST_STATE_KEY};
pub use reservation::{Reservation, ReservationTable};
