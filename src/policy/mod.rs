//! Policy tables and the gate built on them.

pub mod gate;
pub mod registry;

pub use gate::{Decision, DenyReason, PolicyGate};
pub use registry::{PolicyError, PolicyOverlay, PolicyPreset, PolicyRegistry, Thresholds};
