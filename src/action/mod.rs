//! Guarded remediation.
//!
//! The OS-level work (signals, service control) sits behind the
//! `ActionExecutor` trait. `Remediator` owns the sequencing around it:
//! fresh lookup, gate check, call, then a bounded wait or poll.

pub mod guard;
pub mod linux;
pub mod offline;
pub mod sweep;

pub use guard::Remediator;
pub use linux::LinuxExecutor;
pub use offline::SnapshotExecutor;
pub use sweep::{SweepOutcome, SweepReport};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::{Action, EntityRef, ServiceStatus, StartType};
use crate::policy::DenyReason;
use crate::snapshot::ProviderError;

/// Per-entity action failure.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Denied by policy: {0}")]
    Denied(DenyReason),

    #[error("{0} no longer exists")]
    Vanished(String),

    #[error("Access denied for {0}")]
    AccessDenied(String),

    #[error("{entity} did not reach the target state within {waited:?}")]
    Timeout { entity: String, waited: Duration },

    #[error("Operating system rejected the action: {0}")]
    Rejected(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ActionError {
    /// Short label used in metrics and JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Denied(_) => "denied",
            ActionError::Vanished(_) => "vanished",
            ActionError::AccessDenied(_) => "access_denied",
            ActionError::Timeout { .. } => "timeout",
            ActionError::Rejected(_) => "rejected",
            ActionError::Provider(_) => "provider",
            ActionError::Unsupported(_) => "unsupported",
        }
    }
}

/// Result of waiting for a process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited,
    TimedOut,
}

/// Service control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceControl {
    Stop,
    Start,
}

impl ServiceControl {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceControl::Stop => "stop",
            ServiceControl::Start => "start",
        }
    }

    /// Run status that confirms the control took effect.
    pub fn target_status(self) -> ServiceStatus {
        match self {
            ServiceControl::Stop => ServiceStatus::Stopped,
            ServiceControl::Start => ServiceStatus::Running,
        }
    }
}

/// OS primitives the remediator drives.
///
/// Implementations perform exactly one OS call per method and never retry.
pub trait ActionExecutor: Send + Sync {
    /// Sends a graceful (`force == false`) or forced termination request.
    fn terminate(&self, pid: u32, force: bool) -> Result<(), ActionError>;

    /// Blocks until the process is gone or `timeout` elapses.
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> Result<WaitOutcome, ActionError>;

    fn service_control(&self, name: &str, control: ServiceControl) -> Result<(), ActionError>;

    fn query_service_status(&self, name: &str) -> Result<ServiceStatus, ActionError>;

    fn set_start_type(&self, name: &str, start_type: StartType) -> Result<(), ActionError>;
}

/// Bounds for the wait and poll loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub graceful: Duration,
    pub forced: Duration,
    pub service_poll: Duration,
    pub service_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            graceful: Duration::from_secs(5),
            forced: Duration::from_secs(3),
            service_poll: Duration::from_secs(1),
            service_timeout: Duration::from_secs(30),
        }
    }
}

/// Successful action outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub entity: EntityRef,
    pub name: String,
    pub action: Action,
    /// Graceful termination timed out and a forced one followed.
    pub escalated: bool,
    pub elapsed_ms: u64,
    pub message: String,
}
