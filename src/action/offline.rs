//! Executor that acts on a static snapshot instead of the host.
//!
//! Used together with `StaticProvider` when a test data file replaces
//! `/proc` and systemd: terminating removes the process from the snapshot,
//! service control rewrites the recorded status.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ActionError, ActionExecutor, ServiceControl, WaitOutcome};
use crate::model::{ServiceStatus, StartType};
use crate::snapshot::{SnapshotProvider, StaticProvider};

pub struct SnapshotExecutor {
    provider: Arc<StaticProvider>,
}

impl SnapshotExecutor {
    pub fn new(provider: Arc<StaticProvider>) -> Self {
        Self { provider }
    }
}

impl ActionExecutor for SnapshotExecutor {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), ActionError> {
        debug!(pid, force, "removing process from snapshot");
        if self.provider.remove_process(pid) {
            Ok(())
        } else {
            Err(ActionError::Vanished(format!("process {pid}")))
        }
    }

    fn wait_for_exit(&self, pid: u32, _timeout: Duration) -> Result<WaitOutcome, ActionError> {
        match self.provider.get_process(pid)? {
            Some(_) => Ok(WaitOutcome::TimedOut),
            None => Ok(WaitOutcome::Exited),
        }
    }

    fn service_control(&self, name: &str, control: ServiceControl) -> Result<(), ActionError> {
        if self.provider.set_service_status(name, control.target_status()) {
            Ok(())
        } else {
            Err(ActionError::Vanished(format!("service {name}")))
        }
    }

    fn query_service_status(&self, name: &str) -> Result<ServiceStatus, ActionError> {
        self.provider
            .get_service(name)?
            .map(|s| s.status)
            .ok_or_else(|| ActionError::Vanished(format!("service {name}")))
    }

    fn set_start_type(&self, name: &str, start_type: StartType) -> Result<(), ActionError> {
        if self.provider.set_start_type(name, start_type) {
            Ok(())
        } else {
            Err(ActionError::Vanished(format!("service {name}")))
        }
    }
}
