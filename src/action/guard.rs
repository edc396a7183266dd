//! Authorize, act, then wait with a bound.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Span};

use super::{ActionError, ActionExecutor, ActionReport, ServiceControl, TimeoutPolicy, WaitOutcome};
use crate::model::{Action, EntityKind, EntityRef, ProcessRecord, ServiceRecord, StartType};
use crate::policy::{Decision, PolicyGate};
use crate::snapshot::SnapshotProvider;

/// Runs gated actions against single entities.
///
/// Every action re-resolves its target through the provider first, since
/// pids and names may have been recycled since the scan that surfaced them.
pub struct Remediator {
    provider: Arc<dyn SnapshotProvider>,
    executor: Arc<dyn ActionExecutor>,
    gate: PolicyGate,
    timeouts: TimeoutPolicy,
    span: Span,
}

impl Remediator {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        executor: Arc<dyn ActionExecutor>,
        gate: PolicyGate,
    ) -> Self {
        Self {
            provider,
            executor,
            gate,
            timeouts: TimeoutPolicy::default(),
            span: info_span!("remediator"),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    fn check(&self, name: &str, kind: EntityKind, action: Action) -> Result<(), ActionError> {
        match self.gate.authorize(name, kind, action) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(ActionError::Denied(reason)),
        }
    }

    /// Dispatches `action` on `entity`.
    ///
    /// `force` only matters for `Terminate`; `ForceTerminate` implies it.
    pub fn authorize_and_act(
        &self,
        entity: &EntityRef,
        action: Action,
        force: bool,
    ) -> Result<ActionReport, ActionError> {
        match (entity, action) {
            (EntityRef::Process { pid }, Action::Terminate) => self.terminate_process(*pid, force),
            (EntityRef::Process { pid }, Action::ForceTerminate) => {
                self.terminate_process(*pid, true)
            }
            (EntityRef::Service { name }, Action::Stop) => self.stop_service(name),
            (EntityRef::Service { name }, Action::Start) => self.start_service(name),
            (EntityRef::Service { name }, Action::Disable) => self.disable_service(name),
            (entity, action) => Err(ActionError::Unsupported(format!(
                "{} on a {}",
                action,
                entity.kind()
            ))),
        }
    }

    /// Terminates a process: graceful request, bounded wait, then forced
    /// request and a second shorter wait. `force` skips the graceful stage.
    pub fn terminate_process(&self, pid: u32, force: bool) -> Result<ActionReport, ActionError> {
        let _enter = self.span.enter();
        let record = self.lookup_process(pid)?;
        self.terminate_resolved(record, force)
    }

    /// Like `terminate_process`, but only when the pid still belongs to the
    /// process described by `expected` (same name and start time).
    pub fn terminate_record(
        &self,
        expected: &ProcessRecord,
        force: bool,
    ) -> Result<ActionReport, ActionError> {
        let _enter = self.span.enter();
        let record = self.lookup_process(expected.pid)?;
        if !record.same_identity(expected) {
            warn!(
                "Pid {} now belongs to {} (scanned as {}), not terminating",
                expected.pid, record.name, expected.name
            );
            return Err(ActionError::Vanished(format!(
                "process {} ({})",
                expected.pid, expected.name
            )));
        }
        self.terminate_resolved(record, force)
    }

    fn lookup_process(&self, pid: u32) -> Result<ProcessRecord, ActionError> {
        self.provider
            .get_process(pid)?
            .ok_or_else(|| ActionError::Vanished(format!("process {}", pid)))
    }

    fn terminate_resolved(&self, record: ProcessRecord, force: bool) -> Result<ActionReport, ActionError> {
        let start = Instant::now();
        let pid = record.pid;
        let action = if force {
            Action::ForceTerminate
        } else {
            Action::Terminate
        };
        self.check(&record.name, EntityKind::Process, action)?;

        let report = |escalated: bool, message: &str| ActionReport {
            entity: EntityRef::process(pid),
            name: record.name.clone(),
            action,
            escalated,
            elapsed_ms: start.elapsed().as_millis() as u64,
            message: message.to_string(),
        };

        if !force {
            info!("Terminating process {} ({})", pid, record.name);
            self.executor.terminate(pid, false)?;
            match self.executor.wait_for_exit(pid, self.timeouts.graceful)? {
                WaitOutcome::Exited => return Ok(report(false, "terminated")),
                WaitOutcome::TimedOut => warn!(
                    "Process {} ({}) ignored graceful termination for {:?}, escalating",
                    pid, record.name, self.timeouts.graceful
                ),
            }
        } else {
            info!("Force terminating process {} ({})", pid, record.name);
        }

        match self.executor.terminate(pid, true) {
            Ok(()) => {}
            // Exited between the wait and the forced request
            Err(ActionError::Vanished(_)) if !force => {
                return Ok(report(false, "terminated"));
            }
            Err(e) => return Err(e),
        }

        match self.executor.wait_for_exit(pid, self.timeouts.forced)? {
            WaitOutcome::Exited => Ok(report(!force, "killed")),
            WaitOutcome::TimedOut => Err(ActionError::Timeout {
                entity: format!("process {}", pid),
                waited: self.timeouts.forced,
            }),
        }
    }

    pub fn stop_service(&self, name: &str) -> Result<ActionReport, ActionError> {
        self.control_service(name, ServiceControl::Stop)
    }

    pub fn start_service(&self, name: &str) -> Result<ActionReport, ActionError> {
        self.control_service(name, ServiceControl::Start)
    }

    fn control_service(&self, name: &str, control: ServiceControl) -> Result<ActionReport, ActionError> {
        let _enter = self.span.enter();
        let start = Instant::now();
        let action = match control {
            ServiceControl::Stop => Action::Stop,
            ServiceControl::Start => Action::Start,
        };

        let record = self.resolve_service(name, action)?;

        let target = control.target_status();
        let report = |message: String| ActionReport {
            entity: EntityRef::service(record.name.clone()),
            name: record.display_name.clone(),
            action,
            escalated: false,
            elapsed_ms: start.elapsed().as_millis() as u64,
            message,
        };

        if record.status == target {
            debug!("Service {} already {}", record.name, target);
            return Ok(report(format!("already {}", target)));
        }

        info!("Requesting {} of service {}", control.as_str(), record.name);
        self.executor.service_control(&record.name, control)?;
        self.poll_status(&record.name, control)?;
        Ok(report(target.to_string()))
    }

    /// Gates the requested name, looks the unit up, then gates the name the
    /// lookup resolved to. Aliases and unit suffixes resolve to the canonical
    /// unit, which may be critical even when the requested name is not.
    fn resolve_service(&self, name: &str, action: Action) -> Result<ServiceRecord, ActionError> {
        self.check(name, EntityKind::Service, action)?;
        let record = self
            .provider
            .get_service(name)?
            .ok_or_else(|| ActionError::Vanished(format!("service {}", name.trim())))?;
        if EntityKind::Service.normalize(&record.name) != EntityKind::Service.normalize(name) {
            debug!("Service '{}' resolved to '{}'", name.trim(), record.name);
            self.check(&record.name, EntityKind::Service, action)?;
        }
        Ok(record)
    }

    /// Polls until the target status shows up or the bound passes.
    /// The control call is never reissued.
    fn poll_status(&self, name: &str, control: ServiceControl) -> Result<(), ActionError> {
        let target = control.target_status();
        let bound = self.timeouts.service_timeout;
        let start = Instant::now();

        loop {
            let status = self.executor.query_service_status(name)?;
            if status == target {
                debug!("Service {} reached {} after {:?}", name, target, start.elapsed());
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed >= bound {
                warn!(
                    "Service {} still {} after {:?} waiting for {}",
                    name, status, bound, target
                );
                return Err(ActionError::Timeout {
                    entity: format!("service {}", name),
                    waited: bound,
                });
            }
            let remaining = bound - elapsed;
            thread::sleep(self.timeouts.service_poll.min(remaining).max(Duration::from_millis(1)));
        }
    }

    /// Changes the start type to disabled. No polling.
    pub fn disable_service(&self, name: &str) -> Result<ActionReport, ActionError> {
        let _enter = self.span.enter();
        let start = Instant::now();

        let record = self.resolve_service(name, Action::Disable)?;

        info!("Disabling service {}", record.name);
        self.executor.set_start_type(&record.name, StartType::Disabled)?;

        Ok(ActionReport {
            entity: EntityRef::service(record.name.clone()),
            name: record.display_name,
            action: Action::Disable,
            escalated: false,
            elapsed_ms: start.elapsed().as_millis() as u64,
            message: "disabled".to_string(),
        })
    }
}
