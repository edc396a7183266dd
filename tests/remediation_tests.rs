//! Remediation sequencing with a recording executor.
//!
//! The executor records every call, so these tests can assert that denied
//! actions never reach the operating system and that escalation and
//! polling follow their bounds.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procwarden::action::{
    ActionError, ActionExecutor, Remediator, ServiceControl, TimeoutPolicy, WaitOutcome,
};
use procwarden::classify::{ClassificationResult, ProcessCategory, ServiceCategory};
use procwarden::model::{
    normalize_service_name, Action, EntityRef, ProcessRecord, ProcessStatus, ServiceRecord,
    ServiceStatus, StartType,
};
use procwarden::policy::{DenyReason, PolicyGate, PolicyPreset};
use procwarden::snapshot::{ProviderError, SnapshotProvider, StaticProvider};

#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    /// Graceful requests are ignored; forced ones work.
    ignore_graceful: bool,
    /// No request makes the process exit.
    never_exits: bool,
    /// Service status never changes after a control call.
    stuck_services: bool,
    /// The process is gone by the time a forced request arrives.
    gone_before_forced: bool,
    services: Mutex<HashMap<String, ServiceStatus>>,
    last_force: Mutex<bool>,
}

impl RecordingExecutor {
    fn with_service(self, name: &str, status: ServiceStatus) -> Self {
        self.services.lock().unwrap().insert(name.to_string(), status);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ActionExecutor for RecordingExecutor {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), ActionError> {
        self.record(format!("terminate {pid} force={force}"));
        *self.last_force.lock().unwrap() = force;
        if force && self.gone_before_forced {
            return Err(ActionError::Vanished(format!("process {pid}")));
        }
        Ok(())
    }

    fn wait_for_exit(&self, pid: u32, _timeout: Duration) -> Result<WaitOutcome, ActionError> {
        self.record(format!("wait {pid}"));
        let forced = *self.last_force.lock().unwrap();
        if self.never_exits || (self.ignore_graceful && !forced) {
            Ok(WaitOutcome::TimedOut)
        } else {
            Ok(WaitOutcome::Exited)
        }
    }

    fn service_control(&self, name: &str, control: ServiceControl) -> Result<(), ActionError> {
        self.record(format!("{} {name}", control.as_str()));
        if !self.stuck_services {
            self.services
                .lock()
                .unwrap()
                .insert(name.to_string(), control.target_status());
        }
        Ok(())
    }

    fn query_service_status(&self, name: &str) -> Result<ServiceStatus, ActionError> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(ServiceStatus::Unknown))
    }

    fn set_start_type(&self, name: &str, start_type: StartType) -> Result<(), ActionError> {
        self.record(format!("start_type {name} {start_type}"));
        Ok(())
    }
}

fn started() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn proc(pid: u32, name: &str) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: name.to_string(),
        memory_bytes: 5_000_000,
        cpu_percent: 0.0,
        status: ProcessStatus::Running,
        create_time: started(),
        username: None,
        cmdline: vec![],
    }
}

fn svc(name: &str, status: ServiceStatus) -> ServiceRecord {
    ServiceRecord {
        name: name.to_string(),
        display_name: format!("{name} service"),
        status,
        start_type: StartType::Automatic,
        pid: None,
    }
}

fn provider() -> Arc<StaticProvider> {
    Arc::new(StaticProvider::new(
        vec![
            proc(600, "lsass.exe"),
            proc(700, "MsMpEng.exe"),
            proc(4000, "notepad.exe"),
            proc(4001, "calc.exe"),
        ],
        vec![
            svc("spooler", ServiceStatus::Stopped),
            svc("eventlog", ServiceStatus::Running),
            svc("fax", ServiceStatus::Running),
            svc("telnet", ServiceStatus::Stopped),
        ],
    ))
}

fn fast() -> TimeoutPolicy {
    TimeoutPolicy {
        graceful: Duration::from_millis(20),
        forced: Duration::from_millis(20),
        service_poll: Duration::from_millis(5),
        service_timeout: Duration::from_millis(40),
    }
}

fn remediator(executor: Arc<RecordingExecutor>) -> Remediator {
    let gate = PolicyGate::new(Arc::new(PolicyPreset::Windows.registry()));
    Remediator::new(provider(), executor, gate).with_timeouts(fast())
}

#[test]
fn test_denied_actions_never_reach_executor() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());

    let cases = [
        (EntityRef::process(600), Action::Terminate, DenyReason::Critical),
        (EntityRef::process(600), Action::ForceTerminate, DenyReason::Critical),
        (EntityRef::process(700), Action::Terminate, DenyReason::Protected),
        (EntityRef::process(700), Action::ForceTerminate, DenyReason::Protected),
        (EntityRef::service("EventLog"), Action::Stop, DenyReason::Critical),
        (EntityRef::service("eventlog"), Action::Disable, DenyReason::Critical),
        (EntityRef::service("   "), Action::Stop, DenyReason::InvalidName),
        (EntityRef::service(""), Action::Start, DenyReason::InvalidName),
    ];

    for (entity, action, reason) in cases {
        match r.authorize_and_act(&entity, action, false) {
            Err(ActionError::Denied(got)) => assert_eq!(got, reason, "{action} on {entity}"),
            other => panic!("{action} on {entity}: expected denial, got {:?}", other),
        }
    }
    assert!(exec.calls().is_empty());
}

#[test]
fn test_start_of_critical_service_is_allowed() {
    let exec = Arc::new(RecordingExecutor::default().with_service("spooler", ServiceStatus::Stopped));
    let r = remediator(exec.clone());

    let report = r.start_service("spooler").unwrap();
    assert_eq!(report.message, "running");
    assert_eq!(exec.calls(), vec!["start spooler"]);
}

#[test]
fn test_vanished_process_is_failure_without_calls() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());
    assert!(matches!(r.terminate_process(9999, false), Err(ActionError::Vanished(_))));
    assert!(matches!(r.stop_service("nosuch"), Err(ActionError::Vanished(_))));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_graceful_termination() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());

    let report = r.terminate_process(4000, false).unwrap();
    assert!(!report.escalated);
    assert_eq!(report.message, "terminated");
    assert_eq!(report.name, "notepad.exe");
    assert_eq!(exec.calls(), vec!["terminate 4000 force=false", "wait 4000"]);
}

#[test]
fn test_escalates_after_graceful_timeout() {
    let exec = Arc::new(RecordingExecutor {
        ignore_graceful: true,
        ..Default::default()
    });
    let r = remediator(exec.clone());

    let report = r.terminate_process(4000, false).unwrap();
    assert!(report.escalated);
    assert_eq!(report.message, "killed");
    assert_eq!(
        exec.calls(),
        vec![
            "terminate 4000 force=false",
            "wait 4000",
            "terminate 4000 force=true",
            "wait 4000"
        ]
    );
}

#[test]
fn test_exit_before_forced_request() {
    let exec = Arc::new(RecordingExecutor {
        ignore_graceful: true,
        gone_before_forced: true,
        ..Default::default()
    });
    let r = remediator(exec.clone());

    // Exited after the graceful request: counts as terminated
    let report = r.terminate_process(4000, false).unwrap();
    assert!(!report.escalated);
    assert_eq!(report.message, "terminated");
    assert_eq!(
        exec.calls(),
        vec!["terminate 4000 force=false", "wait 4000", "terminate 4000 force=true"]
    );

    // No graceful request was made, so nothing caused the exit
    let err = r.terminate_process(4001, true).unwrap_err();
    assert!(matches!(err, ActionError::Vanished(_)));
}

#[test]
fn test_force_skips_graceful_stage() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());

    let report = r
        .authorize_and_act(&EntityRef::process(4001), Action::Terminate, true)
        .unwrap();
    assert!(!report.escalated);
    assert_eq!(report.action, Action::ForceTerminate);
    assert_eq!(exec.calls(), vec!["terminate 4001 force=true", "wait 4001"]);
}

#[test]
fn test_unkillable_process_times_out() {
    let exec = Arc::new(RecordingExecutor {
        never_exits: true,
        ..Default::default()
    });
    let r = remediator(exec.clone());

    match r.terminate_process(4000, false) {
        Err(ActionError::Timeout { waited, .. }) => assert_eq!(waited, fast().forced),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_service_stop_polls_until_stopped() {
    let exec = Arc::new(RecordingExecutor::default().with_service("fax", ServiceStatus::Running));
    let r = remediator(exec.clone());

    let report = r.stop_service("Fax").unwrap();
    assert_eq!(report.message, "stopped");
    assert_eq!(report.entity, EntityRef::service("fax"));
    assert_eq!(exec.calls(), vec!["stop fax"]);
}

#[test]
fn test_service_stop_timeout_does_not_retry() {
    let exec = Arc::new(
        RecordingExecutor {
            stuck_services: true,
            ..Default::default()
        }
        .with_service("fax", ServiceStatus::Running),
    );
    let r = remediator(exec.clone());

    match r.stop_service("fax") {
        Err(ActionError::Timeout { waited, .. }) => assert_eq!(waited, fast().service_timeout),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(exec.calls(), vec!["stop fax"]);
}

#[test]
fn test_stop_of_stopped_service_is_noop() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());

    let report = r.stop_service("telnet").unwrap();
    assert_eq!(report.message, "already stopped");
    assert!(exec.calls().is_empty());
}

#[test]
fn test_disable_service() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());

    let report = r.disable_service("fax").unwrap();
    assert_eq!(report.action, Action::Disable);
    assert_eq!(exec.calls(), vec!["start_type fax disabled"]);
}

#[test]
fn test_unsupported_combination() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());
    assert!(matches!(
        r.authorize_and_act(&EntityRef::process(4000), Action::Stop, false),
        Err(ActionError::Unsupported(_))
    ));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_sweep_continues_after_failures() {
    let exec = Arc::new(RecordingExecutor::default().with_service("fax", ServiceStatus::Running));
    let r = remediator(exec.clone());

    let mut result = ClassificationResult {
        scanned_at: Utc::now(),
        processes: Default::default(),
        services: Default::default(),
        duplicate_groups: vec![],
    };
    // 5555 vanished since the scan; 4000 shows up in two categories
    result.processes.insert(
        ProcessCategory::Unnecessary,
        vec![proc(5555, "chrome.exe"), proc(4000, "notepad.exe")],
    );
    result
        .processes
        .insert(ProcessCategory::Inactive, vec![proc(4000, "notepad.exe")]);
    result
        .services
        .insert(ServiceCategory::Unnecessary, vec![svc("fax", ServiceStatus::Running)]);

    let report = r.auto_clean(&result);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);

    let failed = &report.outcomes[0];
    assert!(!failed.success);
    assert_eq!(failed.error_kind.as_deref(), Some("vanished"));
    assert!(report.outcomes[1].success);
    assert_eq!(report.outcomes[2].entity, EntityRef::service("fax"));
    assert!(report.outcomes[2].success);

    let terminations = exec
        .calls()
        .iter()
        .filter(|c| c.starts_with("terminate 4000"))
        .count();
    assert_eq!(terminations, 1);
}

/// Resolves alias names to their canonical unit, the way systemd does.
struct AliasProvider {
    inner: StaticProvider,
    aliases: HashMap<String, String>,
}

impl SnapshotProvider for AliasProvider {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>, ProviderError> {
        self.inner.list_processes()
    }

    fn list_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
        self.inner.list_services()
    }

    fn get_service(&self, name: &str) -> Result<Option<ServiceRecord>, ProviderError> {
        let wanted = normalize_service_name(name);
        let canonical = self.aliases.get(&wanted).cloned().unwrap_or(wanted);
        self.inner.get_service(&canonical)
    }
}

fn linux_remediator(executor: Arc<RecordingExecutor>) -> Remediator {
    let provider = AliasProvider {
        inner: StaticProvider::new(
            vec![],
            vec![
                svc("sshd", ServiceStatus::Running),
                svc("cups", ServiceStatus::Running),
            ],
        ),
        aliases: HashMap::from([("ssh".to_string(), "sshd".to_string())]),
    };
    let gate = PolicyGate::new(Arc::new(PolicyPreset::Linux.registry()));
    Remediator::new(Arc::new(provider), executor, gate).with_timeouts(fast())
}

#[test]
fn test_suffixed_or_aliased_critical_service_is_denied() {
    let exec = Arc::new(RecordingExecutor::default().with_service("sshd", ServiceStatus::Running));
    let r = linux_remediator(exec.clone());

    let cases = [
        ("sshd.service", Action::Stop),
        ("SSHD.Service", Action::Disable),
        ("ssh", Action::Stop),
        ("ssh.service", Action::Disable),
    ];
    for (name, action) in cases {
        match r.authorize_and_act(&EntityRef::service(name), action, false) {
            Err(ActionError::Denied(reason)) => {
                assert_eq!(reason, DenyReason::Critical, "{action} {name}")
            }
            other => panic!("{action} {name}: expected denial, got {:?}", other),
        }
    }
    assert!(exec.calls().is_empty());
}

#[test]
fn test_suffixed_ordinary_service_resolves_to_unit() {
    let exec = Arc::new(RecordingExecutor::default().with_service("cups", ServiceStatus::Running));
    let r = linux_remediator(exec.clone());

    let report = r.stop_service("CUPS.service").unwrap();
    assert_eq!(report.entity, EntityRef::service("cups"));
    assert_eq!(report.message, "stopped");
    assert_eq!(exec.calls(), vec!["stop cups"]);
}

#[test]
fn test_recycled_pid_is_not_terminated() {
    let exec = Arc::new(RecordingExecutor::default());
    let r = remediator(exec.clone());

    // Scanned notepad.exe exited; a new notepad.exe got the same pid later
    let mut restarted = proc(4000, "notepad.exe");
    restarted.create_time = started() - ChronoDuration::hours(1);
    // Scanned as notepad.exe, the pid now belongs to calc.exe
    let replaced = proc(4001, "notepad.exe");

    for stale in [&restarted, &replaced] {
        assert!(matches!(
            r.terminate_record(stale, false),
            Err(ActionError::Vanished(_))
        ));
    }

    let mut result = ClassificationResult {
        scanned_at: Utc::now(),
        processes: Default::default(),
        services: Default::default(),
        duplicate_groups: vec![],
    };
    result
        .processes
        .insert(ProcessCategory::Unnecessary, vec![restarted, replaced]);

    let report = r.auto_clean(&result);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.failed(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.error_kind.as_deref() == Some("vanished")));
    assert!(exec.calls().is_empty());

    let report = r.terminate_record(&proc(4000, "notepad.exe"), false).unwrap();
    assert_eq!(report.message, "terminated");
    assert_eq!(exec.calls(), vec!["terminate 4000 force=false", "wait 4000"]);
}
