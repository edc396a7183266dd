//! Offline triage: a snapshot file served by `StaticProvider`, remediated
//! through `SnapshotExecutor`, then exported.

use chrono::{Duration, Local, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::tempdir;

use procwarden::action::{Remediator, SnapshotExecutor, TimeoutPolicy};
use procwarden::classify::{ClassificationEngine, ProcessCategory, ServiceCategory};
use procwarden::model::{ProcessRecord, ProcessStatus, ServiceRecord, ServiceStatus, StartType};
use procwarden::policy::{PolicyGate, PolicyPreset};
use procwarden::report::ExportReport;
use procwarden::snapshot::{SnapshotFile, SnapshotProvider, StaticProvider};

fn proc(pid: u32, name: &str, cpu: f64, age_secs: i64) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: name.to_string(),
        memory_bytes: 20_000_000,
        cpu_percent: cpu,
        status: ProcessStatus::Running,
        create_time: Utc::now() - Duration::seconds(age_secs),
        username: Some("alice".into()),
        cmdline: vec![name.to_string(), "--background".into()],
    }
}

fn svc(name: &str, status: ServiceStatus, start_type: StartType) -> ServiceRecord {
    ServiceRecord {
        name: name.to_string(),
        display_name: format!("{name} service"),
        status,
        start_type,
        pid: None,
    }
}

struct Fixture {
    provider: Arc<StaticProvider>,
    engine: ClassificationEngine,
    remediator: Remediator,
}

fn fixture(file: SnapshotFile) -> Fixture {
    let registry = Arc::new(PolicyPreset::Windows.registry());
    let provider = Arc::new(StaticProvider::from_snapshot(file));
    let engine = ClassificationEngine::new(provider.clone(), registry.clone()).unwrap();
    let remediator = Remediator::new(
        provider.clone(),
        Arc::new(SnapshotExecutor::new(provider.clone())),
        PolicyGate::new(registry),
    )
    .with_timeouts(TimeoutPolicy {
        graceful: StdDuration::from_millis(10),
        forced: StdDuration::from_millis(10),
        service_poll: StdDuration::from_millis(1),
        service_timeout: StdDuration::from_millis(50),
    });
    Fixture {
        provider,
        engine,
        remediator,
    }
}

fn sample_file(inactive_floor: i64) -> SnapshotFile {
    SnapshotFile::new(
        vec![
            proc(600, "lsass.exe", 0.0, inactive_floor * 10),
            proc(4000, "notepad.exe", 3.0, 60),
            proc(4100, "idle-daemon", 0.0, inactive_floor * 2),
            proc(4200, "editor", 12.0, 60),
        ],
        vec![
            svc("Fax", ServiceStatus::Running, StartType::Manual),
            svc("EventLog", ServiceStatus::Running, StartType::Automatic),
        ],
    )
}

#[test]
fn test_clean_sweep_mutates_snapshot() {
    let floor = PolicyPreset::Windows.registry().thresholds.inactive_seconds as i64;
    let fx = fixture(sample_file(floor));

    let before = fx.engine.scan_all().unwrap();
    assert_eq!(
        before
            .processes_in(ProcessCategory::Unnecessary)
            .iter()
            .map(|p| p.pid)
            .collect::<Vec<_>>(),
        vec![4000]
    );
    assert_eq!(
        before
            .processes_in(ProcessCategory::Inactive)
            .iter()
            .map(|p| p.pid)
            .collect::<Vec<_>>(),
        vec![4100]
    );
    assert_eq!(before.services_in(ServiceCategory::Unnecessary).len(), 1);

    let report = fx.remediator.auto_clean(&before);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.failed(), 0);

    let remaining: Vec<u32> = fx
        .provider
        .list_processes()
        .unwrap()
        .iter()
        .map(|p| p.pid)
        .collect();
    assert_eq!(remaining, vec![600, 4200]);
    assert_eq!(
        fx.provider.get_service("fax").unwrap().unwrap().status,
        ServiceStatus::Stopped
    );

    let after = fx.engine.scan_all().unwrap();
    assert_eq!(after.total_issues(), 0);
    assert!(after.services_in(ServiceCategory::Unnecessary).is_empty());
}

#[test]
fn test_snapshot_file_drives_provider() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    sample_file(3600).save(&path).unwrap();

    let provider = StaticProvider::from_file(&path).unwrap();
    assert_eq!(provider.list_processes().unwrap().len(), 4);
    assert_eq!(
        provider.get_service("EVENTLOG").unwrap().unwrap().name,
        "EventLog"
    );
}

#[test]
fn test_export_report_written() {
    let floor = PolicyPreset::Windows.registry().thresholds.inactive_seconds as i64;
    let fx = fixture(sample_file(floor));
    let snapshot = fx.engine.snapshot().unwrap();
    let result = fx.engine.classify(&snapshot, Utc::now());

    let at = Local::now();
    let report = ExportReport::assemble(
        &result,
        &snapshot.services,
        fx.engine.registry(),
        fx.engine.history(),
        at,
    );
    let dir = tempdir().unwrap();
    let path = report.write_to(&dir.path().join("reports"), at).unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        ExportReport::file_name(at)
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["scan_results"]["unnecessary"][0]["pid"], 4000);
    assert_eq!(json["scan_results"]["unnecessary"][0]["name"], "notepad.exe");
    assert!(json["scan_results"]["duplicate"].as_array().unwrap().is_empty());
    assert_eq!(json["service_findings"]["unnecessary"][0]["name"], "Fax");
    assert_eq!(json["services"].as_array().unwrap().len(), 2);
}
