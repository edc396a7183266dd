//! Classification rules.
//!
//! Each rule is an independent function over one frozen snapshot. Rules
//! never see each other's output. Every process rule except the candidate
//! list match consults the gate's pre-check, so anything a rule reports is
//! also something the gate would let an action touch.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::CpuHistory;
use crate::model::{EntityKind, ProcessRecord, ServiceRecord, ServiceStatus, StartType};
use crate::policy::{PolicyGate, Thresholds};

/// Latest-sample ceiling below which a process counts as idle.
pub const IDLE_CPU_PERCENT: f64 = 1.0;

/// Processes sharing a name beyond the tolerated instance count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    /// Normalized name shared by the group.
    pub name: String,
    pub total: usize,
    /// Instances past the threshold, in snapshot order.
    pub excess: Vec<ProcessRecord>,
}

fn flaggable(gate: &PolicyGate, p: &ProcessRecord) -> bool {
    gate.may_flag(&p.name, EntityKind::Process)
}

/// Stopped, zombie or dead processes.
pub fn suspended(processes: &[ProcessRecord], gate: &PolicyGate) -> Vec<ProcessRecord> {
    processes
        .iter()
        .filter(|p| p.status.is_suspended() && flaggable(gate, p))
        .cloned()
        .collect()
}

/// Groups by normalized name and reports every instance past `max_instances`.
///
/// The first `max_instances` instances in snapshot order are kept. Groups
/// appear in order of their first occurrence.
pub fn duplicates(
    processes: &[ProcessRecord],
    gate: &PolicyGate,
    max_instances: usize,
) -> Vec<DuplicateGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&ProcessRecord>> = HashMap::new();

    for p in processes.iter().filter(|p| flaggable(gate, p)) {
        let key = p.normalized_name();
        let members = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        members.push(p);
    }

    order
        .into_iter()
        .filter_map(|name| {
            let members = groups.remove(&name)?;
            if members.len() <= max_instances {
                return None;
            }
            Some(DuplicateGroup {
                total: members.len(),
                excess: members[max_instances..].iter().map(|p| (*p).clone()).collect(),
                name,
            })
        })
        .collect()
}

/// Old processes whose latest CPU sample is below 1%.
///
/// Uses the instantaneous sample of the snapshot, not the rolling average.
pub fn inactive(
    processes: &[ProcessRecord],
    gate: &PolicyGate,
    floor_seconds: u64,
    now: DateTime<Utc>,
) -> Vec<ProcessRecord> {
    let floor_ms = floor_seconds.saturating_mul(1000) as i64;
    processes
        .iter()
        .filter(|p| {
            let age_ms = (now - p.create_time).num_milliseconds();
            age_ms > floor_ms && p.cpu_percent < IDLE_CPU_PERCENT && flaggable(gate, p)
        })
        .cloned()
        .collect()
}

/// Processes named in the candidate list.
///
/// Never-touch membership is still checked first, so an entry listed in
/// both places is never reported.
pub fn unnecessary_processes(processes: &[ProcessRecord], gate: &PolicyGate) -> Vec<ProcessRecord> {
    let registry = gate.registry();
    processes
        .iter()
        .filter(|p| flaggable(gate, p) && registry.is_unnecessary(&p.name, EntityKind::Process))
        .cloned()
        .collect()
}

/// Processes above the memory ceiling or the rolling CPU ceiling.
///
/// Appends each evaluated process's current sample to `history` before
/// averaging. This mutation is part of classification.
pub fn resource_heavy(
    processes: &[ProcessRecord],
    gate: &PolicyGate,
    history: &CpuHistory,
    thresholds: &Thresholds,
) -> Vec<ProcessRecord> {
    processes
        .iter()
        .filter(|p| flaggable(gate, p))
        .filter(|p| {
            let rolling = history.record(p.pid, p.cpu_percent);
            p.memory_mb() > thresholds.memory_mb || rolling > thresholds.cpu_percent
        })
        .cloned()
        .collect()
}

/// Running services named in the candidate list and not critical.
pub fn unnecessary_services(services: &[ServiceRecord], gate: &PolicyGate) -> Vec<ServiceRecord> {
    let registry = gate.registry();
    services
        .iter()
        .filter(|s| {
            s.status == ServiceStatus::Running
                && !registry.is_critical(&s.name, EntityKind::Service)
                && registry.is_unnecessary(&s.name, EntityKind::Service)
        })
        .cloned()
        .collect()
}

/// Automatic services that are stopped and not removal candidates.
pub fn stopped_auto_services(services: &[ServiceRecord], gate: &PolicyGate) -> Vec<ServiceRecord> {
    let registry = gate.registry();
    services
        .iter()
        .filter(|s| {
            s.start_type == StartType::Automatic
                && s.status == ServiceStatus::Stopped
                && !registry.is_unnecessary(&s.name, EntityKind::Service)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessStatus;
    use crate::policy::PolicyRegistry;
    use chrono::Duration;
    use std::sync::Arc;

    fn proc(pid: u32, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.into(),
            memory_bytes: 10_000_000,
            cpu_percent: 5.0,
            status: ProcessStatus::Running,
            create_time: Utc::now(),
            username: None,
            cmdline: vec![],
        }
    }

    fn gate() -> PolicyGate {
        let mut registry = PolicyRegistry::default();
        registry.critical_processes.insert("init".into());
        registry.protected_processes.insert("cron".into());
        registry.unnecessary_processes.insert("notepad.exe".into());
        registry.unnecessary_processes.insert("cron".into());
        registry.critical_services.insert("dbus".into());
        registry.unnecessary_services.insert("cups".into());
        registry.unnecessary_services.insert("dbus".into());
        PolicyGate::new(Arc::new(registry))
    }

    #[test]
    fn test_suspended_excludes_critical() {
        let mut z = proc(1, "worker");
        z.status = ProcessStatus::Zombie;
        let mut t = proc(2, "INIT");
        t.status = ProcessStatus::Stopped;
        let mut other = proc(3, "odd");
        other.status = ProcessStatus::Other;

        let found = suspended(&[z, t, other], &gate());
        assert_eq!(found.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_duplicates_flag_excess_only() {
        let procs: Vec<ProcessRecord> = (0..5).map(|i| proc(100 + i, "Worker")).collect();
        let groups = duplicates(&procs, &gate(), 3);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "worker");
        assert_eq!(groups[0].total, 5);
        assert_eq!(groups[0].excess.len(), 2);
        assert_eq!(groups[0].excess[0].pid, 103);
    }

    #[test]
    fn test_duplicates_case_folded_and_protected_skipped() {
        let procs = vec![
            proc(1, "bash"),
            proc(2, "BASH"),
            proc(3, "cron"),
            proc(4, "cron"),
            proc(5, "Bash "),
        ];
        let groups = duplicates(&procs, &gate(), 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].excess.len(), 2);
    }

    #[test]
    fn test_inactive_boundary() {
        let now = Utc::now();
        let mut p = proc(1, "idle");
        p.create_time = now - Duration::seconds(3601);
        p.cpu_percent = 0.5;

        assert_eq!(inactive(&[p.clone()], &gate(), 3600, now).len(), 1);

        // Exactly at the floor is not older than it
        p.create_time = now - Duration::seconds(3600);
        assert!(inactive(&[p.clone()], &gate(), 3600, now).is_empty());

        p.create_time = now - Duration::seconds(100_000);
        p.cpu_percent = 5.0;
        assert!(inactive(&[p], &gate(), 3600, now).is_empty());
    }

    #[test]
    fn test_unnecessary_process_precedence() {
        let found = unnecessary_processes(
            &[proc(1, "Notepad.exe"), proc(2, "cron"), proc(3, "vim")],
            &gate(),
        );
        assert_eq!(found.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_resource_heavy_memory() {
        let history = CpuHistory::default();
        let mut big = proc(1, "db");
        big.memory_bytes = 500_000_001;
        let mut edge = proc(2, "cache");
        edge.memory_bytes = 500_000_000;

        let found = resource_heavy(&[big, edge], &gate(), &history, &Thresholds::default());
        assert_eq!(found.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![1]);
        assert_eq!(history.tracked_pids(), 2);
    }

    #[test]
    fn test_resource_heavy_skips_critical_without_recording() {
        let history = CpuHistory::default();
        let mut p = proc(1, "init");
        p.cpu_percent = 99.0;
        assert!(resource_heavy(&[p], &gate(), &history, &Thresholds::default()).is_empty());
        assert_eq!(history.tracked_pids(), 0);
    }

    #[test]
    fn test_service_rules() {
        let svc = |name: &str, status, start_type| ServiceRecord {
            name: name.into(),
            display_name: name.into(),
            status,
            start_type,
            pid: None,
        };
        let services = vec![
            svc("cups", ServiceStatus::Running, StartType::Automatic),
            svc("dbus", ServiceStatus::Running, StartType::Automatic),
            svc("ntp", ServiceStatus::Stopped, StartType::Automatic),
            svc("cups-stopped", ServiceStatus::Stopped, StartType::Manual),
        ];
        let g = gate();

        let unnecessary = unnecessary_services(&services, &g);
        assert_eq!(unnecessary.len(), 1);
        assert_eq!(unnecessary[0].name, "cups");

        let stopped = stopped_auto_services(&services, &g);
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].name, "ntp");
    }
}
