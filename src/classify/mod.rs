//! Classification engine.
//!
//! One scan pulls one snapshot from the provider, then runs every rule
//! against that frozen snapshot, so all categories of a result describe a
//! mutually consistent view. The rolling CPU history is the only state that
//! outlives a scan.

pub mod details;
pub mod rules;

pub use details::{EntityDetails, ProcessDetails, ServiceDetails};
pub use rules::DuplicateGroup;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Span};

use crate::history::CpuHistory;
use crate::model::{EntityRef, ProcessRecord, ServiceRecord};
use crate::policy::{PolicyGate, PolicyRegistry};
use crate::snapshot::{ProviderError, Snapshot, SnapshotProvider};

/// Process finding categories, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessCategory {
    Suspended,
    Duplicate,
    Inactive,
    Unnecessary,
    ResourceHeavy,
}

impl ProcessCategory {
    pub const ALL: [ProcessCategory; 5] = [
        ProcessCategory::Suspended,
        ProcessCategory::Duplicate,
        ProcessCategory::Inactive,
        ProcessCategory::Unnecessary,
        ProcessCategory::ResourceHeavy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessCategory::Suspended => "suspended",
            ProcessCategory::Duplicate => "duplicate",
            ProcessCategory::Inactive => "inactive",
            ProcessCategory::Unnecessary => "unnecessary",
            ProcessCategory::ResourceHeavy => "resource_heavy",
        }
    }
}

impl fmt::Display for ProcessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service finding categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Unnecessary,
    StoppedAuto,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 2] = [ServiceCategory::Unnecessary, ServiceCategory::StoppedAuto];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCategory::Unnecessary => "unnecessary",
            ServiceCategory::StoppedAuto => "stopped_auto",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Findings of one scan. Every category key is present, possibly empty.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub scanned_at: DateTime<Utc>,
    pub processes: BTreeMap<ProcessCategory, Vec<ProcessRecord>>,
    pub services: BTreeMap<ServiceCategory, Vec<ServiceRecord>>,
    /// Per-name breakdown behind the flattened `duplicate` category.
    pub duplicate_groups: Vec<DuplicateGroup>,
}

impl ClassificationResult {
    fn empty(scanned_at: DateTime<Utc>) -> Self {
        Self {
            scanned_at,
            processes: ProcessCategory::ALL.iter().map(|c| (*c, Vec::new())).collect(),
            services: ServiceCategory::ALL.iter().map(|c| (*c, Vec::new())).collect(),
            duplicate_groups: Vec::new(),
        }
    }

    pub fn processes_in(&self, category: ProcessCategory) -> &[ProcessRecord] {
        self.processes
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn services_in(&self, category: ServiceCategory) -> &[ServiceRecord] {
        self.services
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sum of process category sizes; duplicates count once per excess
    /// instance.
    pub fn total_issues(&self) -> usize {
        self.processes.values().map(Vec::len).sum()
    }

    pub fn total_service_findings(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }
}

/// Applies the classification rules to snapshots from one provider.
pub struct ClassificationEngine {
    provider: Arc<dyn SnapshotProvider>,
    gate: PolicyGate,
    history: Arc<CpuHistory>,
    scan_services: bool,
    span: Span,
}

impl ClassificationEngine {
    /// Builds an engine. Fails only when the provider is unavailable.
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        registry: Arc<PolicyRegistry>,
    ) -> Result<Self, ProviderError> {
        let span = info_span!("engine");
        {
            let _enter = span.enter();
            provider.probe()?;
            registry.warn_overlaps();
            debug!("Snapshot provider ready");
        }

        Ok(Self {
            provider,
            gate: PolicyGate::new(registry),
            history: Arc::new(CpuHistory::default()),
            scan_services: true,
            span,
        })
    }

    /// Shares an existing CPU history instead of the engine's own.
    pub fn with_history(mut self, history: Arc<CpuHistory>) -> Self {
        self.history = history;
        self
    }

    /// Enables or disables service enumeration during scans.
    pub fn with_services(mut self, scan_services: bool) -> Self {
        self.scan_services = scan_services;
        self
    }

    pub fn gate(&self) -> &PolicyGate {
        &self.gate
    }

    pub fn registry(&self) -> &PolicyRegistry {
        self.gate.registry()
    }

    pub fn history(&self) -> &Arc<CpuHistory> {
        &self.history
    }

    pub fn provider(&self) -> &Arc<dyn SnapshotProvider> {
        &self.provider
    }

    /// Acquires one snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, ProviderError> {
        let _enter = self.span.enter();
        let processes = self.provider.list_processes()?;
        let services = if self.scan_services {
            self.provider.list_services()?
        } else {
            Vec::new()
        };
        Ok(Snapshot::new(processes, services))
    }

    /// Acquires a snapshot and classifies it.
    pub fn scan_all(&self) -> Result<ClassificationResult, ProviderError> {
        let snapshot = self.snapshot()?;
        Ok(self.classify(&snapshot, Utc::now()))
    }

    /// Runs every rule against `snapshot`, with `now` as the age reference.
    pub fn classify(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> ClassificationResult {
        let _enter = self.span.enter();
        let start = Instant::now();
        let thresholds = &self.registry().thresholds;
        let procs = &snapshot.processes;

        let mut result = ClassificationResult::empty(snapshot.taken_at);

        let groups = rules::duplicates(procs, &self.gate, thresholds.max_duplicate_instances);
        let flattened: Vec<ProcessRecord> =
            groups.iter().flat_map(|g| g.excess.iter().cloned()).collect();

        result
            .processes
            .insert(ProcessCategory::Suspended, rules::suspended(procs, &self.gate));
        result.processes.insert(ProcessCategory::Duplicate, flattened);
        result.processes.insert(
            ProcessCategory::Inactive,
            rules::inactive(procs, &self.gate, thresholds.inactive_seconds, now),
        );
        result.processes.insert(
            ProcessCategory::Unnecessary,
            rules::unnecessary_processes(procs, &self.gate),
        );
        result.processes.insert(
            ProcessCategory::ResourceHeavy,
            rules::resource_heavy(procs, &self.gate, &self.history, thresholds),
        );
        result.duplicate_groups = groups;

        result.services.insert(
            ServiceCategory::Unnecessary,
            rules::unnecessary_services(&snapshot.services, &self.gate),
        );
        result.services.insert(
            ServiceCategory::StoppedAuto,
            rules::stopped_auto_services(&snapshot.services, &self.gate),
        );

        for (category, found) in &result.processes {
            debug!("{}: {} processes", category, found.len());
        }
        info!(
            processes = procs.len(),
            services = snapshot.services.len(),
            issues = result.total_issues(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scan classified"
        );
        result
    }

    /// Running services from the candidate list.
    pub fn find_unnecessary_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
        let _enter = self.span.enter();
        let services = self.provider.list_services()?;
        Ok(rules::unnecessary_services(&services, &self.gate))
    }

    /// Stopped services that are configured to start automatically.
    pub fn find_stopped_auto_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
        let _enter = self.span.enter();
        let services = self.provider.list_services()?;
        Ok(rules::stopped_auto_services(&services, &self.gate))
    }

    /// Fresh lookup of one entity. `None` when it no longer exists.
    pub fn get_entity_details(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<EntityDetails>, ProviderError> {
        let _enter = self.span.enter();
        match entity {
            EntityRef::Process { pid } => Ok(self.provider.get_process(*pid)?.map(|p| {
                EntityDetails::Process(ProcessDetails::from_record(&p, self.history.average(p.pid)))
            })),
            EntityRef::Service { name } => Ok(self
                .provider
                .get_service(name)?
                .map(|s| EntityDetails::Service(ServiceDetails::from_record(&s, self.registry())))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProcessStatus, ServiceStatus, StartType};
    use crate::snapshot::StaticProvider;

    struct DownProvider;

    impl SnapshotProvider for DownProvider {
        fn probe(&self) -> Result<(), ProviderError> {
            Err(ProviderError::Unavailable("offline".into()))
        }
        fn list_processes(&self) -> Result<Vec<ProcessRecord>, ProviderError> {
            Ok(vec![])
        }
        fn list_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
            Ok(vec![])
        }
    }

    fn proc(pid: u32, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.into(),
            memory_bytes: 1_000_000,
            cpu_percent: 2.0,
            status: ProcessStatus::Running,
            create_time: Utc::now(),
            username: None,
            cmdline: vec![],
        }
    }

    #[test]
    fn test_unavailable_provider_prevents_construction() {
        let result = ClassificationEngine::new(
            Arc::new(DownProvider),
            Arc::new(PolicyRegistry::default()),
        );
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_empty_result_has_all_keys() {
        let provider = Arc::new(StaticProvider::new(vec![], vec![]));
        let engine =
            ClassificationEngine::new(provider, Arc::new(PolicyRegistry::default())).unwrap();
        let result = engine.scan_all().unwrap();
        assert_eq!(result.processes.len(), 5);
        assert_eq!(result.services.len(), 2);
        assert_eq!(result.total_issues(), 0);
    }

    #[test]
    fn test_services_can_be_skipped() {
        let svc = ServiceRecord {
            name: "ntp".into(),
            display_name: "ntp".into(),
            status: ServiceStatus::Stopped,
            start_type: StartType::Automatic,
            pid: None,
        };
        let provider = Arc::new(StaticProvider::new(vec![proc(1, "a")], vec![svc]));
        let engine = ClassificationEngine::new(provider, Arc::new(PolicyRegistry::default()))
            .unwrap()
            .with_services(false);

        let result = engine.scan_all().unwrap();
        assert!(result.services_in(ServiceCategory::StoppedAuto).is_empty());
        assert_eq!(engine.find_stopped_auto_services().unwrap().len(), 1);
    }

    #[test]
    fn test_entity_details_lookup() {
        let provider = Arc::new(StaticProvider::new(vec![proc(9, "vim")], vec![]));
        let engine =
            ClassificationEngine::new(provider, Arc::new(PolicyRegistry::default())).unwrap();
        engine.scan_all().unwrap();

        match engine.get_entity_details(&EntityRef::process(9)).unwrap() {
            Some(EntityDetails::Process(d)) => {
                assert_eq!(d.name, "vim");
                assert_eq!(d.rolling_cpu_percent, Some(2.0));
            }
            other => panic!("unexpected details: {:?}", other),
        }
        assert!(engine
            .get_entity_details(&EntityRef::process(10))
            .unwrap()
            .is_none());
        assert!(engine
            .get_entity_details(&EntityRef::service("nope"))
            .unwrap()
            .is_none());
    }
}
