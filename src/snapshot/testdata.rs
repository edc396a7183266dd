//! In-memory snapshot provider, optionally loaded from a JSON snapshot file.
//!
//! Used for offline triage of exported snapshots (`--test-data-file`) and
//! throughout the tests. The file format is the one `generate-testdata`
//! writes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::{ProviderError, SnapshotProvider};
use crate::model::{normalize_service_name, ProcessRecord, ServiceRecord, ServiceStatus, StartType};

/// Root structure of a snapshot JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: String,
    pub generated_at: String,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

impl SnapshotFile {
    pub fn new(processes: Vec<ProcessRecord>, services: Vec<ServiceRecord>) -> Self {
        Self {
            version: "1.0".to_string(),
            generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            processes,
            services,
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        debug!("Loading snapshot from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|source| ProviderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SnapshotFile =
            serde_json::from_str(&content).map_err(|e| ProviderError::Parse {
                what: path.display().to_string(),
                message: e.to_string(),
            })?;

        info!(
            "Loaded snapshot version {} from {} ({} processes, {} services)",
            file.version,
            file.generated_at,
            file.processes.len(),
            file.services.len()
        );
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProviderError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ProviderError::Parse {
            what: "snapshot".into(),
            message: e.to_string(),
        })?;
        fs::write(path, json).map_err(|source| ProviderError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Serves records from memory. Mutators let executors and tests model
/// state changes (a process exiting, a service stopping).
#[derive(Debug, Default)]
pub struct StaticProvider {
    data: RwLock<SnapshotFile>,
}

impl StaticProvider {
    pub fn new(processes: Vec<ProcessRecord>, services: Vec<ServiceRecord>) -> Self {
        Self::from_snapshot(SnapshotFile::new(processes, services))
    }

    pub fn from_snapshot(file: SnapshotFile) -> Self {
        Self {
            data: RwLock::new(file),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        SnapshotFile::load(path).map(Self::from_snapshot)
    }

    /// Replaces the process list.
    pub fn set_processes(&self, processes: Vec<ProcessRecord>) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .processes = processes;
    }

    /// Removes a process; returns whether it was present.
    pub fn remove_process(&self, pid: u32) -> bool {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let before = data.processes.len();
        data.processes.retain(|p| p.pid != pid);
        data.processes.len() != before
    }

    /// Updates a service's run status; returns whether it was found.
    pub fn set_service_status(&self, name: &str, status: ServiceStatus) -> bool {
        self.update_service(name, |s| s.status = status)
    }

    pub fn set_start_type(&self, name: &str, start_type: StartType) -> bool {
        self.update_service(name, |s| s.start_type = start_type)
    }

    fn update_service(&self, name: &str, f: impl FnOnce(&mut ServiceRecord)) -> bool {
        let wanted = normalize_service_name(name);
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        match data
            .services
            .iter_mut()
            .find(|s| s.normalized_name() == wanted)
        {
            Some(svc) => {
                f(svc);
                true
            }
            None => false,
        }
    }

    pub fn snapshot_file(&self) -> SnapshotFile {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SnapshotProvider for StaticProvider {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>, ProviderError> {
        Ok(self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .processes
            .clone())
    }

    fn list_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
        Ok(self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .services
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessStatus;
    use tempfile::tempdir;

    fn proc(pid: u32, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.into(),
            memory_bytes: 1_000_000,
            cpu_percent: 0.0,
            status: ProcessStatus::Running,
            create_time: Utc::now(),
            username: None,
            cmdline: vec![],
        }
    }

    fn svc(name: &str) -> ServiceRecord {
        ServiceRecord {
            name: name.into(),
            display_name: name.into(),
            status: ServiceStatus::Running,
            start_type: StartType::Automatic,
            pid: None,
        }
    }

    #[test]
    fn test_lookup_and_mutation() {
        let provider = StaticProvider::new(vec![proc(1, "a"), proc(2, "b")], vec![svc("Cups")]);

        assert_eq!(provider.get_process(2).unwrap().map(|p| p.name), Some("b".into()));
        assert!(provider.get_service("cups").unwrap().is_some());

        assert!(provider.remove_process(2));
        assert!(!provider.remove_process(2));
        assert!(provider.get_process(2).unwrap().is_none());

        assert!(provider.set_service_status("CUPS", ServiceStatus::Stopped));
        assert_eq!(
            provider.get_service("cups").unwrap().map(|s| s.status),
            Some(ServiceStatus::Stopped)
        );
        assert!(!provider.set_start_type("missing", StartType::Disabled));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let file = SnapshotFile::new(vec![proc(10, "firefox")], vec![svc("cups")]);
        file.save(&path).unwrap();

        let provider = StaticProvider::from_file(&path).unwrap();
        assert_eq!(provider.snapshot_file(), file);
    }

    #[test]
    fn test_missing_file() {
        let err = StaticProvider::from_file(Path::new("/nonexistent/snap.json")).unwrap_err();
        assert!(matches!(err, ProviderError::Io { .. }));
    }
}
