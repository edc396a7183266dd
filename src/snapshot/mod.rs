//! Snapshot providers: where process and service records come from.
//!
//! The engine only sees the `SnapshotProvider` trait. `HostProvider` reads
//! the live system (`/proc` + systemd), `StaticProvider` serves records from
//! memory or from a JSON snapshot file.

pub mod procfs;
pub mod systemd;
pub mod testdata;

pub use procfs::ProcfsReader;
pub use systemd::SystemdReader;
pub use testdata::{SnapshotFile, StaticProvider};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::model::{normalize_service_name, ProcessRecord, ServiceRecord};

/// Errors raised by a snapshot provider as a whole.
///
/// Individual entities that vanish or deny access are skipped by the
/// provider and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Snapshot provider unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },
}

/// Source of process and service records.
pub trait SnapshotProvider: Send + Sync {
    /// Checks that the provider can produce snapshots at all.
    fn probe(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn list_processes(&self) -> Result<Vec<ProcessRecord>, ProviderError>;

    fn list_services(&self) -> Result<Vec<ServiceRecord>, ProviderError>;

    /// Fresh lookup of a single process.
    fn get_process(&self, pid: u32) -> Result<Option<ProcessRecord>, ProviderError> {
        Ok(self.list_processes()?.into_iter().find(|p| p.pid == pid))
    }

    /// Fresh lookup of a single service (case-insensitive).
    fn get_service(&self, name: &str) -> Result<Option<ServiceRecord>, ProviderError> {
        let wanted = normalize_service_name(name);
        Ok(self
            .list_services()?
            .into_iter()
            .find(|s| s.normalized_name() == wanted))
    }
}

/// One frozen view of the system. All rules of one scan run against the
/// same snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub processes: Vec<ProcessRecord>,
    pub services: Vec<ServiceRecord>,
}

impl Snapshot {
    pub fn new(processes: Vec<ProcessRecord>, services: Vec<ServiceRecord>) -> Self {
        Self {
            taken_at: Utc::now(),
            processes,
            services,
        }
    }
}

/// Live provider: processes from procfs, services from systemd.
pub struct HostProvider {
    procfs: ProcfsReader,
    systemd: Option<SystemdReader>,
}

impl HostProvider {
    pub fn new(procfs: ProcfsReader, systemd: Option<SystemdReader>) -> Self {
        Self { procfs, systemd }
    }

    pub fn procfs(&self) -> &ProcfsReader {
        &self.procfs
    }
}

impl SnapshotProvider for HostProvider {
    fn probe(&self) -> Result<(), ProviderError> {
        self.procfs.probe()?;
        if let Some(systemd) = &self.systemd {
            systemd.probe()?;
        }
        Ok(())
    }

    fn list_processes(&self) -> Result<Vec<ProcessRecord>, ProviderError> {
        self.procfs.list_processes()
    }

    fn list_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
        match &self.systemd {
            Some(systemd) => systemd.list_services(),
            None => Ok(Vec::new()),
        }
    }

    fn get_process(&self, pid: u32) -> Result<Option<ProcessRecord>, ProviderError> {
        self.procfs.get_process(pid)
    }

    fn get_service(&self, name: &str) -> Result<Option<ServiceRecord>, ProviderError> {
        match &self.systemd {
            Some(systemd) => systemd.get_service(name),
            None => Ok(None),
        }
    }
}
