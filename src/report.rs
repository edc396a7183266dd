//! JSON export of one classification result.
//!
//! Written once per explicit export request, never read back.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::classify::{ClassificationResult, ProcessDetails, ServiceDetails};
use crate::history::CpuHistory;
use crate::model::ServiceRecord;
use crate::policy::PolicyRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Export document: entity type -> array of detail records.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub timestamp: String,
    pub scan_results: BTreeMap<String, Vec<ProcessDetails>>,
    pub service_findings: BTreeMap<String, Vec<ServiceDetails>>,
    pub services: Vec<ServiceDetails>,
}

impl ExportReport {
    /// Builds the document. `services` is the full service list of the
    /// snapshot, independent of the findings.
    pub fn assemble(
        result: &ClassificationResult,
        services: &[ServiceRecord],
        registry: &PolicyRegistry,
        history: &CpuHistory,
        at: DateTime<Local>,
    ) -> Self {
        let scan_results = result
            .processes
            .iter()
            .map(|(category, procs)| {
                let details = procs
                    .iter()
                    .map(|p| ProcessDetails::from_record(p, history.average(p.pid)))
                    .collect();
                (category.as_str().to_string(), details)
            })
            .collect();

        let service_findings = result
            .services
            .iter()
            .map(|(category, svcs)| {
                let details = svcs
                    .iter()
                    .map(|s| ServiceDetails::from_record(s, registry))
                    .collect();
                (category.as_str().to_string(), details)
            })
            .collect();

        Self {
            timestamp: at.to_rfc3339(),
            scan_results,
            service_findings,
            services: services
                .iter()
                .map(|s| ServiceDetails::from_record(s, registry))
                .collect(),
        }
    }

    /// File name for a report taken at `at`.
    pub fn file_name(at: DateTime<Local>) -> String {
        format!("procwarden_report_{}.json", at.format("%Y%m%d_%H%M%S"))
    }

    /// Writes the report into `dir` and returns the file path.
    pub fn write_to(&self, dir: &Path, at: DateTime<Local>) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(Self::file_name(at));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Report exported to {}", path.display());
        Ok(path)
    }
}
