//! Prometheus metrics for scans and actions.
//!
//! Only aggregate values are exposed: findings per category, scan timing,
//! and action outcomes. No per-process series.

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Opts, Registry};
use std::time::Duration;

use crate::action::ActionError;
use crate::classify::{ClassificationResult, ProcessCategory, ServiceCategory};
use crate::model::Action;

/// Collection of procwarden metrics.
#[derive(Clone)]
pub struct ScanMetrics {
    pub findings: GaugeVec,          // labels: kind, category
    pub scans_total: Counter,
    pub scan_failures_total: Counter,
    pub scan_duration_seconds: Gauge,
    pub last_scan_timestamp_seconds: Gauge,
    pub processes_seen: Gauge,
    pub services_seen: Gauge,
    pub actions_total: CounterVec,   // labels: action, outcome
    pub history_tracked_pids: Gauge,
}

impl ScanMetrics {
    /// Creates and registers all metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let findings = GaugeVec::new(
            Opts::new(
                "procwarden_findings",
                "Entities flagged by the last scan, per category",
            ),
            &["kind", "category"],
        )?;
        let scans_total = Counter::new("procwarden_scans_total", "Completed scans")?;
        let scan_failures_total = Counter::new(
            "procwarden_scan_failures_total",
            "Scans that failed because the snapshot provider errored",
        )?;
        let scan_duration_seconds = Gauge::new(
            "procwarden_scan_duration_seconds",
            "Duration of the last scan in seconds",
        )?;
        let last_scan_timestamp_seconds = Gauge::new(
            "procwarden_last_scan_timestamp_seconds",
            "Unix timestamp of the last completed scan",
        )?;
        let processes_seen = Gauge::new(
            "procwarden_processes_seen",
            "Processes in the last snapshot",
        )?;
        let services_seen = Gauge::new(
            "procwarden_services_seen",
            "Services in the last snapshot",
        )?;
        let actions_total = CounterVec::new(
            Opts::new("procwarden_actions_total", "Remediation actions by outcome"),
            &["action", "outcome"],
        )?;
        let history_tracked_pids = Gauge::new(
            "procwarden_history_tracked_pids",
            "Pids with a rolling CPU window",
        )?;

        registry.register(Box::new(findings.clone()))?;
        registry.register(Box::new(scans_total.clone()))?;
        registry.register(Box::new(scan_failures_total.clone()))?;
        registry.register(Box::new(scan_duration_seconds.clone()))?;
        registry.register(Box::new(last_scan_timestamp_seconds.clone()))?;
        registry.register(Box::new(processes_seen.clone()))?;
        registry.register(Box::new(services_seen.clone()))?;
        registry.register(Box::new(actions_total.clone()))?;
        registry.register(Box::new(history_tracked_pids.clone()))?;

        Ok(Self {
            findings,
            scans_total,
            scan_failures_total,
            scan_duration_seconds,
            last_scan_timestamp_seconds,
            processes_seen,
            services_seen,
            actions_total,
            history_tracked_pids,
        })
    }

    /// Publishes the outcome of one scan.
    pub fn observe_scan(
        &self,
        result: &ClassificationResult,
        processes: usize,
        services: usize,
        elapsed: Duration,
        tracked_pids: usize,
    ) {
        for category in ProcessCategory::ALL {
            self.findings
                .with_label_values(&["process", category.as_str()])
                .set(result.processes_in(category).len() as f64);
        }
        for category in ServiceCategory::ALL {
            self.findings
                .with_label_values(&["service", category.as_str()])
                .set(result.services_in(category).len() as f64);
        }
        self.scans_total.inc();
        self.scan_duration_seconds.set(elapsed.as_secs_f64());
        self.last_scan_timestamp_seconds
            .set(result.scanned_at.timestamp() as f64);
        self.processes_seen.set(processes as f64);
        self.services_seen.set(services as f64);
        self.history_tracked_pids.set(tracked_pids as f64);
    }

    pub fn observe_action<T>(&self, action: Action, outcome: &Result<T, ActionError>) {
        let label = match outcome {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.actions_total
            .with_label_values(&[action.as_str(), label])
            .inc();
    }
}
