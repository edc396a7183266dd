//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! the last scan status, CPU history size and uptime as plain text.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use procwarden::classify::{ProcessCategory, ServiceCategory};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "procwarden - process and service triage with policy-gated remediation";

/// Human-readable uptime.
pub fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let last = state.last_scan.read().await;
    let failures = state.metrics.scan_failures_total.get();

    // A server that has never scanned is still healthy; scans run on demand.
    let status = if last.is_none() && failures > 0.0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let mut table = String::new();
    match last.as_ref() {
        Some(summary) => {
            writeln!(table, "LAST SCAN").ok();
            writeln!(table, "=========").ok();
            writeln!(table, "{:25} | {}", "Scanned at", summary.result.scanned_at.to_rfc3339()).ok();
            writeln!(table, "{:25} | {}", "Processes", summary.processes).ok();
            writeln!(table, "{:25} | {}", "Services", summary.services).ok();
            writeln!(table, "{:25} | {} ms", "Duration", summary.elapsed_ms).ok();
            writeln!(table, "{}", "-".repeat(40)).ok();
            for category in ProcessCategory::ALL {
                writeln!(
                    table,
                    "{:25} | {}",
                    format!("process/{}", category),
                    summary.result.processes_in(category).len()
                )
                .ok();
            }
            for category in ServiceCategory::ALL {
                writeln!(
                    table,
                    "{:25} | {}",
                    format!("service/{}", category),
                    summary.result.services_in(category).len()
                )
                .ok();
            }
        }
        None => {
            writeln!(table, "No scan yet - request /scan to run one").ok();
        }
    }
    drop(last);

    let history = state.engine.history().stats();
    let message = if status == StatusCode::OK { "OK" } else { "Scan failed" };
    let uptime_str = format_uptime(state.start_time.elapsed().as_secs());

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nUptime: {uptime_str}\nScan failures: {failures}\nCPU history: {} pids, {} samples (window {})\n\n{table}\n{FOOTER_TEXT}",
            history.tracked_pids, history.total_samples, history.window_size
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(90), "1.5 minutes");
        assert_eq!(format_uptime(7200), "2.0 hours");
        assert_eq!(format_uptime(172_800), "2.0 days");
    }
}
