//! Scan command implementation.
//!
//! Runs one classification and prints the findings.

use std::time::Instant;

use procwarden::classify::{ClassificationResult, ProcessCategory, ProcessDetails, ServiceCategory};
use procwarden::history::CpuHistory;

use crate::cli::OutputFormat;
use crate::state::Components;

/// Categories with at most this many members are printed in full.
const DETAIL_LIMIT: usize = 10;

/// Scans and prints the classification result.
pub fn command_scan(
    components: &Components,
    format: OutputFormat,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    components.warm_up();

    let start = Instant::now();
    let result = components.engine.scan_all()?;
    let elapsed = start.elapsed();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            print_report(&result, components.engine.history(), verbose);
            println!("\n⏱️  Scan completed in {:.1}ms", elapsed.as_secs_f64() * 1000.0);
        }
    }

    Ok(())
}

/// Prints per-category counts, small categories in full, and the totals.
pub fn print_report(result: &ClassificationResult, history: &CpuHistory, verbose: bool) {
    println!("🔍 procwarden - Scan Results");
    println!("============================");
    println!("Scanned at: {}", result.scanned_at.format("%Y-%m-%d %H:%M:%S UTC"));

    for category in ProcessCategory::ALL {
        let procs = result.processes_in(category);
        println!("\n📊 {}: {} processes", category, procs.len());

        if procs.is_empty() || (procs.len() > DETAIL_LIMIT && !verbose) {
            continue;
        }
        for (i, p) in procs.iter().enumerate() {
            let d = ProcessDetails::from_record(p, history.average(p.pid));
            let branch = if i + 1 == procs.len() { "└─" } else { "├─" };
            println!(
                "   {} {} (PID: {}) mem={:.2}MB cpu={:.2}% status={} user={}",
                branch, d.name, d.pid, d.memory_mb, d.cpu_percent, d.status, d.username
            );
        }
    }

    if !result.duplicate_groups.is_empty() {
        println!("\n🧬 Duplicate groups:");
        for g in &result.duplicate_groups {
            println!("   ├─ {}: {} instances, {} excess", g.name, g.total, g.excess.len());
        }
    }

    println!("\n📋 Total issues found: {}", result.total_issues());

    let services = result.services_in(ServiceCategory::Unnecessary);
    println!("\n🛠️  Unnecessary running services: {}", services.len());
    for s in services {
        println!("   ├─ {} ({})", s.name, s.display_name);
    }

    let stopped = result.services_in(ServiceCategory::StoppedAuto);
    if !stopped.is_empty() {
        println!("\n⚠️  Stopped services configured to start automatically: {}", stopped.len());
        if stopped.len() <= DETAIL_LIMIT || verbose {
            for s in stopped {
                println!("   ├─ {} ({})", s.name, s.display_name);
            }
        }
    }
}
