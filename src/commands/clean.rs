//! Clean command implementation.
//!
//! Scans, lists what the sweep would touch, asks for confirmation and runs
//! the sweep.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use procwarden::classify::{ClassificationResult, ProcessCategory, ServiceCategory};

use crate::state::Components;

/// Number of entities a sweep over `result` would act on.
fn planned_targets(result: &ClassificationResult) -> usize {
    let pids: BTreeSet<u32> = result
        .processes_in(ProcessCategory::Unnecessary)
        .iter()
        .chain(result.processes_in(ProcessCategory::Inactive))
        .map(|p| p.pid)
        .collect();
    pids.len() + result.services_in(ServiceCategory::Unnecessary).len()
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Terminates unnecessary and inactive processes and stops unnecessary services.
pub fn command_clean(components: &Components, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧹 procwarden - Clean");
    println!("=====================");

    components.warm_up();
    let result = components.engine.scan_all()?;

    let targets = planned_targets(&result);
    if targets == 0 {
        println!("✅ Nothing to clean");
        return Ok(());
    }

    for category in [ProcessCategory::Unnecessary, ProcessCategory::Inactive] {
        for p in result.processes_in(category) {
            println!("   ├─ terminate {} (PID: {}) [{}]", p.name, p.pid, category);
        }
    }
    for s in result.services_in(ServiceCategory::Unnecessary) {
        println!("   ├─ stop service {}", s.name);
    }

    if !yes && !confirm(&format!("\nProceed with {} actions?", targets))? {
        println!("Aborted");
        return Ok(());
    }

    let report = components.remediator.auto_clean(&result);
    println!();
    for outcome in &report.outcomes {
        if outcome.success {
            println!("   ✅ {} {}: {}", outcome.action, outcome.name, outcome.message);
        } else {
            println!(
                "   ❌ {} {}: {} ({})",
                outcome.action,
                outcome.name,
                outcome.message,
                outcome.error_kind.as_deref().unwrap_or("error")
            );
        }
    }

    println!(
        "\n📋 Summary: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    Ok(())
}
