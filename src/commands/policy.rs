//! Policy command implementation.
//!
//! Prints the effective policy tables after preset, policy file and
//! config overlay have been merged.

use std::collections::BTreeSet;

use procwarden::policy::PolicyRegistry;

use crate::cli::PolicyTable;

fn print_set(title: &str, names: &BTreeSet<String>) {
    println!("\n📁 {} ({})", title, names.len());
    for name in names {
        println!("   ├─ {}", name);
    }
}

/// Prints one or all policy tables.
pub fn command_policy(
    registry: &PolicyRegistry,
    table: Option<PolicyTable>,
) -> Result<(), Box<dyn std::error::Error>> {
    let wanted = |t: PolicyTable| table.map_or(true, |sel| sel == t);

    println!("📜 procwarden - Effective Policy");
    println!("===============================");

    if wanted(PolicyTable::CriticalProcesses) {
        print_set("Critical processes", &registry.critical_processes);
    }
    if wanted(PolicyTable::ProtectedProcesses) {
        print_set("Protected processes", &registry.protected_processes);
    }
    if wanted(PolicyTable::CriticalServices) {
        print_set("Critical services", &registry.critical_services);
    }
    if wanted(PolicyTable::UnnecessaryProcesses) {
        print_set("Unnecessary processes", &registry.unnecessary_processes);
    }
    if wanted(PolicyTable::UnnecessaryServices) {
        print_set("Unnecessary services", &registry.unnecessary_services);
    }
    if wanted(PolicyTable::Thresholds) {
        let t = &registry.thresholds;
        println!("\n📏 Thresholds");
        println!("   ├─ memory_mb: {}", t.memory_mb);
        println!("   ├─ cpu_percent: {}", t.cpu_percent);
        println!("   ├─ inactive_seconds: {}", t.inactive_seconds);
        println!("   └─ max_duplicate_instances: {}", t.max_duplicate_instances);
    }

    let overlaps = registry.overlaps();
    if table.is_none() && !overlaps.is_empty() {
        println!("\n⚠️  Names listed as both never-touch and candidate:");
        for (kind, name) in overlaps {
            println!("   ├─ {} {} (never-touch wins)", kind, name);
        }
    }

    Ok(())
}
