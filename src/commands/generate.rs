//! Generate testdata command implementation.
//!
//! Generates synthetic snapshot JSON files that exercise every rule of the
//! active policy: names from each policy table, one duplicate group, old
//! idle processes and random filler.

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;
use tracing::debug;

use procwarden::model::{
    ProcessRecord, ProcessStatus, ServiceRecord, ServiceStatus, StartType, BYTES_PER_MB,
};
use procwarden::policy::PolicyRegistry;
use procwarden::snapshot::SnapshotFile;

use crate::config::Config;

// Constants for test data generation ranges
const MIN_MEMORY_BYTES: u64 = 10 * 1_000_000; // 10 MB
const MAX_MEMORY_BYTES: u64 = 2_000 * 1_000_000; // 2 GB
const MAX_AGE_SECONDS: i64 = 2 * 24 * 3600; // 2 days
const FILLER_USERS: &[&str] = &["root", "www-data", "postgres", "alice", "bob"];

/// Generates a synthetic snapshot file for offline scans.
pub fn command_generate_testdata(
    output: PathBuf,
    filler_processes: usize,
    filler_services: usize,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = config.build_registry()?;
    debug!(
        "Generating test data: processes={}, services={}, output={}",
        filler_processes,
        filler_services,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let snapshot = generate_snapshot(&mut rng, &registry, filler_processes, filler_services);
    snapshot.save(&output)?;

    println!(
        "✅ Generated test data: {} processes, {} services in {}",
        snapshot.processes.len(),
        snapshot.services.len(),
        output.display()
    );

    Ok(())
}

/// Builds the snapshot. Split out so tests can seed the generator.
pub fn generate_snapshot(
    rng: &mut impl Rng,
    registry: &PolicyRegistry,
    filler_processes: usize,
    filler_services: usize,
) -> SnapshotFile {
    let thresholds = &registry.thresholds;
    let mut processes = Vec::new();
    let mut pid: u32 = 1000;
    let mut next_pid = || {
        pid += 1;
        pid
    };

    let named = registry
        .critical_processes
        .iter()
        .chain(&registry.protected_processes)
        .chain(&registry.unnecessary_processes);
    for name in named {
        processes.push(random_process(rng, next_pid(), name));
    }

    // One name above the duplicate limit
    let dup_count = thresholds.max_duplicate_instances + 2;
    for _ in 0..dup_count {
        processes.push(random_process(rng, next_pid(), "worker-dup"));
    }

    // Idle and older than the inactivity floor
    for i in 0..3 {
        let mut p = random_process(rng, next_pid(), &format!("idle-daemon-{}", i + 1));
        p.cpu_percent = 0.0;
        p.create_time =
            Utc::now() - Duration::seconds(thresholds.inactive_seconds as i64 + 60 * (i + 1));
        processes.push(p);
    }

    // Above the memory ceiling
    let mut heavy = random_process(rng, next_pid(), "heavy-job");
    heavy.memory_bytes = ((thresholds.memory_mb + 100.0) * BYTES_PER_MB) as u64;
    processes.push(heavy);

    for i in 0..filler_processes {
        let mut p = random_process(rng, next_pid(), &format!("process-{}", i + 1));
        p.status = match rng.gen_range(0..20) {
            0 => ProcessStatus::Stopped,
            1 => ProcessStatus::Zombie,
            _ => ProcessStatus::Running,
        };
        processes.push(p);
    }

    let mut services = Vec::new();
    for name in &registry.critical_services {
        services.push(service(name, ServiceStatus::Running, StartType::Automatic));
    }
    for name in &registry.unnecessary_services {
        let status = if rng.gen_bool(0.7) {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        };
        services.push(service(name, status, StartType::Automatic));
    }
    for i in 0..filler_services {
        let status = *[ServiceStatus::Running, ServiceStatus::Stopped]
            .choose(rng)
            .unwrap_or(&ServiceStatus::Running);
        let start_type = *[StartType::Automatic, StartType::Manual, StartType::Disabled]
            .choose(rng)
            .unwrap_or(&StartType::Manual);
        services.push(service(&format!("service-{}", i + 1), status, start_type));
    }

    SnapshotFile::new(processes, services)
}

/// Generates a random process with realistic memory and CPU values.
fn random_process(rng: &mut impl Rng, pid: u32, name: &str) -> ProcessRecord {
    let age = rng.gen_range(60..MAX_AGE_SECONDS);
    ProcessRecord {
        pid,
        name: name.to_string(),
        memory_bytes: rng.gen_range(MIN_MEMORY_BYTES..MAX_MEMORY_BYTES / 4),
        cpu_percent: (rng.gen_range(0.0..60.0_f64) * 100.0).round() / 100.0,
        status: ProcessStatus::Running,
        create_time: Utc::now() - Duration::seconds(age),
        username: FILLER_USERS.choose(rng).map(|u| u.to_string()),
        cmdline: vec![format!("/usr/bin/{name}"), "--serve".into()],
    }
}

fn service(name: &str, status: ServiceStatus, start_type: StartType) -> ServiceRecord {
    ServiceRecord {
        name: name.to_string(),
        display_name: format!("{name} service"),
        status,
        start_type,
        pid: None,
    }
}
