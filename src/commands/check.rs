//! Check command implementation.
//!
//! Validates system requirements and configuration.

use procwarden::snapshot::{ProcfsReader, SystemdReader};

use crate::config::{validate_effective_config, Config};

/// Validates system requirements and configuration.
pub fn command_check(
    proc: bool,
    services: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 procwarden - System Check");
    println!("============================");
    println!(
        "   version {} (commit {}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    );

    let mut all_ok = true;

    // Check /proc filesystem
    if proc || all {
        let root = config.proc_root();
        println!("\n📁 Checking {} ...", root.display());
        let reader = ProcfsReader::new(&root);
        match reader.probe() {
            Ok(()) => {
                println!("   ✅ proc filesystem accessible");
                match reader.list_processes() {
                    Ok(procs) if procs.is_empty() => {
                        println!("   ❌ Cannot read any process entries");
                        all_ok = false;
                    }
                    Ok(procs) => {
                        let owned = procs.iter().filter(|p| p.username.is_some()).count();
                        println!(
                            "   ✅ Can read {} processes ({} with resolved owner)",
                            procs.len(),
                            owned
                        );
                    }
                    Err(e) => {
                        println!("   ❌ Listing processes failed: {}", e);
                        all_ok = false;
                    }
                }
            }
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
    }

    // Check service manager
    if services || all {
        println!("\n🛠️  Checking systemd...");
        let reader = SystemdReader::default();
        match reader.probe().and_then(|_| reader.list_services()) {
            Ok(list) => println!("   ✅ systemctl available, {} services listed", list.len()),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    // Check policy tables
    println!("\n📜 Checking policy tables...");
    match config.build_registry() {
        Ok(registry) => {
            println!(
                "   ✅ {} critical, {} protected, {} candidate process names",
                registry.critical_processes.len(),
                registry.protected_processes.len(),
                registry.unnecessary_processes.len()
            );
            let overlaps = registry.overlaps();
            if !overlaps.is_empty() {
                println!(
                    "   ⚠️  {} names are both never-touch and candidate (never-touch wins)",
                    overlaps.len()
                );
            }
        }
        Err(e) => {
            println!("   ❌ Policy could not be loaded: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
