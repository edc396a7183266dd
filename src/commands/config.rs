//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("procwarden.yaml"),
    };

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# procwarden Configuration
# ========================
#
# Server Configuration (serve)
# ----------------------------
# bind: "127.0.0.1"            # Bind IP; actions are exposed, keep it local
# port: 9216                   # HTTP port
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
# enable_file_logging: false   # Enable file logging
# log_file: null               # Log file path (required with file logging)
#
# Snapshot Sources
# ----------------
# test_data_file: null         # JSON snapshot file instead of /proc and systemd
# proc_root: "/proc"           # Proc filesystem root
# scan_services: true          # Enumerate systemd services
# cpu_sample_interval_ms: 500  # Delay before the first scan for CPU deltas
# parallelism: null            # Parallel /proc parsing threads (null = auto)
#
# Policy
# ------
# policy_preset: "linux"       # linux or windows
# policy_file: null            # TOML tables replacing the preset
# policy:                      # Additions on top of preset or policy file
#   critical_processes: []
#   protected_processes: []
#   critical_services: []
#   unnecessary_processes: []
#   unnecessary_services: []
#   thresholds:
#     memory_mb: 500
#     cpu_percent: 80
#     inactive_seconds: 3600
#     max_duplicate_instances: 3
#
# Remediation Timeouts (seconds)
# ------------------------------
# timeouts:
#   graceful_seconds: 5        # Wait after SIGTERM before SIGKILL
#   forced_seconds: 3          # Wait after SIGKILL
#   service_poll_seconds: 1    # Service status poll interval
#   service_timeout_seconds: 30 # Overall service stop/start bound
#
# Reports
# -------
# export_dir: "."              # Directory for procwarden_report_*.json
"#;

    format!("{comments}\n{yaml}")
}
