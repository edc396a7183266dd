//! Configuration management for procwarden.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use procwarden::action::TimeoutPolicy;
use procwarden::policy::{PolicyOverlay, PolicyPreset, PolicyRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_CPU_SAMPLE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_EXPORT_DIR: &str = ".";

/// Wait and poll bounds for remediation actions, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_graceful_seconds")]
    pub graceful_seconds: f64,

    #[serde(default = "default_forced_seconds")]
    pub forced_seconds: f64,

    #[serde(default = "default_service_poll_seconds")]
    pub service_poll_seconds: f64,

    #[serde(default = "default_service_timeout_seconds")]
    pub service_timeout_seconds: f64,
}

fn default_graceful_seconds() -> f64 {
    5.0
}
fn default_forced_seconds() -> f64 {
    3.0
}
fn default_service_poll_seconds() -> f64 {
    1.0
}
fn default_service_timeout_seconds() -> f64 {
    30.0
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            graceful_seconds: default_graceful_seconds(),
            forced_seconds: default_forced_seconds(),
            service_poll_seconds: default_service_poll_seconds(),
            service_timeout_seconds: default_service_timeout_seconds(),
        }
    }
}

impl TimeoutConfig {
    pub fn to_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            graceful: Duration::from_secs_f64(self.graceful_seconds),
            forced: Duration::from_secs_f64(self.forced_seconds),
            service_poll: Duration::from_secs_f64(self.service_poll_seconds),
            service_timeout: Duration::from_secs_f64(self.service_timeout_seconds),
        }
    }
}

/// Configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    pub log_level: Option<String>,
    pub enable_file_logging: Option<bool>,
    pub log_file: Option<PathBuf>,

    // Snapshot sources
    /// Path to JSON snapshot file (uses it instead of /proc and systemd)
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "scan-services")]
    pub scan_services: Option<bool>,
    /// Delay between priming the CPU counters and the first scan
    #[serde(alias = "cpu-sample-interval-ms")]
    pub cpu_sample_interval_ms: Option<u64>,
    pub parallelism: Option<usize>,

    // Policy
    /// "linux" | "windows"
    #[serde(alias = "policy-preset")]
    pub policy_preset: Option<String>,
    /// TOML policy tables replacing the preset
    #[serde(alias = "policy-file")]
    pub policy_file: Option<PathBuf>,

    // Reports
    #[serde(alias = "export-dir")]
    pub export_dir: Option<PathBuf>,

    // Tables last so the TOML serializer can emit them
    /// Additions layered on top of the preset or policy file
    pub policy: Option<PolicyOverlay>,
    pub timeouts: Option<TimeoutConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            log_level: Some("info".into()),
            enable_file_logging: Some(false),
            log_file: None,
            test_data_file: None,
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            scan_services: Some(true),
            cpu_sample_interval_ms: Some(DEFAULT_CPU_SAMPLE_INTERVAL_MS),
            parallelism: None,
            policy_preset: Some(PolicyPreset::Linux.as_str().to_string()),
            policy_file: None,
            export_dir: Some(PathBuf::from(DEFAULT_EXPORT_DIR)),
            policy: None,
            timeouts: Some(TimeoutConfig::default()),
        }
    }
}

impl Config {
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeouts.clone().unwrap_or_default().to_policy()
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR))
    }

    /// Builds the effective policy: policy file or preset, then the overlay.
    pub fn build_registry(&self) -> Result<PolicyRegistry, Box<dyn std::error::Error>> {
        let mut registry = match &self.policy_file {
            Some(path) => {
                info!("Loading policy tables from {}", path.display());
                PolicyRegistry::from_file(path)?
            }
            None => self
                .policy_preset
                .as_deref()
                .unwrap_or(PolicyPreset::Linux.as_str())
                .parse::<PolicyPreset>()?
                .registry(),
        };
        if let Some(overlay) = &self.policy {
            registry.apply(overlay);
        }
        Ok(registry)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = cfg.log_level.as_deref() {
        match level.to_ascii_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )
                .into());
            }
        }
    }

    if cfg.enable_file_logging.unwrap_or(false) && cfg.log_file.is_none() {
        return Err("enable_file_logging is set but log_file is not".into());
    }

    if cfg.policy_file.is_none() {
        if let Some(preset) = cfg.policy_preset.as_deref() {
            preset.parse::<PolicyPreset>()?;
        }
    } else if let Some(path) = cfg.policy_file.as_deref() {
        if !path.exists() {
            return Err(format!("Policy file not found: {}", path.display()).into());
        }
    }

    if let Some(t) = cfg.policy.as_ref().and_then(|p| p.thresholds.as_ref()) {
        if !(t.memory_mb.is_finite() && t.memory_mb > 0.0) {
            return Err("policy.thresholds.memory_mb must be a positive number".into());
        }
        if !(t.cpu_percent.is_finite() && t.cpu_percent > 0.0) {
            return Err("policy.thresholds.cpu_percent must be a positive number".into());
        }
    }

    if let Some(t) = &cfg.timeouts {
        for (name, value) in [
            ("graceful_seconds", t.graceful_seconds),
            ("forced_seconds", t.forced_seconds),
            ("service_poll_seconds", t.service_poll_seconds),
            ("service_timeout_seconds", t.service_timeout_seconds),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("timeouts.{} must be a positive number", name).into());
            }
        }
        if t.service_poll_seconds > t.service_timeout_seconds {
            return Err("timeouts.service_poll_seconds exceeds service_timeout_seconds".into());
        }
    }

    if let Some(file) = cfg.test_data_file.as_deref() {
        if !file.exists() {
            return Err(format!("Test data file not found: {}", file.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(level) = args.log_level {
        config.log_level = Some(format!("{:?}", level).to_lowercase());
    }

    // Test data file: CLI wins if provided
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }

    if let Some(preset) = &args.preset {
        config.policy_preset = Some(preset.clone());
    }
    if let Some(policy_file) = &args.policy_file {
        config.policy_file = Some(policy_file.clone());
    }

    if args.no_services {
        config.scan_services = Some(false);
    }
    if let Some(n) = args.parallelism {
        config.parallelism = Some(n);
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/procwarden/procwarden.yaml",
                "/etc/procwarden/procwarden.yml",
                "./procwarden.yaml",
                "./procwarden.yml",
                "./procwarden.json",
            ];

            match defaults.iter().map(Path::new).find(|p| p.exists()) {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(config: &Config, format: &ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, &format)?;

    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
