//! CLI arguments and subcommands for procwarden.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format for scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Policy tables that `policy` can print
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyTable {
    CriticalProcesses,
    ProtectedProcesses,
    CriticalServices,
    UnnecessaryProcesses,
    UnnecessaryServices,
    Thresholds,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "procwarden",
    about = "Process and service triage with policy-gated remediation",
    long_about = "Process and service triage with policy-gated remediation.\n\n\
                  Scans the process table and systemd services, classifies suspended, \
                  duplicate, inactive, unnecessary and resource-heavy processes, and \
                  terminates or stops entities only when the policy gate allows it.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides config)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path to JSON snapshot file (uses it instead of /proc and systemd)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Built-in policy preset (linux or windows)
    #[arg(long)]
    pub preset: Option<String>,

    /// Policy tables file (TOML), replaces the preset
    #[arg(long)]
    pub policy_file: Option<PathBuf>,

    /// Skip service enumeration
    #[arg(long)]
    pub no_services: bool,

    /// Parallel /proc parsing threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan and classify processes and services (default)
    Scan {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Print details for every category, not only small ones
        #[arg(long)]
        verbose: bool,
    },

    /// List running services from the unnecessary list
    Services {
        /// Also list stopped services configured to start automatically
        #[arg(long)]
        stopped_auto: bool,
    },

    /// Show details for one process or service
    Details {
        /// Process id
        #[arg(long, conflicts_with = "service", required_unless_present = "service")]
        pid: Option<u32>,

        /// Service name
        #[arg(long)]
        service: Option<String>,
    },

    /// Terminate a process (graceful, then forced after a timeout)
    Terminate {
        pid: u32,

        /// Skip the graceful stage
        #[arg(long)]
        force: bool,
    },

    /// Stop a service and wait for it to reach the stopped state
    Stop { service: String },

    /// Start a service and wait for it to reach the running state
    Start { service: String },

    /// Disable a service's automatic start
    Disable { service: String },

    /// Terminate unnecessary and inactive processes, stop unnecessary services
    Clean {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Export a scan as a timestamped JSON report
    Export {
        /// Output directory (overrides config export_dir)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Print the effective policy tables
    Policy {
        /// Only print one table
        #[arg(long, value_enum)]
        table: Option<PolicyTable>,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Validate configuration and system requirements
    Check {
        /// Check /proc filesystem
        #[arg(long)]
        proc: bool,

        /// Check systemd availability
        #[arg(long)]
        services: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate a synthetic snapshot JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of filler processes
        #[arg(long, default_value_t = 40)]
        processes: usize,

        /// Number of filler services
        #[arg(long, default_value_t = 10)]
        services: usize,
    },

    /// Serve scans, details and actions over HTTP
    Serve {
        /// HTTP listen port
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Bind to specific interface/IP
        #[arg(long)]
        bind: Option<IpAddr>,
    },
}
