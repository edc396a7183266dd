//! CLI command implementations for procwarden.
//!
//! This module provides implementations for all CLI subcommands:
//! - `scan`: Classification report (default)
//! - `services`: Unnecessary and stopped automatic services
//! - `details`: One process or service
//! - `terminate` / `stop` / `start` / `disable`: Gated single actions
//! - `clean`: Auto-clean sweep
//! - `export`: JSON report
//! - `policy`: Effective policy tables
//! - `config`: Configuration file generation
//! - `check`: System validation
//! - `generate-testdata`: Synthetic snapshot files

pub mod act;
pub mod check;
pub mod clean;
pub mod config;
pub mod details;
pub mod export;
pub mod generate;
pub mod policy;
pub mod scan;
pub mod services;

// Re-export command functions
pub use act::command_act;
pub use check::command_check;
pub use clean::command_clean;
pub use config::command_config;
pub use details::command_details;
pub use export::command_export;
pub use generate::command_generate_testdata;
pub use policy::command_policy;
pub use scan::command_scan;
pub use services::command_services;
