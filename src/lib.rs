//! procwarden library
//!
//! Classifies the processes and services of a host against policy tables
//! and performs gated remediation on single entities.
//!
//! # Components
//!
//! - **Policy**: name tables and thresholds (`policy::PolicyRegistry`) and
//!   the gate that every action passes (`policy::PolicyGate`)
//! - **Snapshots**: the `snapshot::SnapshotProvider` trait with live
//!   (`/proc` + systemd) and static implementations
//! - **Classification**: `classify::ClassificationEngine` turns one snapshot
//!   into categorized findings, keeping a rolling CPU window per pid
//! - **Remediation**: `action::Remediator` runs authorize, act and a bounded
//!   wait around an `action::ActionExecutor`
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use procwarden::classify::{ClassificationEngine, ProcessCategory};
//! use procwarden::policy::PolicyPreset;
//! use procwarden::snapshot::StaticProvider;
//!
//! let provider = Arc::new(StaticProvider::new(vec![], vec![]));
//! let registry = Arc::new(PolicyPreset::Linux.registry());
//! let engine = ClassificationEngine::new(provider, registry).unwrap();
//!
//! let result = engine.scan_all().unwrap();
//! println!("{} issues", result.total_issues());
//! assert!(result.processes_in(ProcessCategory::Unnecessary).is_empty());
//! ```

pub mod action;
pub mod classify;
pub mod history;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod report;
pub mod snapshot;

// Re-export main types for convenience
pub use action::{ActionError, ActionExecutor, Remediator, TimeoutPolicy};
pub use classify::{ClassificationEngine, ClassificationResult, EntityDetails};
pub use model::{Action, EntityKind, EntityRef, ProcessRecord, ServiceRecord};
pub use policy::{Decision, DenyReason, PolicyGate, PolicyRegistry};
pub use snapshot::{ProviderError, SnapshotProvider};
