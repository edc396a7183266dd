//! Fixed-shape records for the entities procwarden inspects.
//!
//! Snapshot providers map whatever the operating system yields into these
//! types; everything downstream (classification, gating, actions, reports)
//! works exclusively on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per megabyte used for every memory threshold and display value.
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// Normalizes an entity name for policy lookups (trimmed, lowercase).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalizes a service name; a trailing `.service` unit suffix is dropped
/// so `sshd`, `SSHD.service` and `sshd.service` share one policy key.
pub fn normalize_service_name(name: &str) -> String {
    let name = normalize_name(name);
    match name.strip_suffix(".service") {
        Some(stem) => stem.trim_end().to_string(),
        None => name,
    }
}

/// Lifecycle status of a process (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Stopped,
    Zombie,
    Dead,
    Other,
}

impl ProcessStatus {
    /// Maps the state character of `/proc/<pid>/stat`.
    ///
    /// All schedulable states (running, sleeping, disk sleep, idle, ...)
    /// collapse into `Running`.
    pub fn from_proc_state(state: char) -> Self {
        match state {
            'R' | 'S' | 'D' | 'I' | 'W' | 'P' | 'K' => ProcessStatus::Running,
            'T' | 't' => ProcessStatus::Stopped,
            'Z' => ProcessStatus::Zombie,
            'X' | 'x' => ProcessStatus::Dead,
            _ => ProcessStatus::Other,
        }
    }

    /// Statuses the suspended rule looks for.
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            ProcessStatus::Stopped | ProcessStatus::Zombie | ProcessStatus::Dead
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Zombie => "zombie",
            ProcessStatus::Dead => "dead",
            ProcessStatus::Other => "other",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of one process at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub memory_bytes: u64,
    /// Instantaneous CPU usage in percent (100.0 = one full core).
    pub cpu_percent: f64,
    pub status: ProcessStatus,
    pub create_time: DateTime<Utc>,
    /// Owning user; `None` when the provider could not resolve it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmdline: Vec<String>,
}

impl ProcessRecord {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Same pid, name and start time: the record still describes the
    /// process it was taken from, not a later holder of a recycled pid.
    pub fn same_identity(&self, other: &ProcessRecord) -> bool {
        self.pid == other.pid
            && self.create_time == other.create_time
            && self.normalized_name() == other.normalized_name()
    }

    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / BYTES_PER_MB
    }
}

/// Run status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::StartPending => "start_pending",
            ServiceStatus::StopPending => "stop_pending",
            ServiceStatus::Running => "running",
            ServiceStatus::ContinuePending => "continue_pending",
            ServiceStatus::PausePending => "pause_pending",
            ServiceStatus::Paused => "paused",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured start type of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartType {
    Automatic,
    Boot,
    Manual,
    Disabled,
    System,
    Unknown,
}

impl StartType {
    pub fn as_str(self) -> &'static str {
        match self {
            StartType::Automatic => "automatic",
            StartType::Boot => "boot",
            StartType::Manual => "manual",
            StartType::Disabled => "disabled",
            StartType::System => "system",
            StartType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of one service at scan time.
///
/// Criticality and candidacy are not stored here; they are derived from the
/// policy registry whenever they are needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub display_name: String,
    pub status: ServiceStatus,
    pub start_type: StartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ServiceRecord {
    pub fn normalized_name(&self) -> String {
        normalize_service_name(&self.name)
    }
}

/// Kind of entity an action or policy lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Process,
    Service,
}

impl EntityKind {
    /// Policy key for `name` under this kind.
    pub fn normalize(self, name: &str) -> String {
        match self {
            EntityKind::Process => normalize_name(name),
            EntityKind::Service => normalize_service_name(name),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Process => f.write_str("process"),
            EntityKind::Service => f.write_str("service"),
        }
    }
}

/// Remediation actions the gate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Terminate,
    ForceTerminate,
    Stop,
    Start,
    Disable,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Terminate => "terminate",
            Action::ForceTerminate => "force_terminate",
            Action::Stop => "stop",
            Action::Start => "start",
            Action::Disable => "disable",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identifier of an entity: a pid or a service name.
///
/// Identifiers can be recycled by the OS, so every action re-resolves the
/// reference right before acting on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    Process { pid: u32 },
    Service { name: String },
}

impl EntityRef {
    pub fn process(pid: u32) -> Self {
        EntityRef::Process { pid }
    }

    pub fn service(name: impl Into<String>) -> Self {
        EntityRef::Service { name: name.into() }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Process { .. } => EntityKind::Process,
            EntityRef::Service { .. } => EntityKind::Service,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Process { pid } => write!(f, "process {pid}"),
            EntityRef::Service { name } => write!(f, "service {name}"),
        }
    }
}
