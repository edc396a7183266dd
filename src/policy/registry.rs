//! Policy tables: which names are never touched, which are removal
//! candidates, and the numeric thresholds the classification rules use.
//!
//! Built-in tables are embedded TOML files (one per preset). A registry can
//! also be read from a user-supplied TOML file and extended with an overlay
//! from the main configuration.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, warn};

use crate::model::{normalize_name, normalize_service_name, EntityKind};

/// Errors raised while loading policy tables.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy tables: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown policy preset '{0}', expected 'linux' or 'windows'")]
    UnknownPreset(String),
}

/// Numeric limits used by the classification rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Resident memory ceiling in MB (10^6 bytes).
    #[serde(default = "default_memory_mb")]
    pub memory_mb: f64,

    /// Rolling-average CPU ceiling in percent.
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: f64,

    /// Minimum process age before it can be considered inactive.
    #[serde(default = "default_inactive_seconds")]
    pub inactive_seconds: u64,

    /// Instances of one name tolerated before the rest count as duplicates.
    #[serde(default = "default_max_duplicates")]
    pub max_duplicate_instances: usize,
}

fn default_memory_mb() -> f64 {
    500.0
}
fn default_cpu_percent() -> f64 {
    80.0
}
fn default_inactive_seconds() -> u64 {
    3600
}
fn default_max_duplicates() -> usize {
    3
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            memory_mb: default_memory_mb(),
            cpu_percent: default_cpu_percent(),
            inactive_seconds: default_inactive_seconds(),
            max_duplicate_instances: default_max_duplicates(),
        }
    }
}

/// The five name sets plus thresholds.
///
/// Names are stored normalized. Membership tests normalize their input, so
/// callers may pass raw names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRegistry {
    #[serde(default)]
    pub critical_processes: BTreeSet<String>,
    #[serde(default)]
    pub protected_processes: BTreeSet<String>,
    #[serde(default)]
    pub critical_services: BTreeSet<String>,
    #[serde(default)]
    pub unnecessary_processes: BTreeSet<String>,
    #[serde(default)]
    pub unnecessary_services: BTreeSet<String>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// Additions layered on top of a preset or policy file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverlay {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_processes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected_processes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unnecessary_processes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unnecessary_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
}

/// Built-in policy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPreset {
    Linux,
    Windows,
}

impl FromStr for PolicyPreset {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(PolicyPreset::Linux),
            "windows" => Ok(PolicyPreset::Windows),
            other => Err(PolicyError::UnknownPreset(other.to_string())),
        }
    }
}

impl PolicyPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyPreset::Linux => "linux",
            PolicyPreset::Windows => "windows",
        }
    }

    /// Returns a copy of the embedded registry for this preset.
    pub fn registry(self) -> PolicyRegistry {
        match self {
            PolicyPreset::Linux => LINUX_POLICY.clone(),
            PolicyPreset::Windows => WINDOWS_POLICY.clone(),
        }
    }
}

/// Parses an embedded table; a broken table yields an empty registry.
fn load_embedded(name: &str, content: &str) -> PolicyRegistry {
    match PolicyRegistry::from_toml_str(content) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to parse built-in {} policy: {}", name, e);
            PolicyRegistry::default()
        }
    }
}

static LINUX_POLICY: Lazy<PolicyRegistry> =
    Lazy::new(|| load_embedded("linux", include_str!("../../data/policy-linux.toml")));

static WINDOWS_POLICY: Lazy<PolicyRegistry> =
    Lazy::new(|| load_embedded("windows", include_str!("../../data/policy-windows.toml")));

fn normalize_set(set: &BTreeSet<String>, normalize: fn(&str) -> String) -> BTreeSet<String> {
    set.iter()
        .map(|n| normalize(n))
        .filter(|n| !n.is_empty())
        .collect()
}

fn extend_normalized(set: &mut BTreeSet<String>, names: &[String], normalize: fn(&str) -> String) {
    set.extend(names.iter().map(|n| normalize(n)).filter(|n| !n.is_empty()));
}

impl PolicyRegistry {
    /// Parses policy tables from TOML and normalizes every name.
    pub fn from_toml_str(content: &str) -> Result<Self, PolicyError> {
        let parsed: PolicyRegistry = toml::from_str(content)?;
        Ok(parsed.normalized())
    }

    /// Reads policy tables from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Returns a copy with every name trimmed and lowercased.
    pub fn normalized(self) -> Self {
        Self {
            critical_processes: normalize_set(&self.critical_processes, normalize_name),
            protected_processes: normalize_set(&self.protected_processes, normalize_name),
            critical_services: normalize_set(&self.critical_services, normalize_service_name),
            unnecessary_processes: normalize_set(&self.unnecessary_processes, normalize_name),
            unnecessary_services: normalize_set(&self.unnecessary_services, normalize_service_name),
            thresholds: self.thresholds,
        }
    }

    /// Adds the overlay's names and replaces thresholds when it carries them.
    pub fn apply(&mut self, overlay: &PolicyOverlay) {
        extend_normalized(
            &mut self.critical_processes,
            &overlay.critical_processes,
            normalize_name,
        );
        extend_normalized(
            &mut self.protected_processes,
            &overlay.protected_processes,
            normalize_name,
        );
        extend_normalized(
            &mut self.critical_services,
            &overlay.critical_services,
            normalize_service_name,
        );
        extend_normalized(
            &mut self.unnecessary_processes,
            &overlay.unnecessary_processes,
            normalize_name,
        );
        extend_normalized(
            &mut self.unnecessary_services,
            &overlay.unnecessary_services,
            normalize_service_name,
        );
        if let Some(t) = &overlay.thresholds {
            self.thresholds = t.clone();
        }
    }

    pub fn is_critical(&self, name: &str, kind: EntityKind) -> bool {
        let name = kind.normalize(name);
        match kind {
            EntityKind::Process => self.critical_processes.contains(&name),
            EntityKind::Service => self.critical_services.contains(&name),
        }
    }

    /// Protected tier; services have none beyond critical.
    pub fn is_protected(&self, name: &str, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Process => self.protected_processes.contains(&kind.normalize(name)),
            EntityKind::Service => false,
        }
    }

    pub fn is_unnecessary(&self, name: &str, kind: EntityKind) -> bool {
        let name = kind.normalize(name);
        match kind {
            EntityKind::Process => self.unnecessary_processes.contains(&name),
            EntityKind::Service => self.unnecessary_services.contains(&name),
        }
    }

    /// Names that sit in a never-touch set and a candidate set at once.
    ///
    /// The gate resolves these in favour of the never-touch set.
    pub fn overlaps(&self) -> Vec<(EntityKind, String)> {
        let mut out: Vec<(EntityKind, String)> = self
            .unnecessary_processes
            .iter()
            .filter(|n| self.critical_processes.contains(*n) || self.protected_processes.contains(*n))
            .map(|n| (EntityKind::Process, n.clone()))
            .collect();
        out.extend(
            self.unnecessary_services
                .iter()
                .filter(|n| self.critical_services.contains(*n))
                .map(|n| (EntityKind::Service, n.clone())),
        );
        out
    }

    /// Logs every overlapping name once.
    pub fn warn_overlaps(&self) {
        for (kind, name) in self.overlaps() {
            warn!(
                "Policy lists {} '{}' as both never-touch and removal candidate; never-touch wins",
                kind, name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets_load() {
        let linux = PolicyPreset::Linux.registry();
        assert!(linux.is_critical("systemd", EntityKind::Process));
        assert!(linux.is_critical("sshd", EntityKind::Service));
        assert!(linux.is_unnecessary("cups", EntityKind::Service));
        assert_eq!(linux.thresholds, Thresholds::default());

        let windows = PolicyPreset::Windows.registry();
        assert!(windows.is_critical("LSASS.EXE", EntityKind::Process));
        assert!(windows.is_protected("RuntimeBroker.exe", EntityKind::Process));
        assert!(windows.is_unnecessary("notepad.exe", EntityKind::Process));
        assert!(windows.is_unnecessary("fax", EntityKind::Service));
        assert_eq!(windows.critical_processes.len(), 21);
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("Linux".parse::<PolicyPreset>().unwrap(), PolicyPreset::Linux);
        assert_eq!(" windows ".parse::<PolicyPreset>().unwrap(), PolicyPreset::Windows);
        assert!(matches!(
            "macos".parse::<PolicyPreset>(),
            Err(PolicyError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_from_toml_normalizes_names() {
        let registry = PolicyRegistry::from_toml_str(
            r#"
            critical_processes = ["  Init  ", ""]
            unnecessary_processes = ["Notepad.EXE"]

            [thresholds]
            memory_mb = 250.0
            "#,
        )
        .unwrap();

        assert_eq!(registry.critical_processes.len(), 1);
        assert!(registry.critical_processes.contains("init"));
        assert!(registry.is_unnecessary(" NOTEPAD.exe", EntityKind::Process));
        assert_eq!(registry.thresholds.memory_mb, 250.0);
        // Missing threshold fields fall back to defaults
        assert_eq!(registry.thresholds.max_duplicate_instances, 3);
    }

    #[test]
    fn test_services_have_no_protected_tier() {
        let mut registry = PolicyRegistry::default();
        registry.protected_processes.insert("cron".into());
        assert!(registry.is_protected("cron", EntityKind::Process));
        assert!(!registry.is_protected("cron", EntityKind::Service));
    }

    #[test]
    fn test_overlay_extends_and_replaces_thresholds() {
        let mut registry = PolicyRegistry::default();
        let overlay = PolicyOverlay {
            critical_processes: vec!["PostgreS".into()],
            unnecessary_services: vec!["bluetooth".into()],
            thresholds: Some(Thresholds {
                memory_mb: 1024.0,
                ..Thresholds::default()
            }),
            ..PolicyOverlay::default()
        };
        registry.apply(&overlay);

        assert!(registry.is_critical("postgres", EntityKind::Process));
        assert!(registry.is_unnecessary("Bluetooth", EntityKind::Service));
        assert_eq!(registry.thresholds.memory_mb, 1024.0);
    }

    #[test]
    fn test_overlaps_detected() {
        let windows = PolicyPreset::Windows.registry();
        let overlaps = windows.overlaps();
        assert_eq!(overlaps, vec![(EntityKind::Service, "browser".to_string())]);

        let linux = PolicyPreset::Linux.registry();
        assert!(linux.overlaps().is_empty());
    }

    #[test]
    fn test_from_file_missing() {
        let err = PolicyRegistry::from_file(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }
}
