//! Service records from systemd via `systemctl`.
//!
//! Three queries are combined: `list-units` for run state, `list-unit-files`
//! for the configured start type, and `show` for single-unit lookups
//! (description and main pid). Output parsing is kept in pure functions so it
//! can be tested without a running systemd.

use ahash::AHashMap as HashMap;
use std::io::ErrorKind;
use std::process::Command;
use tracing::debug;

use super::ProviderError;
use crate::model::{normalize_name, ServiceRecord, ServiceStatus, StartType};

const SERVICE_SUFFIX: &str = ".service";

/// Row of `systemctl list-units --type=service --plain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRow {
    pub name: String,
    pub load: String,
    pub active: String,
    pub sub: String,
    pub description: String,
}

/// Strips the `.service` suffix. Template units (`foo@.service`) yield `None`.
fn unit_name(raw: &str) -> Option<String> {
    let raw = raw.trim_start_matches('●').trim();
    let name = raw.strip_suffix(SERVICE_SUFFIX)?;
    if name.is_empty() || name.ends_with('@') {
        return None;
    }
    Some(name.to_string())
}

pub fn parse_list_units(output: &str) -> Vec<UnitRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let first = parts.next()?;
            // Failed units may be prefixed with a bullet column
            let raw = if first == "●" { parts.next()? } else { first };
            let name = unit_name(raw)?;
            let load = parts.next()?.to_string();
            let active = parts.next()?.to_string();
            let sub = parts.next()?.to_string();
            let description = parts.collect::<Vec<_>>().join(" ");
            Some(UnitRow {
                name,
                load,
                active,
                sub,
                description,
            })
        })
        .collect()
}

/// Parses `systemctl list-unit-files --type=service` into name -> state.
pub fn parse_unit_files(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = unit_name(parts.next()?)?;
            let state = parts.next()?.to_string();
            Some((normalize_name(&name), state))
        })
        .collect()
}

/// Parses `systemctl show` `Key=Value` output.
pub fn parse_show(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (k, v) = line.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

pub fn map_active_state(active: &str) -> ServiceStatus {
    match active {
        "active" | "reloading" => ServiceStatus::Running,
        "activating" => ServiceStatus::StartPending,
        "deactivating" => ServiceStatus::StopPending,
        "inactive" | "failed" => ServiceStatus::Stopped,
        _ => ServiceStatus::Unknown,
    }
}

pub fn map_unit_file_state(state: &str) -> StartType {
    match state {
        "enabled" | "enabled-runtime" | "alias" => StartType::Automatic,
        "static" | "indirect" | "generated" | "transient" => StartType::Manual,
        "disabled" | "masked" | "masked-runtime" => StartType::Disabled,
        _ => StartType::Unknown,
    }
}

/// Reads services through the `systemctl` binary.
#[derive(Debug, Clone)]
pub struct SystemdReader {
    systemctl: String,
}

impl Default for SystemdReader {
    fn default() -> Self {
        Self {
            systemctl: "systemctl".into(),
        }
    }
}

impl SystemdReader {
    pub fn new(systemctl: impl Into<String>) -> Self {
        Self {
            systemctl: systemctl.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, ProviderError> {
        let command = format!("{} {}", self.systemctl, args.join(" "));
        let output = Command::new(&self.systemctl)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ProviderError::Unavailable(format!("{} not found", self.systemctl))
                } else {
                    ProviderError::Command {
                        command: command.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        if !output.status.success() {
            return Err(ProviderError::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn probe(&self) -> Result<(), ProviderError> {
        self.run(&["--version"]).map(|_| ())
    }

    pub fn list_services(&self) -> Result<Vec<ServiceRecord>, ProviderError> {
        let units = self.run(&[
            "list-units",
            "--type=service",
            "--all",
            "--no-legend",
            "--no-pager",
            "--plain",
        ])?;
        let files = self.run(&[
            "list-unit-files",
            "--type=service",
            "--no-legend",
            "--no-pager",
        ])?;

        let start_types = parse_unit_files(&files);
        let services: Vec<ServiceRecord> = parse_list_units(&units)
            .into_iter()
            .filter(|row| row.load != "not-found")
            .map(|row| {
                let start_type = start_types
                    .get(&normalize_name(&row.name))
                    .map(|s| map_unit_file_state(s))
                    .unwrap_or(StartType::Unknown);
                ServiceRecord {
                    display_name: if row.description.is_empty() {
                        row.name.clone()
                    } else {
                        row.description.clone()
                    },
                    status: map_active_state(&row.active),
                    start_type,
                    pid: None,
                    name: row.name,
                }
            })
            .collect();

        debug!("Read {} services from systemd", services.len());
        Ok(services)
    }

    pub fn get_service(&self, name: &str) -> Result<Option<ServiceRecord>, ProviderError> {
        let name = name.trim();
        let name = name.strip_suffix(SERVICE_SUFFIX).unwrap_or(name);
        if name.is_empty() {
            return Ok(None);
        }
        let unit = format!("{}{}", name, SERVICE_SUFFIX);
        let output = self.run(&[
            "show",
            &unit,
            "--property=Id,Description,LoadState,ActiveState,UnitFileState,MainPID",
            "--no-pager",
        ])?;
        Ok(service_from_show(name, &parse_show(&output)))
    }
}

/// Builds a record from `systemctl show` properties; `None` when the unit
/// is not loaded.
pub fn service_from_show(name: &str, props: &HashMap<String, String>) -> Option<ServiceRecord> {
    let load = props.get("LoadState").map(String::as_str).unwrap_or("");
    if load.is_empty() || load == "not-found" {
        return None;
    }
    let id = props
        .get("Id")
        .and_then(|id| unit_name(id))
        .unwrap_or_else(|| name.to_string());
    let pid = props
        .get("MainPID")
        .and_then(|p| p.parse::<u32>().ok())
        .filter(|&p| p != 0);

    Some(ServiceRecord {
        display_name: props
            .get("Description")
            .filter(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| id.clone()),
        name: id,
        status: map_active_state(props.get("ActiveState").map(String::as_str).unwrap_or("")),
        start_type: map_unit_file_state(
            props.get("UnitFileState").map(String::as_str).unwrap_or(""),
        ),
        pid,
    })
}
