//! Display-ready detail records for single entities.

use serde::Serialize;

use crate::model::{EntityKind, ProcessRecord, ServiceRecord};
use crate::policy::PolicyRegistry;

const NOT_AVAILABLE: &str = "N/A";

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDetails {
    pub pid: u32,
    pub name: String,
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub status: String,
    pub create_time: String,
    /// First three command-line arguments, or `N/A`.
    pub cmdline: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_cpu_percent: Option<f64>,
}

impl ProcessDetails {
    pub fn from_record(p: &ProcessRecord, rolling_cpu: Option<f64>) -> Self {
        let cmdline = if p.cmdline.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            p.cmdline
                .iter()
                .take(3)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        };

        Self {
            pid: p.pid,
            name: p.name.clone(),
            memory_mb: round2(p.memory_mb()),
            cpu_percent: round2(p.cpu_percent),
            status: p.status.to_string(),
            create_time: p.create_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            cmdline,
            username: p
                .username
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            rolling_cpu_percent: rolling_cpu.map(round2),
        }
    }
}

/// Service view with policy flags derived at lookup time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDetails {
    pub name: String,
    pub display_name: String,
    pub status: String,
    pub start_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub is_critical: bool,
    pub is_unnecessary: bool,
}

impl ServiceDetails {
    pub fn from_record(s: &ServiceRecord, registry: &PolicyRegistry) -> Self {
        Self {
            name: s.name.clone(),
            display_name: s.display_name.clone(),
            status: s.status.to_string(),
            start_type: s.start_type.to_string(),
            pid: s.pid,
            is_critical: registry.is_critical(&s.name, EntityKind::Service),
            is_unnecessary: registry.is_unnecessary(&s.name, EntityKind::Service),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityDetails {
    Process(ProcessDetails),
    Service(ServiceDetails),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProcessStatus, ServiceStatus, StartType};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_process_details_formatting() {
        let p = ProcessRecord {
            pid: 77,
            name: "python3".into(),
            memory_bytes: 123_456_789,
            cpu_percent: 12.3456,
            status: ProcessStatus::Running,
            create_time: Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap(),
            username: None,
            cmdline: vec![
                "python3".into(),
                "-m".into(),
                "http.server".into(),
                "8080".into(),
            ],
        };
        let d = ProcessDetails::from_record(&p, Some(33.333));

        assert_eq!(d.memory_mb, 123.46);
        assert_eq!(d.cpu_percent, 12.35);
        assert_eq!(d.create_time, "2024-03-09 07:05:01");
        assert_eq!(d.cmdline, "python3 -m http.server");
        assert_eq!(d.username, "N/A");
        assert_eq!(d.rolling_cpu_percent, Some(33.33));
        assert_eq!(d.status, "running");
    }

    #[test]
    fn test_empty_cmdline_is_na() {
        let p = ProcessRecord {
            pid: 1,
            name: "x".into(),
            memory_bytes: 0,
            cpu_percent: 0.0,
            status: ProcessStatus::Zombie,
            create_time: Utc::now(),
            username: Some("root".into()),
            cmdline: vec![],
        };
        let d = ProcessDetails::from_record(&p, None);
        assert_eq!(d.cmdline, "N/A");
        assert_eq!(d.username, "root");
    }

    #[test]
    fn test_service_flags_derived_from_registry() {
        let mut registry = PolicyRegistry::default();
        registry.critical_services.insert("browser".into());
        registry.unnecessary_services.insert("browser".into());

        let s = ServiceRecord {
            name: "Browser".into(),
            display_name: "Computer Browser".into(),
            status: ServiceStatus::Running,
            start_type: StartType::Manual,
            pid: Some(4),
        };
        let d = ServiceDetails::from_record(&s, &registry);
        assert!(d.is_critical);
        assert!(d.is_unnecessary);
        assert_eq!(d.start_type, "manual");

        let json = serde_json::to_value(EntityDetails::Service(d)).unwrap();
        assert_eq!(json["type"], "service");
        assert_eq!(json["is_critical"], true);
    }
}
