//! Linux executor: signals through `nix`, services through `systemctl`.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{ActionError, ActionExecutor, ServiceControl, WaitOutcome};
use crate::model::{ServiceStatus, StartType};
use crate::snapshot::procfs::parse_stat;
use crate::snapshot::SystemdReader;

/// Unit names passed to systemctl; rejects anything that could be read as
/// an option or a path.
static UNIT_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9:_.@\-]+$").ok());

fn valid_unit_name(name: &str) -> bool {
    !name.starts_with('-')
        && UNIT_NAME
            .as_ref()
            .is_some_and(|re| re.is_match(name))
}

/// Maps systemctl stderr to an action error.
pub fn classify_systemctl_error(unit: &str, stderr: &str) -> ActionError {
    let lower = stderr.to_lowercase();
    if lower.contains("access denied")
        || lower.contains("authentication")
        || lower.contains("permission denied")
    {
        ActionError::AccessDenied(format!("service {}", unit))
    } else if lower.contains("not loaded") || lower.contains("not found") || lower.contains("does not exist") {
        ActionError::Vanished(format!("service {}", unit))
    } else {
        ActionError::Rejected(stderr.trim().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LinuxExecutor {
    proc_root: PathBuf,
    systemctl: String,
    systemd: SystemdReader,
    poll_interval: Duration,
}

impl Default for LinuxExecutor {
    fn default() -> Self {
        Self::new("/proc", "systemctl")
    }
}

impl LinuxExecutor {
    pub fn new(proc_root: impl Into<PathBuf>, systemctl: impl Into<String>) -> Self {
        let systemctl = systemctl.into();
        Self {
            proc_root: proc_root.into(),
            systemd: SystemdReader::new(systemctl.clone()),
            systemctl,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// True while the pid has a stat entry that is not a zombie or dead.
    fn is_alive(&self, pid: u32) -> bool {
        let path = self.proc_root.join(pid.to_string()).join("stat");
        match fs::read_to_string(path) {
            Ok(content) => parse_stat(&content)
                .map(|f| !matches!(f.state, 'Z' | 'X' | 'x'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn run_systemctl(&self, args: &[&str], unit: &str) -> Result<(), ActionError> {
        let output = Command::new(&self.systemctl)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ActionError::Unsupported(format!("{} not available", self.systemctl))
                } else {
                    ActionError::Rejected(e.to_string())
                }
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(classify_systemctl_error(
                unit,
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
    }

    fn unit(&self, name: &str) -> Result<String, ActionError> {
        let name = name.trim();
        if !valid_unit_name(name) {
            return Err(ActionError::Rejected(format!("invalid unit name '{}'", name)));
        }
        Ok(if name.ends_with(".service") {
            name.to_string()
        } else {
            format!("{}.service", name)
        })
    }
}

impl ActionExecutor for LinuxExecutor {
    fn terminate(&self, pid: u32, force: bool) -> Result<(), ActionError> {
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        let target = i32::try_from(pid)
            .map_err(|_| ActionError::Rejected(format!("pid {} out of range", pid)))?;
        debug!("Sending {} to pid {}", signal, pid);

        kill(Pid::from_raw(target), signal).map_err(|errno| match errno {
            Errno::ESRCH => ActionError::Vanished(format!("process {}", pid)),
            Errno::EPERM => ActionError::AccessDenied(format!("process {}", pid)),
            other => ActionError::Rejected(other.desc().to_string()),
        })
    }

    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> Result<WaitOutcome, ActionError> {
        let start = Instant::now();
        loop {
            if !self.is_alive(pid) {
                return Ok(WaitOutcome::Exited);
            }
            if start.elapsed() >= timeout {
                return Ok(WaitOutcome::TimedOut);
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn service_control(&self, name: &str, control: ServiceControl) -> Result<(), ActionError> {
        let unit = self.unit(name)?;
        debug!("systemctl {} {}", control.as_str(), unit);
        self.run_systemctl(&[control.as_str(), "--no-block", &unit], &unit)
    }

    fn query_service_status(&self, name: &str) -> Result<ServiceStatus, ActionError> {
        self.unit(name)?;
        self.systemd
            .get_service(name)?
            .map(|s| s.status)
            .ok_or_else(|| ActionError::Vanished(format!("service {}", name)))
    }

    fn set_start_type(&self, name: &str, start_type: StartType) -> Result<(), ActionError> {
        let unit = self.unit(name)?;
        let verb = match start_type {
            StartType::Disabled => "disable",
            StartType::Automatic => "enable",
            other => {
                return Err(ActionError::Unsupported(format!(
                    "start type {} for systemd units",
                    other
                )))
            }
        };
        self.run_systemctl(&[verb, &unit], &unit)
    }
}
