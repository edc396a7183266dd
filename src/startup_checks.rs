//! Startup requirement validation for procwarden.
//!
//! Checks that the process table is fully readable and that the service
//! manager can be reached before a live scan or the server starts.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path, services: bool) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_proc_access(proc_root)?;

    if services {
        check_systemctl()?;
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - signals and service control may be refused");
        warn!("   Recommendation: Run as root to act on processes of other users");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check that processes of other users are visible
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    if !proc_root.join("stat").exists() {
        error!("❌ {} does not look like a proc filesystem", proc_root.display());
        return Err(ValidationError::ProcUnavailable(proc_root.display().to_string()));
    }

    let test_file = proc_root.join("1").join("status");
    match fs::metadata(&test_file) {
        Ok(_) => {
            info!("✅ /proc access: Can read process 1");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", test_file.display());
            error!("   Processes of other users will be missing from scans");
            error!("   Check the hidepid mount option of /proc or run as root");
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test /proc access: {}", e);
            Ok(())
        }
    }
}

/// Check that systemctl is installed and answers
fn check_systemctl() -> Result<(), ValidationError> {
    debug!("Checking systemctl...");
    match Command::new("systemctl").arg("--version").output() {
        Ok(out) if out.status.success() => {
            let version = String::from_utf8_lossy(&out.stdout);
            info!(
                "✅ {}",
                version.lines().next().unwrap_or("systemctl available")
            );
            Ok(())
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            error!("❌ systemctl --version failed: {}", stderr);
            Err(ValidationError::ServiceManagerUnavailable(stderr))
        }
        Err(e) => {
            error!("❌ systemctl not found: {}", e);
            error!("   Use --no-services to scan processes only");
            Err(ValidationError::ServiceManagerUnavailable(e.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("Proc filesystem not available at {0}")]
    ProcUnavailable(String),

    #[error("Service manager not available: {0}")]
    ServiceManagerUnavailable(String),
}
