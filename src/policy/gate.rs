//! Safety gate consulted before every state-changing action.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::registry::PolicyRegistry;
use crate::model::{Action, EntityKind};

/// Why the gate refused an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    InvalidName,
    Critical,
    Protected,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::InvalidName => "invalid name",
            DenyReason::Critical => "critical entity",
            DenyReason::Protected => "protected; requires elevated handling",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Answers "may this action be taken on this entity?".
///
/// Pure with respect to the registry: the same inputs always produce the
/// same decision.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    registry: Arc<PolicyRegistry>,
}

impl PolicyGate {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Evaluates without logging. Used by classification to filter
    /// candidates, where a denial is expected and not an alarm.
    pub fn precheck(&self, name: &str, kind: EntityKind, action: Action) -> Decision {
        let name = kind.normalize(name);
        if name.is_empty() {
            return Decision::Deny(DenyReason::InvalidName);
        }
        if action == Action::Start {
            return Decision::Allow;
        }
        if self.registry.is_critical(&name, kind) {
            return Decision::Deny(DenyReason::Critical);
        }
        if kind == EntityKind::Process
            && action != Action::Disable
            && self.registry.is_protected(&name, kind)
        {
            return Decision::Deny(DenyReason::Protected);
        }
        Decision::Allow
    }

    /// Evaluates and logs the decision. Attempts against critical entities
    /// are logged as warnings.
    pub fn authorize(&self, name: &str, kind: EntityKind, action: Action) -> Decision {
        let decision = self.precheck(name, kind, action);
        match decision {
            Decision::Deny(DenyReason::Critical) => {
                warn!("Refusing to {} critical {} '{}'", action, kind, name.trim());
            }
            Decision::Deny(reason) => {
                info!("Refusing to {} {} '{}': {}", action, kind, name.trim(), reason);
            }
            Decision::Allow => {
                debug!("Allowing {} on {} '{}'", action, kind, name.trim());
            }
        }
        decision
    }

    /// True when the entity may be shown as a removal candidate.
    pub fn may_flag(&self, name: &str, kind: EntityKind) -> bool {
        let name = kind.normalize(name);
        !name.is_empty()
            && !self.registry.is_critical(&name, kind)
            && !self.registry.is_protected(&name, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyPreset;

    fn windows_gate() -> PolicyGate {
        PolicyGate::new(Arc::new(PolicyPreset::Windows.registry()))
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let gate = windows_gate();
        for action in [Action::Terminate, Action::Stop, Action::Start, Action::Disable] {
            assert_eq!(
                gate.authorize("   ", EntityKind::Service, action),
                Decision::Deny(DenyReason::InvalidName)
            );
        }
    }

    #[test]
    fn test_critical_process_denied_regardless_of_case() {
        let gate = windows_gate();
        for name in ["lsass.exe", "LSASS.EXE", "  Lsass.Exe "] {
            assert_eq!(
                gate.authorize(name, EntityKind::Process, Action::Terminate),
                Decision::Deny(DenyReason::Critical)
            );
            assert_eq!(
                gate.authorize(name, EntityKind::Process, Action::ForceTerminate),
                Decision::Deny(DenyReason::Critical)
            );
        }
    }

    #[test]
    fn test_protected_process_denied() {
        let gate = windows_gate();
        assert_eq!(
            gate.authorize("MsMpEng.exe", EntityKind::Process, Action::Terminate),
            Decision::Deny(DenyReason::Protected)
        );
    }

    #[test]
    fn test_critical_service_stop_and_disable_denied() {
        let gate = windows_gate();
        assert_eq!(
            gate.authorize("EventLog", EntityKind::Service, Action::Stop),
            Decision::Deny(DenyReason::Critical)
        );
        assert_eq!(
            gate.authorize("eventlog", EntityKind::Service, Action::Disable),
            Decision::Deny(DenyReason::Critical)
        );
    }

    #[test]
    fn test_unit_suffix_does_not_bypass_critical() {
        let gate = PolicyGate::new(Arc::new(PolicyPreset::Linux.registry()));
        for name in ["sshd.service", "SSHD.Service", " sshd.service "] {
            for action in [Action::Stop, Action::Disable] {
                assert_eq!(
                    gate.authorize(name, EntityKind::Service, action),
                    Decision::Deny(DenyReason::Critical),
                    "{action} {name}"
                );
            }
        }
        assert_eq!(
            gate.authorize(".service", EntityKind::Service, Action::Stop),
            Decision::Deny(DenyReason::InvalidName)
        );
    }

    #[test]
    fn test_start_allowed_even_for_critical() {
        let gate = windows_gate();
        assert_eq!(
            gate.authorize("eventlog", EntityKind::Service, Action::Start),
            Decision::Allow
        );
    }

    #[test]
    fn test_ordinary_entities_allowed() {
        let gate = windows_gate();
        assert!(gate
            .authorize("notepad.exe", EntityKind::Process, Action::Terminate)
            .is_allowed());
        assert!(gate
            .authorize("fax", EntityKind::Service, Action::Stop)
            .is_allowed());
    }

    #[test]
    fn test_overlap_resolves_to_deny() {
        let gate = windows_gate();
        assert!(gate.registry().is_unnecessary("browser", EntityKind::Service));
        assert_eq!(
            gate.authorize("browser", EntityKind::Service, Action::Stop),
            Decision::Deny(DenyReason::Critical)
        );
        assert!(!gate.may_flag("browser", EntityKind::Service));
    }

    #[test]
    fn test_precheck_matches_authorize() {
        let gate = windows_gate();
        for (name, kind) in [
            ("lsass.exe", EntityKind::Process),
            ("runtimebroker.exe", EntityKind::Process),
            ("notepad.exe", EntityKind::Process),
            ("", EntityKind::Process),
        ] {
            assert_eq!(
                gate.precheck(name, kind, Action::Terminate),
                gate.authorize(name, kind, Action::Terminate)
            );
        }
    }
}
