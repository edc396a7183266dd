//! Auto-clean sweep over one classification result.
//!
//! Each entity is handled on its own. A failure is recorded and the sweep
//! moves on; earlier successes are never rolled back.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::{ActionReport, Remediator};
use crate::classify::{ClassificationResult, ProcessCategory, ServiceCategory};
use crate::model::{Action, EntityRef};

/// Outcome for one entity of a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub entity: EntityRef,
    pub name: String,
    pub action: Action,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub message: String,
}

impl SweepOutcome {
    fn from_result(
        entity: EntityRef,
        name: &str,
        action: Action,
        result: Result<ActionReport, super::ActionError>,
    ) -> Self {
        match result {
            Ok(report) => Self {
                entity,
                name: name.to_string(),
                action,
                success: true,
                error_kind: None,
                message: report.message,
            },
            Err(e) => Self {
                entity,
                name: name.to_string(),
                action,
                success: false,
                error_kind: Some(e.kind().to_string()),
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub outcomes: Vec<SweepOutcome>,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

impl Remediator {
    /// Terminates unnecessary and inactive processes (each pid once), then
    /// stops unnecessary services. A pid that now belongs to a different
    /// process than the scanned one is reported as vanished and left alone.
    pub fn auto_clean(&self, result: &ClassificationResult) -> SweepReport {
        let mut report = SweepReport::default();
        let mut seen: BTreeSet<u32> = BTreeSet::new();

        let targets = result
            .processes_in(ProcessCategory::Unnecessary)
            .iter()
            .chain(result.processes_in(ProcessCategory::Inactive));

        for p in targets {
            if !seen.insert(p.pid) {
                continue;
            }
            let outcome = self.terminate_record(p, false);
            if let Err(e) = &outcome {
                warn!("Auto-clean: could not terminate {} ({}): {}", p.pid, p.name, e);
            }
            report.outcomes.push(SweepOutcome::from_result(
                EntityRef::process(p.pid),
                &p.name,
                Action::Terminate,
                outcome,
            ));
        }

        for s in result.services_in(ServiceCategory::Unnecessary) {
            let outcome = self.stop_service(&s.name);
            if let Err(e) = &outcome {
                warn!("Auto-clean: could not stop service {}: {}", s.name, e);
            }
            report.outcomes.push(SweepOutcome::from_result(
                EntityRef::service(s.name.clone()),
                &s.display_name,
                Action::Stop,
                outcome,
            ));
        }

        info!(
            "Auto-clean finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}
