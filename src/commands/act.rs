//! Single-entity action commands: terminate, stop, start, disable.

use procwarden::action::ActionError;
use procwarden::model::{Action, EntityRef};

use crate::state::Components;

/// Runs one gated action and prints its outcome.
///
/// Exits with code 1 when the action fails; code 2 when the policy gate
/// denied it.
pub fn command_act(
    components: &Components,
    entity: EntityRef,
    action: Action,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("⚙️  {} {}", action, entity);

    match components
        .remediator
        .authorize_and_act(&entity, action, force)
    {
        Ok(report) => {
            let escalated = if report.escalated { " (escalated to forced)" } else { "" };
            println!(
                "   ✅ {} {}: {}{} in {}ms",
                report.entity, report.name, report.message, escalated, report.elapsed_ms
            );
            Ok(())
        }
        Err(ActionError::Denied(reason)) => {
            println!("   🚫 Denied: {}", reason);
            std::process::exit(2);
        }
        Err(e) => {
            println!("   ❌ Failed ({}): {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}
