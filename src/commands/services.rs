//! Services command implementation.

use procwarden::classify::ServiceDetails;

use crate::state::Components;

/// Lists running services from the unnecessary list, and optionally
/// stopped services that are set to start automatically.
pub fn command_services(
    components: &Components,
    stopped_auto: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = &components.engine;

    let unnecessary = engine.find_unnecessary_services()?;
    println!("🛠️  Unnecessary running services: {}", unnecessary.len());
    for s in &unnecessary {
        let d = ServiceDetails::from_record(s, engine.registry());
        println!("   ├─ {} ({}) start={}", d.name, d.display_name, d.start_type);
    }

    if stopped_auto {
        let stopped = engine.find_stopped_auto_services()?;
        println!("\n⚠️  Stopped automatic services: {}", stopped.len());
        for s in &stopped {
            println!("   ├─ {} ({})", s.name, s.display_name);
        }
    }

    Ok(())
}
