//! Details command implementation.

use procwarden::classify::EntityDetails;
use procwarden::model::EntityRef;

use crate::state::Components;

/// Prints the details of one process or service.
pub fn command_details(
    components: &Components,
    pid: Option<u32>,
    service: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entity = match (pid, service) {
        (Some(pid), _) => EntityRef::process(pid),
        (None, Some(name)) => EntityRef::service(name),
        (None, None) => return Err("either --pid or --service is required".into()),
    };

    match components.engine.get_entity_details(&entity)? {
        Some(EntityDetails::Process(d)) => {
            println!("🔎 Process {} (PID: {})", d.name, d.pid);
            println!("   ├─ Memory: {:.2} MB", d.memory_mb);
            println!("   ├─ CPU: {:.2}%", d.cpu_percent);
            if let Some(avg) = d.rolling_cpu_percent {
                println!("   ├─ CPU (rolling): {:.2}%", avg);
            }
            println!("   ├─ Status: {}", d.status);
            println!("   ├─ Started: {}", d.create_time);
            println!("   ├─ User: {}", d.username);
            println!("   └─ Command: {}", d.cmdline);
        }
        Some(EntityDetails::Service(d)) => {
            println!("🔎 Service {} ({})", d.name, d.display_name);
            println!("   ├─ Status: {}", d.status);
            println!("   ├─ Start type: {}", d.start_type);
            if let Some(pid) = d.pid {
                println!("   ├─ Main PID: {}", pid);
            }
            println!("   ├─ Critical: {}", d.is_critical);
            println!("   └─ Unnecessary: {}", d.is_unnecessary);
        }
        None => {
            println!("❌ {} not found", entity);
            std::process::exit(1);
        }
    }

    Ok(())
}
