//! Export command implementation.

use chrono::Local;
use std::path::PathBuf;

use procwarden::report::ExportReport;

use crate::state::Components;

/// Scans and writes a timestamped JSON report into `dir`.
pub fn command_export(components: &Components, dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    components.warm_up();

    let engine = &components.engine;
    let snapshot = engine.snapshot()?;
    let at = Local::now();
    let result = engine.classify(&snapshot, at.into());

    let report = ExportReport::assemble(
        &result,
        &snapshot.services,
        engine.registry(),
        engine.history(),
        at,
    );
    let path = report.write_to(&dir, at)?;

    println!(
        "✅ Report with {} issues written to: {}",
        result.total_issues(),
        path.display()
    );
    Ok(())
}
