use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use flowcov_core::types::CoverageSummary;

/// Format a coverage summary as JSON.
pub fn format_report(summary: &CoverageSummary, compact: bool) -> String {
    if compact {
        serde_json::to_string(summary).expect("CoverageSummary should be serializable")
    } else {
        serde_json::to_string_pretty(summary).expect("CoverageSummary should be serializable")
    }
}

/// Write `flow-coverage.json` under the output dir. Returns the written path.
pub fn write_report(summary: &CoverageSummary, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir '{}'", output_dir.display()))?;
    let path = output_dir.join("flow-coverage.json");
    std::fs::write(&path, format_report(summary, true))
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(path)
}
