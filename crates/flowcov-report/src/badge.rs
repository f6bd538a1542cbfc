use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use flowcov_core::types::CoverageSummary;

/// Color ramp for the coverage badge, relative to the configured threshold.
fn coverage_color(percent: f64, threshold: f64) -> &'static str {
    if percent < threshold / 2.0 {
        "#e05d44" // red
    } else if percent < threshold * 5.0 / 8.0 {
        "#fe7d37" // orange
    } else if percent < threshold * 6.0 / 8.0 {
        "#dfb317" // yellow
    } else if percent < threshold * 7.0 / 8.0 {
        "#a4a61d" // yellowgreen
    } else if percent < threshold {
        "#97ca00" // green
    } else {
        "#4c1" // brightgreen
    }
}

fn render_badge(label: &str, value: &str, color: &str) -> String {
    // Approximate text metrics; fine for a flat two-segment badge.
    let label_width = 6 * label.len() + 10;
    let value_width = 6 * value.len() + 10;
    let total = label_width + value_width;

    format!(
        concat!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{total}" height="20">"##,
            r##"<g shape-rendering="crispEdges">"##,
            r##"<rect width="{lw}" height="20" fill="#555"/>"##,
            r##"<rect x="{lw}" width="{vw}" height="20" fill="{color}"/>"##,
            r##"</g>"##,
            r##"<g fill="#fff" text-anchor="middle" font-family="Verdana,sans-serif" font-size="11">"##,
            r##"<text x="{lx}" y="14">{label}</text>"##,
            r##"<text x="{vx}" y="14">{value}</text>"##,
            r##"</g>"##,
            r##"</svg>"##,
        ),
        total = total,
        lw = label_width,
        vw = value_width,
        color = color,
        lx = label_width / 2,
        vx = label_width + value_width / 2,
        label = label,
        value = value,
    )
}

/// The coverage percent badge SVG.
pub fn coverage_badge_svg(summary: &CoverageSummary) -> String {
    render_badge(
        "flow-coverage",
        &format!("{}%", summary.percent),
        coverage_color(summary.percent, summary.threshold),
    )
}

/// The flow status badge SVG (passing/failing from the global status check).
pub fn status_badge_svg(summary: &CoverageSummary) -> String {
    let (value, color) = if summary.flow_status.passed {
        ("passing", "#4c1")
    } else {
        ("failing", "#e05d44")
    };
    render_badge("flow", value, color)
}

/// Write both badge SVGs under the output dir. Returns the written paths.
pub fn write_badges(summary: &CoverageSummary, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir '{}'", output_dir.display()))?;

    let coverage_path = output_dir.join("flow-coverage-badge.svg");
    std::fs::write(&coverage_path, coverage_badge_svg(summary))
        .with_context(|| format!("failed to write '{}'", coverage_path.display()))?;

    let status_path = output_dir.join("flow-badge.svg");
    std::fs::write(&status_path, status_badge_svg(summary))
        .with_context(|| format!("failed to write '{}'", status_path.display()))?;

    Ok(vec![coverage_path, status_path])
}
