use colored::Colorize;

use flowcov_core::types::{CoverageSummary, FileCoverageRecord};

/// Format a coverage summary for terminal output. Files are sorted by name
/// for display; the summary's own map is unordered.
pub fn format_report(summary: &CoverageSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "Flow Coverage Report".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(60)));

    let mut filenames: Vec<&String> = summary.files.keys().collect();
    filenames.sort();

    let name_width = filenames
        .iter()
        .map(|f| f.len())
        .chain(std::iter::once("filename".len()))
        .max()
        .unwrap_or(8);

    out.push_str(&format!(
        "  {:<name_width$}  {:<17}  {:>9}  {:>7}  {:>8}  {:>9}\n",
        "filename", "annotation", "percent", "total", "covered", "uncovered",
    ));
    out.push_str(&format!("  {}\n", "-".repeat(name_width + 58)));

    for filename in filenames {
        let record = &summary.files[filename];
        out.push_str(&format_file_row(record, summary.threshold, name_width));
    }

    out.push_str(&format_summary_section(summary));
    out
}

fn format_file_row(record: &FileCoverageRecord, threshold: f64, name_width: usize) -> String {
    let annotation = record
        .annotation
        .map(|a| a.to_string())
        .unwrap_or_else(|| "no flow".to_string());
    let percent = if record.is_error {
        "\u{26a0} Error".to_string()
    } else {
        format!("{} %", record.percent)
    };

    let row = format!(
        "  {:<name_width$}  {:<17}  {:>9}  {:>7}  {:>8}  {:>9}\n",
        record.filename,
        annotation,
        percent,
        record.expressions.total(),
        record.expressions.covered_count,
        record.expressions.uncovered_count,
    );

    let passing = !record.is_error && record.is_flow && record.percent >= threshold;
    if passing {
        row.green().to_string()
    } else {
        row.red().to_string()
    }
}

fn format_summary_section(summary: &CoverageSummary) -> String {
    let mut out = String::new();

    let passed = summary.percent >= summary.threshold;
    let percent_str = format!("{} %", summary.percent);
    let percent_colored = if passed {
        percent_str.green().bold()
    } else {
        percent_str.red().bold()
    };

    out.push_str(&format!("\n{}\n{}\n", "Summary".bold(), "-".repeat(60)));
    out.push_str(&format!(
        "  Coverage:    {percent_colored} (threshold {} %)\n",
        summary.threshold
    ));
    out.push_str(&format!(
        "  Expressions: {} total, {} covered, {} uncovered\n",
        summary.covered_count + summary.uncovered_count,
        summary.covered_count,
        summary.uncovered_count,
    ));

    let annotations = &summary.annotation_summary;
    out.push_str(&format!(
        "  Annotations: {} flow, {} flow weak, {} no flow ({} files)\n",
        annotations.flow_files,
        annotations.flow_weak_files,
        annotations.no_flow_files,
        annotations.total_files,
    ));

    let flow_check = if summary.flow_status.passed {
        "passing".green().to_string()
    } else {
        format!("failing ({} errors)", summary.flow_status.errors.len())
            .red()
            .to_string()
    };
    out.push_str(&format!(
        "  Flow check:  {flow_check} (flow {})\n",
        summary.flow_status.flow_version
    ));
    out.push_str(&format!("  Generated:   {}\n", summary.generated_at));

    if passed {
        out.push_str(&format!("\n{}\n", "COVERAGE PASSED".green().bold()));
    } else {
        out.push_str(&format!(
            "\n{}: {} % is below the {} % threshold\n",
            "COVERAGE FAILED".red().bold(),
            summary.percent,
            summary.threshold,
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcov_core::aggregate;
    use flowcov_core::collector::CollectionFailure;
    use flowcov_core::types::{
        AnnotationLevel, AnnotationSummary, ExpressionCounts, FlowStatus,
    };
    use std::collections::HashMap;

    fn summary_with(records: Vec<FileCoverageRecord>) -> CoverageSummary {
        let mut summary = CoverageSummary {
            covered_count: 0,
            uncovered_count: 0,
            percent: 0.0,
            threshold: 80.0,
            strict_coverage: false,
            exclude_non_flow: false,
            generated_at: "Fri Aug 06 2026 12:00:00 GMT+0000".to_string(),
            flow_status: FlowStatus {
                passed: true,
                flow_version: "0.57.3".to_string(),
                errors: Vec::new(),
            },
            annotation_summary: AnnotationSummary::default(),
            glob_include_patterns: vec!["src/*.js".to_string()],
            glob_exclude_patterns: Vec::new(),
            concurrent_files: 1,
            files: HashMap::new(),
        };
        for record in records {
            aggregate::fold(&mut summary, record, 0);
        }
        summary.percent =
            aggregate::covered_percent(summary.covered_count, summary.uncovered_count, 0);
        summary.annotation_summary = aggregate::summarize_annotations(&summary).unwrap();
        summary
    }

    fn record(filename: &str, covered: u64, uncovered: u64) -> FileCoverageRecord {
        FileCoverageRecord::collected(
            filename,
            AnnotationLevel::Flow,
            true,
            ExpressionCounts {
                covered_count: covered,
                uncovered_count: uncovered,
                uncovered_locs: Vec::new(),
            },
        )
    }

    #[test]
    fn test_format_report_lists_files_sorted() {
        colored::control::set_override(false);
        let summary = summary_with(vec![record("src/b.js", 1, 0), record("src/a.js", 9, 1)]);
        let report = format_report(&summary);

        let a_pos = report.find("src/a.js").unwrap();
        let b_pos = report.find("src/b.js").unwrap();
        assert!(a_pos < b_pos, "files should be sorted by name");
        assert!(report.contains("COVERAGE PASSED"));
    }

    #[test]
    fn test_format_report_below_threshold() {
        colored::control::set_override(false);
        let summary = summary_with(vec![record("src/a.js", 1, 9)]);
        let report = format_report(&summary);
        assert!(report.contains("COVERAGE FAILED"));
        assert!(report.contains("10 %"));
    }

    #[test]
    fn test_format_report_marks_error_rows() {
        colored::control::set_override(false);
        let summary = summary_with(vec![
            record("src/a.js", 9, 1),
            FileCoverageRecord::from_failure(
                "src/bad.js",
                CollectionFailure::ToolException("boom".to_string()),
            ),
        ]);
        let report = format_report(&summary);
        assert!(report.contains("\u{26a0} Error"));
    }

    #[test]
    fn test_format_report_mentions_flow_check() {
        colored::control::set_override(false);
        let summary = summary_with(vec![record("src/a.js", 9, 1)]);
        let report = format_report(&summary);
        assert!(report.contains("flow 0.57.3"));
        assert!(report.contains("passing"));
    }
}
