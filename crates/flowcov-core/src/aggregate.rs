use crate::error::{CoverageError, Result};
use crate::types::{AnnotationLevel, AnnotationSummary, CoverageSummary, FileCoverageRecord};

/// Coverage percent for a covered/uncovered pair. A file or project with
/// zero typeable expressions is vacuously fully covered. With zero decimals
/// the legacy truncating behavior applies; otherwise round-half-up at
/// `decimals` fractional digits.
pub fn covered_percent(covered_count: u64, uncovered_count: u64, decimals: u8) -> f64 {
    let total = covered_count + uncovered_count;
    if total == 0 {
        return 100.0;
    }

    let raw = covered_count as f64 / total as f64 * 100.0;
    if decimals == 0 {
        raw.floor()
    } else {
        let factor = 10f64.powi(i32::from(decimals));
        ((raw * factor) + 0.5).floor() / factor
    }
}

/// Fold one settled record into the summary: accumulate the expression
/// counts, stamp the record's percent and insert it keyed by filename.
pub fn fold(summary: &mut CoverageSummary, mut record: FileCoverageRecord, decimals: u8) {
    summary.covered_count += record.expressions.covered_count;
    summary.uncovered_count += record.expressions.uncovered_count;
    record.percent = covered_percent(
        record.expressions.covered_count,
        record.expressions.uncovered_count,
        decimals,
    );
    summary
        .files
        .insert(record.filename.clone(), record);
}

/// Tally annotation levels across all settled records. A record with no
/// annotation means the collector broke its postcondition; that is an
/// internal error, not a per-file one.
pub fn summarize_annotations(summary: &CoverageSummary) -> Result<AnnotationSummary> {
    let mut flow_files = 0u64;
    let mut flow_weak_files = 0u64;
    let mut no_flow_files = 0u64;

    for (filename, record) in &summary.files {
        match record.annotation {
            Some(AnnotationLevel::Flow)
            | Some(AnnotationLevel::FlowStrict)
            | Some(AnnotationLevel::FlowStrictLocal) => flow_files += 1,
            Some(AnnotationLevel::FlowWeak) => flow_weak_files += 1,
            Some(AnnotationLevel::NoFlow) => no_flow_files += 1,
            None => return Err(CoverageError::MissingAnnotation(filename.clone())),
        }
    }

    Ok(AnnotationSummary {
        passed: flow_weak_files + no_flow_files == 0,
        flow_files,
        flow_weak_files,
        no_flow_files,
        total_files: summary.files.len() as u64,
    })
}
