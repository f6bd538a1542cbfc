use std::collections::HashSet;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;

use crate::aggregate;
use crate::annotation;
use crate::collector::{self, CollectionFailure};
use crate::config::Config;
use crate::error::{CoverageError, Result};
use crate::matcher::{self, ExcludeSet};
use crate::types::{AnnotationLevel, AnnotationSummary, CoverageSummary, FileCoverageRecord};

/// Run a full coverage collection: status check, discovery, bounded per-file
/// collection and aggregation. Returns either a complete summary or a
/// run-fatal error, never a partially-initialized one.
pub async fn collect_coverage(config: &Config) -> Result<CoverageSummary> {
    config.validate()?;

    let flow_status =
        collector::check_flow_status(&config.flow_command_path, &config.project_dir).await?;

    let mut summary = CoverageSummary {
        covered_count: 0,
        uncovered_count: 0,
        percent: 0.0,
        threshold: config.threshold,
        strict_coverage: config.strict_coverage,
        exclude_non_flow: config.exclude_non_flow,
        generated_at: Local::now().format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
        flow_status,
        annotation_summary: AnnotationSummary::default(),
        glob_include_patterns: config.glob_include_patterns.clone(),
        glob_exclude_patterns: config.glob_exclude_patterns.clone(),
        concurrent_files: config.concurrent_files,
        files: Default::default(),
    };

    let work = discover_files(config).await?;

    // Batch-drain: once `concurrent_files` collections are in flight, wait
    // for the whole batch to settle before issuing the next one. Settled
    // records fold into the summary sequentially; no two folds race.
    let timeout = Duration::from_millis(config.flow_command_timeout);
    let mut in_flight: Vec<(String, JoinHandle<FileCoverageRecord>)> = Vec::new();

    for filename in work {
        tracing::debug!(file = %filename, "queueing coverage collection");
        let flow_command_path = config.flow_command_path.clone();
        let project_dir = config.project_dir.clone();
        let strict_coverage = config.strict_coverage;
        let file = filename.clone();
        let handle = tokio::spawn(async move {
            collector::collect_file(
                &flow_command_path,
                timeout,
                &project_dir,
                &file,
                strict_coverage,
            )
            .await
        });
        in_flight.push((filename, handle));

        if in_flight.len() >= config.concurrent_files {
            drain(&mut in_flight, &mut summary, config.percent_decimals).await;
        }
    }

    if !in_flight.is_empty() {
        drain(&mut in_flight, &mut summary, config.percent_decimals).await;
    }

    summary.percent = aggregate::covered_percent(
        summary.covered_count,
        summary.uncovered_count,
        config.percent_decimals,
    );
    summary.annotation_summary = aggregate::summarize_annotations(&summary)?;

    Ok(summary)
}

/// Expand include patterns concurrently, then filter by exclusion and the
/// optional exclude-non-flow pre-filter. Duplicate paths matched by more
/// than one pattern are collected once.
async fn discover_files(config: &Config) -> Result<Vec<String>> {
    let expansions = futures::future::join_all(config.glob_include_patterns.iter().map(
        |pattern| {
            let project_dir = config.project_dir.clone();
            let pattern = pattern.clone();
            tokio::task::spawn_blocking(move || {
                matcher::expand_include_pattern(&project_dir, &pattern)
            })
        },
    ))
    .await;

    let exclude = ExcludeSet::new(&config.glob_exclude_patterns)?;
    let mut seen = HashSet::new();
    let mut work = Vec::new();

    for joined in expansions {
        let files = joined
            .map_err(|e| CoverageError::Internal(format!("glob expansion task failed: {e}")))??;

        for filename in files {
            if exclude.is_excluded(&filename) {
                tracing::debug!(file = %filename, "skipped, matched exclude pattern");
                continue;
            }
            if !seen.insert(filename.clone()) {
                continue;
            }
            if config.exclude_non_flow {
                match annotation::classify(&config.project_dir.join(&filename)) {
                    Ok(AnnotationLevel::NoFlow) => {
                        tracing::debug!(file = %filename, "skipped, no flow annotation");
                        continue;
                    }
                    Ok(_) => {}
                    // Collection will re-run the check and surface the
                    // failure as a per-file error.
                    Err(e) => {
                        tracing::warn!(file = %filename, error = %e, "annotation pre-check failed")
                    }
                }
            }
            work.push(filename);
        }
    }

    Ok(work)
}

async fn drain(
    in_flight: &mut Vec<(String, JoinHandle<FileCoverageRecord>)>,
    summary: &mut CoverageSummary,
    decimals: u8,
) {
    tracing::debug!(count = in_flight.len(), "waiting for in-flight coverage commands");
    for (filename, handle) in in_flight.drain(..) {
        let record = match handle.await {
            Ok(record) => record,
            Err(e) => FileCoverageRecord::from_failure(
                &filename,
                CollectionFailure::ToolException(format!("coverage task failed: {e}")),
            ),
        };
        aggregate::fold(summary, record, decimals);
    }
}
