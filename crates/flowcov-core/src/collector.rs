use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::annotation;
use crate::error::{CoverageError, Result};
use crate::invoker::{escape_file_name, run_command, ExecOptions};
use crate::types::{
    AnnotationLevel, ExpressionCounts, FileCoverageRecord, FlowStatus, Position, UncoveredRange,
};

/// Environment variable enabling raw payload dumps for postmortem inspection.
pub const DUMP_JSON_ENV: &str = "FLOWCOV_DUMP_JSON";

// Raw wire types for the coverage protocol. Positions carry a redundant
// `source` path which is dropped on conversion to the stored range type.

#[derive(Debug, Deserialize)]
struct RawPosition {
    line: u64,
    column: u64,
    offset: u64,
    #[serde(default)]
    #[allow(dead_code)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    start: RawPosition,
    end: RawPosition,
}

#[derive(Debug, Default, Deserialize)]
struct RawExpressions {
    #[serde(default)]
    covered_count: u64,
    #[serde(default)]
    uncovered_count: u64,
    #[serde(default)]
    uncovered_locs: Vec<RawRange>,
}

#[derive(Debug, Deserialize)]
struct RawCoverage {
    #[serde(default)]
    expressions: RawExpressions,
    #[serde(default)]
    error: Option<String>,
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        Position {
            line: raw.line,
            column: raw.column,
            offset: raw.offset,
        }
    }
}

impl From<RawExpressions> for ExpressionCounts {
    fn from(raw: RawExpressions) -> Self {
        ExpressionCounts {
            covered_count: raw.covered_count,
            uncovered_count: raw.uncovered_count,
            uncovered_locs: raw
                .uncovered_locs
                .into_iter()
                .map(|range| UncoveredRange {
                    start: range.start.into(),
                    end: range.end.into(),
                })
                .collect(),
        }
    }
}

/// How one file's collection settled, before being collapsed into the
/// stored record's mutually-exclusive error fields.
#[derive(Debug)]
pub enum CollectionFailure {
    /// Process-level failure unrelated to the analyzer's own reporting.
    ToolException(String),
    /// Neither stdout nor stderr yielded a usable JSON payload.
    ParseFailure(String),
    /// The tool reported a per-file coverage error inside its JSON payload.
    ToolReported(String),
    /// Non-JSON diagnostics on stderr with nothing usable on stdout.
    ToolStderr(String),
}

impl FileCoverageRecord {
    /// An error-shaped record contributing zero counts to the aggregate.
    pub fn from_failure(filename: &str, failure: CollectionFailure) -> Self {
        let mut record = Self {
            filename: filename.to_string(),
            annotation: Some(AnnotationLevel::NoFlow),
            is_flow: false,
            is_error: true,
            expressions: ExpressionCounts::default(),
            percent: 0.0,
            tool_error: None,
            tool_exception: None,
            parsing_error: None,
            tool_stderr: None,
        };
        match failure {
            CollectionFailure::ToolException(message) => record.tool_exception = Some(message),
            CollectionFailure::ParseFailure(message) => record.parsing_error = Some(message),
            CollectionFailure::ToolReported(message) => record.tool_error = Some(message),
            CollectionFailure::ToolStderr(stderr) => record.tool_stderr = Some(stderr),
        }
        record
    }
}

/// Check the analyzer's global status. Exit code 2 means "type errors
/// present" and is tolerated; the payload is still parsed from stdout.
/// Any other failure aborts the whole run.
pub async fn check_flow_status(
    flow_command_path: &str,
    project_dir: &Path,
) -> Result<FlowStatus> {
    let command = format!("{flow_command_path} status --json");
    let options = ExecOptions {
        cwd: Some(project_dir.to_path_buf()),
        timeout: None,
    };
    let res = run_command(&command, &options).await;

    if let Some(exit) = &res.exit_error {
        if exit.code != Some(2) {
            tracing::error!(error = %exit, stderr = %res.stderr, "flow status failed");
            return Err(CoverageError::StatusCommand(exit.message.clone()));
        }
    }

    maybe_dump_payload("status", &res.stdout);

    let value: serde_json::Value = serde_json::from_str(&res.stdout)
        .map_err(|e| CoverageError::StatusParse(e.to_string()))?;
    let status: FlowStatus =
        serde_json::from_value(value).map_err(|_| CoverageError::InvalidStatus)?;
    Ok(status)
}

/// Collect coverage for a single file. Every failure mode resolves to a
/// well-formed error record; nothing propagates past this function, so one
/// file can never abort collection of the rest.
pub async fn collect_file(
    flow_command_path: &str,
    timeout: Duration,
    project_dir: &Path,
    filename: &str,
    strict_coverage: bool,
) -> FileCoverageRecord {
    tracing::debug!(
        file = filename,
        timeout_ms = timeout.as_millis() as u64,
        "collecting coverage data"
    );

    let command = format!(
        "{flow_command_path} coverage --json {}",
        escape_file_name(filename)
    );
    let options = ExecOptions {
        cwd: Some(project_dir.to_path_buf()),
        timeout: Some(timeout),
    };
    let res = run_command(&command, &options).await;

    maybe_dump_payload(filename, &res.stdout);

    if let Some(exit) = res.exit_error {
        tracing::warn!(file = filename, error = %exit, stderr = %res.stderr, "coverage command failed");
        return FileCoverageRecord::from_failure(
            filename,
            CollectionFailure::ToolException(exit.message),
        );
    }

    let mut parsed: Option<RawCoverage> = None;
    let mut parse_error: Option<String> = None;

    if !res.stdout.is_empty() {
        match serde_json::from_str::<RawCoverage>(&res.stdout) {
            Ok(data) => parsed = Some(data),
            Err(e) => parse_error = Some(e.to_string()),
        }
    }

    // The tool reports per-file coverage failures as JSON on stderr. When
    // stderr parses, it wins over whatever stdout produced.
    if !res.stderr.is_empty() {
        if let Ok(data) = serde_json::from_str::<RawCoverage>(&res.stderr) {
            parsed = Some(data);
        }
    }

    let data = match parsed {
        Some(data) => data,
        None => {
            return match parse_error {
                Some(message) => {
                    tracing::warn!(file = filename, error = %message, "unparsable coverage payload");
                    FileCoverageRecord::from_failure(
                        filename,
                        CollectionFailure::ParseFailure(message),
                    )
                }
                None if !res.stderr.is_empty() => FileCoverageRecord::from_failure(
                    filename,
                    CollectionFailure::ToolStderr(res.stderr),
                ),
                None => FileCoverageRecord::from_failure(
                    filename,
                    CollectionFailure::ParseFailure("empty coverage output".to_string()),
                ),
            };
        }
    };

    if let Some(message) = data.error {
        tracing::warn!(file = filename, error = %message, "tool reported a coverage error");
        return FileCoverageRecord::from_failure(
            filename,
            CollectionFailure::ToolReported(message),
        );
    }

    let annotation = match annotation::classify(&project_dir.join(filename)) {
        Ok(annotation) => annotation,
        Err(e) => {
            tracing::warn!(file = filename, error = %e, "annotation check failed");
            return FileCoverageRecord::from_failure(
                filename,
                CollectionFailure::ToolException(format!(
                    "failed to determine annotation: {e}"
                )),
            );
        }
    };

    let is_flow = annotation.counts_as_typed(strict_coverage);
    let mut expressions: ExpressionCounts = data.expressions.into();

    // Strict policy: a file that does not qualify as typed contributes all
    // of its expressions as uncovered.
    if strict_coverage && !is_flow {
        expressions.uncovered_count += expressions.covered_count;
        expressions.covered_count = 0;
    }

    FileCoverageRecord::collected(filename, annotation, is_flow, expressions)
}

/// Persist a raw payload to a temp file when dump mode is enabled.
/// Diagnostic only; any failure here is ignored.
fn maybe_dump_payload(label: &str, payload: &str) {
    if std::env::var(DUMP_JSON_ENV).is_err() {
        return;
    }
    let file = tempfile::Builder::new()
        .prefix("flowcov-")
        .suffix(".json")
        .tempfile();
    if let Ok(file) = file {
        if std::fs::write(file.path(), payload).is_ok() {
            if let Ok((_, path)) = file.keep() {
                tracing::debug!(label, path = %path.display(), "raw payload saved");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write a fake `flow` executable whose `coverage` subcommand responds
    /// per file basename.
    fn write_fake_flow(dir: &Path) -> PathBuf {
        let script = r#"#!/bin/sh
sub="$1"
if [ "$sub" = "status" ]; then
  echo '{"passed":true,"flowVersion":"0.57.3","errors":[]}'
  exit 0
fi
file="$3"
case "$file" in
  *slow.js)
    sleep 5
    echo '{"expressions":{"covered_count":1,"uncovered_count":0,"uncovered_locs":[]}}'
    ;;
  *broken.js)
    echo 'this is not json'
    ;;
  *reported.js)
    echo '{"expressions":{"covered_count":0,"uncovered_count":0,"uncovered_locs":[]},"error":"failed to normalize coverage"}' 1>&2
    ;;
  *crash.js)
    echo 'flow crashed hard' 1>&2
    exit 0
    ;;
  *)
    echo '{"expressions":{"covered_count":6,"uncovered_count":2,"uncovered_locs":[{"start":{"line":3,"column":1,"offset":40,"source":"'"$file"'"},"end":{"line":3,"column":9,"offset":48,"source":"'"$file"'"}}]}}'
    ;;
esac
"#;
        let path = dir.join("fake-flow");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn project_with_files(files: &[(&str, &str)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        for (name, content) in files {
            std::fs::write(tmp.path().join(name), content).unwrap();
        }
        tmp
    }

    #[tokio::test]
    async fn test_check_flow_status() {
        let tmp = tempfile::tempdir().unwrap();
        let flow = write_fake_flow(tmp.path());
        let status = check_flow_status(flow.to_str().unwrap(), tmp.path())
            .await
            .unwrap();
        assert!(status.passed);
        assert_eq!(status.flow_version, "0.57.3");
        assert!(status.errors.is_empty());
    }

    #[tokio::test]
    async fn test_check_flow_status_missing_tool_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = check_flow_status("/nonexistent/flow-binary", tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CoverageError::StatusCommand(_)));
    }

    #[tokio::test]
    async fn test_check_flow_status_tolerates_type_errors_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\necho '{\"passed\":false,\"flowVersion\":\"0.57.3\",\"errors\":[{\"kind\":\"infer\",\"level\":\"error\",\"message\":[{\"descr\":\"number incompatible with string\"}]}]}'\nexit 2\n";
        let path = tmp.path().join("fake-flow");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let status = check_flow_status(path.to_str().unwrap(), tmp.path())
            .await
            .unwrap();
        assert!(!status.passed);
        assert_eq!(status.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_check_flow_status_requires_version_field() {
        let tmp = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\necho '{\"passed\":true}'\n";
        let path = tmp.path().join("fake-flow");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = check_flow_status(path.to_str().unwrap(), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CoverageError::InvalidStatus));
    }

    #[tokio::test]
    async fn test_collect_file_success_strips_source_from_ranges() {
        let tmp = project_with_files(&[("src/a.js", "// @flow\nconst x = 1;\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            "src/a.js",
            false,
        )
        .await;

        assert!(!record.is_error);
        assert_eq!(record.annotation, Some(AnnotationLevel::Flow));
        assert!(record.is_flow);
        assert_eq!(record.expressions.covered_count, 6);
        assert_eq!(record.expressions.uncovered_count, 2);
        assert_eq!(record.expressions.uncovered_locs.len(), 1);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["expressions"]["uncovered_locs"][0]["start"]
            .get("source")
            .is_none());
    }

    #[tokio::test]
    async fn test_collect_file_strict_mode_folds_untyped_file() {
        let tmp = project_with_files(&[("src/weak.js", "// @flow weak\nconst x = 1;\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            "src/weak.js",
            true,
        )
        .await;

        assert!(!record.is_error);
        assert_eq!(record.annotation, Some(AnnotationLevel::FlowWeak));
        assert!(!record.is_flow);
        assert_eq!(record.expressions.covered_count, 0);
        assert_eq!(record.expressions.uncovered_count, 8);
    }

    #[tokio::test]
    async fn test_collect_file_parse_failure() {
        let tmp = project_with_files(&[("src/broken.js", "// @flow\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            "src/broken.js",
            false,
        )
        .await;

        assert!(record.is_error);
        assert!(record.parsing_error.is_some());
        assert!(record.tool_error.is_none());
        assert!(record.tool_exception.is_none());
        assert_eq!(record.expressions.covered_count, 0);
        assert_eq!(record.expressions.uncovered_count, 0);
        assert!(record.expressions.uncovered_locs.is_empty());
    }

    #[tokio::test]
    async fn test_collect_file_prefers_stderr_json_error() {
        let tmp = project_with_files(&[("src/reported.js", "// @flow\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            "src/reported.js",
            false,
        )
        .await;

        assert!(record.is_error);
        assert_eq!(
            record.tool_error.as_deref(),
            Some("failed to normalize coverage")
        );
        assert!(record.parsing_error.is_none());
    }

    #[tokio::test]
    async fn test_collect_file_non_json_stderr() {
        let tmp = project_with_files(&[("src/crash.js", "// @flow\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            "src/crash.js",
            false,
        )
        .await;

        assert!(record.is_error);
        assert_eq!(record.tool_stderr.as_deref(), Some("flow crashed hard\n"));
    }

    #[tokio::test]
    async fn test_collect_file_timeout_is_per_file_error() {
        let tmp = project_with_files(&[("src/slow.js", "// @flow\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_millis(150),
            tmp.path(),
            "src/slow.js",
            false,
        )
        .await;

        assert!(record.is_error);
        let message = record.tool_exception.expect("timeout surfaces as exception");
        assert!(message.contains("timed out"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn test_collect_file_missing_tool() {
        let tmp = project_with_files(&[("src/a.js", "// @flow\n")]);

        let record = collect_file(
            "/nonexistent/flow-binary",
            Duration::from_secs(10),
            tmp.path(),
            "src/a.js",
            false,
        )
        .await;

        assert!(record.is_error);
        assert!(record.tool_exception.is_some());
    }

    #[tokio::test]
    async fn test_collect_file_quoted_filename() {
        let name = "src/file-with-a'quote.js";
        let tmp = project_with_files(&[(name, "// @flow\nconst x = 1;\n")]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            name,
            false,
        )
        .await;

        assert!(!record.is_error, "unexpected error: {record:?}");
        assert_eq!(record.filename, name);
        assert_eq!(record.expressions.covered_count, 6);
    }

    #[tokio::test]
    async fn test_collect_file_missing_source_is_per_file_error() {
        // Coverage succeeds but the annotation check cannot read the file.
        let tmp = project_with_files(&[]);
        let flow = write_fake_flow(tmp.path());

        let record = collect_file(
            flow.to_str().unwrap(),
            Duration::from_secs(10),
            tmp.path(),
            "src/ghost.js",
            false,
        )
        .await;

        assert!(record.is_error);
        let message = record.tool_exception.unwrap();
        assert!(message.contains("annotation"), "unexpected message: {message}");
    }
}
