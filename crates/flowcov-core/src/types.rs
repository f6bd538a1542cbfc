use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Declared strictness of a source file's `@flow` pragma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationLevel {
    #[serde(rename = "no flow")]
    NoFlow,
    #[serde(rename = "flow weak")]
    FlowWeak,
    #[serde(rename = "flow")]
    Flow,
    #[serde(rename = "flow strict")]
    FlowStrict,
    #[serde(rename = "flow strict local")]
    FlowStrictLocal,
}

impl AnnotationLevel {
    /// Whether a file with this annotation counts as typed under the active
    /// coverage policy. With strict coverage enabled, `flow weak` no longer
    /// qualifies.
    pub fn counts_as_typed(&self, strict_coverage: bool) -> bool {
        match self {
            AnnotationLevel::NoFlow => false,
            AnnotationLevel::FlowWeak => !strict_coverage,
            AnnotationLevel::Flow
            | AnnotationLevel::FlowStrict
            | AnnotationLevel::FlowStrictLocal => true,
        }
    }
}

impl fmt::Display for AnnotationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationLevel::NoFlow => write!(f, "no flow"),
            AnnotationLevel::FlowWeak => write!(f, "flow weak"),
            AnnotationLevel::Flow => write!(f, "flow"),
            AnnotationLevel::FlowStrict => write!(f, "flow strict"),
            AnnotationLevel::FlowStrictLocal => write!(f, "flow strict local"),
        }
    }
}

/// A position inside an uncovered source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u64,
    pub column: u64,
    pub offset: u64,
}

/// A sub-span of a file lacking type coverage. The redundant `source` path
/// present in the raw tool payload is stripped before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncoveredRange {
    pub start: Position,
    pub end: Position,
}

/// Expression counts reported by the coverage command for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionCounts {
    pub covered_count: u64,
    pub uncovered_count: u64,
    #[serde(default)]
    pub uncovered_locs: Vec<UncoveredRange>,
}

impl ExpressionCounts {
    pub fn total(&self) -> u64 {
        self.covered_count + self.uncovered_count
    }
}

/// One message within a type error reported by the global status check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeErrorMessage {
    #[serde(default)]
    pub descr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A type error from the analyzer's global status payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeError {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: Vec<TypeErrorMessage>,
}

/// Result of the analyzer's global `status --json` check. Informational only:
/// a non-passing status does not abort coverage collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStatus {
    #[serde(default)]
    pub passed: bool,
    #[serde(rename = "flowVersion")]
    pub flow_version: String,
    #[serde(default)]
    pub errors: Vec<TypeError>,
}

/// Per-file coverage record. Created once by the collector, immutable after
/// it lands in the summary's file map.
///
/// On error exactly one of `tool_error`, `tool_exception`, `parsing_error`,
/// `tool_stderr` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCoverageRecord {
    pub filename: String,
    /// `None` means the collector violated its postcondition; the aggregator
    /// turns that into a fatal internal error rather than a per-file one.
    pub annotation: Option<AnnotationLevel>,
    #[serde(rename = "isFlow")]
    pub is_flow: bool,
    #[serde(rename = "isError")]
    pub is_error: bool,
    pub expressions: ExpressionCounts,
    pub percent: f64,
    #[serde(rename = "toolError", skip_serializing_if = "Option::is_none")]
    pub tool_error: Option<String>,
    #[serde(rename = "toolException", skip_serializing_if = "Option::is_none")]
    pub tool_exception: Option<String>,
    #[serde(rename = "parsingError", skip_serializing_if = "Option::is_none")]
    pub parsing_error: Option<String>,
    #[serde(rename = "toolStderr", skip_serializing_if = "Option::is_none")]
    pub tool_stderr: Option<String>,
}

impl FileCoverageRecord {
    /// A successfully collected record. `percent` is computed by the
    /// aggregator at fold time.
    pub fn collected(
        filename: &str,
        annotation: AnnotationLevel,
        is_flow: bool,
        expressions: ExpressionCounts,
    ) -> Self {
        Self {
            filename: filename.to_string(),
            annotation: Some(annotation),
            is_flow,
            is_error: false,
            expressions,
            percent: 0.0,
            tool_error: None,
            tool_exception: None,
            parsing_error: None,
            tool_stderr: None,
        }
    }
}

/// Per-run tally of file annotation levels, derived from the file map once
/// every file has settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSummary {
    pub passed: bool,
    pub flow_files: u64,
    pub flow_weak_files: u64,
    pub no_flow_files: u64,
    pub total_files: u64,
}

/// The aggregate root emitted once per run to the report renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub covered_count: u64,
    pub uncovered_count: u64,
    pub percent: f64,
    pub threshold: f64,
    #[serde(rename = "strictCoverage")]
    pub strict_coverage: bool,
    #[serde(rename = "excludeNonFlow")]
    pub exclude_non_flow: bool,
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    #[serde(rename = "flowStatus")]
    pub flow_status: FlowStatus,
    #[serde(rename = "annotationSummary")]
    pub annotation_summary: AnnotationSummary,
    #[serde(rename = "globIncludePatterns")]
    pub glob_include_patterns: Vec<String>,
    #[serde(rename = "globExcludePatterns")]
    pub glob_exclude_patterns: Vec<String>,
    #[serde(rename = "concurrentFiles")]
    pub concurrent_files: usize,
    pub files: HashMap<String, FileCoverageRecord>,
}
