use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoverageError;
use crate::matcher;

/// Default timeout for per-file coverage commands, in milliseconds.
pub const DEFAULT_FLOW_TIMEOUT_MS: u64 = 15 * 1000;

/// Report renderers that consume the final summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Text,
    Json,
    Badge,
}

impl std::str::FromStr for ReportType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ReportType::Text),
            "json" => Ok(ReportType::Json),
            "badge" => Ok(ReportType::Badge),
            _ => Err(anyhow::anyhow!("unknown report type: {s}")),
        }
    }
}

/// Top-level configuration from `.flowcov.toml`, merged with CLI flags by the
/// binary before a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    #[serde(default)]
    pub glob_include_patterns: Vec<String>,
    #[serde(default = "default_exclude_patterns")]
    pub glob_exclude_patterns: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub percent_decimals: u8,
    #[serde(default = "default_concurrent_files")]
    pub concurrent_files: usize,
    #[serde(default)]
    pub strict_coverage: bool,
    #[serde(default)]
    pub exclude_non_flow: bool,
    #[serde(default = "default_flow_command_path")]
    pub flow_command_path: String,
    /// Per-invocation timeout for coverage commands, milliseconds.
    #[serde(default = "default_flow_command_timeout")]
    pub flow_command_timeout: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_report_types")]
    pub report_types: Vec<ReportType>,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["node_modules/**".to_string()]
}

fn default_threshold() -> f64 {
    80.0
}

fn default_concurrent_files() -> usize {
    1
}

fn default_flow_command_path() -> String {
    "flow".to_string()
}

fn default_flow_command_timeout() -> u64 {
    DEFAULT_FLOW_TIMEOUT_MS
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("flow-coverage")
}

fn default_report_types() -> Vec<ReportType> {
    vec![ReportType::Text]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            glob_include_patterns: Vec::new(),
            glob_exclude_patterns: default_exclude_patterns(),
            threshold: default_threshold(),
            percent_decimals: 0,
            concurrent_files: default_concurrent_files(),
            strict_coverage: false,
            exclude_non_flow: false,
            flow_command_path: default_flow_command_path(),
            flow_command_timeout: default_flow_command_timeout(),
            output_dir: default_output_dir(),
            report_types: default_report_types(),
        }
    }
}

impl Config {
    /// Load configuration from a `.flowcov.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `flowcov init` to create a valid config file",
                path.display()
            )
        })?;
        Ok(config)
    }

    /// Load from `.flowcov.toml` in the given directory or any ancestor, or
    /// return defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let config_path = current.join(".flowcov.toml");
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!(
                            "Warning: failed to load config from '{}': {e:#}. Using defaults.",
                            config_path.display()
                        );
                        Self::default()
                    }
                };
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Self::default()
    }

    /// Validate the merged configuration before a run starts.
    pub fn validate(&self) -> std::result::Result<(), CoverageError> {
        matcher::validate_include_patterns(&self.glob_include_patterns)?;
        if self.concurrent_files == 0 {
            return Err(CoverageError::Internal(
                "concurrent_files must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(CoverageError::Internal(format!(
                "threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// The output directory resolved against the project dir.
    pub fn resolved_output_dir(&self) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            self.project_dir.join(&self.output_dir)
        }
    }

    /// Generate default TOML content for `flowcov init`.
    pub fn default_toml() -> String {
        r#"# flowcov - Flow type coverage configuration
# See https://github.com/rebelopsio/flowcov for documentation

# Globs expanded against the project dir to select the files to analyze.
glob_include_patterns = ["src/**/*.js"]
glob_exclude_patterns = ["node_modules/**"]

# Minimum aggregate coverage percent. Below this the report command exits 1.
threshold = 80.0
percent_decimals = 0

# Upper bound on simultaneously in-flight coverage commands.
concurrent_files = 1

# Count only @flow, @flow strict and @flow strict-local files as covered.
strict_coverage = false
# Omit files without an @flow pragma from collection entirely.
exclude_non_flow = false

flow_command_path = "flow"
# Per-file coverage command timeout, milliseconds.
flow_command_timeout = 15000

output_dir = "flow-coverage"
report_types = ["text"]
"#
        .to_string()
    }
}
