use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{CoverageError, Result};

/// Test a single path against a shell-glob pattern (`*`, `**`, character
/// classes). Pure function, shared by discovery and exclusion.
pub fn matches(path: &str, pattern: &str) -> Result<bool> {
    let glob = compile(pattern)?;
    Ok(glob.compile_matcher().is_match(path))
}

/// Reject include patterns the collector cannot honor. Negation is an
/// exclude-pattern concern; a leading `!` on an include glob is a usage error.
pub fn validate_include_patterns(patterns: &[String]) -> Result<()> {
    if patterns.is_empty() || patterns.iter().all(|p| p.is_empty()) {
        return Err(CoverageError::EmptyIncludePatterns);
    }
    for pattern in patterns {
        if pattern.starts_with('!') {
            return Err(CoverageError::NegatedIncludePattern(pattern.clone()));
        }
        compile(pattern)?;
    }
    Ok(())
}

/// Exclude patterns precompiled into a single matcher.
pub struct ExcludeSet {
    set: GlobSet,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(compile(pattern)?);
        }
        let set = builder.build().map_err(|e| CoverageError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;
        Ok(Self { set })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        self.set.is_match(&normalized)
    }
}

/// Expand an include pattern against the filesystem, relative to the project
/// dir. Returns forward-slash relative paths in enumeration order.
pub fn expand_include_pattern(project_dir: &Path, pattern: &str) -> Result<Vec<String>> {
    let full_pattern = project_dir.join(pattern).to_string_lossy().to_string();
    let entries = glob::glob(&full_pattern).map_err(|e| CoverageError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "skipping unreadable glob entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let relative = path
            .strip_prefix(project_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        files.push(relative);
    }
    Ok(files)
}

fn compile(pattern: &str) -> Result<Glob> {
    Glob::new(pattern).map_err(|e| CoverageError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}
