use std::io;
use std::path::Path;

use crate::types::AnnotationLevel;

/// Determine a file's declared annotation level from its leading pragma
/// docblock, independent of full coverage collection.
///
/// An I/O failure propagates to the caller: during the exclude-non-flow
/// pre-filter it only decides whether the file is skipped; after a coverage
/// collection the collector turns it into a per-file error record.
pub fn classify(path: &Path) -> io::Result<AnnotationLevel> {
    let content = std::fs::read_to_string(path)?;
    Ok(classify_source(&content))
}

/// Classify from source text. The pragma must appear in the leading comment
/// block, before the first line of code.
pub fn classify_source(source: &str) -> AnnotationLevel {
    let header = leading_comment_block(source);

    if header.contains("@noflow") {
        return AnnotationLevel::NoFlow;
    }
    if header.contains("@flow strict-local") {
        return AnnotationLevel::FlowStrictLocal;
    }
    if header.contains("@flow strict") {
        return AnnotationLevel::FlowStrict;
    }
    if header.contains("@flow weak") {
        return AnnotationLevel::FlowWeak;
    }
    if header.contains("@flow") {
        return AnnotationLevel::Flow;
    }
    AnnotationLevel::NoFlow
}

/// The file's leading run of blank lines and comments, as one string.
fn leading_comment_block(source: &str) -> String {
    let mut header = String::new();
    let mut in_block_comment = false;

    for line in source.lines() {
        let trimmed = line.trim_start();

        if in_block_comment {
            header.push_str(line);
            header.push('\n');
            if let Some(end) = trimmed.find("*/") {
                in_block_comment = false;
                // Code after the block terminator ends the header.
                if !trimmed[end + 2..].trim().is_empty() {
                    break;
                }
            }
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with("#!") || trimmed.starts_with("//") {
            header.push_str(line);
            header.push('\n');
            continue;
        }

        if trimmed.starts_with("/*") {
            header.push_str(line);
            header.push('\n');
            match trimmed.find("*/") {
                Some(end) if !trimmed[end + 2..].trim().is_empty() => break,
                Some(_) => {}
                None => in_block_comment = true,
            }
            continue;
        }

        break;
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_line_comment_pragmas() {
        assert_eq!(classify_source("// @flow\nexport {};\n"), AnnotationLevel::Flow);
        assert_eq!(
            classify_source("// @flow weak\nexport {};\n"),
            AnnotationLevel::FlowWeak
        );
        assert_eq!(
            classify_source("// @flow strict\nexport {};\n"),
            AnnotationLevel::FlowStrict
        );
        assert_eq!(
            classify_source("// @flow strict-local\nexport {};\n"),
            AnnotationLevel::FlowStrictLocal
        );
    }

    #[test]
    fn test_classify_block_comment_pragma() {
        assert_eq!(
            classify_source("/* @flow */\nexport {};\n"),
            AnnotationLevel::Flow
        );
        assert_eq!(
            classify_source("/**\n * @flow strict\n */\nexport {};\n"),
            AnnotationLevel::FlowStrict
        );
    }

    #[test]
    fn test_classify_noflow_and_missing() {
        assert_eq!(
            classify_source("// @noflow\nexport {};\n"),
            AnnotationLevel::NoFlow
        );
        assert_eq!(classify_source("export {};\n"), AnnotationLevel::NoFlow);
        assert_eq!(classify_source(""), AnnotationLevel::NoFlow);
    }

    #[test]
    fn test_pragma_after_code_is_ignored() {
        let source = "const x = 1;\n// @flow\n";
        assert_eq!(classify_source(source), AnnotationLevel::NoFlow);
    }

    #[test]
    fn test_pragma_after_shebang_and_blank_lines() {
        let source = "#!/usr/bin/env node\n\n// @flow\nexport {};\n";
        assert_eq!(classify_source(source), AnnotationLevel::Flow);
    }

    #[test]
    fn test_classify_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.js");
        std::fs::write(&path, "// @flow weak\nmodule.exports = {};\n").unwrap();
        assert_eq!(classify(&path).unwrap(), AnnotationLevel::FlowWeak);
    }

    #[test]
    fn test_classify_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(classify(&tmp.path().join("nope.js")).is_err());
    }
}
