use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Options for a single external command invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    /// `None` disables the timeout entirely (the global status check runs
    /// unbounded; per-file coverage must always pass one).
    pub timeout: Option<Duration>,
}

/// Exit information for an invocation that did not complete cleanly.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExitError {
    pub code: Option<i32>,
    pub timed_out: bool,
    pub message: String,
}

/// Structured result of an invocation. A non-zero exit is not a failure of
/// `run_command` itself; the caller interprets `exit_error`.
#[derive(Debug, Default)]
pub struct ExecResult {
    pub exit_error: Option<ExitError>,
    pub stdout: String,
    pub stderr: String,
}

/// Run a shell command line, capturing stdout and stderr unbounded. Output
/// truncation would corrupt large coverage payloads, so none is applied.
/// On timeout the child is killed and the elapsed time reported as an
/// `ExitError`; this function never returns `Err`.
pub async fn run_command(command_line: &str, options: &ExecOptions) -> ExecResult {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &options.cwd {
        command.current_dir(cwd);
    }

    tracing::debug!(command = command_line, "spawning external command");

    let output_future = command.output();

    let output = match options.timeout {
        Some(limit) => match tokio::time::timeout(limit, output_future).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the future kills the child via kill_on_drop.
                return ExecResult {
                    exit_error: Some(ExitError {
                        code: None,
                        timed_out: true,
                        message: format!(
                            "command timed out after {}ms: {command_line}",
                            limit.as_millis()
                        ),
                    }),
                    stdout: String::new(),
                    stderr: String::new(),
                };
            }
        },
        None => output_future.await,
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            return ExecResult {
                exit_error: Some(ExitError {
                    code: None,
                    timed_out: false,
                    message: format!("failed to spawn '{command_line}': {e}"),
                }),
                stdout: String::new(),
                stderr: String::new(),
            };
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let exit_error = if output.status.success() {
        None
    } else {
        let code = output.status.code();
        Some(ExitError {
            code,
            timed_out: false,
            message: match code {
                Some(code) => format!("command exited with code {code}: {command_line}"),
                None => format!("command terminated by signal: {command_line}"),
            },
        })
    };

    ExecResult {
        exit_error,
        stdout,
        stderr,
    }
}

/// Escape shell-sensitive characters in a file name so it survives the
/// `sh -c` invocation intact: quotes, backslash, backtick, dollar and
/// whitespace.
pub fn escape_file_name(file_name: &str) -> String {
    let mut escaped = String::with_capacity(file_name.len());
    for c in file_name.chars() {
        if matches!(c, '"' | '\'' | '$' | '`' | '\\') || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
