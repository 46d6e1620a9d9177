//! External process execution
//!
//! Runs external tools synchronously, sorts failures into transient and
//! permanent ones, and retries transient failures a bounded number of times.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::ToolError;

/// Marker printed by Python tools when they crash
const PYTHON_TRACEBACK: &str = "Traceback (most recent call last)";

/// Locate `tool`, preferring an explicitly configured path
pub fn locate(tool: &str, configured: Option<&Path>) -> Result<PathBuf, ToolError> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(ToolError::NotFound {
            tool: path.display().to_string(),
        }),
        None => which::which(tool).map_err(|_| ToolError::NotFound {
            tool: tool.to_string(),
        }),
    }
}

/// Render a command line for diagnostics
pub fn describe<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Run `program` with `args` and return its standard output
pub fn run<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<String, ToolError> {
    let command = describe(program, args);
    tracing::debug!("Running {command}");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ToolError::NotFound {
                tool: program.display().to_string(),
            },
            _ => ToolError::Permanent {
                command: command.clone(),
                error: e.to_string(),
            },
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);

    match output.status.code() {
        Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        None => Err(ToolError::Transient {
            command,
            error: format!("terminated by signal: {}", stderr.trim()),
        }),
        Some(_) if stderr.contains(PYTHON_TRACEBACK) => Err(ToolError::Transient {
            command,
            error: last_line(&stderr),
        }),
        Some(code) => Err(ToolError::Permanent {
            command,
            error: format!("exit code {code}: {}", stderr.trim()),
        }),
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Call `op` until it succeeds, fails permanently, or `attempts` transient
/// failures have been seen. Exhausted transient failures become
/// [`ToolError::RetriesExhausted`].
pub fn with_retries<T, F>(attempts: u32, delay: Duration, mut op: F) -> Result<T, ToolError>
where
    F: FnMut() -> Result<T, ToolError>,
{
    let mut attempt = 0;
    let policy = backoff::backoff::Constant::new(delay);

    backoff::retry(policy, || {
        attempt += 1;
        op().map_err(|e| {
            if !e.is_transient() {
                return backoff::Error::permanent(e);
            }
            if attempt < attempts {
                tracing::warn!("Attempt {attempt}/{attempts} failed, retrying: {e}");
                return backoff::Error::transient(e);
            }
            backoff::Error::permanent(match e {
                ToolError::Transient { command, error } => ToolError::RetriesExhausted {
                    command,
                    attempts: attempt,
                    error,
                },
                other => other,
            })
        })
    })
    .map_err(|e| match e {
        backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
    })
}
