//! External command execution with captured output.
//!
//! Every external tool the pipeline drives (git, the encrypt/decrypt
//! command) runs through here so that failures carry the process output
//! for operator diagnosis.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

/// An external command exited non-zero or could not be spawned.
#[derive(Debug, Error)]
#[error("`{command}` {}: {output}", .code.map_or_else(|| "could not be run".to_string(), |c| format!("exited with code {c}")))]
pub struct ProcessError {
    /// The command line that was attempted.
    pub command: String,

    /// Exit code, if the process ran at all.
    pub code: Option<i32>,

    /// Combined stdout/stderr, or the spawn error text.
    pub output: String,
}

impl ProcessError {
    /// Build an error for a command that ran and failed.
    pub fn failed(command: impl Into<String>, code: Option<i32>, output: impl Into<String>) -> Self {
        Self { command: command.into(), code, output: output.into() }
    }
}

/// Run a command in `dir`, capturing stdout and stderr together.
///
/// Returns the combined output on success. On a non-zero exit (or a spawn
/// failure, e.g. the tool is not installed) the combined output travels in
/// the error so the operator sees what the tool printed.
pub fn run<S: AsRef<OsStr>>(program: &str, args: &[S], dir: &Path) -> Result<String, ProcessError> {
    let rendered = render_command(program, args);
    tracing::debug!(command = %rendered, dir = %dir.display(), "running external command");

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ProcessError { command: rendered.clone(), code: None, output: e.to_string() })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_string();

    if !output.status.success() {
        return Err(ProcessError { command: rendered, code: output.status.code(), output: combined });
    }

    Ok(combined)
}

fn render_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}
