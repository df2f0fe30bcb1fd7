//! External command invocation.
//!
//! Commands run to completion with stdout/stderr captured. Children are
//! placed in their own process group so a terminal Ctrl-C is delivered to
//! this process only, which then decides how to wind down.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Lines of output kept in error diagnostics.
const DIAGNOSTIC_LINES: usize = 20;

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit status plus the tail of stderr (or stdout when stderr is empty).
    pub fn diagnostic(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let stream = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = stream.trim_end().lines().collect();
        let tail = &lines[lines.len().saturating_sub(DIAGNOSTIC_LINES)..];
        if tail.is_empty() {
            status
        } else {
            format!("{status}: {}", tail.join("\n"))
        }
    }
}

/// Shell-like rendering of a command line, for logs.
pub fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` with `args` and wait for it to exit.
///
/// The child is killed if the returned future is dropped before completion.
pub async fn run(program: &str, args: &[String], cwd: Option<&Path>) -> std::io::Result<CommandOutput> {
    info!("+ {}", render(program, args));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let output = cmd.output().await?;
    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.stdout.trim().is_empty() {
        debug!(program, "stdout:\n{}", result.stdout.trim_end());
    }
    if !result.stderr.trim().is_empty() {
        debug!(program, "stderr:\n{}", result.stderr.trim_end());
    }

    Ok(result)
}
