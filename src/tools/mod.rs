//! Deterministic analyzer wrappers
//!
//! A [`Tool`] never fails past its boundary: a missing binary, a timeout or
//! unreadable output all come back as a [`ToolResult`] with `error` set.

pub mod csharp;
pub mod python;
pub mod semgrep;

use crate::config::ToolSettings;
use crate::model::{EvaluationTarget, ToolResult};
use crate::util::{run_command_with_timeout, tail_chars, CommandError, CommandRunResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::process::Command;

/// Characters of stderr kept when a tool exits without usable output
const STDERR_HINT_CHARS: usize = 200;

pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult;
}

/// Run `tools` in the given order. A panicking tool is recorded as failed and
/// the remaining tools still run.
pub fn run_in_order<'a, I>(
    tools: I,
    target: &EvaluationTarget,
    settings: &ToolSettings,
) -> Vec<ToolResult>
where
    I: IntoIterator<Item = &'a dyn Tool>,
{
    tools
        .into_iter()
        .map(|tool| {
            let name = tool.name();
            let result = catch_unwind(AssertUnwindSafe(|| tool.run(target, settings)))
                .unwrap_or_else(|_| ToolResult::failed(name, format!("{} crashed", name)));
            if let Some(err) = &result.error {
                tracing::warn!(file = %target.file_name(), tool = name, error = %err, "tool degraded");
            } else {
                tracing::debug!(
                    file = %target.file_name(),
                    tool = name,
                    findings = result.findings.len(),
                    "tool finished"
                );
            }
            result
        })
        .collect()
}

/// Execute an analyzer process and map every failure mode to a message.
///
/// Analyzers routinely exit non-zero when they report findings, so the exit
/// code alone is never treated as failure.
pub(crate) fn execute(
    label: &str,
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    settings: &ToolSettings,
) -> Result<CommandRunResult, String> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    match run_command_with_timeout(&mut command, settings.timeout()) {
        Ok(output) if output.timed_out => Err(format!("{} timed out.", label)),
        Ok(output) => Ok(output),
        Err(CommandError::NotFound { program }) => {
            Err(format!("'{}' CLI not found. Install it to enable {}.", program, label))
        }
        Err(err) => Err(format!("{} execution error: {}", label, err)),
    }
}

/// Error text for a run that produced no parsable stdout.
pub(crate) fn empty_output_error(label: &str, output: &CommandRunResult) -> Option<String> {
    let code = output.exit_code()?;
    if code == 0 || output.stderr.trim().is_empty() {
        return None;
    }
    let hint = output
        .stderr
        .trim()
        .lines()
        .last()
        .map(|l| tail_chars(l, STDERR_HINT_CHARS))
        .unwrap_or_default();
    Some(format!("{} exited {}: {}", label, code, hint))
}

/// Python interpreter used to launch module-based analyzers.
pub(crate) fn python_program() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}
