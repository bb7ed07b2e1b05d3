//! Python analyzers: pylint, radon, bandit and mypy
//!
//! Each analyzer is launched as `python -m <tool>` so the interpreter's own
//! environment decides which versions run.

use super::{empty_output_error, execute, python_program, Tool};
use crate::config::ToolSettings;
use crate::model::{ComplexityBlock, EvaluationTarget, ToolFinding, ToolResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const PYLINT: &str = "pylint";
pub const RADON: &str = "radon";
pub const BANDIT: &str = "bandit";
pub const MYPY: &str = "mypy";

fn run_module(
    label: &str,
    module: &str,
    args: &[&str],
    target: &EvaluationTarget,
    settings: &ToolSettings,
) -> Result<String, String> {
    let path = target.path.to_string_lossy();
    let mut argv = vec!["-m", module];
    argv.extend_from_slice(args);
    argv.push(path.as_ref());
    let output = execute(label, python_program(), &argv, None, settings)?;
    if output.stdout.trim().is_empty() {
        if let Some(err) = empty_output_error(label, &output) {
            return Err(err);
        }
    }
    Ok(output.stdout)
}

// ── pylint ──────────────────────────────────────────────────────────────

pub struct Pylint;

#[derive(Debug, Deserialize)]
struct PylintReport {
    #[serde(default)]
    messages: Vec<PylintMessage>,
    #[serde(default)]
    statistics: Option<PylintStatistics>,
}

#[derive(Debug, Deserialize)]
struct PylintMessage {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default, rename = "messageId", alias = "message-id", alias = "message_id")]
    message_id: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    line: u32,
}

#[derive(Debug, Deserialize)]
struct PylintStatistics {
    #[serde(default)]
    score: Option<f64>,
}

pub fn parse_pylint(stdout: &str) -> Result<ToolResult, String> {
    let report: PylintReport = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("Failed to parse Pylint output: {}", e))?;
    let findings = report
        .messages
        .into_iter()
        .map(|m| {
            let message = if m.symbol.is_empty() {
                m.message
            } else {
                format!("{} ({})", m.message, m.symbol)
            };
            ToolFinding::new(m.line, m.kind, m.message_id, message)
        })
        .collect();
    let mut result = ToolResult::new(PYLINT).with_findings(findings);
    if let Some(score) = report.statistics.and_then(|s| s.score) {
        result = result.with_quality_score(score);
    }
    Ok(result)
}

impl Tool for Pylint {
    fn name(&self) -> &'static str {
        PYLINT
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        let args = ["--output-format=json2", "--disable=C0114,C0115,C0116"];
        match run_module("Pylint", "pylint", &args, target, settings) {
            Ok(stdout) if stdout.trim().is_empty() => ToolResult::new(PYLINT),
            Ok(stdout) => parse_pylint(&stdout).unwrap_or_else(|e| ToolResult::failed(PYLINT, e)),
            Err(e) => ToolResult::failed(PYLINT, e),
        }
    }
}

// ── radon ───────────────────────────────────────────────────────────────

pub struct Radon;

#[derive(Debug, Deserialize)]
struct RadonBlock {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    complexity: u32,
    #[serde(default)]
    lineno: u32,
    #[serde(default)]
    methods: Vec<RadonBlock>,
}

fn flatten_blocks(blocks: Vec<RadonBlock>, out: &mut Vec<ComplexityBlock>) {
    for block in blocks {
        out.push(ComplexityBlock {
            name: block.name,
            kind: block.kind,
            complexity: block.complexity,
            line: block.lineno,
        });
        flatten_blocks(block.methods, out);
    }
}

/// Parse `radon cc -j` output: `{ "<path>": [blocks...] }`. A path mapped
/// to an object instead of a list carries radon's own error.
pub fn parse_radon(stdout: &str) -> Result<ToolResult, String> {
    let data: BTreeMap<String, serde_json::Value> = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("Failed to parse Radon output: {}", e))?;
    let mut blocks = Vec::new();
    for (path, value) in data {
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return Err(format!("Radon could not analyze {}: {}", path, err));
        }
        let parsed: Vec<RadonBlock> = serde_json::from_value(value)
            .map_err(|e| format!("Failed to parse Radon output: {}", e))?;
        flatten_blocks(parsed, &mut blocks);
    }
    Ok(ToolResult::new(RADON).with_complexity(blocks))
}

impl Tool for Radon {
    fn name(&self) -> &'static str {
        RADON
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        match run_module("Radon", "radon", &["cc", "-j", "-a"], target, settings) {
            Ok(stdout) if stdout.trim().is_empty() => ToolResult::new(RADON),
            Ok(stdout) => parse_radon(&stdout).unwrap_or_else(|e| ToolResult::failed(RADON, e)),
            Err(e) => ToolResult::failed(RADON, e),
        }
    }
}

// ── bandit ──────────────────────────────────────────────────────────────

pub struct Bandit;

#[derive(Debug, Deserialize)]
struct BanditReport {
    #[serde(default)]
    results: Vec<BanditIssue>,
}

#[derive(Debug, Deserialize)]
struct BanditIssue {
    #[serde(default)]
    issue_severity: String,
    #[serde(default)]
    issue_confidence: String,
    #[serde(default)]
    test_id: String,
    #[serde(default)]
    test_name: String,
    #[serde(default)]
    line_number: u32,
    #[serde(default)]
    issue_text: String,
}

pub fn parse_bandit(stdout: &str) -> Result<ToolResult, String> {
    let report: BanditReport = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("Failed to parse Bandit output: {}", e))?;
    let findings = report
        .results
        .into_iter()
        .map(|i| {
            let message = if i.issue_confidence.is_empty() {
                format!("{} [{}]", i.issue_text, i.test_name)
            } else {
                format!(
                    "{} [{}, confidence {}]",
                    i.issue_text, i.test_name, i.issue_confidence
                )
            };
            ToolFinding::new(i.line_number, i.issue_severity, i.test_id, message)
        })
        .collect();
    Ok(ToolResult::new(BANDIT).with_findings(findings))
}

impl Tool for Bandit {
    fn name(&self) -> &'static str {
        BANDIT
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        match run_module("Bandit", "bandit", &["-f", "json", "-q"], target, settings) {
            Ok(stdout) if stdout.trim().is_empty() => ToolResult::new(BANDIT),
            Ok(stdout) => parse_bandit(&stdout).unwrap_or_else(|e| ToolResult::failed(BANDIT, e)),
            Err(e) => ToolResult::failed(BANDIT, e),
        }
    }
}

// ── mypy ────────────────────────────────────────────────────────────────

pub struct Mypy;

fn mypy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<file>.+?):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<level>error|note):\s*(?P<msg>.+?)(?:\s*\[(?P<code>[a-zA-Z0-9_-]+)\])?\s*$",
        )
        .expect("mypy regex compiles")
    })
}

/// Parse mypy's line format, keeping `error` lines only.
///
/// `path/to/file.py:12: error: Incompatible types in assignment  [assignment]`
pub fn parse_mypy(stdout: &str) -> ToolResult {
    let pattern = mypy_pattern();

    let findings = stdout
        .lines()
        .filter_map(|line| pattern.captures(line.trim()))
        .filter(|caps| &caps["level"] == "error")
        .filter_map(|caps| {
            let line = caps["line"].parse::<u32>().ok()?;
            let code = caps.name("code").map(|c| c.as_str()).unwrap_or("");
            Some(ToolFinding::new(line, "error", code, caps["msg"].trim()))
        })
        .collect();
    ToolResult::new(MYPY).with_findings(findings)
}

impl Tool for Mypy {
    fn name(&self) -> &'static str {
        MYPY
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        let args = ["--no-error-summary", "--show-error-codes", "--no-pretty"];
        match run_module("MyPy", "mypy", &args, target, settings) {
            Ok(stdout) => parse_mypy(&stdout),
            Err(e) => ToolResult::failed(MYPY, e),
        }
    }
}
