//! Language-agnostic pattern scan via `semgrep scan --json`

use super::{empty_output_error, execute, Tool};
use crate::config::ToolSettings;
use crate::model::{EvaluationTarget, ToolFinding, ToolResult};
use serde::Deserialize;

pub const SEMGREP: &str = "semgrep";

pub struct Semgrep;

#[derive(Debug, Deserialize)]
struct SemgrepReport {
    #[serde(default)]
    results: Vec<SemgrepResult>,
}

#[derive(Debug, Deserialize)]
struct SemgrepResult {
    #[serde(default)]
    check_id: String,
    #[serde(default)]
    start: Option<SemgrepPosition>,
    #[serde(default)]
    extra: Option<SemgrepExtra>,
}

#[derive(Debug, Deserialize)]
struct SemgrepPosition {
    #[serde(default)]
    line: u32,
}

#[derive(Debug, Deserialize)]
struct SemgrepExtra {
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    message: String,
}

/// Last dotted segment of a rule id (`python.lang.security.audit.eval` -> `eval`).
pub fn short_rule_id(rule_id: &str) -> &str {
    rule_id.rsplit('.').next().unwrap_or(rule_id)
}

pub fn parse_semgrep(stdout: &str) -> Result<ToolResult, String> {
    let report: SemgrepReport = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("Failed to parse Semgrep output: {}", e))?;
    let findings = report
        .results
        .into_iter()
        .map(|r| {
            let (severity, message) = match r.extra {
                Some(extra) => (
                    extra
                        .severity
                        .map(|s| s.to_uppercase())
                        .unwrap_or_else(|| "WARNING".to_string()),
                    extra.message,
                ),
                None => ("WARNING".to_string(), String::new()),
            };
            let line = r.start.map(|s| s.line).unwrap_or(0);
            ToolFinding::new(line, severity, r.check_id, message)
        })
        .collect();
    Ok(ToolResult::new(SEMGREP).with_findings(findings))
}

impl Tool for Semgrep {
    fn name(&self) -> &'static str {
        SEMGREP
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        let path = target.path.to_string_lossy();
        let args = [
            "scan",
            "--json",
            "--quiet",
            "--config",
            settings.semgrep_config.as_str(),
            path.as_ref(),
        ];
        let output = match execute("Semgrep", "semgrep", &args, None, settings) {
            Ok(output) => output,
            Err(e) if e.contains("not found") => {
                return ToolResult::failed(
                    SEMGREP,
                    "'semgrep' CLI not found. Install via: pip install semgrep  (or pipx install semgrep)",
                )
            }
            Err(e) => return ToolResult::failed(SEMGREP, e),
        };
        if output.stdout.trim().is_empty() {
            return match empty_output_error("Semgrep", &output) {
                Some(err) => ToolResult::failed(SEMGREP, err),
                None => ToolResult::new(SEMGREP),
            };
        }
        parse_semgrep(&output.stdout).unwrap_or_else(|e| ToolResult::failed(SEMGREP, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_semgrep_results() {
        let stdout = r#"{"errors": [], "results": [
            {"check_id": "python.lang.security.audit.formatted-sql-query",
             "path": "app.py", "start": {"line": 14, "col": 5}, "end": {"line": 14, "col": 60},
             "extra": {"severity": "error", "message": "Detected possible formatted SQL query",
                       "metadata": {"category": "security"}}},
            {"check_id": "generic.secrets.gitleaks", "start": {"line": 2}}
        ]}"#;
        let result = parse_semgrep(stdout).unwrap();
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].severity, "ERROR");
        assert_eq!(result.findings[0].line, 14);
        assert_eq!(result.findings[1].severity, "WARNING");
        assert_eq!(short_rule_id(&result.findings[0].code), "formatted-sql-query");
    }

    #[test]
    fn test_short_rule_id_without_dots() {
        assert_eq!(short_rule_id("custom-rule"), "custom-rule");
        assert_eq!(short_rule_id(""), "");
    }
}
