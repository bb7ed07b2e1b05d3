//! Evaluation data model
//!
//! Everything a single file's pipeline produces, from the immutable target
//! through tool evidence and stage output to the final per-file result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A source file admitted to the pipeline. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct EvaluationTarget {
    pub path: PathBuf,
    pub source: String,
    pub language: &'static str,
}

impl EvaluationTarget {
    pub fn new(path: PathBuf, source: String, language: &'static str) -> Self {
        Self {
            path,
            source,
            language,
        }
    }

    /// Display name used in logs and prompts.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// One diagnostic emitted by a deterministic analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFinding {
    pub line: u32,
    /// Tool-native classification ("error", "convention", "HIGH", ...)
    pub severity: String,
    /// Rule or message identifier, empty when the tool has none
    #[serde(default)]
    pub code: String,
    pub message: String,
}

impl ToolFinding {
    pub fn new(
        line: u32,
        severity: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            severity: severity.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Cyclomatic complexity of one function, method or block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityBlock {
    pub name: String,
    pub kind: String,
    pub complexity: u32,
    pub line: u32,
}

/// Output of one analyzer run. A failed tool carries `error` and keeps
/// whatever it managed to collect before failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub findings: Vec<ToolFinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub complexity: Vec<ComplexityBlock>,
    /// Overall quality signal reported by the tool itself (pylint's 0-10 score)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ..Self::default()
        }
    }

    pub fn failed(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_findings(mut self, findings: Vec<ToolFinding>) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_complexity(mut self, blocks: Vec<ComplexityBlock>) -> Self {
        self.complexity = blocks;
        self
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Tool results after the owning profile's noise reduction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilteredEvidence {
    pub tools: Vec<ToolResult>,
}

impl FilteredEvidence {
    pub fn new(tools: Vec<ToolResult>) -> Self {
        Self { tools }
    }

    pub fn tool(&self, name: &str) -> Option<&ToolResult> {
        self.tools.iter().find(|t| t.tool == name)
    }

    /// Highest complexity reported by any tool, 0 when none was measured.
    pub fn max_complexity(&self) -> u32 {
        self.tools
            .iter()
            .flat_map(|t| t.complexity.iter())
            .map(|b| b.complexity)
            .max()
            .unwrap_or(0)
    }

    pub fn finding_count(&self) -> usize {
        self.tools.iter().map(|t| t.findings.len()).sum()
    }

    pub fn failed_tools(&self) -> impl Iterator<Item = &ToolResult> {
        self.tools.iter().filter(|t| !t.is_ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    Security,
    Logic,
    Pattern,
}

impl IssueCategory {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "security" => Some(Self::Security),
            "logic" => Some(Self::Logic),
            "pattern" => Some(Self::Pattern),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "Security",
            Self::Logic => "Logic",
            Self::Pattern => "Pattern",
        }
    }
}

/// A Detective proposal awaiting the Judge. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateIssue {
    pub line: u32,
    pub issue: String,
    #[serde(rename = "type")]
    pub category: IssueCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    /// Accepts only the three canonical names (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "major" => Some(Self::Major),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::Major => "Major",
            Self::Minor => "Minor",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Judge-approved finding backed by a literal quote from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedViolation {
    pub line: u32,
    pub message: String,
    pub proof_quote: String,
    pub reasoning: String,
    pub severity: Severity,
    pub fix_suggestion: String,
}

/// Per-file pipeline state. `Failed` is terminal and reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    ToolsRun,
    EvidenceFiltered,
    Retrieved,
    Detected,
    Judged,
    Scored,
    Reported,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::ToolsRun => "tools_run",
            Stage::EvidenceFiltered => "evidence_filtered",
            Stage::Retrieved => "retrieved",
            Stage::Detected => "detected",
            Stage::Judged => "judged",
            Stage::Scored => "scored",
            Stage::Reported => "reported",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome for one file. `score` is `None` exactly when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub file: PathBuf,
    pub language: String,
    pub score: Option<u8>,
    pub summary: String,
    pub violations: Vec<VerifiedViolation>,
    #[serde(default)]
    pub judge_degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn failed(file: PathBuf, language: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            file,
            language: language.into(),
            score: None,
            summary: error.clone(),
            violations: Vec::new(),
            judge_degraded: false,
            notes: Vec::new(),
            stage: Stage::Failed,
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
