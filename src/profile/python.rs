use super::{
    candidates_section, format_finding, guidance_section, prompts, queries_from_table,
    summarize_semgrep, summarize_tool, LanguageProfile, Prompt,
};
use crate::model::{CandidateIssue, EvaluationTarget, FilteredEvidence, ToolResult};
use crate::tools::python::{Bandit, Mypy, Pylint, Radon, BANDIT, MYPY, PYLINT};
use crate::tools::semgrep::Semgrep;
use crate::tools::Tool;

/// Pylint message ids dropped regardless of the overall score
pub const IGNORED_PYLINT_IDS: &[&str] = &[
    "C0114", // missing-module-docstring
    "C0115", // missing-class-docstring
    "C0116", // missing-function-docstring
    "C0301", // line-too-long
    "W0511", // fixme
    "R0903", // too-few-public-methods
    "R0913", // too-many-arguments
];

/// Below this pylint score, convention/refactor findings are kept too
pub const LOW_PYLINT_SCORE_THRESHOLD: f64 = 5.0;

const QUERY_TABLE: &[(&str, &str)] = &[
    ("sqlalchemy", "database rules"),
    ("sqlite3", "database rules"),
    ("psycopg", "database rules"),
    ("pymongo", "database rules"),
    ("subprocess", "security subprocess rules"),
    ("os.system", "security subprocess rules"),
    ("eval", "security eval rules"),
    ("exec", "security eval rules"),
    ("print", "logging rules"),
    ("logging", "logging rules"),
    ("random", "security random token rules"),
    ("secrets", "security random token rules"),
    ("threading", "concurrency rules"),
    ("concurrent", "concurrency rules"),
    ("pytest", "testing rules"),
    ("unittest", "testing rules"),
    ("requests", "error handling rules"),
    ("flask", "error handling rules"),
    ("fastapi", "error handling rules"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PylintBucket {
    Fatal,
    Error,
    Warning,
    Convention,
    Refactor,
    Other,
}

impl PylintBucket {
    fn of(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "fatal" | "f" => Self::Fatal,
            "error" | "e" => Self::Error,
            "warning" | "w" => Self::Warning,
            "convention" | "c" => Self::Convention,
            "refactor" | "r" => Self::Refactor,
            _ => Self::Other,
        }
    }

    fn always_kept(self) -> bool {
        matches!(self, Self::Fatal | Self::Error | Self::Warning)
    }
}

/// Drop low-value pylint messages. Convention, refactor and unclassified
/// messages survive only when the file's pylint score is already poor; a
/// missing score counts as 0.
pub fn filter_pylint(mut result: ToolResult) -> ToolResult {
    let low_score = result.quality_score.unwrap_or(0.0) < LOW_PYLINT_SCORE_THRESHOLD;
    result.findings.retain(|finding| {
        if IGNORED_PYLINT_IDS.contains(&finding.code.trim()) {
            return false;
        }
        PylintBucket::of(&finding.severity).always_kept() || low_score
    });
    result
}

pub struct PythonProfile {
    tools: Vec<Box<dyn Tool>>,
}

impl PythonProfile {
    pub fn new() -> Self {
        Self::with_tools(vec![
            Box::new(Pylint),
            Box::new(Radon),
            Box::new(Bandit),
            Box::new(Mypy),
            Box::new(Semgrep),
        ])
    }

    /// Profile running `tools` instead of the standard analyzers.
    pub fn with_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }
}

impl Default for PythonProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageProfile for PythonProfile {
    fn name(&self) -> &'static str {
        "python"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".py"]
    }

    fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    fn filter(&self, results: Vec<ToolResult>) -> FilteredEvidence {
        let tools = results
            .into_iter()
            .map(|result| {
                if result.tool == PYLINT {
                    filter_pylint(result)
                } else {
                    result
                }
            })
            .collect();
        FilteredEvidence::new(tools)
    }

    fn derive_queries(&self, source: &str) -> Vec<String> {
        queries_from_table(QUERY_TABLE, source)
    }

    fn detective_prompt(
        &self,
        target: &EvaluationTarget,
        evidence: &FilteredEvidence,
        guidance: &[String],
    ) -> Prompt {
        let bandit = summarize_tool(
            evidence.tool(BANDIT),
            "No security issues.",
            format_finding,
        );
        let mut user = format!(
            "### Source Code (`{}`)\n```python\n{}\n```\n\n### Bandit Security Scan\n{}\n",
            target.path.display(),
            target.source,
            bandit
        );
        if let Some(semgrep) = summarize_semgrep(evidence) {
            user.push_str(&format!("\n### Semgrep Scan\n{}\n", semgrep));
        }
        user.push_str(&format!(
            "\n### Team Coding Guidelines\n{}\n\nList all potential issues as a JSON array. Be thorough.\n",
            guidance_section(guidance)
        ));
        Prompt {
            system: prompts::python_detective(),
            user,
        }
    }

    fn judge_prompt(
        &self,
        target: &EvaluationTarget,
        candidates: &[CandidateIssue],
        evidence: &FilteredEvidence,
    ) -> Prompt {
        let pylint = summarize_tool(evidence.tool(PYLINT), "No Pylint issues.", format_finding);
        let mypy = summarize_tool(evidence.tool(MYPY), "No MyPy type errors.", |f| {
            if f.code.is_empty() {
                format!("  L{}: {}", f.line, f.message)
            } else {
                format!("  L{}: {} [{}]", f.line, f.message, f.code)
            }
        });
        let bandit = summarize_tool(
            evidence.tool(BANDIT),
            "No security issues.",
            format_finding,
        );
        let user = format!(
            "### Source Code (`{}`)\n```python\n{}\n```\n\n\
             ### Potential Issues\n{}\n\n\
             ### Pylint Results (filtered)\n{}\n\n\
             ### MyPy Results\n{}\n\n\
             ### Bandit Security Scan\n{}\n\n\
             Review each finding. Discard false positives. Assign severity and fix \
             suggestions for real issues. Return the JSON.\n",
            target.path.display(),
            target.source,
            candidates_section(candidates),
            pylint,
            mypy,
            bandit
        );
        Prompt {
            system: prompts::python_judge(),
            user,
        }
    }
}
