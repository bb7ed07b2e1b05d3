//! Language profiles
//!
//! A [`LanguageProfile`] bundles everything language-specific about an
//! evaluation. The pipeline only ever talks to the trait; adding a language
//! means implementing it and registering the profile.

pub mod csharp;
pub mod prompts;
pub mod python;

pub use csharp::CSharpProfile;
pub use python::PythonProfile;

use crate::config::ToolSettings;
use crate::error::ResolveError;
use crate::model::{
    CandidateIssue, EvaluationTarget, FilteredEvidence, ToolFinding, ToolResult, VerifiedViolation,
};
use crate::scoring;
use crate::tools::{run_in_order, semgrep, Tool};
use std::path::Path;
use std::sync::Arc;

/// Findings listed per tool in a prompt
pub const EVIDENCE_SUMMARY_LIMIT: usize = 25;

/// Topic appended to every query set
pub const GENERAL_TOPIC: &str = "general code style";

/// A system prompt plus the user payload for one reasoning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub trait LanguageProfile: Send + Sync {
    /// Registry key, e.g. `python`
    fn name(&self) -> &'static str;

    /// Alternative names accepted by an explicit override
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Lower-case extensions including the dot
    fn extensions(&self) -> &'static [&'static str];

    /// Analyzers in execution order
    fn tools(&self) -> &[Box<dyn Tool>];

    /// Run every enabled analyzer in order. One failing tool never stops
    /// the rest.
    fn run_tools(&self, target: &EvaluationTarget, settings: &ToolSettings) -> Vec<ToolResult> {
        let active = self
            .tools()
            .iter()
            .map(|tool| tool.as_ref())
            .filter(|tool| settings.semgrep || tool.name() != semgrep::SEMGREP);
        run_in_order(active, target, settings)
    }

    fn filter(&self, results: Vec<ToolResult>) -> FilteredEvidence;

    fn derive_queries(&self, source: &str) -> Vec<String>;

    fn detective_prompt(
        &self,
        target: &EvaluationTarget,
        evidence: &FilteredEvidence,
        guidance: &[String],
    ) -> Prompt;

    fn judge_prompt(
        &self,
        target: &EvaluationTarget,
        candidates: &[CandidateIssue],
        evidence: &FilteredEvidence,
    ) -> Prompt;

    fn score(&self, violations: &[VerifiedViolation], evidence: &FilteredEvidence) -> u8 {
        scoring::score(violations, evidence)
    }
}

/// Topics whose keyword occurs in `source`, in table order, without
/// repeats, followed by [`GENERAL_TOPIC`].
pub fn queries_from_table(table: &[(&str, &str)], source: &str) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    for (keyword, topic) in table {
        if source.contains(keyword) && !queries.iter().any(|q| q == topic) {
            queries.push(topic.to_string());
        }
    }
    if !queries.iter().any(|q| q == GENERAL_TOPIC) {
        queries.push(GENERAL_TOPIC.to_string());
    }
    queries
}

/// `  L<line>: [<severity>] <code> <message>`
pub fn format_finding(finding: &ToolFinding) -> String {
    let code = if finding.code.is_empty() {
        String::new()
    } else {
        format!("{} ", finding.code)
    };
    format!(
        "  L{}: [{}] {}{}",
        finding.line, finding.severity, code, finding.message
    )
}

/// Prompt section for one tool: its error, a note that it found nothing,
/// or up to [`EVIDENCE_SUMMARY_LIMIT`] formatted findings.
pub fn summarize_tool<F>(result: Option<&ToolResult>, none_found: &str, format: F) -> String
where
    F: Fn(&ToolFinding) -> String,
{
    let Some(result) = result else {
        return "  Not run.".to_string();
    };
    if let Some(err) = &result.error {
        return format!("  Error: {}", err);
    }
    if result.findings.is_empty() {
        return format!("  {}", none_found);
    }
    let mut lines: Vec<String> = result
        .findings
        .iter()
        .take(EVIDENCE_SUMMARY_LIMIT)
        .map(format)
        .collect();
    let hidden = result.findings.len().saturating_sub(EVIDENCE_SUMMARY_LIMIT);
    if hidden > 0 {
        lines.push(format!("  ... {} more", hidden));
    }
    lines.join("\n")
}

/// Semgrep section, shared by every profile.
pub fn summarize_semgrep(evidence: &FilteredEvidence) -> Option<String> {
    let result = evidence.tool(semgrep::SEMGREP)?;
    Some(summarize_tool(Some(result), "No Semgrep findings.", |f| {
        let rule = if f.code.is_empty() {
            "?"
        } else {
            semgrep::short_rule_id(&f.code)
        };
        format!("  L{}: [{}] {} - {}", f.line, f.severity, rule, f.message)
    }))
}

pub fn guidance_section(guidance: &[String]) -> String {
    if guidance.is_empty() {
        "(Retrieval disabled or no matching guidelines.)".to_string()
    } else {
        guidance.join("\n\n")
    }
}

pub fn candidates_section(candidates: &[CandidateIssue]) -> String {
    if candidates.is_empty() {
        return "[]  (The first pass found no potential issues.)".to_string();
    }
    serde_json::to_string_pretty(candidates).unwrap_or_else(|_| "[]".to_string())
}

/// Statically registered profiles, matched by extension or by name.
#[derive(Clone, Default)]
pub struct ProfileRegistry {
    profiles: Vec<Arc<dyn LanguageProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Python and C#.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonProfile::new()));
        registry.register(Arc::new(CSharpProfile::new()));
        registry
    }

    pub fn register(&mut self, profile: Arc<dyn LanguageProfile>) {
        self.profiles.push(profile);
    }

    /// Every registered extension, in registration order.
    pub fn extensions(&self) -> Vec<&'static str> {
        self.profiles
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }

    /// Look a profile up by name or alias (case-insensitive).
    pub fn by_name(&self, name: &str) -> Result<Arc<dyn LanguageProfile>, ResolveError> {
        let wanted = name.trim().to_lowercase();
        self.profiles
            .iter()
            .find(|p| p.name() == wanted || p.aliases().contains(&wanted.as_str()))
            .cloned()
            .ok_or_else(|| ResolveError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Profile for `path`. An explicit `language` bypasses extension
    /// detection entirely.
    pub fn resolve(
        &self,
        path: &Path,
        language: Option<&str>,
    ) -> Result<Arc<dyn LanguageProfile>, ResolveError> {
        if let Some(name) = language {
            return self.by_name(name);
        }
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        self.profiles
            .iter()
            .find(|p| p.extensions().contains(&extension.as_str()))
            .cloned()
            .ok_or(ResolveError::NotSupported { extension })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueCategory;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_by_extension_is_case_insensitive() {
        let registry = ProfileRegistry::builtin();
        assert_eq!(
            registry.resolve(Path::new("a/b/app.py"), None).unwrap().name(),
            "python"
        );
        assert_eq!(
            registry.resolve(Path::new("Program.CS"), None).unwrap().name(),
            "csharp"
        );
    }

    #[test]
    fn test_resolve_unsupported_extension() {
        let registry = ProfileRegistry::builtin();
        let err = registry.resolve(Path::new("main.rb"), None).err().unwrap();
        assert_eq!(
            err,
            ResolveError::NotSupported {
                extension: ".rb".into()
            }
        );
        // No globbing or prefix matching
        assert!(registry.resolve(Path::new("x.pyc"), None).is_err());
        assert!(registry.resolve(Path::new("Makefile"), None).is_err());
    }

    #[test]
    fn test_override_bypasses_detection() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.resolve(Path::new("script.txt"), Some("C#")).unwrap();
        assert_eq!(profile.name(), "csharp");

        let err = registry.resolve(Path::new("app.py"), Some("cobol")).err().unwrap();
        assert_eq!(
            err,
            ResolveError::ProfileNotFound {
                name: "cobol".into()
            }
        );
    }

    #[test]
    fn test_queries_from_table_is_order_stable() {
        let table = [
            ("sqlite3", "database rules"),
            ("subprocess", "security subprocess rules"),
            ("psycopg", "database rules"),
        ];
        let source = "import subprocess\nimport psycopg\nimport sqlite3\n";
        assert_eq!(
            queries_from_table(&table, source),
            vec![
                "database rules",
                "security subprocess rules",
                "general code style"
            ]
        );
        assert_eq!(queries_from_table(&table, "x = 1"), vec!["general code style"]);
    }

    #[test]
    fn test_summarize_tool_caps_and_reports_errors() {
        let findings: Vec<ToolFinding> = (1..=30)
            .map(|i| ToolFinding::new(i, "warning", "W1", "m"))
            .collect();
        let result = ToolResult::new("lint").with_findings(findings);
        let text = summarize_tool(Some(&result), "none", format_finding);
        assert_eq!(text.lines().count(), EVIDENCE_SUMMARY_LIMIT + 1);
        assert!(text.ends_with("... 5 more"));

        let failed = ToolResult::failed("lint", "not installed");
        assert_eq!(
            summarize_tool(Some(&failed), "none", format_finding),
            "  Error: not installed"
        );
        assert_eq!(summarize_tool(None, "none", format_finding), "  Not run.");
    }

    #[test]
    fn test_candidates_section_serializes_type_field() {
        let candidates = vec![CandidateIssue {
            line: 4,
            issue: "SQL built by concatenation".into(),
            category: IssueCategory::Security,
        }];
        let text = candidates_section(&candidates);
        assert!(text.contains("\"type\": \"Security\""));
        assert!(candidates_section(&[]).starts_with("[]"));
    }

    #[test]
    fn test_prompts_embed_literal_source() {
        let registry = ProfileRegistry::builtin();
        let source = "query = \"SELECT * FROM t WHERE id = \" + user_id\n";
        let target = EvaluationTarget::new(PathBuf::from("q.py"), source.into(), "python");
        let profile = registry.resolve(&target.path, None).unwrap();
        let evidence = FilteredEvidence::default();
        let detective = profile.detective_prompt(&target, &evidence, &[]);
        let judge = profile.judge_prompt(&target, &[], &evidence);
        assert!(detective.user.contains(source));
        assert!(judge.user.contains(source));
        assert!(judge.system.contains("SAFE HARBOR"));
    }
}
