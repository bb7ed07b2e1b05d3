use super::{
    candidates_section, format_finding, guidance_section, prompts, queries_from_table,
    summarize_semgrep, summarize_tool, LanguageProfile, Prompt,
};
use crate::model::{CandidateIssue, EvaluationTarget, FilteredEvidence, ToolResult};
use crate::scoring::COMPLEXITY_THRESHOLD;
use crate::tools::csharp::{
    DevSkim, DotnetBuild, RegexComplexity, COMPLEXITY, DEVSKIM, DOTNET_BUILD,
};
use crate::tools::semgrep::Semgrep;
use crate::tools::Tool;

/// Compiler diagnostics that never reach the reviewers
pub const IGNORED_BUILD_IDS: &[&str] = &[
    "CS1591", // missing XML comment
];

const QUERY_TABLE: &[(&str, &str)] = &[
    ("System.Data", "database rules"),
    ("SqlClient", "database rules"),
    ("EntityFramework", "database rules"),
    ("Microsoft.EntityFrameworkCore", "database rules"),
    ("System.Diagnostics.Process", "security subprocess rules"),
    ("Process.Start", "security subprocess rules"),
    ("Assembly.Load", "security eval rules"),
    ("Activator.CreateInstance", "security eval rules"),
    ("Console.Write", "logging rules"),
    ("ILogger", "logging rules"),
    ("Serilog", "logging rules"),
    ("NLog", "logging rules"),
    ("System.Random", "security random token rules"),
    ("RandomNumberGenerator", "security random token rules"),
    ("System.Threading", "concurrency rules"),
    ("Task.Run", "concurrency rules"),
    ("Parallel.", "concurrency rules"),
    ("HttpClient", "error handling rules"),
    ("WebClient", "error handling rules"),
    ("Xunit", "testing rules"),
    ("NUnit", "testing rules"),
    ("MSTest", "testing rules"),
    ("Newtonsoft.Json", "serialization rules"),
    ("System.Text.Json", "serialization rules"),
    ("BinaryFormatter", "security deserialization rules"),
];

pub fn filter_build(mut result: ToolResult) -> ToolResult {
    result
        .findings
        .retain(|finding| !IGNORED_BUILD_IDS.contains(&finding.code.as_str()));
    result
}

pub struct CSharpProfile {
    tools: Vec<Box<dyn Tool>>,
}

impl CSharpProfile {
    pub fn new() -> Self {
        Self::with_tools(vec![
            Box::new(DotnetBuild),
            Box::new(DevSkim),
            Box::new(RegexComplexity),
            Box::new(Semgrep),
        ])
    }

    /// Profile running `tools` instead of the standard analyzers.
    pub fn with_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }
}

impl Default for CSharpProfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Methods above the complexity penalty threshold, worst first.
fn complexity_hotspots(evidence: &FilteredEvidence) -> String {
    let Some(result) = evidence.tool(COMPLEXITY) else {
        return "  Not run.".to_string();
    };
    let mut hot: Vec<_> = result
        .complexity
        .iter()
        .filter(|b| b.complexity > COMPLEXITY_THRESHOLD)
        .collect();
    if hot.is_empty() {
        return format!("  No method above complexity {}.", COMPLEXITY_THRESHOLD);
    }
    hot.sort_by(|a, b| b.complexity.cmp(&a.complexity));
    hot.iter()
        .map(|b| format!("  L{}: {} (complexity {})", b.line, b.name, b.complexity))
        .collect::<Vec<_>>()
        .join("\n")
}

impl LanguageProfile for CSharpProfile {
    fn name(&self) -> &'static str {
        "csharp"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["cs", "c#"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".cs"]
    }

    fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    fn filter(&self, results: Vec<ToolResult>) -> FilteredEvidence {
        let tools = results
            .into_iter()
            .map(|result| {
                if result.tool == DOTNET_BUILD {
                    filter_build(result)
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
        let devskim = summarize_tool(
            evidence.tool(DEVSKIM),
            "No security issues.",
            format_finding,
        );
        let mut user = format!(
            "### Source Code (`{}`)\n```csharp\n{}\n```\n\n### DevSkim Security Scan\n{}\n",
            target.path.display(),
            target.source,
            devskim
        );
        if let Some(semgrep) = summarize_semgrep(evidence) {
            user.push_str(&format!("\n### Semgrep Scan\n{}\n", semgrep));
        }
        user.push_str(&format!(
            "\n### Team Coding Guidelines\n{}\n\nList all potential issues as a JSON array. Be thorough.\n",
            guidance_section(guidance)
        ));
        Prompt {
            system: prompts::csharp_detective(),
            user,
        }
    }

    fn judge_prompt(
        &self,
        target: &EvaluationTarget,
        candidates: &[CandidateIssue],
        evidence: &FilteredEvidence,
    ) -> Prompt {
        let build = summarize_tool(
            evidence.tool(DOTNET_BUILD),
            "No build diagnostics.",
            format_finding,
        );
        let user = format!(
            "### Source Code (`{}`)\n```csharp\n{}\n```\n\n\
             ### Potential Issues\n{}\n\n\
             ### Build Diagnostics (dotnet build, filtered)\n{}\n\n\
             ### Complexity Hotspots\n{}\n\n\
             Review each finding. Discard false positives. Assign severity and fix \
             suggestions for real issues. Return the JSON.\n",
            target.path.display(),
            target.source,
            candidates_section(candidates),
            build,
            complexity_hotspots(evidence)
        );
        Prompt {
            system: prompts::csharp_judge(),
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComplexityBlock, ToolFinding};
    use std::path::PathBuf;

    #[test]
    fn test_filter_drops_missing_xml_comment() {
        let profile = CSharpProfile::new();
        let build = ToolResult::new(DOTNET_BUILD).with_findings(vec![
            ToolFinding::new(3, "warning", "CS1591", "Missing XML comment"),
            ToolFinding::new(9, "error", "CS0103", "Name does not exist"),
        ]);
        let evidence = profile.filter(vec![build]);
        let kept = &evidence.tool(DOTNET_BUILD).unwrap().findings;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].code, "CS0103");
    }

    #[test]
    fn test_derive_queries() {
        let profile = CSharpProfile::new();
        let source = "using System.Data.SqlClient;\nvar f = new BinaryFormatter();\nProcess.Start(cmd);";
        assert_eq!(
            profile.derive_queries(source),
            vec![
                "database rules",
                "security subprocess rules",
                "security deserialization rules",
                "general code style"
            ]
        );
    }

    #[test]
    fn test_judge_prompt_lists_hotspots() {
        let profile = CSharpProfile::new();
        let target = EvaluationTarget::new(
            PathBuf::from("Svc.cs"),
            "class Svc {}".into(),
            "csharp",
        );
        let evidence = FilteredEvidence::new(vec![ToolResult::new(COMPLEXITY).with_complexity(
            vec![ComplexityBlock {
                name: "Dispatch".into(),
                kind: "method".into(),
                complexity: 22,
                line: 14,
            }],
        )]);
        let prompt = profile.judge_prompt(&target, &[], &evidence);
        assert!(prompt.user.contains("L14: Dispatch (complexity 22)"));
        assert!(prompt.user.contains("```csharp\nclass Svc {}\n```"));
    }
}
