//! C# analyzers: compiler diagnostics, DevSkim and a regex complexity estimate

use super::{execute, Tool};
use crate::config::ToolSettings;
use crate::model::{ComplexityBlock, EvaluationTarget, ToolFinding, ToolResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DOTNET_BUILD: &str = "dotnet_build";
pub const DEVSKIM: &str = "devskim";
pub const COMPLEXITY: &str = "complexity";

/// Parent directories searched for a project file
const MAX_PROJECT_SEARCH_DEPTH: usize = 20;

/// Identifiers the method matcher can mistake for a method name
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "using", "lock", "return", "new", "fixed",
];

// ── dotnet build ────────────────────────────────────────────────────────

pub struct DotnetBuild;

/// Nearest `*.csproj` at or above `start`, searching at most
/// [`MAX_PROJECT_SEARCH_DEPTH`] levels.
pub fn find_nearest_project(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    for _ in 0..MAX_PROJECT_SEARCH_DEPTH {
        let dir = current?;
        if let Ok(entries) = fs::read_dir(dir) {
            let mut projects: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csproj"))
                .collect();
            projects.sort();
            if let Some(first) = projects.into_iter().next() {
                return Some(first);
            }
        }
        current = dir.parent();
    }
    None
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn build_diagnostic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\)\s*:\s*(?P<level>error|warning)\s+(?P<id>\w+)\s*:\s*(?P<msg>.+)$",
        )
        .expect("msbuild diagnostic regex compiles")
    })
}

/// Extract MSBuild diagnostics that point at `source`. Each diagnostic is
/// kept once even when MSBuild repeats it.
pub fn parse_build_output(output: &str, source: &Path) -> Vec<ToolFinding> {
    let pattern = build_diagnostic_pattern();
    let mut seen = HashSet::new();
    let mut findings = Vec::new();
    for line in output.lines() {
        let Some(caps) = pattern.captures(line.trim_end()) else {
            continue;
        };
        if !same_file(Path::new(caps["file"].trim()), source) {
            continue;
        }
        let Ok(line_no) = caps["line"].parse::<u32>() else {
            continue;
        };
        let message = strip_project_suffix(caps["msg"].trim());
        if !seen.insert((line_no, caps["id"].to_string(), message.to_string())) {
            continue;
        }
        findings.push(ToolFinding::new(line_no, &caps["level"], &caps["id"], message));
    }
    findings
}

/// MSBuild appends ` [/path/App.csproj]` to every diagnostic.
fn strip_project_suffix(message: &str) -> &str {
    match message.rfind(" [") {
        Some(idx) if message.ends_with(".csproj]") => message[..idx].trim_end(),
        _ => message,
    }
}

impl Tool for DotnetBuild {
    fn name(&self) -> &'static str {
        DOTNET_BUILD
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        let source = fs::canonicalize(&target.path).unwrap_or_else(|_| target.path.clone());
        let Some(project) = source.parent().and_then(find_nearest_project) else {
            return ToolResult::failed(
                DOTNET_BUILD,
                "No .csproj found; dotnet build diagnostics unavailable. \
                 Place a .csproj in a parent directory to enable compilation checks.",
            );
        };
        let project_arg = project.to_string_lossy();
        let args = [
            "build",
            project_arg.as_ref(),
            "--no-restore",
            "-consoleloggerparameters:NoSummary",
            "-verbosity:quiet",
        ];
        match execute("dotnet build", "dotnet", &args, None, settings) {
            Ok(output) => {
                let combined = format!("{}\n{}", output.stdout, output.stderr);
                ToolResult::new(DOTNET_BUILD).with_findings(parse_build_output(&combined, &source))
            }
            Err(e) => ToolResult::failed(DOTNET_BUILD, e),
        }
    }
}

// ── DevSkim ─────────────────────────────────────────────────────────────

pub struct DevSkim;

#[derive(Debug, Deserialize)]
struct Sarif {
    #[serde(default)]
    runs: Vec<SarifRun>,
}

#[derive(Debug, Deserialize)]
struct SarifRun {
    #[serde(default)]
    results: Vec<SarifResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    #[serde(default)]
    rule_id: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<SarifMessage>,
    #[serde(default)]
    locations: Vec<SarifLocation>,
}

#[derive(Debug, Deserialize)]
struct SarifMessage {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    physical_location: Option<SarifPhysicalLocation>,
}

#[derive(Debug, Deserialize)]
struct SarifPhysicalLocation {
    region: Option<SarifRegion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifRegion {
    #[serde(default)]
    start_line: u32,
}

pub fn parse_sarif(stdout: &str) -> Result<ToolResult, String> {
    let sarif: Sarif = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("Failed to parse DevSkim output: {}", e))?;
    let findings = sarif
        .runs
        .into_iter()
        .flat_map(|run| run.results)
        .map(|r| {
            let line = r
                .locations
                .first()
                .and_then(|l| l.physical_location.as_ref())
                .and_then(|p| p.region.as_ref())
                .map(|region| region.start_line)
                .unwrap_or(0);
            ToolFinding::new(
                line,
                r.level.unwrap_or_else(|| "warning".to_string()),
                r.rule_id,
                r.message.map(|m| m.text).unwrap_or_default(),
            )
        })
        .collect();
    Ok(ToolResult::new(DEVSKIM).with_findings(findings))
}

impl Tool for DevSkim {
    fn name(&self) -> &'static str {
        DEVSKIM
    }

    fn run(&self, target: &EvaluationTarget, settings: &ToolSettings) -> ToolResult {
        let path = target.path.to_string_lossy();
        let args = ["analyze", "--source-code", path.as_ref(), "-f", "sarif", "-o", "-"];
        match execute("DevSkim", "devskim", &args, None, settings) {
            Ok(output) if output.stdout.trim().is_empty() => ToolResult::new(DEVSKIM),
            Ok(output) => {
                parse_sarif(&output.stdout).unwrap_or_else(|e| ToolResult::failed(DEVSKIM, e))
            }
            Err(e) if e.contains("not found") => ToolResult::failed(
                DEVSKIM,
                "'devskim' CLI not found. Install via: dotnet tool install -g Microsoft.CST.DevSkim.CLI",
            ),
            Err(e) => ToolResult::failed(DEVSKIM, e),
        }
    }
}

// ── complexity ──────────────────────────────────────────────────────────

/// In-process estimate: 1 + branch points inside each method body.
pub struct RegexComplexity;

/// Text between the brace at `open` and its matching close brace. An
/// unbalanced block runs to the end of the source.
fn brace_block(source: &str, open: usize) -> &str {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    for (i, byte) in bytes.iter().enumerate().skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &source[open + 1..i];
                }
            }
            _ => {}
        }
    }
    source.get(open + 1..).unwrap_or("")
}

fn method_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|virtual|override|async|abstract|sealed|extern|unsafe|partial)\s+)*[\w<>\[\],.?]+(?:\s+[\w<>\[\],.?]+)*?\s+(?P<name>\w+)\s*\([^)]*\)\s*\{",
        )
        .expect("method regex compiles")
    })
}

fn branch_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:if|else\s+if|case|for|foreach|while|do|catch)\b|&&|\|\||\?\?")
            .expect("branch regex compiles")
    })
}

pub fn estimate_complexity(source: &str) -> Vec<ComplexityBlock> {
    let method = method_pattern();
    let branch = branch_pattern();

    let mut blocks = Vec::new();
    for caps in method.captures_iter(source) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
            continue;
        };
        if CONTROL_KEYWORDS.contains(&name.as_str()) {
            continue;
        }
        let body = brace_block(source, whole.end() - 1);
        let complexity = 1 + branch.find_iter(body).count() as u32;
        let line = source[..whole.start()].matches('\n').count() as u32 + 1;
        blocks.push(ComplexityBlock {
            name: name.as_str().to_string(),
            kind: "method".to_string(),
            complexity,
            line,
        });
    }
    blocks
}

impl Tool for RegexComplexity {
    fn name(&self) -> &'static str {
        COMPLEXITY
    }

    fn run(&self, target: &EvaluationTarget, _settings: &ToolSettings) -> ToolResult {
        ToolResult::new(COMPLEXITY).with_complexity(estimate_complexity(&target.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_output_keeps_only_this_file() {
        let output = "\
/src/App/Program.cs(12,17): warning CS0168: The variable 'ex' is declared but never used [/src/App/App.csproj]
/src/App/Program.cs(12,17): warning CS0168: The variable 'ex' is declared but never used [/src/App/App.csproj]
/src/App/Other.cs(3,1): error CS1002: ; expected [/src/App/App.csproj]
/src/App/Program.cs(30,5): error CS0103: The name 'foo' does not exist in the current context [/src/App/App.csproj]
Build FAILED.
";
        let findings = parse_build_output(output, Path::new("/src/App/Program.cs"));
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].code, "CS0168");
        assert_eq!(findings[0].severity, "warning");
        assert_eq!(
            findings[0].message,
            "The variable 'ex' is declared but never used"
        );
        assert_eq!(findings[1].line, 30);
        assert_eq!(findings[1].severity, "error");
    }

    #[test]
    fn test_find_nearest_project_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("src").join("Services");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("App.csproj"), "<Project />").unwrap();

        let found = find_nearest_project(&nested).unwrap();
        assert_eq!(found.file_name().unwrap(), "App.csproj");
    }

    #[test]
    fn test_parse_sarif() {
        let stdout = r#"{"version": "2.1.0", "runs": [{"results": [
            {"ruleId": "DS126858", "level": "error",
             "message": {"text": "Weak/Broken Hash Algorithm"},
             "locations": [{"physicalLocation": {"region": {"startLine": 9, "startColumn": 4}}}]},
            {"ruleId": "DS137138", "message": {"text": "Insecure URL"}, "locations": []}
        ]}]}"#;
        let result = parse_sarif(stdout).unwrap();
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].line, 9);
        assert_eq!(result.findings[0].severity, "error");
        assert_eq!(result.findings[0].code, "DS126858");
        assert_eq!(result.findings[1].line, 0);
        assert_eq!(result.findings[1].severity, "warning");
    }

    #[test]
    fn test_estimate_complexity_counts_branches() {
        let source = r#"
public class OrderService
{
    public decimal Total(List<Order> orders, bool vip)
    {
        decimal sum = 0;
        foreach (var o in orders)
        {
            if (o.Paid && !o.Refunded)
            {
                sum += o.Amount;
            }
            else if (vip || o.Trial)
            {
                sum += 0;
            }
        }
        return sum;
    }

    private static string Name(User u)
    {
        return u?.Name ?? "anon";
    }
}
"#;
        let blocks = estimate_complexity(source);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Total", "Name"]);
        // foreach, if, &&, else if, ||
        assert_eq!(blocks[0].complexity, 6);
        assert_eq!(blocks[0].line, 4);
        // ??
        assert_eq!(blocks[1].complexity, 2);
    }

    #[test]
    fn test_brace_block_unbalanced_runs_to_end() {
        let source = "void F() { if (x) { y(); ";
        let open = source.find('{').unwrap();
        assert_eq!(brace_block(source, open), " if (x) { y(); ");
    }
}
