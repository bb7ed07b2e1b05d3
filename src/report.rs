//! Run report: console rendering plus JSON and CSV export

use crate::model::{EvaluationResult, Severity};
use crate::scoring::Grade;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use uuid::Uuid;

/// Inner width of a per-file detail panel
const PANEL_WIDTH: usize = 72;
const FILE_COLUMN_MAX: usize = 48;
const CSV_HEADER: &str = "file,language,score,violations_count,summary,judge_degraded,error";

/// Aggregate figures over one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub files: usize,
    pub scored: usize,
    pub failed: usize,
    pub judge_degraded: usize,
    /// Mean score over scored files, `None` when nothing was scored
    pub average_score: Option<f64>,
    pub elapsed_secs: f64,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub results: Vec<EvaluationResult>,
}

impl RunReport {
    pub fn new(results: Vec<EvaluationResult>, elapsed: Duration, workers: usize) -> Self {
        let scores: Vec<u8> = results.iter().filter_map(|r| r.score).collect();
        let average_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64)
        };
        let summary = RunSummary {
            files: results.len(),
            scored: scores.len(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
            judge_degraded: results.iter().filter(|r| r.judge_degraded).count(),
            average_score,
            elapsed_secs: elapsed.as_secs_f64(),
            workers,
        };
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            summary,
            results,
        }
    }
}

/// Cut `text` to `width` display columns (marking the cut with `…`), then
/// pad with spaces to exactly `width`.
pub fn fit(text: &str, width: usize) -> String {
    let mut out = String::new();
    if text.width() <= width {
        out.push_str(text);
    } else if width > 0 {
        let mut used = 0;
        for ch in text.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > width - 1 {
                break;
            }
            out.push(ch);
            used += w;
        }
        out.push('…');
    }
    let pad = width.saturating_sub(out.width());
    out.push_str(&" ".repeat(pad));
    out
}

/// Greedy word wrap at `width` display columns.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.width() + 1 + word.width() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "!!",
        Severity::Major => "! ",
        Severity::Minor => "· ",
    }
}

fn score_label(result: &EvaluationResult) -> String {
    match result.score {
        Some(score) => format!("{}/100 ({})", score, Grade::from_score(score)),
        None => "FAILED".to_string(),
    }
}

fn render_panel(out: &mut String, result: &EvaluationResult) {
    let rule = "─".repeat(PANEL_WIDTH + 2);
    let label = score_label(result);
    let header_width = PANEL_WIDTH.saturating_sub(label.width() + 1);
    let _ = writeln!(out, "┌{}┐", rule);
    let _ = writeln!(
        out,
        "│ {} {} │",
        fit(&result.file.display().to_string(), header_width),
        label
    );
    let _ = writeln!(out, "├{}┤", rule);
    let language = format!("Language: {}", result.language);
    let _ = writeln!(out, "│ {} │", fit(&language, PANEL_WIDTH));
    if let Some(score) = result.score {
        let verdict = format!("Verdict:  {}", Grade::from_score(score).description());
        let _ = writeln!(out, "│ {} │", fit(&verdict, PANEL_WIDTH));
    }
    for line in wrap(&result.summary, PANEL_WIDTH) {
        let _ = writeln!(out, "│ {} │", fit(&line, PANEL_WIDTH));
    }
    if result.judge_degraded {
        let _ = writeln!(
            out,
            "│ {} │",
            fit("Judge degraded: violations were not verified.", PANEL_WIDTH)
        );
    }
    let _ = writeln!(out, "└{}┘", rule);

    for violation in &result.violations {
        let _ = writeln!(
            out,
            "  {} L{:<5} {:<8} {}",
            severity_marker(violation.severity),
            violation.line,
            violation.severity,
            violation.message
        );
        let _ = writeln!(out, "       proof:  {}", violation.proof_quote.trim());
        if !violation.fix_suggestion.is_empty() {
            let _ = writeln!(out, "       fix:    {}", violation.fix_suggestion);
        }
    }
    for note in &result.notes {
        let _ = writeln!(out, "  note: {}", note);
    }
    out.push('\n');
}

fn render_table(out: &mut String, results: &[EvaluationResult]) {
    let file_width = results
        .iter()
        .map(|r| r.file.display().to_string().width())
        .max()
        .unwrap_or(4)
        .clamp(4, FILE_COLUMN_MAX);
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        fit("File", file_width),
        fit("Language", 8),
        fit("Score", 5),
        fit("Grade", 5),
        "Violations"
    );
    let _ = writeln!(out, "{}", "─".repeat(file_width + 8 + 5 + 5 + 10 + 8));
    for result in results {
        let (score, grade) = match result.score {
            Some(score) => (score.to_string(), Grade::from_score(score).to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        let status = if result.is_failed() {
            "failed".to_string()
        } else if result.judge_degraded {
            format!("{} (degraded)", result.violations.len())
        } else {
            result.violations.len().to_string()
        };
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            fit(&result.file.display().to_string(), file_width),
            fit(&result.language, 8),
            fit(&score, 5),
            fit(&grade, 5),
            status
        );
    }
}

pub fn summary_line(summary: &RunSummary) -> String {
    let average = summary
        .average_score
        .map(|avg| format!("{:.1}", avg))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "Average score: {} over {} scored file(s) | files: {} | failed: {} | judge degraded: {} | elapsed: {:.1}s | workers: {}",
        average,
        summary.scored,
        summary.files,
        summary.failed,
        summary.judge_degraded,
        summary.elapsed_secs,
        summary.workers
    )
}

/// Detail panels, summary table and aggregate line.
pub fn render_console(report: &RunReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        render_panel(&mut out, result);
    }
    render_table(&mut out, &report.results);
    out.push('\n');
    out.push_str(&summary_line(&report.summary));
    out.push('\n');
    out
}

/// Directories that hold at least one discovered file.
#[derive(Default)]
struct DirNode {
    dirs: BTreeMap<String, DirNode>,
    files: Vec<String>,
}

impl DirNode {
    fn insert(&mut self, parts: &[String]) {
        match parts {
            [] => {}
            [file] => self.files.push(file.clone()),
            [dir, rest @ ..] => self.dirs.entry(dir.clone()).or_default().insert(rest),
        }
    }

    fn render(&self, out: &mut String, prefix: &str) {
        let mut files = self.files.clone();
        files.sort();
        let entries: Vec<(&str, Option<&DirNode>)> = self
            .dirs
            .iter()
            .map(|(name, node)| (name.as_str(), Some(node)))
            .chain(files.iter().map(|name| (name.as_str(), None)))
            .collect();
        for (i, (name, node)) in entries.iter().enumerate() {
            let last = i + 1 == entries.len();
            let connector = if last { "└── " } else { "├── " };
            match node {
                Some(node) => {
                    let _ = writeln!(out, "{}{}{}/", prefix, connector, name);
                    let child = format!("{}{}", prefix, if last { "    " } else { "│   " });
                    node.render(out, &child);
                }
                None => {
                    let _ = writeln!(out, "{}{}{}", prefix, connector, name);
                }
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Project structure shown before evaluation: only directories containing
/// discovered files appear. A single file given directly is shown by name.
pub fn render_tree(root: &Path, files: &[PathBuf]) -> String {
    if files.is_empty() {
        return String::new();
    }
    if files.len() == 1 && files[0] == root {
        return format!("{}\n", display_name(root));
    }

    let mut tree = DirNode::default();
    for file in files {
        let relative = file.strip_prefix(root).unwrap_or(file);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        tree.insert(&parts);
    }

    let rule = "─".repeat(40);
    let mut out = String::new();
    let _ = writeln!(out, "Project Structure\n{}", rule);
    let _ = writeln!(out, "{}/", display_name(root));
    tree.render(&mut out, "");
    let _ = writeln!(out, "{}", rule);
    out
}

/// `Found N file(s) to evaluate (2 .cs, 3 .py).`
pub fn discovery_line(files: &[PathBuf]) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        let extension = file
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| "(no extension)".to_string());
        *counts.entry(extension).or_default() += 1;
    }
    let breakdown: Vec<String> = counts
        .iter()
        .map(|(extension, count)| format!("{} {}", count, extension))
        .collect();
    format!(
        "Found {} file(s) to evaluate ({}).",
        files.len(),
        breakdown.join(", ")
    )
}

pub fn to_json(report: &RunReport) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(results: &[EvaluationResult]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for result in results {
        let row = [
            csv_field(&result.file.display().to_string()),
            csv_field(&result.language),
            result.score.map(|s| s.to_string()).unwrap_or_default(),
            result.violations.len().to_string(),
            csv_field(&result.summary),
            result.judge_degraded.to_string(),
            csv_field(result.error.as_deref().unwrap_or_default()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Export format chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    pub fn for_path(path: &Path) -> anyhow::Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            _ => anyhow::bail!(
                "Unsupported report format '{}': use a .json or .csv file",
                path.display()
            ),
        }
    }
}

/// Write the report to `path`, choosing the format from its extension.
pub fn export(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let content = match ReportFormat::for_path(path)? {
        ReportFormat::Json => to_json(report)?,
        ReportFormat::Csv => to_csv(&report.results),
    };
    fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    tracing::info!(path = %path.display(), "report exported");
    Ok(())
}
