//! First reasoning pass: propose candidate issues

use crate::error::ReasoningError;
use crate::model::{CandidateIssue, IssueCategory};
use crate::profile::Prompt;
use crate::reasoning::parse::{salvage_json, JsonShape};
use crate::reasoning::ReasoningClient;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectiveOutcome {
    pub candidates: Vec<CandidateIssue>,
    pub notes: Vec<String>,
}

impl DetectiveOutcome {
    fn degraded(note: String) -> Self {
        Self {
            candidates: Vec::new(),
            notes: vec![note],
        }
    }
}

/// Line numbers arrive as integers or numeric strings.
pub(crate) fn line_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn candidate(entry: &Value) -> Option<CandidateIssue> {
    let line = line_number(entry.get("line"))?;
    let issue = entry.get("issue")?.as_str()?.trim();
    if issue.is_empty() {
        return None;
    }
    let category = IssueCategory::parse(entry.get("type")?.as_str()?)?;
    Some(CandidateIssue {
        line,
        issue: issue.to_string(),
        category,
    })
}

/// Candidates from a raw response. Unusable entries are skipped and
/// counted; an unparsable response is an error.
pub fn parse_candidates(response: &str) -> Result<(Vec<CandidateIssue>, usize), String> {
    let value = salvage_json(response, JsonShape::Array)?;
    let entries = value.as_array().map(Vec::as_slice).unwrap_or_default();
    let candidates: Vec<CandidateIssue> = entries.iter().filter_map(candidate).collect();
    let skipped = entries.len() - candidates.len();
    Ok((candidates, skipped))
}

/// Run the Detective. Exhausted transient failures and malformed output
/// degrade to zero candidates; any other backend failure is returned.
pub async fn detect(
    client: &dyn ReasoningClient,
    prompt: &Prompt,
) -> Result<DetectiveOutcome, ReasoningError> {
    let response = match client.send(&prompt.system, &prompt.user).await {
        Ok(text) => text,
        Err(err) if err.is_transient() => {
            tracing::warn!(error = %err, "detective unavailable; continuing without candidates");
            return Ok(DetectiveOutcome::degraded(format!(
                "detective: backend unavailable ({})",
                err
            )));
        }
        Err(err) => return Err(err),
    };

    match parse_candidates(&response) {
        Ok((candidates, skipped)) => {
            let mut notes = Vec::new();
            if skipped > 0 {
                tracing::debug!(skipped, "detective entries without line, issue or valid type");
                notes.push(format!("detective: skipped {} unusable entries", skipped));
            }
            tracing::debug!(candidates = candidates.len(), "detective finished");
            Ok(DetectiveOutcome { candidates, notes })
        }
        Err(err) => {
            tracing::warn!(error = %err, "detective response unparsable; continuing without candidates");
            Ok(DetectiveOutcome::degraded(format!(
                "detective: malformed response ({})",
                err
            )))
        }
    }
}
