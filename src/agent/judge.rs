//! Second reasoning pass: verify candidates and assign severity
//!
//! Every violation the model returns is checked locally before it is kept:
//! the proof quote must occur verbatim in the source, reasoning must be
//! present and must precede severity in the response object, and severity
//! must be one of the three canonical levels.

use super::detective::line_number;
use crate::error::ReasoningError;
use crate::model::{Severity, VerifiedViolation};
use crate::profile::Prompt;
use crate::reasoning::parse::{repair_request, salvage_json, JsonShape, REPAIR_SYSTEM_PROMPT};
use crate::reasoning::ReasoningClient;
use crate::util::truncate;
use serde_json::{Map, Value};

/// Characters of a rejected quote echoed into a note
const NOTE_QUOTE_CHARS: usize = 60;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeOutcome {
    pub violations: Vec<VerifiedViolation>,
    pub summary: String,
    /// True when no usable verdict was obtained
    pub degraded: bool,
    pub notes: Vec<String>,
}

impl JudgeOutcome {
    fn degraded(summary: &str, note: String) -> Self {
        Self {
            violations: Vec::new(),
            summary: summary.to_string(),
            degraded: true,
            notes: vec![note],
        }
    }
}

/// Why a returned violation was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
    MissingQuote,
    QuoteNotInSource(String),
    MissingReasoning,
    ReasoningAfterSeverity,
    InvalidSeverity(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotAnObject => write!(f, "entry is not an object"),
            Rejection::MissingQuote => write!(f, "no proof quote"),
            Rejection::QuoteNotInSource(quote) => write!(
                f,
                "proof quote not found in source: \"{}\"",
                truncate(quote, NOTE_QUOTE_CHARS)
            ),
            Rejection::MissingReasoning => write!(f, "no reasoning"),
            Rejection::ReasoningAfterSeverity => write!(f, "reasoning given after severity"),
            Rejection::InvalidSeverity(raw) => write!(f, "invalid severity '{}'", raw),
        }
    }
}

/// Validated Judge verdict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub violations: Vec<VerifiedViolation>,
    pub summary: String,
    pub rejected: Vec<(u32, Rejection)>,
}

fn text_field<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 1-based line of the first occurrence of `quote` in `source`.
fn line_of(source: &str, quote: &str) -> Option<u32> {
    let offset = source.find(quote)?;
    let line = source[..offset].matches('\n').count() + 1;
    u32::try_from(line).ok()
}

/// Returns the quote as it occurs in `source`. Surrounding whitespace the
/// model added is tolerated; anything else must match exactly.
fn locate_quote<'a>(source: &str, quote: &'a str) -> Option<&'a str> {
    if source.contains(quote) {
        return Some(quote);
    }
    let trimmed = quote.trim();
    (!trimmed.is_empty() && source.contains(trimmed)).then_some(trimmed)
}

fn check_violation(entry: &Value, source: &str) -> Result<VerifiedViolation, Rejection> {
    let entry = entry.as_object().ok_or(Rejection::NotAnObject)?;

    let raw_quote = entry
        .get("proof_quote")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or(Rejection::MissingQuote)?;
    let quote = locate_quote(source, raw_quote)
        .ok_or_else(|| Rejection::QuoteNotInSource(raw_quote.to_string()))?;

    let reasoning = text_field(entry, "reasoning").ok_or(Rejection::MissingReasoning)?;
    let position = |key: &str| entry.keys().position(|k| k == key);
    if let (Some(r), Some(s)) = (position("reasoning"), position("severity")) {
        if r > s {
            return Err(Rejection::ReasoningAfterSeverity);
        }
    }

    let raw_severity = entry.get("severity").and_then(Value::as_str).unwrap_or("");
    let severity = Severity::parse(raw_severity)
        .ok_or_else(|| Rejection::InvalidSeverity(raw_severity.to_string()))?;

    let line = line_number(entry.get("line"))
        .filter(|&l| l > 0)
        .or_else(|| line_of(source, quote))
        .unwrap_or(0);

    Ok(VerifiedViolation {
        line,
        message: text_field(entry, "message").unwrap_or(reasoning).to_string(),
        proof_quote: quote.to_string(),
        reasoning: reasoning.to_string(),
        severity,
        fix_suggestion: text_field(entry, "fix_suggestion")
            .unwrap_or_default()
            .to_string(),
    })
}

/// Check a parsed Judge object against `source`. A response without a
/// `verified_violations` array is malformed.
pub fn validate_verdict(value: &Value, source: &str) -> Result<Verdict, String> {
    let entries = value
        .get("verified_violations")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing 'verified_violations' array".to_string())?;

    let mut verdict = Verdict {
        summary: value
            .get("analysis_summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        ..Verdict::default()
    };
    for entry in entries {
        match check_violation(entry, source) {
            Ok(violation) => verdict.violations.push(violation),
            Err(reason) => {
                let line = line_number(entry.get("line")).unwrap_or(0);
                verdict.rejected.push((line, reason));
            }
        }
    }
    Ok(verdict)
}

fn parse_verdict(response: &str, source: &str) -> Result<Verdict, String> {
    let value = salvage_json(response, JsonShape::Object)?;
    validate_verdict(&value, source)
}

fn outcome(verdict: Verdict, mut notes: Vec<String>) -> JudgeOutcome {
    for (line, reason) in &verdict.rejected {
        tracing::debug!(line, reason = %reason, "judge violation rejected");
        notes.push(format!("judge: dropped violation at line {}: {}", line, reason));
    }
    let summary = if verdict.summary.is_empty() {
        format!("{} verified violation(s).", verdict.violations.len())
    } else {
        verdict.summary
    };
    JudgeOutcome {
        violations: verdict.violations,
        summary,
        degraded: false,
        notes,
    }
}

/// One JSON-repair request for an unparsable Judge response.
async fn refine(
    client: &dyn ReasoningClient,
    malformed: &str,
    error: &str,
) -> Result<String, ReasoningError> {
    let request = repair_request(malformed, error, "code review");
    client.send(REPAIR_SYSTEM_PROMPT, &request).await
}

/// Run the Judge against `source`. Exhausted transient failures and
/// responses that stay malformed after one repair attempt degrade to an
/// empty verdict; any other backend failure is returned.
pub async fn judge(
    client: &dyn ReasoningClient,
    prompt: &Prompt,
    source: &str,
) -> Result<JudgeOutcome, ReasoningError> {
    let response = match client.send(&prompt.system, &prompt.user).await {
        Ok(text) => text,
        Err(err) if err.is_transient() => {
            tracing::warn!(error = %err, "judge unavailable; no violations verified");
            return Ok(JudgeOutcome::degraded(
                "Judge unavailable; violations not verified.",
                format!("judge: backend unavailable ({})", err),
            ));
        }
        Err(err) => return Err(err),
    };

    let error = match parse_verdict(&response, source) {
        Ok(verdict) => return Ok(outcome(verdict, Vec::new())),
        Err(error) => error,
    };

    tracing::warn!(error = %error, "judge response malformed; requesting JSON repair");
    let repaired = match refine(client, &response, &error).await {
        Ok(text) => parse_verdict(&text, source),
        Err(err) => Err(format!("repair request failed: {}", err)),
    };
    match repaired {
        Ok(verdict) => Ok(outcome(
            verdict,
            vec![format!("judge: response repaired after parse error ({})", error)],
        )),
        Err(repair_error) => {
            tracing::warn!(error = %repair_error, "judge response unrecoverable; degrading");
            Ok(JudgeOutcome::degraded(
                "Judge response unreadable; violations not verified.",
                format!(
                    "judge: malformed response ({}); repair failed ({})",
                    error, repair_error
                ),
            ))
        }
    }
}
