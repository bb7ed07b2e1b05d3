//! Deterministic salvage of JSON embedded in model output
//!
//! Models wrap JSON in markdown fences, prepend prose, leave trailing commas
//! or emit typographic quotes. Salvage tries progressively looser readings
//! before giving up.

use serde_json::Value;

/// JSON-repair instructions for the Refiner
pub const REPAIR_SYSTEM_PROMPT: &str = r#"You are a JSON repair assistant. Your ONLY job is to fix malformed JSON.

RULES:
- Output ONLY the corrected JSON, nothing else
- No explanations, no markdown fences, no commentary
- Preserve all the original data, structure and key order
- Fix syntax errors: missing commas, unclosed brackets, invalid escapes
- Ensure strings are properly quoted and escaped
- Ensure the JSON is complete (not truncated)"#;

/// Characters of the malformed response included in a repair request
const REPAIR_INPUT_CHARS: usize = 6000;

/// Top-level JSON value a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Array,
    Object,
}

impl JsonShape {
    fn delimiters(self) -> (char, char) {
        match self {
            JsonShape::Array => ('[', ']'),
            JsonShape::Object => ('{', '}'),
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            JsonShape::Array => value.is_array(),
            JsonShape::Object => value.is_object(),
        }
    }
}

/// Strip markdown code fences from a response
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(inner) = fenced_block(trimmed) {
        return inner;
    }
    trimmed
}

/// Body of the first ```` ``` ```` block, language tag removed.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let tag = after[..body_start].trim();
    if !tag.is_empty() && !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        // Opening fence immediately followed by content on the same line
        let end = after.find("```").unwrap_or(after.len());
        return Some(after[..end].trim());
    }
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// Extract a JSON fragment between matching delimiters
pub fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Try to fix common JSON issues from LLM responses.
///
/// Repairs apply only outside string literals: typographic quotes used as
/// delimiters become `"`, trailing commas before `]`/`}` are dropped and
/// stray control characters are removed. Inside a string the text is kept
/// verbatim, except raw newlines and tabs which are escaped.
pub fn fix_json_issues(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut fixed = String::with_capacity(json.len());
    // Some(true) when the open string was started by a typographic quote
    let mut string: Option<bool> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match string {
            Some(smart) => {
                if escaped {
                    escaped = false;
                    fixed.push(c);
                    continue;
                }
                match c {
                    '\\' => {
                        escaped = true;
                        fixed.push(c);
                    }
                    '"' if !smart => {
                        string = None;
                        fixed.push(c);
                    }
                    '\u{201D}' | '\u{201C}' if smart => {
                        string = None;
                        fixed.push('"');
                    }
                    '"' => fixed.push_str("\\\""),
                    '\n' => fixed.push_str("\\n"),
                    '\t' => fixed.push_str("\\t"),
                    c if c.is_control() => {}
                    c => fixed.push(c),
                }
            }
            None => match c {
                '"' => {
                    string = Some(false);
                    fixed.push(c);
                }
                '\u{201C}' | '\u{201D}' => {
                    string = Some(true);
                    fixed.push('"');
                }
                ',' => {
                    let next = chars[i..].iter().position(|c| !c.is_whitespace());
                    match next.map(|offset| chars[i + offset]) {
                        Some(']') | Some('}') => i += next.unwrap_or(0),
                        _ => fixed.push(c),
                    }
                }
                c if c.is_control() && c != '\n' && c != '\t' => {}
                c => fixed.push(c),
            },
        }
    }
    fixed
}

/// Every top-level balanced `open ... close` span, skipping delimiters that
/// appear inside string literals.
pub fn balanced_candidates(text: &str, open: char, close: char) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth: usize = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            c if c == open => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            c if c == close && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..i + c.len_utf8()]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

fn parse_shaped(candidate: &str, shape: JsonShape) -> Result<Value, String> {
    let value: Value = serde_json::from_str(candidate).map_err(|e| e.to_string())?;
    if shape.matches(&value) {
        Ok(value)
    } else {
        Err(format!("expected a JSON {:?}", shape).to_lowercase())
    }
}

/// Parse `response` as JSON of the expected shape, trying the raw text, the
/// outermost delimited fragment, a repaired fragment, then each balanced
/// span. The error names the first failure.
pub fn salvage_json(response: &str, shape: JsonShape) -> Result<Value, String> {
    if let Ok(value) = parse_shaped(response.trim(), shape) {
        return Ok(value);
    }
    let clean = strip_markdown_fences(response);
    let first_error = match parse_shaped(clean, shape) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let (open, close) = shape.delimiters();
    if let Some(fragment) = extract_json_fragment(clean, open, close) {
        if let Ok(value) = parse_shaped(fragment, shape) {
            return Ok(value);
        }
        if let Ok(value) = parse_shaped(&fix_json_issues(fragment), shape) {
            return Ok(value);
        }
    }

    let repaired = fix_json_issues(clean);
    for candidate in balanced_candidates(&repaired, open, close) {
        if let Ok(value) = parse_shaped(candidate, shape) {
            return Ok(value);
        }
    }
    Err(first_error)
}

/// User message asking the Refiner to repair `malformed`.
pub fn repair_request(malformed: &str, error: &str, context_hint: &str) -> String {
    format!(
        "The following {} response contains invalid JSON.\n\n\
         Parse error: {}\n\n\
         Original response:\n{}\n\n\
         Output ONLY the corrected, valid JSON:",
        context_hint,
        error,
        crate::util::truncate_str(malformed, REPAIR_INPUT_CHARS)
    )
}
