// Defensive Response Parsing
//
// Model output is hostile input: fenced, prefixed with prose, truncated
// mid-structure, or followed by trailing garbage. Extraction strips fence
// markers, finds the first opening brace/bracket, and scans for the
// matching close by depth counting with full string/escape awareness.

use serde_json::Value;

/// Parse-level fault, split so the retry loop can recognize
/// truncation-shaped failures and widen the token budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFault {
    /// No JSON body found at all.
    NoJson,
    /// Opening brace without a balanced close: the truncation signature.
    Unbalanced,
    /// Balanced body that still failed to deserialize.
    Syntax(String),
}

impl ParseFault {
    pub fn is_truncation(&self) -> bool {
        matches!(self, ParseFault::Unbalanced)
    }

    pub fn message(&self) -> String {
        match self {
            ParseFault::NoJson => "response contains no JSON body".to_string(),
            ParseFault::Unbalanced => "JSON body is unbalanced (truncated?)".to_string(),
            ParseFault::Syntax(msg) => format!("JSON syntax error: {}", msg),
        }
    }
}

/// Extract and deserialize the first balanced JSON body in `raw`.
pub fn extract_json(raw: &str) -> Result<Value, ParseFault> {
    let stripped = strip_code_fences(raw);
    let body = balanced_body(stripped)?;
    serde_json::from_str(body).map_err(|e| ParseFault::Syntax(e.to_string()))
}

/// Remove Markdown code-fence lines, keeping their contents.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

/// Locate the first `{` or `[` and return the slice up to its balanced
/// close. Trailing garbage after the close is tolerated by construction.
fn balanced_body(text: &str) -> Result<&str, ParseFault> {
    let start = text.find(['{', '[']).ok_or(ParseFault::NoJson)?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    Err(ParseFault::Unbalanced)
}

/// Collect every balanced top-level `{...}` segment in `raw`, used by the
/// repair pass to recover a partial list from a truncated array body.
pub fn balanced_object_segments(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = strip_code_fences(raw);
    while let Some(start) = rest.find('{') {
        match balanced_body(&rest[start..]) {
            Ok(segment) => {
                segments.push(segment);
                rest = &rest[start + segment.len()..];
            }
            // Unbalanced at this opener (e.g. the truncated outer object);
            // step past it and look for complete inner segments.
            Err(_) => rest = &rest[start + 1..],
        }
    }
    segments
}
