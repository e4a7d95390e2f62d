//! Per-format extraction and validation of agent output (spec §4.E
//! step 7). Blog gets a JSON repair pass for common malformations;
//! other formats fail fast to save time.

use serde_json::Value;

pub const PROMPT_VERSION: &str = "v1";

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub json: Option<Value>,
    pub was_repaired: bool,
}

/// Finds the outermost `{...}` span in `text` and tries to parse it;
/// falls back to parsing the whole trimmed string.
fn extract_json_candidate(text: &str) -> Option<String> {
    let stripped = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let (Some(first), Some(last)) = (stripped.find('{'), stripped.rfind('}')) {
        if last > first {
            let candidate = &stripped[first..=last];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }

    if serde_json::from_str::<Value>(stripped).is_ok() {
        return Some(stripped.to_string());
    }

    None
}

/// Fixes trailing commas, unquoted keys, and single-quoted strings —
/// the malformations the repair pass is meant to catch. Best-effort;
/// returns `None` if the result still doesn't parse.
fn repair_json(candidate: &str) -> Option<String> {
    let mut repaired = String::with_capacity(candidate.len());
    let mut chars = candidate.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ',' => {
                repaired.push(',');
                // Skip whitespace and check for a trailing closer.
                let mut lookahead = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() {
                        lookahead.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if matches!(chars.peek(), Some('}') | Some(']')) {
                    repaired.pop(); // drop the trailing comma
                } else {
                    repaired.push_str(&lookahead);
                }
            }
            '\'' => repaired.push('"'),
            other => repaired.push(other),
        }
    }

    let repaired = quote_bare_keys(&repaired);
    serde_json::from_str::<Value>(&repaired).ok().map(|_| repaired)
}

/// Quotes identifier-like keys that appear immediately before a `:` and
/// are not already quoted — a conservative, non-regex stand-in for the
/// source's `\w+\s*:` substitution.
fn quote_bare_keys(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let bytes: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if (c == '{' || c == ',') && !out.ends_with('"') {
            out.push(c);
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_whitespace() {
                i += 1;
            }
            let ident_start = i;
            while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                i += 1;
            }
            let mut j = i;
            while j < bytes.len() && bytes[j].is_whitespace() {
                j += 1;
            }
            if ident_start < i && j < bytes.len() && bytes[j] == ':' {
                out.push_str(&bytes[start..ident_start].iter().collect::<String>());
                out.push('"');
                out.push_str(&bytes[ident_start..i].iter().collect::<String>());
                out.push('"');
            } else {
                out.push_str(&bytes[start..i].iter().collect::<String>());
            }
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Extracts the text to stream/persist for `content_type` from the raw
/// agent output, validating its JSON shape. Blog content gets a repair
/// pass on first failure; other formats do not (spec §4.E step 7c).
pub fn extract_and_validate(content_type: &str, raw_output: &str) -> Result<ExtractedContent, String> {
    let candidate = extract_json_candidate(raw_output);

    if let Some(candidate) = &candidate {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if schema_is_valid(content_type, &value) {
                let text = text_for(content_type, &value);
                return Ok(ExtractedContent { text, json: Some(value), was_repaired: false });
            }
        }
    }

    if content_type == "blog" {
        if let Some(candidate) = &candidate {
            if let Some(repaired) = repair_json(candidate) {
                if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                    if schema_is_valid(content_type, &value) {
                        let text = text_for(content_type, &value);
                        return Ok(ExtractedContent { text, json: Some(value), was_repaired: true });
                    }
                }
            }
        }
    }

    Err(format!("content validation failed for {content_type}: no valid JSON found"))
}

/// A minimal structural check standing in for the full per-format
/// schema: each content kind requires at least its headline field.
fn schema_is_valid(content_type: &str, value: &Value) -> bool {
    let required_field = match content_type {
        "blog" => "title",
        "social" => "posts",
        "audio" => "script",
        "video" => "scenes",
        _ => return value.is_object(),
    };
    value.get(required_field).is_some()
}

fn text_for(content_type: &str, value: &Value) -> String {
    match content_type {
        "blog" => {
            let title = value.get("title").and_then(|v| v.as_str()).unwrap_or_default();
            let body = value.get("body").and_then(|v| v.as_str()).unwrap_or_default();
            format!("{title}\n\n{body}")
        }
        "social" => value
            .get("posts")
            .and_then(|v| v.as_array())
            .map(|posts| {
                posts
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string).or_else(|| {
                        p.get("text").and_then(|t| t.as_str()).map(str::to_string)
                    }))
                    .collect::<Vec<_>>()
                    .join("\n---\n")
            })
            .unwrap_or_default(),
        "audio" => value.get("script").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        "video" => serde_json::to_string(value.get("scenes").unwrap_or(&Value::Null)).unwrap_or_default(),
        _ => value.to_string(),
    }
}

/// Chunk size adapts to total length (spec §4.E step 7d).
pub fn chunk_size_for(total_len: usize) -> usize {
    if total_len <= 2048 {
        200
    } else if total_len <= 5120 {
        500
    } else {
        1024
    }
}

pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<&str> {
    if text.is_empty() {
        return vec![];
    }
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = (start + chunk_size).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}
