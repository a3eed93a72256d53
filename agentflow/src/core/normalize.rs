//! Best-effort recovery of a JSON object from raw model output.
//!
//! This step only locates and decodes JSON; it never judges the shape of the
//! plan. Strict validation happens in [`crate::core::parser`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Find the first JSON object in `raw`, trying progressively looser readings.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let text = strip_reasoning(raw);
    let candidates = json_candidates(&text);

    for candidate in &candidates {
        if let Some(object) = parse_object(candidate) {
            return Some(object);
        }
    }

    // Transport-escaped output, e.g. `{\"activity\": ...}` or a quoted JSON string.
    for candidate in &candidates {
        let Some(decoded) = decode_escapes(candidate) else {
            continue;
        };
        for inner in json_candidates(&decoded) {
            if let Some(object) = parse_object(&inner) {
                debug!("recovered json object from escaped response");
                return Some(object);
            }
        }
    }

    None
}

/// Remove `<think>...</think>` reasoning blocks emitted by some models.
pub fn strip_reasoning(raw: &str) -> String {
    REASONING_RE.replace_all(raw, "").trim().to_string()
}

/// Candidate JSON slices, most specific reading first.
pub fn json_candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if !candidate.is_empty() && !out.iter().any(|c: &String| c == candidate) {
            out.push(candidate.to_string());
        }
    };

    push(text);

    for marker in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(marker) {
            let after = &text[start + marker.len()..];
            if let Some(end) = after.find("```") {
                push(&after[..end]);
            }
        }
    }

    for object in embedded_objects(text) {
        push(object);
    }

    // Widest brace span; only useful once escapes are decoded.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start <= end
    {
        push(&text[start..=end]);
    }

    out
}

/// Slices of `text` that each hold one complete JSON object, in order.
///
/// Reading stops at the end of each object, so braces in the surrounding
/// prose never swallow it.
fn embedded_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut offset = 0;
    while let Some(found) = text[offset..].find('{') {
        let start = offset + found;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(_))) => {
                let end = start + stream.byte_offset();
                objects.push(&text[start..end]);
                offset = end;
            }
            _ => offset = start + 1,
        }
    }
    objects
}

/// Interpret `candidate` as the body of a JSON string literal.
///
/// Reverses `\"`, `\\`, `\n` and `\uXXXX` artefacts. A candidate that is
/// already a quoted string is decoded as-is.
pub fn decode_escapes(candidate: &str) -> Option<String> {
    if !candidate.contains('\\') {
        return None;
    }
    if candidate.len() >= 2 && candidate.starts_with('"') && candidate.ends_with('"') {
        return serde_json::from_str::<String>(candidate).ok();
    }
    let flattened: String = candidate
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect();
    serde_json::from_str::<String>(&format!("\"{flattened}\"")).ok()
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}
