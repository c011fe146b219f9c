//! Recover a [`ToolCall`] from free model text.
//!
//! The primary path scans for the balanced object after the sentinel, tracking
//! quote and escape state so braces inside strings do not count. When that
//! text is not valid JSON, a non-nesting regex is tried as a last resort.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::types::ToolCall;

pub const SENTINEL: &str = "TOOL_CALL:";

lazy_static! {
    static ref FALLBACK_RE: Regex = Regex::new(r"TOOL_CALL:\s*(\{[^}]*\})").expect("static regex");
}

pub fn contains_sentinel(text: &str) -> bool {
    text.contains(SENTINEL)
}

/// Balanced object text starting at `text[0] == '{'`. An unterminated object
/// yields the remaining input with one closing brace appended.
fn balanced_object(text: &str) -> String {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => escape_next = true,
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => depth += 1,
            '}' if !in_quotes => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return text[..=i].to_string();
                }
            }
            _ => {}
        }
    }

    let mut recovered = text.trim_end().to_string();
    recovered.push('}');
    recovered
}

enum Parsed {
    Call(ToolCall),
    Rejected(&'static str),
}

/// Shape check shared by both paths: object with string `name`, object-or-absent `arguments`.
fn to_call(value: Value) -> Parsed {
    let Value::Object(mut obj) = value else {
        return Parsed::Rejected("not_an_object");
    };
    let name = match obj.remove("name") {
        Some(Value::String(n)) => n,
        Some(_) => return Parsed::Rejected("name_not_string"),
        None => return Parsed::Rejected("missing_name"),
    };
    let arguments = match obj.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m,
        Some(_) => return Parsed::Rejected("arguments_not_object"),
    };
    Parsed::Call(ToolCall { name, arguments })
}

fn fallback(text: &str) -> Option<ToolCall> {
    let caps = FALLBACK_RE.captures(text)?;
    let candidate = caps.get(1)?.as_str();
    debug!(target: "extractor", candidate, "fallback_candidate");
    let value: Value = serde_json::from_str(candidate).ok()?;
    match to_call(value) {
        Parsed::Call(c) => Some(c),
        Parsed::Rejected(reason) => {
            debug!(target: "extractor", reason, "fallback_rejected");
            None
        }
    }
}

/// Extract the first tool call in `text`, or `None` when there is none to be had.
#[instrument(name = "extract_tool_call", skip(text), fields(len = text.len()))]
pub fn extract_tool_call(text: &str) -> Option<ToolCall> {
    let Some(start) = text.find(SENTINEL) else {
        debug!(target: "extractor", "no_sentinel");
        return None;
    };
    let after = &text[start + SENTINEL.len()..];
    let Some(brace) = after.find('{') else {
        debug!(target: "extractor", "no_opening_brace");
        return None;
    };

    let candidate = balanced_object(&after[brace..]);
    debug!(target: "extractor", candidate = %candidate, "primary_candidate");
    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => match to_call(value) {
            Parsed::Call(c) => Some(c),
            Parsed::Rejected(reason) => {
                debug!(target: "extractor", reason, "primary_rejected");
                None
            }
        },
        Err(e) => {
            debug!(target: "extractor", error = %e, "primary_parse_failed");
            fallback(text)
        }
    }
}
