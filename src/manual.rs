//! Manual tool commands typed at the CLI: `<tool> [json | key=value ... | bare]`.

use color_eyre::{Result, eyre::eyre};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::call::ToolCall;
use crate::tools::{ADVANCED_QUERY_TOOL, IUCR_TOOL};

/// Digits become integers, `true`/`false` become booleans, everything else stays a string.
fn coerce_pair_value(raw: &str) -> Value {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn bare_argument(tool: &str, raw: &str) -> Map<String, Value> {
    let raw = raw.trim_matches(|c| c == '"' || c == '\'');
    let mut args = Map::new();
    match tool {
        ADVANCED_QUERY_TOOL => match raw.parse::<i64>() {
            Ok(year) => {
                args.insert("start_year".into(), Value::from(year));
                args.insert("end_year".into(), Value::from(year));
            }
            Err(_) => {
                args.insert("location_type".into(), Value::from(raw));
            }
        },
        IUCR_TOOL => {
            args.insert("iucr_code".into(), Value::from(raw));
        }
        other => warn!(target: "cli", tool = other, arg = raw, "bare_argument_ignored"),
    }
    args
}

pub fn parse_manual_command(text: &str) -> Result<ToolCall> {
    let text = text.trim();
    let (name, rest) = match text.split_once(char::is_whitespace) {
        Some((n, r)) => (n, r.trim()),
        None => (text, ""),
    };
    if name.is_empty() {
        return Err(eyre!("empty tool command"));
    }

    let arguments = if rest.is_empty() {
        Map::new()
    } else if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(rest) {
        obj
    } else if rest.contains('=') {
        rest.split_whitespace()
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), coerce_pair_value(v)))
            .collect()
    } else {
        bare_argument(name, rest)
    };

    debug!(target: "cli", tool = name, args = arguments.len(), "manual_command_parsed");
    Ok(ToolCall::new(name, arguments))
}
