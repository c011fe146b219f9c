//! Validate a [`ToolCall`] against the catalog and route it to the query surface.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::types::{ExecutionRecord, ToolCall};
use crate::dataset::{AdvancedQuery, DEFAULT_LIMIT, DEFAULT_TOP_N, IncidentQueries, QueryFilters, QueryResult};
use crate::error::QaError;
use crate::format::format_result;
use crate::tools::{ParamKind, ToolCatalog, ToolKind, ToolSpec, catalog};

type ArgResult<T> = Result<Option<T>, String>;

fn int_arg(args: &Map<String, Value>, key: &str) -> ArgResult<i64> {
    let bad = || format!("argument '{key}' must be an integer");
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => n.as_f64().filter(|f| f.fract() == 0.0).map(|f| Some(f as i64)).ok_or_else(bad),
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Some(i));
            }
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| Some(f as i64))
                .ok_or_else(bad)
        }
        Some(_) => Err(bad()),
    }
}

fn bool_arg(args: &Map<String, Value>, key: &str) -> ArgResult<bool> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(_) => Err(format!("argument '{key}' must be a boolean")),
    }
}

fn str_arg(args: &Map<String, Value>, key: &str) -> ArgResult<String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(format!("argument '{key}' must be a string")),
    }
}

/// Clamp into the declared range; absent values take the declared default.
fn bounded_usize(spec: &ToolSpec, args: &Map<String, Value>, key: &str, fallback: usize) -> Result<usize, String> {
    let param = spec.parameters.get(key);
    let default = param
        .and_then(|p| p.default.as_ref())
        .and_then(Value::as_u64)
        .map_or(fallback, |d| d as usize);
    let Some(v) = int_arg(args, key)? else { return Ok(default) };
    let (lo, hi) = match param.map(|p| &p.kind) {
        Some(ParamKind::Integer { min, max }) => (min.unwrap_or(1), max.unwrap_or(i64::MAX)),
        _ => (1, i64::MAX),
    };
    let clamped = v.clamp(lo, hi);
    if clamped != v {
        debug!(target: "dispatch", key, requested = v, clamped, "argument_clamped");
    }
    Ok(clamped as usize)
}

fn build_advanced_query(spec: &ToolSpec, args: &Map<String, Value>) -> Result<AdvancedQuery, String> {
    let filters = QueryFilters {
        start_year: int_arg(args, "start_year")?,
        end_year: int_arg(args, "end_year")?,
        ward: int_arg(args, "ward")?,
        district: int_arg(args, "district")?,
        community_area: int_arg(args, "community_area")?,
        arrest_status: bool_arg(args, "arrest_status")?,
        domestic: bool_arg(args, "domestic")?,
        location_type: str_arg(args, "location_type")?.filter(|s| !s.trim().is_empty()),
    };
    Ok(AdvancedQuery {
        filters,
        group_by: str_arg(args, "group_by")?.filter(|s| !s.trim().is_empty()),
        top_n: bounded_usize(spec, args, "top_n", DEFAULT_TOP_N)?,
        limit: bounded_usize(spec, args, "limit", DEFAULT_LIMIT)?,
    })
}

fn run(spec: &ToolSpec, args: &Map<String, Value>, queries: &dyn IncidentQueries) -> Result<QueryResult, QaError> {
    for key in args.keys() {
        if spec.parameters.get(key).is_none() {
            warn!(target: "dispatch", tool = spec.name, key = %key, "unknown_argument_ignored");
        }
    }
    match spec.kind {
        ToolKind::AdvancedQuery => {
            let query = build_advanced_query(spec, args).map_err(|m| QaError::tool_execution(spec.name, m))?;
            queries.advanced_query(&query)
        }
        ToolKind::ClassificationLookup => {
            let code = str_arg(args, "iucr_code").map_err(|m| QaError::tool_execution(spec.name, m))?;
            queries.lookup_classification_code(code.as_deref())
        }
    }
}

/// Dispatch against the process-wide catalog.
pub fn dispatch(call: &ToolCall, queries: &dyn IncidentQueries) -> ExecutionRecord {
    dispatch_with(catalog(), call, queries)
}

/// Read-only: the same call against the same data yields the same record (latency aside).
#[instrument(name = "dispatch", skip(catalog, queries, call), fields(tool = %call.name))]
pub fn dispatch_with(catalog: &ToolCatalog, call: &ToolCall, queries: &dyn IncidentQueries) -> ExecutionRecord {
    let started = Instant::now();

    let Some(spec) = catalog.get(&call.name) else {
        let err = QaError::UnknownTool { name: call.name.clone(), available: catalog.names() };
        warn!(target: "dispatch", error = %err, "unknown_tool");
        return ExecutionRecord {
            raw_result: QueryResult::from(err.clone()),
            formatted_result: format!("❌ Unknown tool: {}", call.name),
            error: Some(err),
            latency: started.elapsed(),
        };
    };

    let (raw_result, error) = match run(spec, &call.arguments, queries) {
        Ok(r) => {
            let error = r.error_message().map(|m| QaError::tool_execution(spec.name, m));
            (r, error)
        }
        Err(err) => (QueryResult::from(err.clone()), Some(err)),
    };
    let formatted_result = format_result(&raw_result);
    let latency = started.elapsed();

    match &error {
        None => info!(target: "dispatch", tool = spec.name, latency_ms = latency.as_millis() as u64, "tool_executed"),
        Some(e) => warn!(target: "dispatch", tool = spec.name, error = %e, "tool_error"),
    }
    ExecutionRecord { raw_result, formatted_result, error, latency }
}
