//! Model grading: run a matrix of questions through full turns and score the
//! tool call each turn produced against what the question should have asked for.
//!
//! Cases are YAML; the report is JSON.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use chrono::{DateTime, Utc};
use color_eyre::{Result, eyre::WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::call::{InteractionTrace, TurnState, handle_question};
use crate::dataset::{GroupBy, IncidentQueries};
use crate::llm::ModelGateway;
use crate::tools::ToolCatalog;

/// One graded question. `expected_tool: None` means a direct answer is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_complexity")]
    pub complexity: String,
    #[serde(default)]
    pub expected_tool: Option<String>,
    #[serde(default)]
    pub expected_params: Vec<String>,
    #[serde(default)]
    pub expected_group_by: Option<String>,
    #[serde(default)]
    pub expected_top_n: Option<i64>,
    #[serde(default)]
    pub expected_arrest_status: Option<bool>,
    #[serde(default)]
    pub expected_domestic: Option<bool>,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_complexity() -> String {
    "simple".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSuite {
    #[serde(default)]
    pub name: String,
    pub cases: Vec<EvalCase>,
}

impl EvalSuite {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).wrap_err_with(|| format!("reading eval cases {}", path.display()))?;
        let mut suite: EvalSuite =
            serde_yaml::from_str(&text).wrap_err_with(|| format!("parsing eval cases {}", path.display()))?;
        if suite.name.is_empty() {
            suite.name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        }
        Ok(suite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub question: String,
    pub category: String,
    pub complexity: String,
    pub passed: bool,
    pub state: TurnState,
    pub tool_called: Option<String>,
    pub parameters_used: Map<String, Value>,
    pub issues: Vec<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub passed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub suite: String,
    pub backend: String,
    pub model: String,
    pub prompt_variant: String,
    pub timestamp: DateTime<Utc>,
    pub total_tests: usize,
    pub passed_tests: usize,
    /// Pass rate in percent.
    pub overall_score: f64,
    pub categories: BTreeMap<String, CategoryScore>,
    pub results: Vec<CaseResult>,
}

impl EvalReport {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).wrap_err_with(|| format!("writing eval report {}", path.display()))
    }
}

impl Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "📊 {} [{}] ({:.1}% - {}/{})",
            self.model, self.prompt_variant, self.overall_score, self.passed_tests, self.total_tests
        )?;
        for (category, score) in &self.categories {
            writeln!(f, "  {category}: {}/{}", score.passed, score.total)?;
            for r in self.results.iter().filter(|r| &r.category == category) {
                let status = if r.passed { "✅" } else { "❌" };
                writeln!(f, "    {status} {} ({}ms)", r.question, r.latency_ms)?;
                for issue in &r.issues {
                    writeln!(f, "        ⚠️  {issue}")?;
                }
            }
        }
        Ok(())
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn check_bool(args: &Map<String, Value>, key: &str, expected: Option<bool>, issues: &mut Vec<String>) {
    let Some(want) = expected else { return };
    match args.get(key).and_then(as_bool) {
        Some(got) if got == want => {}
        Some(got) => issues.push(format!("{key} is {got}, expected {want}")),
        None => issues.push(format!("{key} missing, expected {want}")),
    }
}

/// Grade a finished turn. Argument values are read with the same leniency the
/// dispatcher applies, so `"7"` satisfies an expected `7`.
pub fn score_trace(case: &EvalCase, trace: &InteractionTrace) -> CaseResult {
    let mut issues = Vec::new();
    let call = trace.tool_call.as_ref();

    match (&case.expected_tool, call) {
        (None, None) => {}
        (None, Some(c)) => issues.push(format!("expected a direct answer, got tool call {}", c.name)),
        (Some(want), None) => issues.push(format!("no tool call (state={}), expected {want}", trace.state)),
        (Some(want), Some(c)) if &c.name != want => issues.push(format!("called {}, expected {want}", c.name)),
        (Some(_), Some(c)) => {
            let args = &c.arguments;
            for p in &case.expected_params {
                if args.get(p).is_none_or(Value::is_null) {
                    issues.push(format!("missing parameter {p}"));
                }
            }
            if let Some(want) = &case.expected_group_by {
                let got = args.get("group_by").and_then(Value::as_str);
                let same = match (got.and_then(GroupBy::parse), GroupBy::parse(want)) {
                    (Some(g), Some(w)) => g == w,
                    _ => got == Some(want.as_str()),
                };
                if !same {
                    issues.push(format!("group_by is {}, expected {want}", got.unwrap_or("unset")));
                }
            }
            if let Some(want) = case.expected_top_n {
                match args.get("top_n").and_then(as_int) {
                    Some(got) if got == want => {}
                    Some(got) => issues.push(format!("top_n is {got}, expected {want}")),
                    None => issues.push(format!("top_n missing, expected {want}")),
                }
            }
            check_bool(args, "arrest_status", case.expected_arrest_status, &mut issues);
            check_bool(args, "domestic", case.expected_domestic, &mut issues);
        }
    }

    if let Some(err) = &trace.error {
        issues.push(format!("turn failed at {}: {}", err.stage, err.message));
    }

    CaseResult {
        question: case.question.clone(),
        category: case.category.clone(),
        complexity: case.complexity.clone(),
        passed: issues.is_empty(),
        state: trace.state,
        tool_called: call.map(|c| c.name.clone()),
        parameters_used: call.map(|c| c.arguments.clone()).unwrap_or_default(),
        issues,
        latency_ms: trace.total_latency_ms,
    }
}

/// Run every case as a full turn and collect the scores.
#[instrument(name = "run_suite", skip_all, fields(suite = %suite.name, cases = suite.cases.len()))]
pub fn run_suite(
    suite: &EvalSuite,
    gateway: &ModelGateway,
    tools: &ToolCatalog,
    queries: &dyn IncidentQueries,
    model: &str,
) -> EvalReport {
    let mut categories: BTreeMap<String, CategoryScore> = BTreeMap::new();
    let mut results = Vec::with_capacity(suite.cases.len());

    for case in &suite.cases {
        let trace = handle_question(&case.question, gateway, tools, queries);
        let result = score_trace(case, &trace);
        info!(target: "eval", question = %case.question, passed = result.passed, issues = result.issues.len(), "case_scored");
        let score = categories.entry(case.category.clone()).or_default();
        score.total += 1;
        if result.passed {
            score.passed += 1;
        }
        results.push(result);
    }

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let overall_score = if total_tests == 0 { 0.0 } else { passed_tests as f64 / total_tests as f64 * 100.0 };
    info!(target: "eval", passed_tests, total_tests, overall_score, "suite_finished");

    EvalReport {
        suite: suite.name.clone(),
        backend: gateway.backend_name().to_string(),
        model: model.to_string(),
        prompt_variant: gateway.variant().to_string(),
        timestamp: Utc::now(),
        total_tests,
        passed_tests,
        overall_score,
        categories,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{ToolCall, TraceError};
    use serde_json::json;

    fn case(yaml: &str) -> EvalCase {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn trace_with(name: &str, args: Value) -> InteractionTrace {
        let mut t = InteractionTrace::new("q", "tool_use_v1");
        let Value::Object(arguments) = args else { panic!("object expected") };
        t.tool_call = Some(ToolCall::new(name, arguments));
        t.state = TurnState::Done;
        t
    }

    #[test]
    fn matching_call_passes_with_lenient_values() {
        let c = case(
            "question: top 2 wards without arrests\n\
             expected_tool: query_incidents_advanced\n\
             expected_params: [arrest_status, group_by, top_n]\n\
             expected_group_by: ward\n\
             expected_top_n: 2\n\
             expected_arrest_status: false\n",
        );
        let t = trace_with(
            "query_incidents_advanced",
            json!({"arrest_status": "false", "group_by": "Wards", "top_n": "2"}),
        );
        let r = score_trace(&c, &t);
        assert!(r.passed, "{:?}", r.issues);
        assert_eq!(r.category, "general");
        assert_eq!(r.tool_called.as_deref(), Some("query_incidents_advanced"));
    }

    #[test]
    fn each_mismatch_is_reported() {
        let c = case(
            "question: q\n\
             expected_tool: query_incidents_advanced\n\
             expected_params: [start_year, end_year]\n\
             expected_group_by: community_area\n\
             expected_top_n: 5\n\
             expected_domestic: true\n",
        );
        let t = trace_with("query_incidents_advanced", json!({"start_year": 2020, "end_year": null, "group_by": "ward"}));
        let r = score_trace(&c, &t);
        assert!(!r.passed);
        assert_eq!(
            r.issues,
            vec![
                "missing parameter end_year".to_string(),
                "group_by is ward, expected community_area".to_string(),
                "top_n missing, expected 5".to_string(),
                "domestic missing, expected true".to_string(),
            ]
        );
    }

    #[test]
    fn wrong_tool_or_no_call_fails() {
        let c = case("question: q\nexpected_tool: get_iucr_info\n");
        let r = score_trace(&c, &trace_with("query_incidents_advanced", json!({})));
        assert_eq!(r.issues, vec!["called query_incidents_advanced, expected get_iucr_info".to_string()]);

        let mut direct = InteractionTrace::new("q", "tool_use_v1");
        direct.state = TurnState::Direct;
        let r = score_trace(&c, &direct);
        assert_eq!(r.issues, vec!["no tool call (state=direct), expected get_iucr_info".to_string()]);
    }

    #[test]
    fn direct_answer_case_and_failed_turns() {
        let c = case("question: hello\n");
        let mut direct = InteractionTrace::new("hello", "tool_use_v1");
        direct.state = TurnState::Direct;
        assert!(score_trace(&c, &direct).passed);

        let c = case("question: q\nexpected_tool: get_iucr_info\n");
        let mut t = trace_with("get_iucr_info", json!({"iucr_code": "9999"}));
        t.state = TurnState::ToolError;
        t.error = Some(TraceError { stage: "execution".into(), message: "IUCR code '9999' not found".into() });
        let r = score_trace(&c, &t);
        assert!(!r.passed);
        assert!(r.issues[0].starts_with("turn failed at execution"));
    }
}
