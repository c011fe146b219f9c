use incident_qa::eval::{EvalSuite, run_suite};
use incident_qa::llm::ModelGateway;
use incident_qa::tools::catalog;
mod common;
use common::ScriptedBackend;

#[ctor::ctor]
fn _init() { common::init(); }

const SUITE: &str = r#"
name: scripted
cases:
  - question: How many homicides in 2023?
    category: simple_queries
    expected_tool: query_incidents_advanced
    expected_params: [start_year, end_year]
  - question: Which ward had the most homicides in 2023?
    category: which_x_most_queries
    expected_tool: query_incidents_advanced
    expected_group_by: ward
  - question: What does IUCR mean?
    category: simple_queries
    expected_tool: get_iucr_info
"#;

#[test]
fn scripted_model_is_graded_per_case() -> color_eyre::Result<()> {
    let suite: EvalSuite = serde_yaml::from_str(SUITE)?;
    let backend = ScriptedBackend::ok([
        r#"TOOL_CALL: {"name": "query_incidents_advanced", "arguments": {"start_year": 2023, "end_year": 2023}}"#,
        "There were 12 homicides in 2023.",
        r#"TOOL_CALL: {"name": "query_incidents_advanced", "arguments": {"start_year": 2023, "group_by": "district"}}"#,
        "District 001 had the most.",
        "IUCR is the Illinois Uniform Crime Reporting code.",
    ]);
    let log = backend.log();
    let gateway = ModelGateway::new(Box::new(backend), "tool_use_v1", catalog());
    let ds = common::year_dataset(12, 4);

    let report = run_suite(&suite, &gateway, catalog(), &ds, "scripted-model");

    assert_eq!(report.total_tests, 3);
    assert_eq!(report.passed_tests, 1);
    assert!((report.overall_score - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(report.backend, "scripted");
    assert_eq!(report.model, "scripted-model");
    assert_eq!(report.categories["simple_queries"].total, 2);
    assert_eq!(report.categories["simple_queries"].passed, 1);
    assert_eq!(report.categories["which_x_most_queries"].passed, 0);

    assert!(report.results[0].passed);
    assert_eq!(report.results[1].issues, vec!["group_by is district, expected ward".to_string()]);
    assert_eq!(report.results[2].tool_called, None);
    assert_eq!(log.lock().unwrap().len(), 5);

    let text = report.to_string();
    assert!(text.contains("(33.3% - 1/3)"), "{text}");
    assert!(text.contains("⚠️  group_by is district, expected ward"));

    let dir = tempfile::tempdir()?;
    let out = dir.path().join("report.json");
    report.write_json(&out)?;
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(saved["passed_tests"], 1);
    assert_eq!(saved["results"][1]["state"], "done");
    assert_eq!(saved["results"][0]["parameters_used"]["start_year"], 2023);
    Ok(())
}

#[test]
fn shipped_cases_load_and_name_catalog_tools() -> color_eyre::Result<()> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("eval/cases.yaml");
    let suite = EvalSuite::from_yaml_file(&path)?;
    assert_eq!(suite.name, "incident_tool_use");
    assert_eq!(suite.cases.len(), 7);
    for case in &suite.cases {
        let tool = case.expected_tool.as_deref().expect("every shipped case expects a tool");
        assert!(catalog().get(tool).is_some(), "{tool}");
        for p in &case.expected_params {
            assert!(catalog().get(tool).unwrap().parameters.get(p).is_some(), "{tool}.{p}");
        }
    }
    Ok(())
}

#[test]
fn missing_case_file_is_an_error() {
    assert!(EvalSuite::from_yaml_file("/nonexistent/cases.yaml").is_err());
}
