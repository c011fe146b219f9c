use incident_qa::call::{InteractionTrace, TurnEvent, TurnState, handle_question, handle_question_with_logger};
use incident_qa::dataset::IncidentStore;
use incident_qa::llm::{ModelGateway, Role};
use incident_qa::tools::catalog;
mod common;
use common::ScriptedBackend;

#[ctor::ctor]
fn _init() { common::init(); }

fn gateway(backend: ScriptedBackend) -> ModelGateway {
    ModelGateway::new(Box::new(backend), "tool_use_v1", catalog())
}

#[test]
fn direct_answer_makes_one_call() {
    let backend = ScriptedBackend::ok(["IUCR is a crime classification scheme."]);
    let log = backend.log();
    let ds = common::year_dataset(3, 1);
    let trace = handle_question("What is IUCR?", &gateway(backend), catalog(), &ds);
    assert_eq!(trace.state, TurnState::Direct);
    assert_eq!(trace.final_answer, "IUCR is a crime classification scheme.");
    assert!(trace.tool_call.is_none());
    let sent = log.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][0].role, Role::System);
    assert_eq!(sent[0][1].content, "What is IUCR?");
}

#[test]
fn tool_turn_summarizes_with_follow_up() {
    let backend = ScriptedBackend::ok([
        r#"Let me check. TOOL_CALL: {"name": "query_incidents_advanced", "arguments": {"start_year": 2023, "end_year": 2023}}"#,
        "There were 40 homicides in 2023, with 15 arrests.",
    ]);
    let log = backend.log();
    let ds = common::year_dataset(40, 15);
    let mut events = Vec::new();
    let trace = handle_question_with_logger("How many homicides in 2023?", &gateway(backend), catalog(), &ds, |ev: &TurnEvent| {
        events.push(ev.to_string());
    });

    assert_eq!(trace.state, TurnState::Done);
    assert_eq!(trace.final_answer, "There were 40 homicides in 2023, with 15 arrests.");
    assert_eq!(trace.tool_call.as_ref().map(|c| c.name.as_str()), Some("query_incidents_advanced"));
    assert!(trace.error.is_none());
    assert_eq!(trace.raw_result.as_ref().unwrap()["arrest_rate"], "37.5%");

    let sent = log.lock().unwrap();
    assert_eq!(sent.len(), 2);
    let follow_up = &sent[1][0].content;
    assert_eq!(sent[1].len(), 1);
    assert!(follow_up.starts_with("Based on this data about homicides:"));
    assert!(follow_up.contains("- Total matches: 40"));
    assert!(follow_up.contains("\"How many homicides in 2023?\""));

    assert!(events.iter().any(|e| e == "Transition extracting_call -> executing_tool"));
    assert!(events.last().unwrap().starts_with("Finished state=done"));
}

#[test]
fn unparseable_call_stops_without_second_call() {
    let raw = "TOOL_CALL: {\"arguments\": {}}";
    let backend = ScriptedBackend::ok([raw, "should never be used"]);
    let log = backend.log();
    let ds = common::year_dataset(3, 1);
    let trace = handle_question("q", &gateway(backend), catalog(), &ds);
    assert_eq!(trace.state, TurnState::ExtractionFailed);
    assert_eq!(trace.final_answer, format!("❌ Could not parse tool call from response: {raw}"));
    assert_eq!(trace.error.as_ref().unwrap().stage, "extraction");
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn unknown_tool_is_a_tool_error() {
    let backend = ScriptedBackend::ok([r#"TOOL_CALL: {"name": "nonexistent_tool", "arguments": {}}"#]);
    let log = backend.log();
    let ds = common::year_dataset(3, 1);
    let spy = common::CountingQueries::new(&ds);
    let trace = handle_question("q", &gateway(backend), catalog(), &spy);
    assert_eq!(trace.state, TurnState::ToolError);
    assert_eq!(trace.final_answer, "❌ Unknown tool: nonexistent_tool");
    assert_eq!(spy.count(), 0);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn accessor_error_is_a_tool_error() {
    let backend = ScriptedBackend::ok([r#"TOOL_CALL: {"name": "get_iucr_info", "arguments": {"iucr_code": "9999"}}"#]);
    let store = IncidentStore::new(common::year_dataset(3, 1));
    let trace = handle_question("What is 9999?", &gateway(backend), catalog(), &store);
    assert_eq!(trace.state, TurnState::ToolError);
    assert_eq!(trace.final_answer, "❌ IUCR code '9999' not found");
    assert_eq!(trace.error.as_ref().unwrap().stage, "execution");
}

#[test]
fn unloaded_store_ends_turn_at_data_stage() {
    let backend = ScriptedBackend::ok([r#"TOOL_CALL: {"name": "query_incidents_advanced", "arguments": {"ward": 7}}"#]);
    let log = backend.log();
    let store = IncidentStore::empty();
    let trace = handle_question("How many in ward 7?", &gateway(backend), catalog(), &store);
    assert_eq!(trace.state, TurnState::ToolError);
    assert_eq!(trace.final_answer, "❌ Incident data not loaded");
    let err = trace.error.as_ref().unwrap();
    assert_eq!(err.stage, "data");
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn gateway_failure_on_first_pass() {
    let backend = ScriptedBackend::new([Err::<&str, &str>("connection refused")]);
    let ds = common::year_dataset(3, 1);
    let trace = handle_question("q", &gateway(backend), catalog(), &ds);
    assert_eq!(trace.state, TurnState::GatewayFailed);
    assert_eq!(trace.final_answer, "❌ Error generating response: connection refused");
    assert!(trace.raw_response.is_none());
}

#[test]
fn gateway_failure_on_summary_keeps_tool_result() {
    let backend = ScriptedBackend::new([
        Ok(r#"TOOL_CALL: {"name": "get_iucr_info", "arguments": {}}"#),
        Err("timed out"),
    ]);
    let ds = common::year_dataset(3, 1);
    let trace = handle_question("What is IUCR?", &gateway(backend), catalog(), &ds);
    assert_eq!(trace.state, TurnState::GatewayFailed);
    assert!(trace.formatted_result.as_deref().unwrap().contains("About IUCR Codes"));
    assert_eq!(trace.error.as_ref().unwrap().stage, "model");
}

#[test]
fn trace_round_trips_through_json() {
    let backend = ScriptedBackend::ok([
        r#"TOOL_CALL: {"name": "query_incidents_advanced", "arguments": {"group_by": "ward"}}"#,
        "Ward 7 had the most.",
    ]);
    let ds = common::ward_dataset(&[("3", 5), ("7", 9), ("12", 9)]);
    let trace = handle_question("Which ward had the most?", &gateway(backend), catalog(), &ds);
    let json = serde_json::to_string(&trace).unwrap();
    let back: InteractionTrace = serde_json::from_str(&json).unwrap();
    assert_eq!(back, trace);
    let replayed = incident_qa::format::format_value(back.raw_result.as_ref().unwrap());
    assert_eq!(Some(replayed), trace.formatted_result);
}
