use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::QueryResult;
use crate::error::QaError;

/// A tool invocation recovered from model text. Unvalidated until dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self { name: name.into(), arguments }
    }

    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

impl Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.arguments_json())
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub raw_result: QueryResult,
    pub formatted_result: String,
    pub error: Option<QaError>,
    pub latency: Duration,
}

impl ExecutionRecord {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "Ok(len={}) in {:?}", self.formatted_result.len(), self.latency),
            Some(e) => write!(f, "Err(stage={}) {} in {:?}", e.stage(), e, self.latency),
        }
    }
}

/// Where a turn is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingModelDecision,
    Direct,
    ExtractingCall,
    ExtractionFailed,
    ExecutingTool,
    ToolError,
    Summarizing,
    Done,
    GatewayFailed,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Direct | TurnState::ExtractionFailed | TurnState::ToolError | TurnState::Done | TurnState::GatewayFailed
        )
    }
}

impl Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::AwaitingModelDecision => "awaiting_model_decision",
            TurnState::Direct => "direct",
            TurnState::ExtractingCall => "extracting_call",
            TurnState::ExtractionFailed => "extraction_failed",
            TurnState::ExecutingTool => "executing_tool",
            TurnState::ToolError => "tool_error",
            TurnState::Summarizing => "summarizing",
            TurnState::Done => "done",
            TurnState::GatewayFailed => "gateway_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum TurnEvent {
    Transition { from: TurnState, to: TurnState },
    ModelReplied { needs_tool_call: bool, content: String },
    CallExtracted { call: ToolCall },
    ToolExecuted { name: String, record: ExecutionRecord },
    FollowUpSent { prompt: String },
    Finished { state: TurnState, answer: String },
}

impl Display for TurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnEvent::Transition { from, to } => write!(f, "Transition {} -> {}", from, to),
            TurnEvent::ModelReplied { needs_tool_call, content } => {
                write!(f, "ModelReplied needs_tool_call={} len={}", needs_tool_call, content.len())
            }
            TurnEvent::CallExtracted { call } => write!(f, "CallExtracted {}", call),
            TurnEvent::ToolExecuted { name, record } => write!(f, "ToolExecuted name={} => {}", name, record),
            TurnEvent::FollowUpSent { prompt } => write!(f, "FollowUpSent len={}", prompt.len()),
            TurnEvent::Finished { state, answer } => write!(f, "Finished state={} len={}", state, answer.len()),
        }
    }
}

/// Stage and message of the failure that ended a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceError {
    pub stage: String,
    pub message: String,
}

impl From<&QaError> for TraceError {
    fn from(e: &QaError) -> Self {
        Self { stage: e.stage().to_string(), message: e.to_string() }
    }
}

/// Everything one turn did, in a form that can be written out and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionTrace {
    pub question: String,
    pub prompt_variant: String,
    #[serde(default)]
    pub raw_response: Option<String>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub raw_result: Option<Value>,
    #[serde(default)]
    pub formatted_result: Option<String>,
    #[serde(default)]
    pub error: Option<TraceError>,
    #[serde(default)]
    pub tool_latency_ms: Option<u64>,
    pub total_latency_ms: u64,
    pub final_answer: String,
    pub state: TurnState,
}

impl InteractionTrace {
    pub fn new(question: impl Into<String>, prompt_variant: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            prompt_variant: prompt_variant.into(),
            raw_response: None,
            tool_call: None,
            raw_result: None,
            formatted_result: None,
            error: None,
            tool_latency_ms: None,
            total_latency_ms: 0,
            final_answer: String::new(),
            state: TurnState::AwaitingModelDecision,
        }
    }
}
