// Tool-call protocol: extraction from model text, dispatch to the query surface, and the per-question turn.

pub mod types;
pub mod extractor;
pub mod dispatcher;
pub mod orchestrator;

pub use types::{ExecutionRecord, InteractionTrace, ToolCall, TraceError, TurnEvent, TurnState};
pub use extractor::{SENTINEL, contains_sentinel, extract_tool_call};
pub use dispatcher::{dispatch, dispatch_with};
pub use orchestrator::{follow_up_prompt, handle_question, handle_question_with_logger};
