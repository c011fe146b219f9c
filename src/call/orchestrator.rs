//! One question, one turn: first model pass, optional tool call, optional summary pass.

use std::time::Instant;

use tracing::{debug, info, instrument};

use super::dispatcher::dispatch_with;
use super::extractor::extract_tool_call;
use super::types::{InteractionTrace, TraceError, TurnEvent, TurnState};
use crate::dataset::IncidentQueries;
use crate::error::QaError;
use crate::format::format_error;
use crate::llm::ModelGateway;
use crate::tools::ToolCatalog;

/// Second-pass prompt built from the formatted tool result.
pub fn follow_up_prompt(tool_result: &str, question: &str) -> String {
    format!(
        "Based on this data about homicides:\n\n{tool_result}\n\n\
         Please answer the original question: \"{question}\"\n\n\
         Provide a clear, informative answer based on the data."
    )
}

struct Turn<'l> {
    trace: InteractionTrace,
    started: Instant,
    logger: Option<&'l mut dyn FnMut(&TurnEvent)>,
}

impl Turn<'_> {
    fn emit(&mut self, ev: TurnEvent) {
        if let Some(cb) = self.logger.as_deref_mut() {
            cb(&ev);
        }
    }

    fn advance(&mut self, next: TurnState) {
        let from = self.trace.state;
        self.trace.state = next;
        debug!(target: "orchestrator", %from, to = %next, "turn_transition");
        self.emit(TurnEvent::Transition { from, to: next });
    }

    fn fail(mut self, state: TurnState, err: &QaError, answer: String) -> InteractionTrace {
        self.trace.error = Some(TraceError::from(err));
        self.finish(state, answer)
    }

    fn finish(mut self, state: TurnState, answer: String) -> InteractionTrace {
        debug_assert!(state.is_terminal(), "turn finished in non-terminal state {state}");
        self.advance(state);
        self.trace.final_answer = answer;
        self.trace.total_latency_ms = self.started.elapsed().as_millis() as u64;
        info!(
            target: "orchestrator",
            state = %self.trace.state,
            total_ms = self.trace.total_latency_ms,
            tool = self.trace.tool_call.as_ref().map(|c| c.name.as_str()).unwrap_or("-"),
            "turn_finished"
        );
        let ev = TurnEvent::Finished { state, answer: self.trace.final_answer.clone() };
        self.emit(ev);
        self.trace
    }
}

#[instrument(name = "handle_question", skip(gateway, tools, queries))]
pub fn handle_question(
    question: &str,
    gateway: &ModelGateway,
    tools: &ToolCatalog,
    queries: &dyn IncidentQueries,
) -> InteractionTrace {
    handle_question_internal(question, gateway, tools, queries, None)
}

#[instrument(name = "handle_question_with_logger", skip(gateway, tools, queries, logger))]
pub fn handle_question_with_logger(
    question: &str,
    gateway: &ModelGateway,
    tools: &ToolCatalog,
    queries: &dyn IncidentQueries,
    logger: impl FnMut(&TurnEvent),
) -> InteractionTrace {
    let mut user_logger = logger;
    let mut log_and_forward = |ev: &TurnEvent| {
        debug!(target: "orchestrator", event = %ev, "turn_event");
        user_logger(ev);
    };
    handle_question_internal(question, gateway, tools, queries, Some(&mut log_and_forward))
}

fn handle_question_internal(
    question: &str,
    gateway: &ModelGateway,
    tools: &ToolCatalog,
    queries: &dyn IncidentQueries,
    logger: Option<&mut dyn FnMut(&TurnEvent)>,
) -> InteractionTrace {
    let mut turn = Turn { trace: InteractionTrace::new(question, gateway.variant()), started: Instant::now(), logger };

    let reply = match gateway.generate_with_tools(question) {
        Ok(r) => r,
        Err(e) => {
            let answer = format_error(&e.to_string());
            return turn.fail(TurnState::GatewayFailed, &e, answer);
        }
    };
    turn.trace.raw_response = Some(reply.content.clone());
    turn.emit(TurnEvent::ModelReplied { needs_tool_call: reply.needs_tool_call, content: reply.content.clone() });

    if !reply.needs_tool_call {
        return turn.finish(TurnState::Direct, reply.content);
    }

    turn.advance(TurnState::ExtractingCall);
    let Some(call) = extract_tool_call(&reply.content) else {
        let err = QaError::MalformedToolCall { raw: reply.content };
        let answer = format_error(&err.to_string());
        return turn.fail(TurnState::ExtractionFailed, &err, answer);
    };
    turn.trace.tool_call = Some(call.clone());
    turn.emit(TurnEvent::CallExtracted { call: call.clone() });

    turn.advance(TurnState::ExecutingTool);
    let record = dispatch_with(tools, &call, queries);
    turn.trace.raw_result = serde_json::to_value(&record.raw_result).ok();
    turn.trace.formatted_result = Some(record.formatted_result.clone());
    turn.trace.tool_latency_ms = Some(record.latency.as_millis() as u64);
    turn.emit(TurnEvent::ToolExecuted { name: call.name.clone(), record: record.clone() });

    if let Some(err) = &record.error {
        return turn.fail(TurnState::ToolError, err, record.formatted_result);
    }

    turn.advance(TurnState::Summarizing);
    let prompt = follow_up_prompt(&record.formatted_result, question);
    turn.emit(TurnEvent::FollowUpSent { prompt: prompt.clone() });
    match gateway.generate(&prompt) {
        Ok(text) => turn.finish(TurnState::Done, text),
        Err(e) => {
            let answer = format_error(&e.to_string());
            turn.fail(TurnState::GatewayFailed, &e, answer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_up_prompt_embeds_result_and_question() {
        let p = follow_up_prompt("📊 data", "How many?");
        assert!(p.starts_with("Based on this data about homicides:\n\n📊 data\n\n"));
        assert!(p.contains("Please answer the original question: \"How many?\""));
        assert!(p.ends_with("Provide a clear, informative answer based on the data."));
    }
}
