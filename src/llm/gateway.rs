use tracing::{info, instrument, warn};

use super::{ChatMessage, CompletionBackend};
use crate::call::contains_sentinel;
use crate::error::QaError;
use crate::prompt::{build_tool_system_prompt, resolve_variant};
use crate::tools::ToolCatalog;

/// First-pass reply: raw text plus whether it asks for a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub needs_tool_call: bool,
}

impl ModelReply {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let needs_tool_call = contains_sentinel(&content);
        Self { content, needs_tool_call }
    }
}

pub struct ModelGateway {
    backend: Box<dyn CompletionBackend>,
    variant: &'static str,
    system_prompt: String,
}

fn gateway_error(e: color_eyre::Report) -> QaError {
    let chain: Vec<String> = e.chain().map(|c| c.to_string()).collect();
    QaError::ModelGateway(chain.join(": "))
}

impl ModelGateway {
    /// The system prompt is rendered once here; unknown variants fall back to the default.
    pub fn new(backend: Box<dyn CompletionBackend>, variant: &str, catalog: &ToolCatalog) -> Self {
        let resolved = resolve_variant(variant).name;
        Self { backend, variant: resolved, system_prompt: build_tool_system_prompt(resolved, catalog) }
    }

    pub fn variant(&self) -> &str {
        self.variant
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[instrument(name = "generate_with_tools", skip(self, question), fields(backend = self.backend.name(), variant = self.variant))]
    pub fn generate_with_tools(&self, question: &str) -> Result<ModelReply, QaError> {
        let messages = [ChatMessage::system(self.system_prompt.as_str()), ChatMessage::user(question)];
        match self.backend.complete(&messages) {
            Ok(content) => {
                let reply = ModelReply::new(content);
                info!(target: "llm", needs_tool_call = reply.needs_tool_call, len = reply.content.len(), "first_pass_reply");
                Ok(reply)
            }
            Err(e) => {
                let err = gateway_error(e);
                warn!(target: "llm", error = %err, "first_pass_failed");
                Err(err)
            }
        }
    }

    /// Plain single-message completion with no system prompt.
    #[instrument(name = "generate", skip(self, prompt), fields(backend = self.backend.name(), len = prompt.len()))]
    pub fn generate(&self, prompt: &str) -> Result<String, QaError> {
        self.backend.complete(&[ChatMessage::user(prompt)]).map_err(|e| {
            let err = gateway_error(e);
            warn!(target: "llm", error = %err, "generate_failed");
            err
        })
    }
}
