//! Model gateway: a narrow completion trait with one adapter per backend.
//!
//! The orchestrator only ever sees [`ModelGateway`]; adapters turn a list of
//! chat messages into reply text and nothing more.

pub mod gateway;
pub mod ollama;
pub mod openai;

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::config::{Backend, Config};

pub use gateway::{ModelGateway, ModelReply};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Black-box text completion. Implementations must not panic on transport failures.
pub trait CompletionBackend {
    fn name(&self) -> &str;
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Build the adapter selected in `config`.
pub fn backend_from_config(config: &Config) -> Result<Box<dyn CompletionBackend>> {
    Ok(match config.backend {
        Backend::Ollama => Box::new(OllamaBackend::from_config(config)?),
        Backend::OpenAI => Box::new(OpenAiBackend::from_config(config)),
    })
}
