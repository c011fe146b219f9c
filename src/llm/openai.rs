//! OpenAI chat completions adapter (async-openai driven from a blocking call site).

use async_openai::Client;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use color_eyre::{Result, eyre::eyre};
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument};

use super::{ChatMessage, CompletionBackend, Role};
use crate::config::Config;

/// OpenAI の Chat Completions を叩くアダプタ。API キーは `OPENAI_API_KEY` から読む。
pub struct OpenAiBackend {
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl OpenAiBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }

    fn to_request_messages(messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let msg: ChatCompletionRequestMessage = match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default().content(m.content.as_str()).build()?.into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default().content(m.content.as_str()).build()?.into(),
                Role::Assistant => {
                    ChatCompletionRequestAssistantMessageArgs::default().content(m.content.as_str()).build()?.into()
                }
            };
            out.push(msg);
        }
        Ok(out)
    }

    async fn complete_async(&self, messages: &[ChatMessage]) -> Result<String> {
        let client = Client::new();
        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::to_request_messages(messages)?)
            .max_completion_tokens(self.max_tokens)
            .temperature(self.temperature)
            .top_p(self.top_p)
            .build()?;

        info!(target: "llm", model = %self.model, max_tokens = self.max_tokens, "openai_chat_request");
        let resp = client.chat().create(req).await?;
        debug!(target: "llm", choices = resp.choices.len(), "openai_chat_response");

        resp.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| eyre!("empty completion from {}", self.model))
    }
}

impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(name = "openai_complete", skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let rt = Runtime::new()?;
        rt.block_on(self.complete_async(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_converts() {
        let msgs = [ChatMessage::system("s"), ChatMessage::user("u"), ChatMessage::assistant("a")];
        let out = OpenAiBackend::to_request_messages(&msgs).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(out[2], ChatCompletionRequestMessage::Assistant(_)));
    }
}
