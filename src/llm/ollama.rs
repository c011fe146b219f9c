//! Ollama `/api/chat` adapter over blocking reqwest.

use std::time::Duration;

use color_eyre::{Result, eyre::{WrapErr, eyre}};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{ChatMessage, CompletionBackend};
use crate::config::Config;

#[derive(Debug, Clone, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(alias = "name")]
    model: String,
}

pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    options: ChatOptions,
}

impl OllamaBackend {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent("incident_qa_ollama/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .wrap_err("building reqwest client for ollama")?;
        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: ChatOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
                top_p: config.top_p,
                repeat_penalty: config.repeat_penalty,
            },
        })
    }

    /// Models installed on the server (`/api/tags`).
    pub fn available_models(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .wrap_err("requesting ollama model list")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(eyre!("status {} from /api/tags", status.as_u16()));
        }
        let tags: TagsResponse = resp.json().wrap_err("decoding ollama model list")?;
        Ok(tags.models.into_iter().map(|m| m.model).filter(|m| !m.is_empty()).collect())
    }

    /// `Ok(false)` when the server is up but the configured model is not pulled.
    pub fn has_model(&self) -> Result<bool> {
        Ok(self.available_models()?.iter().any(|m| m == &self.model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(name = "ollama_complete", skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatRequest { model: &self.model, messages, stream: false, options: &self.options };
        info!(target: "llm", model = %self.model, num_predict = self.options.num_predict, "ollama_chat_request");

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .wrap_err("sending ollama chat request")?;
        let status = resp.status();
        let text = resp.text().wrap_err("reading ollama response body")?;
        debug!(target: "llm", status = %status, len = text.len(), "ollama_response_raw");
        if !status.is_success() {
            return Err(eyre!("status {}: {}", status.as_u16(), text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).wrap_err("decoding ollama chat response")?;
        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_carries_sampling_options() {
        let cfg = Config::default();
        let backend = OllamaBackend::from_config(&cfg).unwrap();
        let messages = [ChatMessage::system("s"), ChatMessage::user("q")];
        let body = ChatRequest { model: backend.model(), messages: &messages, stream: false, options: &backend.options };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "llama3.2:3b");
        assert_eq!(v["stream"], false);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["options"]["num_predict"], 2048);
        assert!(v["options"].get("repeat_penalty").is_some());
    }

    #[test]
    fn response_and_tags_decode() {
        let r: ChatResponse = serde_json::from_value(json!({
            "model": "m", "message": {"role": "assistant", "content": "hi"}, "done": true
        }))
        .unwrap();
        assert_eq!(r.message.content, "hi");
        let t: TagsResponse = serde_json::from_value(json!({"models": [{"name": "llama3.2:3b"}]})).unwrap();
        assert_eq!(t.models[0].model, "llama3.2:3b");
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let cfg = Config { ollama_url: "http://127.0.0.1:9".into(), request_timeout_secs: 2, ..Config::default() };
        let backend = OllamaBackend::from_config(&cfg).unwrap();
        assert!(backend.complete(&[ChatMessage::user("hello")]).is_err());
        assert!(backend.has_model().is_err());
    }
}
