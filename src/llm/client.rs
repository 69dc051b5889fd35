//! Completion calls against an OpenAI-compatible chat API.

use crate::config::OportunaConfig;
use crate::error::GenerateError;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One synchronous request/response completion per visitor turn.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns `Ok(None)` when the provider answered without usable text.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Option<String>, GenerateError>;
}

/// Client for `/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new completion client.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            max_tokens: 500,
            temperature: 0.7,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OportunaConfig) -> Self {
        Self::new(&config.llm_api_url, &config.llm_api_key, &config.llm_model)
            .with_sampling(config.temperature, config.max_response_tokens)
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn build_request<'a>(&'a self, system: &'a str, messages: &'a [ChatMessage]) -> ChatRequest<'a> {
        let mut payloads = Vec::with_capacity(messages.len() + 1);
        payloads.push(MessagePayload {
            role: "system",
            content: system,
        });
        payloads.extend(messages.iter().map(|m| MessagePayload {
            role: match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: &m.content,
        }));

        ChatRequest {
            model: &self.model,
            messages: payloads,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Option<String>, GenerateError> {
        if self.api_key.is_empty() {
            return Err(GenerateError::Configuration(
                "no language model API key is set".into(),
            ));
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = self.build_request(system, messages);

        debug!("Completion request to model: {} ({} messages)", self.model, messages.len());

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Provider(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GenerateError::Provider(format!("failed to read body: {e}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GenerateError::Configuration(format!(
                "provider rejected the API key ({status})"
            )));
        }
        if !status.is_success() {
            return Err(GenerateError::Provider(format!("completion failed ({status}): {body}")));
        }

        parse_completion(&body)
    }
}

/// Extract the first choice's text. Missing or blank content is `None`.
pub fn parse_completion(body: &str) -> Result<Option<String>, GenerateError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerateError::Provider(format!("unreadable completion: {e}")))?;

    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|text| !text.trim().is_empty()))
}
