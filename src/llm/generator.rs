//! Agent reply generation.

use crate::config::OportunaConfig;
use crate::error::GenerateError;
use crate::llm::client::{CompletionProvider, OpenAiClient};
use crate::llm::prompt;
use crate::types::{Agent, ChatMessage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shown when the provider answers without any text.
pub const FALLBACK_REPLY: &str = "I apologize, but I was unable to generate a response.";

/// Produces one reply for a message sequence and an agent profile.
#[derive(Clone)]
pub struct ResponseGenerator {
    provider: Arc<dyn CompletionProvider>,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub fn from_config(config: &OportunaConfig) -> Self {
        Self::new(Arc::new(OpenAiClient::from_config(config)))
    }

    /// Generate the agent's next reply.
    ///
    /// Always yields non-empty text on success. Configuration and provider
    /// failures are returned distinctly so callers can treat them differently.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        agent: &Agent,
    ) -> Result<String, GenerateError> {
        let directive = prompt::build_directive(agent);
        match self.provider.complete(&directive, messages).await? {
            Some(text) => {
                debug!("Generated {} chars for '{}'", text.len(), agent.slug);
                Ok(text)
            }
            None => {
                warn!("Empty completion for agent '{}'; using fallback", agent.slug);
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }
}
