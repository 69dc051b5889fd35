//! Conversation history view for an owner's agent.

use super::Dashboard;
use crate::error::SettingsError;
use crate::types::{ChatRole, Conversation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker label for visitor messages.
pub const VISITOR_LABEL: &str = "Visitor";

/// One rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLine {
    pub speaker: String,
    pub role: ChatRole,
    pub content: String,
}

/// One conversation, rendered in message order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptView {
    pub id: String,
    pub visitor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<HistoryLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHistory {
    pub agent_id: String,
    pub agent_name: String,
    /// Newest first.
    pub conversations: Vec<TranscriptView>,
}

impl TranscriptView {
    fn render(conversation: Conversation, agent_name: &str) -> Self {
        let lines = conversation
            .messages
            .into_iter()
            .map(|m| HistoryLine {
                speaker: match m.role {
                    ChatRole::Assistant => agent_name.to_string(),
                    ChatRole::User => VISITOR_LABEL.to_string(),
                },
                role: m.role,
                content: m.content,
            })
            .collect();
        Self {
            id: conversation.id,
            visitor_id: conversation.visitor_id,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            lines,
        }
    }
}

impl Dashboard {
    pub async fn history(&self, owner: &str, agent_id: &str) -> Result<AgentHistory, SettingsError> {
        let agent = self.get_agent(owner, agent_id).await?;
        let conversations = self.store.conversations_for_agent(&agent.id).await?;

        Ok(AgentHistory {
            conversations: conversations
                .into_iter()
                .map(|c| TranscriptView::render(c, &agent.name))
                .collect(),
            agent_id: agent.id,
            agent_name: agent.name,
        })
    }
}
