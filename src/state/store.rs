//! The record store seam shared by the chat and dashboard flows.

use crate::error::StoreError;
use crate::state::Database;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub type StoreResult<T> = Result<T, StoreError>;

/// Row-level access to the five record kinds.
///
/// Queries are limited to equality filters, newest-first ordering and
/// "latest" lookups, so hosted and embedded backends can both serve them.
#[async_trait]
pub trait Store: Send + Sync {
    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>>;

    async fn agent_by_id(&self, id: &str) -> StoreResult<Option<Agent>>;

    /// An owner's agents, newest first.
    async fn agents_for_owner(&self, user_id: &str) -> StoreResult<Vec<Agent>>;

    /// Insert a new agent. A taken slug is `Conflict`.
    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()>;

    /// Update an agent where both `id` and `user_id` match; `NotFound` otherwise.
    async fn update_agent(&self, agent: &Agent) -> StoreResult<()>;

    async fn latest_conversation(&self, agent_id: &str) -> StoreResult<Option<Conversation>>;

    /// All conversations for an agent, newest first.
    async fn conversations_for_agent(&self, agent_id: &str) -> StoreResult<Vec<Conversation>>;

    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()>;

    /// Overwrite the full message array of a conversation.
    async fn update_conversation_messages(
        &self,
        id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn count_conversations(&self, agent_ids: &[String]) -> StoreResult<u64>;

    async fn record_visit(&self, visit: &AgentVisit) -> StoreResult<()>;

    async fn count_visits(&self, agent_ids: &[String]) -> StoreResult<u64>;

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    /// Amounts of `completed` transactions for the given agents.
    async fn completed_amounts(&self, agent_ids: &[String]) -> StoreResult<Vec<f64>>;

    async fn profile(&self, id: &str) -> StoreResult<Option<Profile>>;

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Conversation upsert
// ---------------------------------------------------------------------------

/// Which write a transcript save performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted(String),
    Updated(String),
}

impl SaveOutcome {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Inserted(id) | Self::Updated(id) => id,
        }
    }
}

/// Persist the whole message sequence for an agent.
///
/// The most recently created conversation for the agent is overwritten when
/// one exists; otherwise a new row is inserted. Last writer wins.
pub async fn save_transcript(
    store: &dyn Store,
    agent_id: &str,
    visitor_id: Option<&str>,
    messages: &[ChatMessage],
) -> StoreResult<SaveOutcome> {
    let now = Utc::now();
    match store.latest_conversation(agent_id).await? {
        Some(existing) => {
            debug!("Updating conversation {} for agent {}", existing.id, agent_id);
            store
                .update_conversation_messages(&existing.id, messages, now)
                .await?;
            Ok(SaveOutcome::Updated(existing.id))
        }
        None => {
            let conversation = Conversation {
                id: new_id(),
                agent_id: agent_id.to_string(),
                visitor_id: visitor_id.map(str::to_string),
                messages: messages.to_vec(),
                metadata: None,
                created_at: now,
                updated_at: now,
            };
            debug!("Creating conversation {} for agent {}", conversation.id, agent_id);
            store.insert_conversation(&conversation).await?;
            Ok(SaveOutcome::Inserted(conversation.id))
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// [`Store`] backed by the embedded SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_memory() -> StoreResult<Self> {
        Ok(Self::new(Database::open_memory()?))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>> {
        self.db.lock().await.agent_by_slug(slug)
    }

    async fn agent_by_id(&self, id: &str) -> StoreResult<Option<Agent>> {
        self.db.lock().await.agent_by_id(id)
    }

    async fn agents_for_owner(&self, user_id: &str) -> StoreResult<Vec<Agent>> {
        self.db.lock().await.agents_for_owner(user_id)
    }

    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.db.lock().await.insert_agent(agent)
    }

    async fn update_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.db.lock().await.update_agent(agent)
    }

    async fn latest_conversation(&self, agent_id: &str) -> StoreResult<Option<Conversation>> {
        self.db.lock().await.latest_conversation(agent_id)
    }

    async fn conversations_for_agent(&self, agent_id: &str) -> StoreResult<Vec<Conversation>> {
        self.db.lock().await.conversations_for_agent(agent_id)
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        self.db.lock().await.insert_conversation(conversation)
    }

    async fn update_conversation_messages(
        &self,
        id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.db
            .lock()
            .await
            .update_conversation_messages(id, messages, updated_at)
    }

    async fn count_conversations(&self, agent_ids: &[String]) -> StoreResult<u64> {
        self.db.lock().await.count_conversations(agent_ids)
    }

    async fn record_visit(&self, visit: &AgentVisit) -> StoreResult<()> {
        self.db.lock().await.record_visit(visit)
    }

    async fn count_visits(&self, agent_ids: &[String]) -> StoreResult<u64> {
        self.db.lock().await.count_visits(agent_ids)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        self.db.lock().await.insert_transaction(tx)
    }

    async fn completed_amounts(&self, agent_ids: &[String]) -> StoreResult<Vec<f64>> {
        self.db.lock().await.completed_amounts(agent_ids)
    }

    async fn profile(&self, id: &str) -> StoreResult<Option<Profile>> {
        self.db.lock().await.profile(id)
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.db.lock().await.upsert_profile(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{agent_with_id, seed_agent};

    async fn store_with_agents(ids: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_memory().unwrap();
        for id in ids {
            seed_agent(&store, &agent_with_id(id)).await;
        }
        store
    }

    #[tokio::test]
    async fn test_first_save_inserts_then_updates_same_row() {
        let store = store_with_agents(&["a1"]).await;
        let mut messages = vec![
            ChatMessage::assistant("Hello! I'm Ava. How can I help you today?"),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hey there"),
        ];

        let first = save_transcript(&store, "a1", None, &messages).await.unwrap();
        assert!(matches!(first, SaveOutcome::Inserted(_)));

        messages.push(ChatMessage::user("What do you do?"));
        messages.push(ChatMessage::assistant("I connect people"));
        let second = save_transcript(&store, "a1", None, &messages).await.unwrap();
        assert_eq!(second, SaveOutcome::Updated(first.conversation_id().to_string()));

        let all = store.conversations_for_agent("a1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].messages, messages);
    }

    #[tokio::test]
    async fn test_save_is_scoped_per_agent() {
        let store = store_with_agents(&["a1", "a2"]).await;
        let msgs = [ChatMessage::user("Hi")];
        save_transcript(&store, "a1", Some("v1"), &msgs).await.unwrap();
        let other = save_transcript(&store, "a2", None, &msgs).await.unwrap();
        assert!(matches!(other, SaveOutcome::Inserted(_)));

        let saved = store.latest_conversation("a1").await.unwrap().unwrap();
        assert_eq!(saved.visitor_id.as_deref(), Some("v1"));
        assert_eq!(store.count_conversations(&["a1".into(), "a2".into()]).await.unwrap(), 2);
    }
}
