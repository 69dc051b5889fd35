//! Test doubles shared by unit tests.

use crate::error::{GenerateError, StoreError};
use crate::llm::CompletionProvider;
use crate::payment::{PaymentInitiator, PaymentOutcome};
use crate::state::{Database, SqliteStore, Store, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const RECEIVING: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

pub const OWNER: &str = "owner-1";

pub fn agent(name: &str, slug: &str, fee: Option<f64>) -> Agent {
    Agent {
        id: format!("agent-{slug}"),
        user_id: OWNER.into(),
        slug: slug.into(),
        name: name.into(),
        description: Some(format!("{name}'s public card")),
        personality: None,
        interests: Vec::new(),
        facts: Vec::new(),
        system_prompt: None,
        fee_amount: fee,
        fee_token: "ETH".into(),
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Same as [`agent`] but with a fixed id, for rows keyed by hand.
pub fn agent_with_id(id: &str) -> Agent {
    Agent {
        id: id.into(),
        ..agent(id, id, None)
    }
}

pub fn profile(id: &str) -> Profile {
    Profile {
        id: id.into(),
        username: Some(format!("{id}-name")),
        full_name: None,
        role: ProfileRole::User,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Insert the agent's owner profile, then the agent itself.
pub async fn seed_agent(store: &dyn Store, agent: &Agent) {
    store.upsert_profile(&profile(&agent.user_id)).await.unwrap();
    store.insert_agent(agent).await.unwrap();
}

pub fn seed_agent_db(db: &Database, agent: &Agent) {
    db.upsert_profile(&profile(&agent.user_id)).unwrap();
    db.insert_agent(agent).unwrap();
}

type Completion = Result<Option<String>, GenerateError>;

/// Replays queued completions; echoes a numbered reply once the queue runs dry.
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Completion>>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Completion>) -> Self {
        Self {
            queue: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replies<const N: usize>(texts: [&str; N]) -> Self {
        Self::new(texts.iter().map(|t| Ok(Some(t.to_string()))).collect())
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Completion {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((system.to_string(), messages.to_vec()));
            calls.len()
        };
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Some(format!("reply {n}"))))
    }
}

/// Replays queued payment outcomes; succeeds once the queue runs dry.
pub struct ScriptedPayment {
    enabled: bool,
    queue: Mutex<VecDeque<PaymentOutcome>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedPayment {
    pub fn new(outcomes: Vec<PaymentOutcome>) -> Self {
        Self {
            enabled: true,
            queue: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentInitiator for ScriptedPayment {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send_payment(&self, to: &str, amount: &str) -> PaymentOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((to.to_string(), amount.to_string()));
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PaymentOutcome::ok)
    }
}

/// Aggregate read that [`FailingStore`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Visits,
    Conversations,
    Earnings,
}

/// SQLite store whose chosen aggregate read always fails.
pub struct FailingStore {
    inner: SqliteStore,
    broken: Aggregate,
}

impl FailingStore {
    pub fn new(broken: Aggregate) -> Self {
        Self {
            inner: SqliteStore::open_memory().unwrap(),
            broken,
        }
    }

    fn check(&self, read: Aggregate) -> StoreResult<()> {
        if self.broken == read {
            return Err(StoreError::Backend(format!("{read:?} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>> {
        self.inner.agent_by_slug(slug).await
    }

    async fn agent_by_id(&self, id: &str) -> StoreResult<Option<Agent>> {
        self.inner.agent_by_id(id).await
    }

    async fn agents_for_owner(&self, user_id: &str) -> StoreResult<Vec<Agent>> {
        self.inner.agents_for_owner(user_id).await
    }

    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.inner.insert_agent(agent).await
    }

    async fn update_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.inner.update_agent(agent).await
    }

    async fn latest_conversation(&self, agent_id: &str) -> StoreResult<Option<Conversation>> {
        self.inner.latest_conversation(agent_id).await
    }

    async fn conversations_for_agent(&self, agent_id: &str) -> StoreResult<Vec<Conversation>> {
        self.inner.conversations_for_agent(agent_id).await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        self.inner.insert_conversation(conversation).await
    }

    async fn update_conversation_messages(
        &self,
        id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .update_conversation_messages(id, messages, updated_at)
            .await
    }

    async fn count_conversations(&self, agent_ids: &[String]) -> StoreResult<u64> {
        self.check(Aggregate::Conversations)?;
        self.inner.count_conversations(agent_ids).await
    }

    async fn record_visit(&self, visit: &AgentVisit) -> StoreResult<()> {
        self.inner.record_visit(visit).await
    }

    async fn count_visits(&self, agent_ids: &[String]) -> StoreResult<u64> {
        self.check(Aggregate::Visits)?;
        self.inner.count_visits(agent_ids).await
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        self.inner.insert_transaction(tx).await
    }

    async fn completed_amounts(&self, agent_ids: &[String]) -> StoreResult<Vec<f64>> {
        self.check(Aggregate::Earnings)?;
        self.inner.completed_amounts(agent_ids).await
    }

    async fn profile(&self, id: &str) -> StoreResult<Option<Profile>> {
        self.inner.profile(id).await
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.inner.upsert_profile(profile).await
    }
}
