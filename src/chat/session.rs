//! Chat flow controller for one visitor session against one agent.
//!
//! A session is created in the loading step and is either refused
//! (not found, inactive, store failure) or starts `Ready` with a greeting.
//! Each submission then goes through the payment gate:
//! 1. Gate trips → `PaymentRequired`, the message waits for payment
//! 2. Otherwise the reply is generated and the transcript persisted
//!
//! Provider failures never reach the visitor; they become a fixed apology.

use crate::chat::gate;
use crate::config::OportunaConfig;
use crate::error::{ChatError, GenerateError};
use crate::llm::ResponseGenerator;
use crate::payment::{format_fee, PaymentInitiator, WalletConnectPayment};
use crate::state::{save_transcript, Store};
use crate::types::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Appended when the provider call fails.
pub const APOLOGY_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Appended when the payment collaborator reports failure.
pub const PAYMENT_FAILED_REPLY: &str =
    "There was an error processing your payment. Please try again.";

pub const PAY_ACTION_LABEL: &str = "Pay to Continue";

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct ChatContext {
    pub store: Arc<dyn Store>,
    pub generator: ResponseGenerator,
    pub payments: Arc<dyn PaymentInitiator>,
    pub receiving_address: String,
    pub free_visitor_turns: usize,
}

impl ChatContext {
    /// Build from a validated configuration.
    pub fn from_config(config: &OportunaConfig, store: Arc<dyn Store>) -> Self {
        Self {
            store,
            generator: ResponseGenerator::from_config(config),
            payments: Arc::new(WalletConnectPayment::new(Some(config.wallet_project_id.as_str()))),
            receiving_address: config.receiving_address.clone(),
            free_visitor_turns: config.free_visitor_turns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// Accepting visitor input.
    Ready,
    /// Waiting on the pay action; free text is refused.
    PaymentRequired,
}

/// What the visitor is asked to pay before the conversation continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPrompt {
    pub amount: String,
    pub token: String,
    pub message: String,
    pub action: String,
}

impl PaymentPrompt {
    fn for_agent(agent: &Agent) -> Self {
        let amount = format_fee(agent.fee());
        Self {
            message: format!(
                "To continue this conversation, a payment of {} {} is required.",
                amount, agent.fee_token
            ),
            amount,
            token: agent.fee_token.clone(),
            action: PAY_ACTION_LABEL.to_string(),
        }
    }
}

/// Result of a submission or pay action.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// The agent answered.
    Replied(String),
    /// Generation failed and the apology was appended.
    Apologized,
    /// The gate tripped; the message waits for payment.
    PaymentRequired(PaymentPrompt),
    /// The payment collaborator reported failure; the gate stays engaged.
    PaymentFailed,
}

/// Public projection of an agent for visitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub fee_amount: Option<f64>,
    pub fee_token: String,
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub agent: AgentCard,
    pub messages: Vec<ChatMessage>,
    pub phase: ChatPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_prompt: Option<PaymentPrompt>,
    pub payments_enabled: bool,
}

/// One visitor's conversation with one agent.
pub struct ChatSession {
    id: String,
    ctx: ChatContext,
    agent: Agent,
    visitor_id: Option<String>,
    messages: Vec<ChatMessage>,
    phase: ChatPhase,
    paid: bool,
    conversation_id: Option<String>,
}

impl ChatSession {
    /// Fetch the agent by slug, record the visit and greet the visitor.
    pub async fn load(
        ctx: ChatContext,
        slug: &str,
        visitor_id: Option<String>,
        visit: VisitInfo,
    ) -> Result<Self, ChatError> {
        let agent = match ctx.store.agent_by_slug(slug).await {
            Ok(Some(agent)) => agent,
            Ok(None) => {
                warn!("Agent '{}' not found", slug);
                return Err(ChatError::AgentNotFound(slug.to_string()));
            }
            Err(e) => {
                error!("Error fetching agent '{}': {}", slug, e);
                return Err(e.into());
            }
        };

        if !agent.is_active {
            warn!("Agent '{}' is inactive", slug);
            return Err(ChatError::AgentInactive(slug.to_string()));
        }

        let visit = AgentVisit {
            id: new_id(),
            agent_id: agent.id.clone(),
            info: visit,
            created_at: Utc::now(),
        };
        if let Err(e) = ctx.store.record_visit(&visit).await {
            warn!("Failed to record visit for '{}': {}", slug, e);
        }

        let greeting = format!("Hello! I'm {}. How can I help you today?", agent.name);
        info!("Chat session opened for '{}'", slug);

        Ok(Self {
            id: new_id(),
            ctx,
            agent,
            visitor_id,
            messages: vec![ChatMessage::assistant(greeting)],
            phase: ChatPhase::Ready,
            paid: false,
            conversation_id: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// Id of the persisted conversation, once one has been written.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn payment_prompt(&self) -> Option<PaymentPrompt> {
        (self.phase == ChatPhase::PaymentRequired).then(|| PaymentPrompt::for_agent(&self.agent))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            agent: AgentCard {
                slug: self.agent.slug.clone(),
                name: self.agent.name.clone(),
                description: self.agent.description.clone(),
                fee_amount: self.agent.fee_amount,
                fee_token: self.agent.fee_token.clone(),
            },
            messages: self.messages.clone(),
            phase: self.phase,
            payment_prompt: self.payment_prompt(),
            payments_enabled: self.ctx.payments.is_enabled(),
        }
    }

    /// Submit visitor text.
    pub async fn submit(&mut self, text: &str) -> Result<Turn, ChatError> {
        if self.phase == ChatPhase::PaymentRequired {
            return Err(ChatError::PaymentPending);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let gated = gate::requires_payment(
            &self.agent,
            &self.messages,
            self.paid,
            self.ctx.free_visitor_turns,
        );
        self.messages.push(ChatMessage::user(text));

        if gated {
            info!(
                "Payment required for '{}' after {} visitor turns",
                self.agent.slug,
                gate::visitor_turns(&self.messages) - 1
            );
            self.phase = ChatPhase::PaymentRequired;
            return Ok(Turn::PaymentRequired(PaymentPrompt::for_agent(&self.agent)));
        }

        match self.respond().await {
            Err(ChatError::Configuration(msg)) => {
                // Nothing answered this message; drop it so a retry is clean.
                self.messages.pop();
                Err(ChatError::Configuration(msg))
            }
            other => other,
        }
    }

    /// Pay the agent's fee and answer the message waiting behind the gate.
    pub async fn pay(&mut self) -> Result<Turn, ChatError> {
        if self.phase != ChatPhase::PaymentRequired {
            return Err(ChatError::NoPaymentRequired);
        }

        let amount = format_fee(self.agent.fee());
        let outcome = self
            .ctx
            .payments
            .send_payment(&self.ctx.receiving_address, &amount)
            .await;

        if !outcome.success {
            warn!(
                "Payment for '{}' failed: {}",
                self.agent.slug,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            self.messages.push(ChatMessage::assistant(PAYMENT_FAILED_REPLY));
            return Ok(Turn::PaymentFailed);
        }

        info!("Payment of {} {} accepted for '{}'", amount, self.agent.fee_token, self.agent.slug);
        self.paid = true;
        self.phase = ChatPhase::Ready;
        self.respond().await
    }

    /// Generate a reply for the current sequence and persist on success.
    async fn respond(&mut self) -> Result<Turn, ChatError> {
        match self.ctx.generator.generate(&self.messages, &self.agent).await {
            Ok(reply) => {
                self.messages.push(ChatMessage::assistant(reply.clone()));
                self.persist().await;
                Ok(Turn::Replied(reply))
            }
            Err(GenerateError::Configuration(msg)) => {
                error!("Cannot generate for '{}': {}", self.agent.slug, msg);
                Err(ChatError::Configuration(msg))
            }
            Err(e) => {
                error!("Error getting AI response for '{}': {}", self.agent.slug, e);
                self.messages.push(ChatMessage::assistant(APOLOGY_REPLY));
                Ok(Turn::Apologized)
            }
        }
    }

    /// Save failures are logged only; the visitor keeps the reply.
    async fn persist(&mut self) {
        match save_transcript(
            self.ctx.store.as_ref(),
            &self.agent.id,
            self.visitor_id.as_deref(),
            &self.messages,
        )
        .await
        {
            Ok(outcome) => {
                debug!("Saved transcript: {:?}", outcome);
                self.conversation_id = Some(outcome.conversation_id().to_string());
            }
            Err(e) => error!("Error saving conversation for '{}': {}", self.agent.slug, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FALLBACK_REPLY;
    use crate::payment::PaymentOutcome;
    use crate::state::SqliteStore;
    use crate::testutil::{agent, seed_agent, ScriptedPayment, ScriptedProvider, RECEIVING};

    struct Harness {
        ctx: ChatContext,
        store: Arc<SqliteStore>,
        provider: Arc<ScriptedProvider>,
        payments: Arc<ScriptedPayment>,
    }

    async fn harness(agents: &[Agent], provider: ScriptedProvider, payments: ScriptedPayment) -> Harness {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        for a in agents {
            seed_agent(store.as_ref(), a).await;
        }
        let provider = Arc::new(provider);
        let payments = Arc::new(payments);
        let ctx = ChatContext {
            store: store.clone(),
            generator: ResponseGenerator::new(provider.clone()),
            payments: payments.clone(),
            receiving_address: RECEIVING.to_string(),
            free_visitor_turns: 3,
        };
        Harness {
            ctx,
            store,
            provider,
            payments,
        }
    }

    async fn open(h: &Harness, slug: &str) -> ChatSession {
        ChatSession::load(h.ctx.clone(), slug, None, VisitInfo::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_load_greets_and_records_visit() {
        let h = harness(&[agent("Ava", "ava", None)], ScriptedProvider::replies([]), ScriptedPayment::new(vec![])).await;
        let session = open(&h, "ava").await;

        assert_eq!(session.phase(), ChatPhase::Ready);
        assert_eq!(
            session.messages(),
            [ChatMessage::assistant("Hello! I'm Ava. How can I help you today?")]
        );
        let ids = vec![session.agent().id.clone()];
        assert_eq!(h.store.count_visits(&ids).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_refuses_missing_and_inactive() {
        let mut off = agent("Off", "off", None);
        off.is_active = false;
        let h = harness(&[off], ScriptedProvider::replies([]), ScriptedPayment::new(vec![])).await;

        let missing = ChatSession::load(h.ctx.clone(), "nobody", None, VisitInfo::default()).await;
        assert!(matches!(missing, Err(ChatError::AgentNotFound(_))));
        let inactive = ChatSession::load(h.ctx.clone(), "off", None, VisitInfo::default()).await;
        assert!(matches!(inactive, Err(ChatError::AgentInactive(_))));
    }

    #[tokio::test]
    async fn test_free_agent_replies_without_prompt() {
        let h = harness(
            &[agent("Ava", "ava", Some(0.0))],
            ScriptedProvider::replies(["Hi there!", "I help founders"]),
            ScriptedPayment::new(vec![]),
        )
        .await;
        let mut session = open(&h, "ava").await;

        assert_eq!(session.submit("Hi").await.unwrap(), Turn::Replied("Hi there!".into()));
        assert_eq!(
            session.submit("What do you do?").await.unwrap(),
            Turn::Replied("I help founders".into())
        );
        for i in 0..10 {
            let turn = session.submit(&format!("more {i}")).await.unwrap();
            assert!(matches!(turn, Turn::Replied(_)));
        }
        assert!(session.payment_prompt().is_none());
        assert!(h.payments.calls().is_empty());
    }

    #[tokio::test]
    async fn test_paid_agent_gates_fourth_submission_once() {
        let h = harness(
            &[agent("Rex", "rex", Some(0.01))],
            ScriptedProvider::replies([]),
            ScriptedPayment::new(vec![]),
        )
        .await;
        let mut session = open(&h, "rex").await;

        for q in ["one", "two", "three"] {
            assert!(matches!(session.submit(q).await.unwrap(), Turn::Replied(_)));
        }
        assert_eq!(session.phase(), ChatPhase::Ready);

        let turn = session.submit("four").await.unwrap();
        let Turn::PaymentRequired(prompt) = turn else {
            panic!("expected payment prompt, got {turn:?}");
        };
        assert_eq!(format!("{} {}", prompt.amount, prompt.token), "0.01 ETH");
        assert_eq!(prompt.action, "Pay to Continue");
        assert_eq!(
            prompt.message,
            "To continue this conversation, a payment of 0.01 ETH is required."
        );
        assert_eq!(h.provider.calls().len(), 3);

        assert!(matches!(session.submit("five").await, Err(ChatError::PaymentPending)));

        let before = session.messages().len();
        assert_eq!(session.pay().await.unwrap(), Turn::Replied("reply 4".into()));
        assert_eq!(session.messages().len(), before + 1);
        assert_eq!(session.messages()[before - 1], ChatMessage::user("four"));
        assert_eq!(h.payments.calls(), vec![(RECEIVING.to_string(), "0.01".to_string())]);

        // gate never re-engages once paid
        for q in ["five", "six", "seven"] {
            assert!(matches!(session.submit(q).await.unwrap(), Turn::Replied(_)));
        }
        assert_eq!(h.payments.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_payment_keeps_gate_and_allows_retry() {
        let h = harness(
            &[agent("Rex", "rex", Some(0.01))],
            ScriptedProvider::replies([]),
            ScriptedPayment::new(vec![PaymentOutcome::failed("user rejected")]),
        )
        .await;
        let mut session = open(&h, "rex").await;
        for q in ["one", "two", "three", "four"] {
            session.submit(q).await.unwrap();
        }

        assert_eq!(session.pay().await.unwrap(), Turn::PaymentFailed);
        assert_eq!(session.phase(), ChatPhase::PaymentRequired);
        assert_eq!(
            session.messages().last().unwrap(),
            &ChatMessage::assistant(PAYMENT_FAILED_REPLY)
        );
        assert_eq!(h.provider.calls().len(), 3);

        assert!(matches!(session.pay().await.unwrap(), Turn::Replied(_)));
        assert_eq!(session.phase(), ChatPhase::Ready);
        assert_eq!(h.provider.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_pay_without_gate_is_rejected() {
        let h = harness(&[agent("Ava", "ava", None)], ScriptedProvider::replies([]), ScriptedPayment::new(vec![])).await;
        let mut session = open(&h, "ava").await;
        assert!(matches!(session.pay().await, Err(ChatError::NoPaymentRequired)));
        assert!(matches!(session.submit("   ").await, Err(ChatError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_provider_failure_appends_apology_without_saving() {
        let h = harness(
            &[agent("Ava", "ava", None)],
            ScriptedProvider::new(vec![Err(GenerateError::Provider("timeout".into()))]),
            ScriptedPayment::new(vec![]),
        )
        .await;
        let mut session = open(&h, "ava").await;

        assert_eq!(session.submit("Hi").await.unwrap(), Turn::Apologized);
        assert_eq!(session.messages().last().unwrap(), &ChatMessage::assistant(APOLOGY_REPLY));
        assert!(h.store.latest_conversation("agent-ava").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_configuration_error_is_distinct() {
        let h = harness(
            &[agent("Ava", "ava", None)],
            ScriptedProvider::new(vec![Err(GenerateError::Configuration("no key".into()))]),
            ScriptedPayment::new(vec![]),
        )
        .await;
        let mut session = open(&h, "ava").await;

        assert!(matches!(session.submit("Hi").await, Err(ChatError::Configuration(_))));
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_completion_shows_fallback() {
        let h = harness(
            &[agent("Ava", "ava", None)],
            ScriptedProvider::new(vec![Ok(None)]),
            ScriptedPayment::new(vec![]),
        )
        .await;
        let mut session = open(&h, "ava").await;
        assert_eq!(session.submit("Hi").await.unwrap(), Turn::Replied(FALLBACK_REPLY.into()));
    }

    #[tokio::test]
    async fn test_saved_transcript_matches_session() {
        let h = harness(&[agent("Ava", "ava", None)], ScriptedProvider::replies([]), ScriptedPayment::new(vec![])).await;
        let mut session = open(&h, "ava").await;
        for q in ["Hi", "What do you do?", "Thanks"] {
            session.submit(q).await.unwrap();
        }

        let saved = h.store.conversations_for_agent("agent-ava").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].messages, session.messages());
        assert_eq!(session.conversation_id(), Some(saved[0].id.as_str()));
    }

    #[tokio::test]
    async fn test_view_reports_phase_and_prompt() {
        let h = harness(&[agent("Rex", "rex", Some(0.01))], ScriptedProvider::replies([]), ScriptedPayment::new(vec![])).await;
        let mut session = open(&h, "rex").await;
        for q in ["one", "two", "three", "four"] {
            session.submit(q).await.unwrap();
        }

        let view = serde_json::to_value(session.view()).unwrap();
        assert_eq!(view["phase"], "payment_required");
        assert_eq!(view["agent"]["slug"], "rex");
        assert_eq!(view["payment_prompt"]["amount"], "0.01");
        assert_eq!(view["payments_enabled"], true);
    }
}
