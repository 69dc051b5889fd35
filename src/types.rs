//! Shared record types for agents, conversations and payments.
//!
//! These mirror the five record kinds held by the backing store
//! (`agents`, `agent_conversations`, `agent_visits`, `transactions`,
//! `profiles`). Loosely typed columns from the store are validated here:
//! `null` arrays decode as empty, message roles are restricted to
//! user/assistant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fee token used when an agent does not name one.
pub const DEFAULT_FEE_TOKEN: &str = "ETH";

/// New time-ordered record id, rendered in UUID layout so hosted stores with
/// `uuid` columns accept it.
pub fn new_id() -> String {
    let raw = ulid::Ulid::new().0;
    let hex = format!("{raw:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The visitor.
    User,
    /// The agent (including synthesized greetings and failure notices).
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// A configured conversational persona published at `/agent/{slug}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interests: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub facts: Vec<String>,
    /// Replaces the synthesized system directive when non-empty.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// `None` or zero means the agent is free.
    #[serde(default)]
    pub fee_amount: Option<f64>,
    #[serde(default = "default_fee_token")]
    pub fee_token: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Effective fee; anything absent, non-finite or non-positive is zero.
    pub fn fee(&self) -> f64 {
        match self.fee_amount {
            Some(fee) if fee.is_finite() && fee > 0.0 => fee,
            _ => 0.0,
        }
    }

    /// Whether visitors may be asked to pay.
    pub fn charges_fee(&self) -> bool {
        self.fee() > 0.0
    }
}

/// Owner-supplied agent fields from the settings form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDraft {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub personality: Option<String>,
    /// A JSON array or the form's comma-separated text.
    #[serde(deserialize_with = "list_or_csv")]
    pub interests: Vec<String>,
    pub facts: Vec<String>,
    pub system_prompt: Option<String>,
    pub fee_amount: Option<f64>,
    pub fee_token: Option<String>,
    pub is_active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// Persisted message history for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Visits
// ---------------------------------------------------------------------------

/// Request details captured when a visitor opens an agent's chat page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitInfo {
    pub visitor_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// A recorded page visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentVisit {
    pub id: String,
    pub agent_id: String,
    #[serde(flatten)]
    pub info: VisitInfo,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

/// A claimed payment to an agent's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub from_address: String,
    pub amount: f64,
    #[serde(default = "default_fee_token")]
    pub token: String,
    pub tx_hash: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    #[default]
    User,
    Admin,
}

impl fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for ProfileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown profile role '{other}'")),
        }
    }
}

/// An owner account. Managed by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: ProfileRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Aggregates shown on the owner's dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_visits: u64,
    pub total_conversations: u64,
    /// Sum of completed transaction amounts.
    pub total_earnings: f64,
    /// Token the earnings are denominated in.
    #[serde(default = "default_fee_token")]
    pub earnings_token: String,
    /// Conversations per visit, as a percentage.
    pub conversion_rate: f64,
}

impl Default for DashboardStats {
    fn default() -> Self {
        Self::new(0, 0, 0.0)
    }
}

impl DashboardStats {
    pub fn new(total_visits: u64, total_conversations: u64, total_earnings: f64) -> Self {
        let conversion_rate = if total_visits > 0 {
            total_conversations as f64 / total_visits as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_visits,
            total_conversations,
            total_earnings,
            earnings_token: default_fee_token(),
            conversion_rate,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.earnings_token = token.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn default_fee_token() -> String {
    DEFAULT_FEE_TOKEN.to_string()
}

fn default_true() -> bool {
    true
}

/// Decode `null` as an empty collection.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `["a","b"]`, `"a, b"` or `null`.
fn list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Option::<ListOrCsv>::deserialize(deserializer)? {
        Some(ListOrCsv::List(items)) => items,
        Some(ListOrCsv::Csv(raw)) => crate::dashboard::parse_interests(&raw),
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_draft_interests_accept_text_or_list() {
        let from_text: AgentDraft =
            serde_json::from_value(json!({"name": "Ava", "interests": "rust, , ai "})).unwrap();
        assert_eq!(from_text.interests, vec!["rust", "ai"]);

        let from_list: AgentDraft =
            serde_json::from_value(json!({"name": "Ava", "interests": ["rust", "ai"]})).unwrap();
        assert_eq!(from_list.interests, vec!["rust", "ai"]);

        let absent: AgentDraft = serde_json::from_value(json!({"interests": null})).unwrap();
        assert!(absent.interests.is_empty());
    }

    #[test]
    fn test_agent_decodes_nullable_columns() {
        let agent: Agent = serde_json::from_value(json!({
            "id": "a1",
            "user_id": "u1",
            "slug": "ava",
            "name": "Ava",
            "description": null,
            "personality": null,
            "interests": null,
            "fee_amount": null,
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:00:00+00:00"
        }))
        .unwrap();

        assert!(agent.interests.is_empty());
        assert!(agent.facts.is_empty());
        assert_eq!(agent.fee_token, "ETH");
        assert!(agent.is_active);
        assert!(!agent.charges_fee());
    }

    #[test]
    fn test_fee_ignores_negative_and_nan() {
        let mut agent: Agent = serde_json::from_value(json!({
            "id": "a1", "user_id": "u1", "slug": "rex", "name": "Rex",
            "fee_amount": 0.01,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert!(agent.charges_fee());

        agent.fee_amount = Some(-1.0);
        assert_eq!(agent.fee(), 0.0);
        agent.fee_amount = Some(f64::NAN);
        assert_eq!(agent.fee(), 0.0);
    }

    #[test]
    fn test_message_role_rejects_system() {
        let result: Result<ChatMessage, _> =
            serde_json::from_value(json!({"role": "system", "content": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_new_id_layout() {
        let id = new_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_ne!(id, new_id());
    }

    #[test]
    fn test_conversion_rate() {
        assert_eq!(DashboardStats::new(0, 3, 0.0).conversion_rate, 0.0);
        assert_eq!(DashboardStats::new(4, 1, 0.0).conversion_rate, 25.0);
        assert_eq!(DashboardStats::default().earnings_token, DEFAULT_FEE_TOKEN);
    }
}
