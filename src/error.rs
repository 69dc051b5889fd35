//! Error taxonomy shared by the store, generator, payment and chat layers.

use thiserror::Error;

/// Failures talking to the backing record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("malformed record: {0}")]
    Decode(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("row".into()),
            rusqlite::Error::SqliteFailure(code, msg)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Self::Conflict(msg.unwrap_or_else(|| code.to_string()))
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Failures producing an agent reply.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// No usable provider credential. Never retried.
    #[error("language model not configured: {0}")]
    Configuration(String),

    /// Transport failure, non-success status or unreadable body.
    #[error("language model provider error: {0}")]
    Provider(String),
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

/// Failures preparing a payment request.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("wallet connection is not configured")]
    Unavailable,
}

/// Failures driving a visitor chat session.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("agent '{0}' is not active")]
    AgentInactive(String),

    #[error("message is empty")]
    EmptyInput,

    #[error("payment is required before continuing")]
    PaymentPending,

    #[error("no payment is pending")]
    NoPaymentRequired,

    #[error("a request for this session is already in progress")]
    Busy,

    #[error("chat is not configured: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures in the owner's settings and dashboard flows.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("agent is not owned by this user")]
    NotOwner,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
