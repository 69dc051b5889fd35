//! Visitor-facing chat flow: load an agent, converse, collect the fee.

pub mod gate;
pub mod session;

pub use session::{
    ChatContext, ChatPhase, ChatSession, PaymentPrompt, SessionView, Turn, APOLOGY_REPLY,
    PAYMENT_FAILED_REPLY, PAY_ACTION_LABEL,
};
