//! Oportuna: personal AI agents with a public chat page.
//!
//! Owners publish an agent at a slug; visitors chat with it and, for agents
//! with a fee, pay to continue after a few free turns.

pub mod chat;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod llm;
pub mod payment;
pub mod server;
pub mod setup;
pub mod state;
pub mod types;

#[cfg(test)]
mod testutil;
