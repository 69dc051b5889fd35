pub mod client;
pub mod generator;
pub mod prompt;

pub use client::{CompletionProvider, OpenAiClient};
pub use generator::{ResponseGenerator, FALLBACK_REPLY};
