//! Owner-facing flows: agent settings, aggregate stats and conversation history.

pub mod history;
pub mod settings;
pub mod stats;

pub use history::{AgentHistory, HistoryLine, TranscriptView};
pub use settings::{normalize_slug, parse_interests};

use crate::state::Store;
use std::sync::Arc;

/// Dashboard operations scoped to the authenticated owner.
#[derive(Clone)]
pub struct Dashboard {
    store: Arc<dyn Store>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}
