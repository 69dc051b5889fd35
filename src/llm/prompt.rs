//! System directive builder.
//!
//! Layers (in order), each only when set:
//! 1. Name
//! 2. Personality
//! 3. Interests
//! 4. Facts
//! 5. Description
//! 6. Purpose and brevity instructions
//!
//! An owner-written `system_prompt` replaces all of the above.

use crate::types::Agent;
use tracing::debug;

/// What the agent is for.
const PURPOSE: &str = "You act as your owner's AI-powered business card: \
answer visitors' inquiries about them, help qualify opportunities such as jobs, \
interviews and collaborations, and respond in a way that reflects your personality \
and interests.";

const BREVITY: &str = "Keep your responses concise and engaging.";

/// Build the system-role directive for one agent.
pub fn build_directive(agent: &Agent) -> String {
    if let Some(custom) = agent.system_prompt.as_deref().map(str::trim) {
        if !custom.is_empty() {
            return custom.to_string();
        }
    }

    let mut prompt = String::with_capacity(512);
    prompt.push_str(&format!("You are an AI agent named {}.", agent.name));

    if let Some(personality) = non_empty(agent.personality.as_deref()) {
        prompt.push_str(&format!(" Your personality is {}.", personality));
    }

    let interests: Vec<&str> = agent
        .interests
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !interests.is_empty() {
        prompt.push_str(&format!(" Your interests include: {}.", interests.join(", ")));
    }

    let facts: Vec<&str> = agent
        .facts
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !facts.is_empty() {
        prompt.push_str(&format!(" Facts about you: {}.", facts.join("; ")));
    }

    if let Some(description) = non_empty(agent.description.as_deref()) {
        prompt.push_str("\n\n");
        prompt.push_str(description);
    }

    prompt.push_str("\n\n");
    prompt.push_str(PURPOSE);
    prompt.push('\n');
    prompt.push_str(BREVITY);

    debug!("System directive for '{}': {} chars", agent.slug, prompt.len());
    prompt
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
