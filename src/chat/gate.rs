//! Payment gate rule.

use crate::types::{Agent, ChatMessage, ChatRole};

/// Number of visitor-authored messages in a sequence.
///
/// Greetings and every other assistant message are not counted.
pub fn visitor_turns(messages: &[ChatMessage]) -> usize {
    messages.iter().filter(|m| m.role == ChatRole::User).count()
}

/// Whether the next submission must be paid for.
///
/// `prior` is the sequence before the new visitor message is appended, so
/// with `free_turns = 3` the first three submissions are free and the fourth
/// is gated. A session that has already paid is never gated again.
pub fn requires_payment(agent: &Agent, prior: &[ChatMessage], paid: bool, free_turns: usize) -> bool {
    !paid && agent.charges_fee() && visitor_turns(prior) >= free_turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::agent;

    fn history(turns: usize) -> Vec<ChatMessage> {
        let mut msgs = vec![ChatMessage::assistant("Hello!")];
        for i in 0..turns {
            msgs.push(ChatMessage::user(format!("q{i}")));
            msgs.push(ChatMessage::assistant(format!("a{i}")));
        }
        msgs
    }

    #[test]
    fn test_free_agent_never_gated() {
        let ava = agent("Ava", "ava", Some(0.0));
        assert!(!requires_payment(&ava, &history(50), false, 3));
        let unset = agent("Ava", "ava", None);
        assert!(!requires_payment(&unset, &history(50), false, 3));
    }

    #[test]
    fn test_threshold_boundary() {
        let rex = agent("Rex", "rex", Some(0.01));
        // third submission: two prior visitor turns
        assert!(!requires_payment(&rex, &history(2), false, 3));
        // fourth submission: three prior visitor turns
        assert!(requires_payment(&rex, &history(3), false, 3));
    }

    #[test]
    fn test_paid_session_not_gated() {
        let rex = agent("Rex", "rex", Some(0.01));
        assert!(!requires_payment(&rex, &history(10), true, 3));
    }

    #[test]
    fn test_greeting_does_not_count() {
        assert_eq!(visitor_turns(&history(0)), 0);
        assert_eq!(visitor_turns(&history(2)), 2);
    }
}
