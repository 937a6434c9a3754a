//! Canned "@AI" responder.
//!
//! Stands in for a real assistant backend: the reply is chosen by substring
//! matching against a handful of fixed phrases.

use crate::{format_time, Address, ChatMessage, MessageId, MessageOrigin};
use chrono::Utc;

/// Token that triggers a simulated reply. Matched case-insensitively.
pub const TRIGGER_TOKEN: &str = "@ai";

/// Sender recorded on simulated replies. Not a valid account address.
pub const AI_SENDER: &str = "0x000000000000000000000000000000000000AI";

pub const AI_DISPLAY_NAME: &str = "AI Bot (Simulated)";

/// True when `content` mentions the trigger token in any case.
pub fn mentions_ai(content: &str) -> bool {
    content.to_lowercase().contains(TRIGGER_TOKEN)
}

/// Lowercased message text with the first trigger token removed.
pub fn strip_trigger(content: &str) -> String {
    content
        .to_lowercase()
        .replacen(TRIGGER_TOKEN, "", 1)
        .trim()
        .to_string()
}

/// Pick the canned answer for a message that mentioned the assistant.
pub fn canned_reply(content: &str) -> String {
    let query = strip_trigger(content);

    if query.is_empty() {
        "You mentioned me (@AI)! How can I help?".to_string()
    } else if query.contains("hello") || query.contains("hi") {
        "Hello there! This is a simulated response. In a real setup, I'd call the Gemini API."
            .to_string()
    } else if query.contains("help") {
        "I'm a simulated AI assistant. Mention '@AI' followed by your query. For example: '@AI what is blockchain?'"
            .to_string()
    } else if query.contains("how are you") {
        "I'm a simulation running in your browser! A real AI would run on a server."
            .to_string()
    } else if query.contains("blockchain") {
        "Blockchain is a distributed, immutable ledger. This response is simulated; a real AI would give more detail."
            .to_string()
    } else {
        format!(
            "I received your message: \"{query}\". This is a simulated response. A real backend would process this with Gemini."
        )
    }
}

/// Build the synthetic message appended in reply to `trigger`.
pub fn simulated_reply(trigger: &str) -> ChatMessage {
    let now = Utc::now();
    ChatMessage {
        id: MessageId::simulated(),
        sender: Address::new_unchecked(AI_SENDER),
        sender_display: AI_DISPLAY_NAME.to_string(),
        content: canned_reply(trigger),
        timestamp: u64::try_from(now.timestamp()).unwrap_or_default(),
        display_timestamp: format_time(now),
        origin: MessageOrigin::Simulated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_detection_ignores_case() {
        assert!(mentions_ai("@AI hello"));
        assert!(mentions_ai("hey @ai"));
        assert!(mentions_ai("ping @Ai please"));
        assert!(!mentions_ai("hello everyone"));
        assert!(!mentions_ai("a i"));
    }

    #[test]
    fn test_greeting_reply() {
        assert_eq!(
            canned_reply("@AI hello"),
            "Hello there! This is a simulated response. In a real setup, I'd call the Gemini API."
        );
    }

    #[test]
    fn test_blockchain_reply() {
        assert!(canned_reply("@AI blockchain").starts_with("Blockchain is a distributed"));
        assert!(canned_reply("@ai what is blockchain?").starts_with("Blockchain is"));
    }

    #[test]
    fn test_fallback_echoes_stripped_text() {
        let reply = canned_reply("@AI xyz123");
        assert_eq!(
            reply,
            "I received your message: \"xyz123\". This is a simulated response. A real backend would process this with Gemini."
        );
    }

    #[test]
    fn test_status_reply_wording() {
        assert_eq!(
            canned_reply("@AI how are you"),
            "I'm a simulation running in your browser! A real AI would run on a server."
        );
    }

    #[test]
    fn test_bare_mention() {
        assert_eq!(canned_reply("  @AI  "), "You mentioned me (@AI)! How can I help?");
    }

    #[test]
    fn test_phrase_priority() {
        assert!(canned_reply("@AI help").starts_with("I'm a simulated AI assistant"));
        assert!(canned_reply("@AI how are you").starts_with("I'm a simulation"));
        // Greeting wins over help when both match.
        assert!(canned_reply("@AI hi, help me").starts_with("Hello there!"));
    }

    #[test]
    fn test_simulated_reply_is_tagged() {
        let reply = simulated_reply("@AI blockchain");
        assert!(reply.is_simulated());
        assert_eq!(reply.sender.as_str(), AI_SENDER);
        assert_eq!(reply.sender_display, AI_DISPLAY_NAME);
        assert!(reply.id.to_string().starts_with("ai-"));
        assert!(reply.content.starts_with("Blockchain is"));
    }
}
