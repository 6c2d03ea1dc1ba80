//! Events published to session subscribers

use super::Message;
use crate::ledger::TokenStats;
use serde::Serialize;

/// Event pushed to every subscriber of a session, in publish order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    NewMessage(Message),
    TokenStatsUpdate(TokenStats),
    Error { message: String },
    Closed { reason: String },
}

impl SessionEvent {
    /// Event name on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::NewMessage(_) => "new_message",
            SessionEvent::TokenStatsUpdate(_) => "token_stats_update",
            SessionEvent::Error { .. } => "error",
            SessionEvent::Closed { .. } => "closed",
        }
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        SessionEvent::Closed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Usage;
    use crate::session::ParticipantSlot;
    use chrono::Utc;

    #[test]
    fn test_new_message_is_flat() {
        let event = SessionEvent::NewMessage(Message {
            sequence: 2,
            participant: ParticipantSlot::Two,
            speaker: "Bob".to_string(),
            text: "hi".to_string(),
            timestamp: Utc::now(),
            usage: Usage::new(3, 4),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["participant"], "participant-2");
        assert_eq!(json["speaker"], "Bob");
        assert_eq!(json["sequence"], 2);
        assert_eq!(event.kind(), "new_message");
    }

    #[test]
    fn test_closed_carries_reason() {
        let json = serde_json::to_value(SessionEvent::closed("deleted")).unwrap();
        assert_eq!(json["type"], "closed");
        assert_eq!(json["reason"], "deleted");
    }
}
