//! Session data model

use crate::llm::Usage;
use crate::state_machine::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
pub const DEFAULT_INITIAL_MESSAGE: &str = "Hello! Let's have a conversation.";

/// Stable identifier of one of the two participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParticipantSlot {
    #[serde(rename = "participant-1")]
    One,
    #[serde(rename = "participant-2")]
    Two,
}

impl ParticipantSlot {
    pub const BOTH: [ParticipantSlot; 2] = [ParticipantSlot::One, ParticipantSlot::Two];

    pub fn index(self) -> usize {
        match self {
            ParticipantSlot::One => 0,
            ParticipantSlot::Two => 1,
        }
    }

    /// The participant who speaks after this one
    pub fn other(self) -> Self {
        match self {
            ParticipantSlot::One => ParticipantSlot::Two,
            ParticipantSlot::Two => ParticipantSlot::One,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantSlot::One => "participant-1",
            ParticipantSlot::Two => "participant-2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "participant-1" => Some(ParticipantSlot::One),
            "participant-2" => Some(ParticipantSlot::Two),
            _ => None,
        }
    }

    fn default_name(self) -> &'static str {
        match self {
            ParticipantSlot::One => "Bot 1",
            ParticipantSlot::Two => "Bot 2",
        }
    }
}

impl fmt::Display for ParticipantSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    pub name: String,
    pub model: String,
    pub system_prompt: String,
}

impl ParticipantConfig {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Fill blank fields with the defaults for `slot`
    pub fn normalized(self, slot: ParticipantSlot) -> Self {
        let name = self.name.trim();
        let prompt = self.system_prompt.trim();
        Self {
            name: if name.is_empty() {
                slot.default_name().to_string()
            } else {
                name.to_string()
            },
            model: self.model.trim().to_string(),
            system_prompt: if prompt.is_empty() {
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                self.system_prompt
            },
        }
    }

    /// Copy of this config with a different system prompt
    pub fn with_prompt(&self, prompt: &str) -> Self {
        Self {
            system_prompt: if prompt.trim().is_empty() {
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                prompt.to_string()
            },
            ..self.clone()
        }
    }
}

/// One turn of the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 1-based, gap-free
    pub sequence: u64,
    pub participant: ParticipantSlot,
    /// Display name at the time the turn was generated
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub usage: Usage,
}

impl Message {
    pub fn tokens(&self) -> u64 {
        self.usage.total()
    }
}

/// Full state of a session as held in memory and in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: Option<String>,
    pub participants: [ParticipantConfig; 2],
    pub transcript: Vec<Message>,
    pub state: SessionState,
    pub next_speaker: ParticipantSlot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh, idle record with an empty transcript
    pub fn new(id: String, title: Option<String>, participants: [ParticipantConfig; 2]) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.filter(|t| !t.trim().is_empty()),
            participants,
            transcript: Vec::new(),
            state: SessionState::Idle,
            next_speaker: ParticipantSlot::One,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn participant(&self, slot: ParticipantSlot) -> &ParticipantConfig {
        &self.participants[slot.index()]
    }

    /// Title for list views, falling back to "A & B"
    pub fn display_title(&self) -> String {
        display_title(self.title.as_deref(), &self.participants[0].name, &self.participants[1].name)
    }

    pub fn next_sequence(&self) -> u64 {
        self.transcript.last().map_or(1, |m| m.sequence + 1)
    }
}

pub fn display_title(title: Option<&str>, first: &str, second: &str) -> String {
    match title {
        Some(title) if !title.trim().is_empty() => title.to_string(),
        _ => format!("{first} & {second}"),
    }
}

/// Name and model of a participant, as shown in list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantBrief {
    pub name: String,
    pub model: String,
}

/// Row in the session list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub participants: [ParticipantBrief; 2],
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_cost_secondary: f64,
}

/// Parameters for creating a session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSession {
    /// Caller-chosen id; a UUID v4 is generated when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub participant1: ParticipantConfig,
    pub participant2: ParticipantConfig,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_fields_take_defaults() {
        let config = ParticipantConfig::new("  ", " gpt-4o ", "").normalized(ParticipantSlot::Two);
        assert_eq!(config.name, "Bot 2");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_slot_serializes_as_participant_id() {
        let json = serde_json::to_string(&ParticipantSlot::Two).unwrap();
        assert_eq!(json, "\"participant-2\"");
        assert_eq!(ParticipantSlot::parse("participant-1"), Some(ParticipantSlot::One));
        assert_eq!(ParticipantSlot::One.other(), ParticipantSlot::Two);
    }

    #[test]
    fn test_display_title_falls_back_to_names() {
        let record = SessionRecord::new(
            "s".to_string(),
            Some(String::new()),
            [
                ParticipantConfig::new("Alice", "gpt-4o", "p"),
                ParticipantConfig::new("Bob", "gpt-4o", "p"),
            ],
        );
        assert_eq!(record.title, None);
        assert_eq!(record.display_title(), "Alice & Bob");
        assert_eq!(record.next_sequence(), 1);
    }

    #[test]
    fn test_with_prompt_keeps_identity() {
        let config = ParticipantConfig::new("Alice", "gpt-4o", "old");
        let updated = config.with_prompt("new");
        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.system_prompt, "new");
        assert_eq!(config.system_prompt, "old");
    }
}
