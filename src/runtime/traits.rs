//! Trait abstractions for runtime I/O
//!
//! These traits let the registry and the orchestration loop run against mock
//! implementations in tests.

use crate::db::Database;
use crate::ledger::Totals;
use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmResponse, ModelRegistry};
use crate::session::{Message, ParticipantConfig, ParticipantSlot, SessionRecord, SessionSummary};
use crate::state_machine::SessionState;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces the next utterance for a participant
#[async_trait]
pub trait TurnGenerator: Send + Sync {
    async fn generate(
        &self,
        speaker: &ParticipantConfig,
        slot: ParticipantSlot,
        transcript: &[Message],
    ) -> Result<LlmResponse, LlmError>;
}

/// Durable storage for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session; a no-op if the id is already stored
    async fn create(&self, record: &SessionRecord) -> Result<(), String>;

    /// Store one message and refresh the cached aggregates
    async fn append_message(
        &self,
        session_id: &str,
        message: &Message,
        totals: &Totals,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String>;

    async fn update_lifecycle(
        &self,
        session_id: &str,
        state: SessionState,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String>;

    async fn update_prompts(&self, session_id: &str, prompts: &[String; 2]) -> Result<(), String>;

    async fn delete(&self, session_id: &str) -> Result<(), String>;

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String>;

    /// All stored sessions, newest first
    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, String>;

    /// Mark every `active` session `paused`; returns how many changed
    async fn pause_all_active(&self) -> Result<usize, String>;
}

#[async_trait]
impl<T: TurnGenerator + ?Sized> TurnGenerator for Arc<T> {
    async fn generate(
        &self,
        speaker: &ParticipantConfig,
        slot: ParticipantSlot,
        transcript: &[Message],
    ) -> Result<LlmResponse, LlmError> {
        (**self).generate(speaker, slot, transcript).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as SessionStore
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), String> {
        self.db.insert_session(record).map_err(|e| e.to_string())
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: &Message,
        totals: &Totals,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String> {
        self.db
            .append_message(session_id, message, totals, next_speaker)
            .map_err(|e| e.to_string())
    }

    async fn update_lifecycle(
        &self,
        session_id: &str,
        state: SessionState,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String> {
        self.db
            .update_lifecycle(session_id, state, next_speaker)
            .map_err(|e| e.to_string())
    }

    async fn update_prompts(&self, session_id: &str, prompts: &[String; 2]) -> Result<(), String> {
        self.db
            .update_prompts(session_id, prompts)
            .map_err(|e| e.to_string())
    }

    async fn delete(&self, session_id: &str) -> Result<(), String> {
        self.db
            .delete_session(session_id)
            .map(drop)
            .map_err(|e| e.to_string())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String> {
        self.db.get_session(session_id).map_err(|e| e.to_string())
    }

    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, String> {
        self.db.list_sessions().map_err(|e| e.to_string())
    }

    async fn pause_all_active(&self) -> Result<usize, String> {
        self.db.pause_all_active().map_err(|e| e.to_string())
    }
}

/// Adapter to use ModelRegistry as TurnGenerator
pub struct RegistryTurnGenerator {
    registry: Arc<ModelRegistry>,
    max_tokens: u32,
    temperature: f32,
}

impl RegistryTurnGenerator {
    pub fn new(registry: Arc<ModelRegistry>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            registry,
            max_tokens,
            temperature,
        }
    }

    /// Frame the transcript from the speaker's point of view: its own turns
    /// are `assistant` messages, the other participant's are `user` messages.
    pub fn build_request(
        &self,
        speaker: &ParticipantConfig,
        slot: ParticipantSlot,
        transcript: &[Message],
    ) -> LlmRequest {
        let messages = transcript
            .iter()
            .map(|m| {
                if m.participant == slot {
                    LlmMessage::assistant(&m.text)
                } else {
                    LlmMessage::user(&m.text)
                }
            })
            .collect();

        LlmRequest {
            system: speaker.system_prompt.clone(),
            messages,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

#[async_trait]
impl TurnGenerator for RegistryTurnGenerator {
    async fn generate(
        &self,
        speaker: &ParticipantConfig,
        slot: ParticipantSlot,
        transcript: &[Message],
    ) -> Result<LlmResponse, LlmError> {
        let llm = self.registry.get(&speaker.model).ok_or_else(|| {
            LlmError::auth(format!(
                "Model {} is not configured; set OPENAI_API_KEY or LLM_GATEWAY",
                speaker.model
            ))
        })?;
        let request = self.build_request(speaker, slot, transcript);
        llm.complete(&request).await
    }
}
