//! Mock implementations for testing
//!
//! These mocks let the registry, sessions and writer run without network or
//! disk I/O.

use super::traits::*;
use crate::ledger::Totals;
use crate::llm::{LlmError, LlmResponse, Usage};
use crate::session::{
    display_title, Message, ParticipantBrief, ParticipantConfig, ParticipantSlot, SessionRecord,
    SessionSummary,
};
use crate::state_machine::SessionState;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Turn Generator
// ============================================================================

/// One call made to a mock generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateCall {
    pub slot: ParticipantSlot,
    pub speaker: String,
    pub system_prompt: String,
    pub transcript_len: usize,
}

fn record_call(
    calls: &Mutex<Vec<GenerateCall>>,
    speaker: &ParticipantConfig,
    slot: ParticipantSlot,
    transcript: &[Message],
) {
    calls.lock().unwrap().push(GenerateCall {
        slot,
        speaker: speaker.name.clone(),
        system_prompt: speaker.system_prompt.clone(),
        transcript_len: transcript.len(),
    });
}

/// Generator that replays queued results, then answers with a canned reply
pub struct MockTurnGenerator {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    pub calls: Mutex<Vec<GenerateCall>>,
}

impl MockTurnGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, text: &str, usage: Usage) {
        self.responses.lock().unwrap().push_back(Ok(LlmResponse {
            text: text.to_string(),
            usage,
        }));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTurnGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TurnGenerator for MockTurnGenerator {
    async fn generate(
        &self,
        speaker: &ParticipantConfig,
        slot: ParticipantSlot,
        transcript: &[Message],
    ) -> Result<LlmResponse, LlmError> {
        record_call(&self.calls, speaker, slot, transcript);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(LlmResponse {
                    text: format!("{} speaking after {} turns", speaker.name, transcript.len()),
                    usage: Usage::new(10, 5),
                })
            })
    }
}

// ============================================================================
// Delayed Turn Generator (for cancellation testing)
// ============================================================================

/// Generator that blocks every call until released
pub struct DelayedTurnGenerator {
    started: Notify,
    release: Notify,
    pub calls: Mutex<Vec<GenerateCall>>,
}

impl DelayedTurnGenerator {
    pub fn new() -> Self {
        Self {
            started: Notify::new(),
            release: Notify::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Wait until a call is blocked inside the generator
    pub async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.started.notified())
            .await
            .expect("generator was never called");
    }

    /// Let one blocked call finish
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl Default for DelayedTurnGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TurnGenerator for DelayedTurnGenerator {
    async fn generate(
        &self,
        speaker: &ParticipantConfig,
        slot: ParticipantSlot,
        transcript: &[Message],
    ) -> Result<LlmResponse, LlmError> {
        record_call(&self.calls, speaker, slot, transcript);
        self.started.notify_one();
        self.release.notified().await;
        Ok(LlmResponse {
            text: format!("late reply from {}", speaker.name),
            usage: Usage::new(7, 3),
        })
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory SessionStore that records which operations ran
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, (SessionRecord, Totals)>>,
    operations: Mutex<Vec<&'static str>>,
    delete_delay: Mutex<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            operations: Mutex::new(Vec::new()),
            delete_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Make `delete` take this long before removing the record
    pub fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = delay;
    }

    /// Seed a record as if written by an earlier process
    pub fn insert(&self, record: SessionRecord) {
        self.sessions
            .lock()
            .unwrap()
            .insert(record.id.clone(), (record, Totals::default()));
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.operations.lock().unwrap().clone()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    fn log(&self, op: &'static str) {
        self.operations.lock().unwrap().push(op);
    }

    fn update(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionRecord, &mut Totals),
    ) -> Result<(), String> {
        let mut sessions = self.sessions.lock().unwrap();
        let (record, totals) = sessions
            .get_mut(session_id)
            .ok_or_else(|| format!("Session not found: {session_id}"))?;
        f(record, totals);
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), String> {
        self.sessions
            .lock()
            .unwrap()
            .entry(record.id.clone())
            .or_insert_with(|| (record.clone(), Totals::default()));
        self.log("create");
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: &Message,
        totals: &Totals,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String> {
        self.update(session_id, |record, stored| {
            record.transcript.retain(|m| m.sequence != message.sequence);
            record.transcript.push(message.clone());
            record.next_speaker = next_speaker;
            *stored = *totals;
        })?;
        self.log("append_message");
        Ok(())
    }

    async fn update_lifecycle(
        &self,
        session_id: &str,
        state: SessionState,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String> {
        self.update(session_id, |record, _| {
            record.state = state;
            record.next_speaker = next_speaker;
        })?;
        self.log("update_lifecycle");
        Ok(())
    }

    async fn update_prompts(&self, session_id: &str, prompts: &[String; 2]) -> Result<(), String> {
        self.update(session_id, |record, _| {
            for (participant, prompt) in record.participants.iter_mut().zip(prompts) {
                participant.system_prompt.clone_from(prompt);
            }
        })?;
        self.log("update_prompts");
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), String> {
        let delay = *self.delete_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sessions.lock().unwrap().remove(session_id);
        self.log("delete");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|(record, _)| record.clone()))
    }

    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, String> {
        let sessions = self.sessions.lock().unwrap();
        let mut summaries: Vec<_> = sessions
            .values()
            .map(|(record, totals)| SessionSummary {
                id: record.id.clone(),
                title: display_title(
                    record.title.as_deref(),
                    &record.participants[0].name,
                    &record.participants[1].name,
                ),
                participants: record.participants.clone().map(|p| ParticipantBrief {
                    name: p.name,
                    model: p.model,
                }),
                state: record.state,
                created_at: record.created_at,
                updated_at: record.updated_at,
                message_count: record.transcript.len() as u64,
                total_tokens: totals.total_tokens,
                total_cost: totals.cost.usd,
                total_cost_secondary: totals.cost.eur,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn pause_all_active(&self) -> Result<usize, String> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut count = 0;
        for (record, _) in sessions.values_mut() {
            if record.state == SessionState::Active {
                record.state = SessionState::Paused;
                count += 1;
            }
        }
        Ok(count)
    }
}

// ============================================================================
// Flaky Store
// ============================================================================

/// Store whose first `failures` calls fail, then behaves like InMemoryStore.
/// Listing can also be switched off on its own.
pub struct FlakyStore {
    inner: InMemoryStore,
    remaining: AtomicU32,
    failed: AtomicU32,
    listing_down: AtomicBool,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryStore::new(),
            remaining: AtomicU32::new(failures),
            failed: AtomicU32::new(0),
            listing_down: AtomicBool::new(false),
        }
    }

    /// Make `list_summaries` fail until switched back
    pub fn set_listing_down(&self, down: bool) {
        self.listing_down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Number of calls that failed so far
    pub fn failures(&self) -> u32 {
        self.failed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), String> {
        let fail = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            self.failed.fetch_add(1, Ordering::SeqCst);
            Err("injected storage failure".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), String> {
        self.check()?;
        self.inner.create(record).await
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: &Message,
        totals: &Totals,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String> {
        self.check()?;
        self.inner
            .append_message(session_id, message, totals, next_speaker)
            .await
    }

    async fn update_lifecycle(
        &self,
        session_id: &str,
        state: SessionState,
        next_speaker: ParticipantSlot,
    ) -> Result<(), String> {
        self.check()?;
        self.inner
            .update_lifecycle(session_id, state, next_speaker)
            .await
    }

    async fn update_prompts(&self, session_id: &str, prompts: &[String; 2]) -> Result<(), String> {
        self.check()?;
        self.inner.update_prompts(session_id, prompts).await
    }

    async fn delete(&self, session_id: &str) -> Result<(), String> {
        self.check()?;
        self.inner.delete(session_id).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, String> {
        self.inner.load(session_id).await
    }

    async fn list_summaries(&self) -> Result<Vec<SessionSummary>, String> {
        if self.listing_down.load(Ordering::SeqCst) {
            return Err("store unreachable".to_string());
        }
        self.inner.list_summaries().await
    }

    async fn pause_all_active(&self) -> Result<usize, String> {
        self.inner.pause_all_active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generator_replays_then_falls_back() {
        let mock = MockTurnGenerator::new();
        mock.queue_error(LlmError::rate_limit("slow down"));
        let bob = ParticipantConfig::new("Bob", "gpt-4o", "p");

        assert!(mock.generate(&bob, ParticipantSlot::Two, &[]).await.is_err());
        let reply = mock.generate(&bob, ParticipantSlot::Two, &[]).await.unwrap();
        assert!(reply.text.starts_with("Bob"));
        assert_eq!(mock.recorded_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_flaky_store_recovers() {
        let store = FlakyStore::new(1);
        let record = SessionRecord::new(
            "s1".to_string(),
            None,
            [
                ParticipantConfig::new("A", "gpt-4o", "p"),
                ParticipantConfig::new("B", "gpt-4o", "p"),
            ],
        );
        assert!(store.create(&record).await.is_err());
        assert!(store.create(&record).await.is_ok());
        assert_eq!(store.failures(), 1);
        assert!(store.inner().contains("s1"));
    }
}
