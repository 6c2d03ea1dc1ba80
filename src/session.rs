//! Conversation sessions
//!
//! A [`Session`] owns one two-participant conversation: its lifecycle state,
//! participant configs, transcript and token ledger. Commands run through the
//! pure transition table under the session's critical section, and the
//! returned effects are executed before the lock is released, so observers
//! never see a half-applied command.

mod error;
mod events;
mod types;

pub use error::{ErrorKind, SessionError};
pub use events::SessionEvent;
pub use types::*;

use crate::fanout::{Fanout, Subscription};
use crate::ledger::{TokenLedger, TokenStats};
use crate::llm::{LlmError, LlmResponse, Usage};
use crate::runtime::{orchestrator, PersistOp, PersistWriter, RuntimeSettings, TurnGenerator};
use crate::state_machine::{transition, Command, Effect, SessionState, TransitionContext};
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Point-in-time copy of a session for queries and stream initialisation
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub stats: TokenStats,
    pub generating: bool,
}

/// What the orchestration loop needs to produce one turn
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub slot: ParticipantSlot,
    pub participant: ParticipantConfig,
    pub transcript: Vec<Message>,
}

struct SessionCore {
    record: SessionRecord,
    ledger: TokenLedger,
    /// An adapter call is outstanding
    in_flight: bool,
    cancel: Option<CancellationToken>,
    /// Bumped whenever a loop is spawned; stale loops compare and exit
    epoch: u64,
}

pub struct Session {
    id: String,
    core: Mutex<SessionCore>,
    fanout: Arc<Fanout>,
    writer: PersistWriter,
    generator: Arc<dyn TurnGenerator>,
    settings: RuntimeSettings,
}

impl Session {
    pub fn new(
        record: SessionRecord,
        fanout: Arc<Fanout>,
        writer: PersistWriter,
        generator: Arc<dyn TurnGenerator>,
        settings: RuntimeSettings,
    ) -> Arc<Self> {
        let ledger =
            TokenLedger::from_transcript(settings.cost_model, &record.participants, &record.transcript);
        Arc::new(Self {
            id: record.id.clone(),
            core: Mutex::new(SessionCore {
                record,
                ledger,
                in_flight: false,
                cancel: None,
                epoch: 0,
            }),
            fanout,
            writer,
            generator,
            settings,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.lock().record.state
    }

    pub fn participants(&self) -> [ParticipantConfig; 2] {
        self.lock().record.participants.clone()
    }

    pub(crate) fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub(crate) fn generator(&self) -> Arc<dyn TurnGenerator> {
        Arc::clone(&self.generator)
    }

    pub(crate) fn writer(&self) -> &PersistWriter {
        &self.writer
    }

    pub fn snapshot(&self) -> SessionView {
        let core = self.lock();
        view(&core)
    }

    /// Subscribe and snapshot atomically, so the subscriber sees every event
    /// after the snapshot exactly once
    pub fn subscribe(&self) -> (Subscription, SessionView) {
        let core = self.lock();
        let subscription = self.fanout.subscribe(&self.id);
        (subscription, view(&core))
    }

    pub fn summary(&self) -> SessionSummary {
        let core = self.lock();
        let record = &core.record;
        let totals = core.ledger.totals();
        SessionSummary {
            id: record.id.clone(),
            title: record.display_title(),
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
        }
    }

    // ==================== Commands ====================

    pub fn start(self: &Arc<Self>, initial_message: &str) -> Result<(), SessionError> {
        let text = initial_message.trim();
        if text.is_empty() {
            return Err(SessionError::InvalidRequest(
                "initial message must not be empty".to_string(),
            ));
        }
        self.apply(Command::Start {
            initial_message: text.to_string(),
        })
        .map(drop)
    }

    pub fn pause(self: &Arc<Self>) -> Result<(), SessionError> {
        self.apply(Command::Pause).map(drop)
    }

    pub fn resume(self: &Arc<Self>) -> Result<(), SessionError> {
        self.apply(Command::Resume).map(drop)
    }

    pub fn update_system_prompts(
        self: &Arc<Self>,
        first: Option<String>,
        second: Option<String>,
    ) -> Result<(), SessionError> {
        self.apply(Command::UpdateSystemPrompts { first, second })
            .map(drop)
    }

    /// Move to `Terminated` and notify subscribers. Removing the record is
    /// the registry's job.
    pub fn delete(self: &Arc<Self>) -> Result<(), SessionError> {
        self.apply(Command::Delete).map(drop)
    }

    fn apply(self: &Arc<Self>, command: Command) -> Result<SessionState, SessionError> {
        let mut core = self.lock();
        self.apply_locked(&mut core, command)
    }

    fn apply_locked(
        self: &Arc<Self>,
        core: &mut SessionCore,
        command: Command,
    ) -> Result<SessionState, SessionError> {
        let name = command.name();
        let context = TransitionContext {
            generation_in_flight: core.in_flight,
        };
        let from = core.record.state;
        let result = transition(from, &context, command).inspect_err(|e| {
            tracing::debug!(session_id = %self.id, command = name, error = %e, "Command rejected");
        })?;

        core.record.state = result.new_state;
        core.record.updated_at = Utc::now();
        for effect in result.effects {
            self.execute(core, effect);
        }

        tracing::info!(
            session_id = %self.id,
            command = name,
            from = %from,
            to = %result.new_state,
            "Applied command"
        );
        Ok(result.new_state)
    }

    fn execute(self: &Arc<Self>, core: &mut SessionCore, effect: Effect) {
        match effect {
            Effect::SeedTranscript { text } => {
                self.append(core, ParticipantSlot::One, text, Usage::default());
            }
            Effect::ReplacePrompts { first, second } => {
                for (slot, prompt) in ParticipantSlot::BOTH.into_iter().zip([first, second]) {
                    if let Some(prompt) = prompt {
                        let i = slot.index();
                        core.record.participants[i] = core.record.participants[i].with_prompt(&prompt);
                    }
                }
            }
            Effect::PersistLifecycle => self.writer.enqueue(PersistOp::UpdateLifecycle {
                state: core.record.state,
                next_speaker: core.record.next_speaker,
            }),
            Effect::PersistPrompts => self.writer.enqueue(PersistOp::UpdatePrompts {
                prompts: core
                    .record
                    .participants
                    .clone()
                    .map(|p| p.system_prompt),
            }),
            Effect::SpawnLoop => {
                core.epoch += 1;
                let token = CancellationToken::new();
                core.cancel = Some(token.clone());
                tokio::spawn(orchestrator::run(Arc::clone(self), core.epoch, token));
            }
            Effect::CancelGeneration => {
                if let Some(token) = core.cancel.take() {
                    token.cancel();
                }
                core.in_flight = false;
            }
            Effect::NotifyClosed => {
                self.fanout.close(&self.id, &SessionEvent::closed("deleted"));
            }
            Effect::NotifyError { message } => {
                self.fanout
                    .publish(&self.id, &SessionEvent::Error { message });
            }
        }
    }

    /// Append a turn, update the ledger, publish, and enqueue persistence
    fn append(&self, core: &mut SessionCore, slot: ParticipantSlot, text: String, usage: Usage) {
        let participant = core.record.participant(slot).clone();
        let message = Message {
            sequence: core.record.next_sequence(),
            participant: slot,
            speaker: participant.name,
            text,
            timestamp: Utc::now(),
            usage,
        };

        core.ledger.record(slot, &participant.model, usage.total());
        core.record.transcript.push(message.clone());
        core.record.next_speaker = slot.other();
        core.record.updated_at = message.timestamp;

        let stats = core.ledger.snapshot(&core.record.participants);
        self.fanout
            .publish(&self.id, &SessionEvent::NewMessage(message.clone()));
        self.fanout
            .publish(&self.id, &SessionEvent::TokenStatsUpdate(stats));

        self.writer.enqueue(PersistOp::AppendMessage {
            message,
            totals: core.ledger.totals(),
            next_speaker: core.record.next_speaker,
        });
    }

    // ==================== Orchestration hooks ====================

    /// Claim the next turn for the loop started at `epoch`.
    ///
    /// Returns `None` when the loop should stop.
    pub(crate) fn begin_turn(&self, epoch: u64) -> Option<TurnInput> {
        let mut core = self.lock();
        if core.record.state != SessionState::Active || core.epoch != epoch {
            return None;
        }
        core.in_flight = true;
        let slot = core.record.next_speaker;
        Some(TurnInput {
            slot,
            participant: core.record.participant(slot).clone(),
            transcript: core.record.transcript.clone(),
        })
    }

    /// Apply the adapter's result for a turn claimed by [`Self::begin_turn`].
    ///
    /// Returns whether the loop should continue. Results for a loop that has
    /// been paused or superseded are discarded.
    pub(crate) fn complete_turn(
        self: &Arc<Self>,
        epoch: u64,
        slot: ParticipantSlot,
        result: Result<LlmResponse, LlmError>,
    ) -> bool {
        let mut core = self.lock();
        if core.record.state != SessionState::Active || core.epoch != epoch {
            tracing::debug!(session_id = %self.id, epoch, "Discarding stale turn");
            return false;
        }
        core.in_flight = false;

        match result {
            Ok(response) => {
                self.append(&mut core, slot, response.text, response.usage);
                true
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    participant = %slot,
                    kind = ?e.kind,
                    error = %e.message,
                    "Turn generation failed, pausing session"
                );
                let message = SessionError::AdapterFailure(e.message).to_string();
                if let Err(err) = self.apply_locked(&mut core, Command::GenerationFailed { message }) {
                    tracing::error!(session_id = %self.id, error = %err, "Could not pause after failure");
                }
                false
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.core.try_lock().ok().map(|c| c.record.state))
            .finish_non_exhaustive()
    }
}

fn view(core: &SessionCore) -> SessionView {
    SessionView {
        record: core.record.clone(),
        stats: core.ledger.snapshot(&core.record.participants),
        generating: core.in_flight,
    }
}
