//! Per-session ordered persistence writer
//!
//! Sessions enqueue writes without awaiting; a single task per session
//! applies them to the store in order, retrying each with exponential
//! backoff. A write is only abandoned after the retry budget is spent, and
//! the in-memory session stays authoritative either way.

use super::traits::SessionStore;
use crate::ledger::Totals;
use crate::session::{Message, ParticipantSlot, SessionRecord};
use crate::state_machine::SessionState;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Backoff schedule for failed writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let spread = base.as_millis().min(u128::from(u32::MAX)) / 10;
        let jitter = rand::thread_rng().gen_range(0..=u64::try_from(spread).unwrap_or(0));
        base + Duration::from_millis(jitter)
    }
}

/// One write against the store
#[derive(Debug)]
pub enum PersistOp {
    Create(Box<SessionRecord>),
    AppendMessage {
        message: Message,
        totals: Totals,
        next_speaker: ParticipantSlot,
    },
    UpdateLifecycle {
        state: SessionState,
        next_speaker: ParticipantSlot,
    },
    UpdatePrompts {
        prompts: [String; 2],
    },
    /// Remove the record, acknowledge, and stop the writer
    Delete {
        ack: oneshot::Sender<Result<(), String>>,
    },
}

impl PersistOp {
    fn name(&self) -> &'static str {
        match self {
            PersistOp::Create(_) => "create",
            PersistOp::AppendMessage { .. } => "append_message",
            PersistOp::UpdateLifecycle { .. } => "update_lifecycle",
            PersistOp::UpdatePrompts { .. } => "update_prompts",
            PersistOp::Delete { .. } => "delete",
        }
    }
}

/// Handle for enqueueing writes for one session
#[derive(Clone)]
pub struct PersistWriter {
    session_id: String,
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistWriter {
    /// Start the writer task for `session_id`
    pub fn spawn(session_id: &str, store: Arc<dyn SessionStore>, retry: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(session_id.to_string(), store, retry, rx));
        Self {
            session_id: session_id.to_string(),
            tx,
        }
    }

    pub fn enqueue(&self, op: PersistOp) {
        if let Err(e) = self.tx.send(op) {
            tracing::warn!(
                session_id = %self.session_id,
                op = e.0.name(),
                "Persistence writer stopped, dropping write"
            );
        }
    }

    /// Delete the stored record once every earlier write has been applied
    pub async fn delete(&self) -> Result<(), String> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(PersistOp::Delete { ack })
            .map_err(|_| "persistence writer stopped".to_string())?;
        done.await
            .map_err(|_| "persistence writer stopped".to_string())?
    }
}

async fn run(
    session_id: String,
    store: Arc<dyn SessionStore>,
    retry: RetryPolicy,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
) {
    while let Some(op) = rx.recv().await {
        if let PersistOp::Delete { ack } = op {
            let result = with_retry(&session_id, "delete", retry, || store.delete(&session_id)).await;
            let _ = ack.send(result);
            break;
        }

        let name = op.name();
        let _ = with_retry(&session_id, name, retry, || apply(store.as_ref(), &session_id, &op)).await;
    }
    tracing::debug!(session_id = %session_id, "Persistence writer finished");
}

async fn apply(store: &dyn SessionStore, session_id: &str, op: &PersistOp) -> Result<(), String> {
    match op {
        PersistOp::Create(record) => store.create(record).await,
        PersistOp::AppendMessage {
            message,
            totals,
            next_speaker,
        } => {
            store
                .append_message(session_id, message, totals, *next_speaker)
                .await
        }
        PersistOp::UpdateLifecycle {
            state,
            next_speaker,
        } => store.update_lifecycle(session_id, *state, *next_speaker).await,
        PersistOp::UpdatePrompts { prompts } => store.update_prompts(session_id, prompts).await,
        PersistOp::Delete { .. } => Ok(()),
    }
}

async fn with_retry<F, Fut>(
    session_id: &str,
    op: &'static str,
    retry: RetryPolicy,
    mut attempt_fn: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= retry.max_attempts => {
                tracing::error!(
                    session_id = %session_id,
                    op,
                    attempts = attempt,
                    error = %e,
                    "Persistence failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = retry.jittered(attempt);
                tracing::warn!(
                    session_id = %session_id,
                    op,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Persistence failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
