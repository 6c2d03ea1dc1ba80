//! Orchestration loop
//!
//! One task per Active session. Each iteration claims a turn under the
//! session lock, calls the turn generator outside it, and hands the result
//! back. The loop exits as soon as the session leaves `Active` or a newer
//! loop takes over.

use crate::llm::LlmError;
use crate::session::Session;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(session: Arc<Session>, epoch: u64, cancel: CancellationToken) {
    let timeout = session.settings().generation_timeout;
    let turn_delay = session.settings().turn_delay;
    let generator = session.generator();

    tracing::debug!(session_id = %session.id(), epoch, "Orchestration loop started");

    loop {
        let Some(turn) = session.begin_turn(epoch) else {
            break;
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = tokio::time::timeout(
                timeout,
                generator.generate(&turn.participant, turn.slot, &turn.transcript),
            ) => result.unwrap_or_else(|_| Err(LlmError::timed_out(timeout))),
        };

        if !session.complete_turn(epoch, turn.slot, result) {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(turn_delay) => {}
        }
    }

    tracing::debug!(session_id = %session.id(), epoch, "Orchestration loop stopped");
}
