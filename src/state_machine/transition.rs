//! Pure state transition function
//!
//! | state      | command               | result                      |
//! |------------|-----------------------|-----------------------------|
//! | Idle       | Start                 | Active                      |
//! | Active     | Pause                 | Paused                      |
//! | Paused     | Resume                | Active                      |
//! | Active     | UpdateSystemPrompts   | Active                      |
//! | Paused     | UpdateSystemPrompts   | Paused                      |
//! | Active     | GenerationFailed      | Paused                      |
//! | non-terminal, nothing in flight | Delete | Terminated          |
//! | non-terminal, generation in flight | Delete | `Conflict`       |
//!
//! Every other pair is rejected with `InvalidState`.

use super::{Command, Effect, SessionState, TransitionContext};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {command} a session that is {state}")]
    InvalidState {
        state: SessionState,
        command: &'static str,
    },
    #[error("a turn is being generated; pause the session before deleting it")]
    GenerationInFlight,
}

/// Pure transition function: no I/O, same inputs give the same outputs.
pub fn transition(
    state: SessionState,
    context: &TransitionContext,
    command: Command,
) -> Result<TransitionResult, TransitionError> {
    match (state, command) {
        (SessionState::Idle, Command::Start { initial_message }) => {
            Ok(TransitionResult::new(SessionState::Active)
                .with_effect(Effect::SeedTranscript {
                    text: initial_message,
                })
                .with_effect(Effect::PersistLifecycle)
                .with_effect(Effect::SpawnLoop))
        }

        (SessionState::Active, Command::Pause) => Ok(TransitionResult::new(SessionState::Paused)
            .with_effect(Effect::CancelGeneration)
            .with_effect(Effect::PersistLifecycle)),

        (SessionState::Paused, Command::Resume) => {
            Ok(TransitionResult::new(SessionState::Active)
                .with_effect(Effect::PersistLifecycle)
                .with_effect(Effect::SpawnLoop))
        }

        (
            current @ (SessionState::Active | SessionState::Paused),
            Command::UpdateSystemPrompts { first, second },
        ) => Ok(TransitionResult::new(current)
            .with_effect(Effect::ReplacePrompts { first, second })
            .with_effect(Effect::PersistPrompts)),

        (SessionState::Active, Command::GenerationFailed { message }) => {
            Ok(TransitionResult::new(SessionState::Paused)
                .with_effect(Effect::CancelGeneration)
                .with_effect(Effect::PersistLifecycle)
                .with_effect(Effect::NotifyError { message }))
        }

        (SessionState::Idle | SessionState::Active | SessionState::Paused, Command::Delete) => {
            if context.generation_in_flight {
                return Err(TransitionError::GenerationInFlight);
            }
            Ok(TransitionResult::new(SessionState::Terminated)
                .with_effect(Effect::CancelGeneration)
                .with_effect(Effect::NotifyClosed))
        }

        (state, command) => Err(TransitionError::InvalidState {
            state,
            command: command.name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_ctx() -> TransitionContext {
        TransitionContext::default()
    }

    fn start() -> Command {
        Command::Start {
            initial_message: "Hi".to_string(),
        }
    }

    #[test]
    fn test_start_from_idle_spawns_loop() {
        let result = transition(SessionState::Idle, &idle_ctx(), start()).unwrap();
        assert_eq!(result.new_state, SessionState::Active);
        assert_eq!(
            result.effects,
            vec![
                Effect::SeedTranscript {
                    text: "Hi".to_string()
                },
                Effect::PersistLifecycle,
                Effect::SpawnLoop,
            ]
        );
    }

    #[test]
    fn test_start_twice_rejected() {
        let err = transition(SessionState::Active, &idle_ctx(), start()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidState {
                state: SessionState::Active,
                command: "start"
            }
        );
    }

    #[test]
    fn test_pause_cancels_before_persisting() {
        let result = transition(SessionState::Active, &idle_ctx(), Command::Pause).unwrap();
        assert_eq!(result.new_state, SessionState::Paused);
        assert_eq!(result.effects[0], Effect::CancelGeneration);
    }

    #[test]
    fn test_pause_when_paused_rejected() {
        assert!(transition(SessionState::Paused, &idle_ctx(), Command::Pause).is_err());
        assert!(transition(SessionState::Idle, &idle_ctx(), Command::Pause).is_err());
    }

    #[test]
    fn test_resume_only_from_paused() {
        let result = transition(SessionState::Paused, &idle_ctx(), Command::Resume).unwrap();
        assert_eq!(result.new_state, SessionState::Active);
        assert!(result.effects.contains(&Effect::SpawnLoop));

        assert!(transition(SessionState::Active, &idle_ctx(), Command::Resume).is_err());
        assert!(transition(SessionState::Idle, &idle_ctx(), Command::Resume).is_err());
    }

    #[test]
    fn test_update_prompts_keeps_state() {
        let command = Command::UpdateSystemPrompts {
            first: Some("new".to_string()),
            second: None,
        };
        let result = transition(SessionState::Paused, &idle_ctx(), command.clone()).unwrap();
        assert_eq!(result.new_state, SessionState::Paused);

        let err = transition(SessionState::Idle, &idle_ctx(), command).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidState { .. }));
    }

    #[test]
    fn test_delete_conflicts_while_generating() {
        let ctx = TransitionContext {
            generation_in_flight: true,
        };
        let err = transition(SessionState::Active, &ctx, Command::Delete).unwrap_err();
        assert_eq!(err, TransitionError::GenerationInFlight);
    }

    #[test]
    fn test_delete_notifies_subscribers() {
        let result = transition(SessionState::Paused, &idle_ctx(), Command::Delete).unwrap();
        assert_eq!(result.new_state, SessionState::Terminated);
        assert!(result.effects.contains(&Effect::NotifyClosed));
    }

    #[test]
    fn test_terminated_accepts_nothing() {
        for command in [start(), Command::Pause, Command::Resume, Command::Delete] {
            assert!(transition(SessionState::Terminated, &idle_ctx(), command).is_err());
        }
    }

    #[test]
    fn test_generation_failure_pauses_with_error() {
        let command = Command::GenerationFailed {
            message: "boom".to_string(),
        };
        let result = transition(SessionState::Active, &idle_ctx(), command).unwrap();
        assert_eq!(result.new_state, SessionState::Paused);
        assert!(result.effects.contains(&Effect::NotifyError {
            message: "boom".to_string()
        }));
    }
}
