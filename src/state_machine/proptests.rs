//! Property-based tests for the state machine
//!
//! Replays arbitrary command sequences and checks the outcome against an
//! independent model of the lifecycle table.

use super::*;
use proptest::prelude::*;

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(|initial_message| Command::Start { initial_message }),
        Just(Command::Pause),
        Just(Command::Resume),
        (
            proptest::option::of("[a-z ]{0,20}"),
            proptest::option::of("[a-z ]{0,20}")
        )
            .prop_map(|(first, second)| Command::UpdateSystemPrompts { first, second }),
        Just(Command::Delete),
        "[a-z ]{1,20}".prop_map(|message| Command::GenerationFailed { message }),
    ]
}

fn arb_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Idle),
        Just(SessionState::Active),
        Just(SessionState::Paused),
        Just(SessionState::Terminated),
    ]
}

/// Reference model: the expected next state, or `None` if rejected
fn expected(state: SessionState, in_flight: bool, command: &Command) -> Option<SessionState> {
    use SessionState::{Active, Idle, Paused, Terminated};
    match (state, command) {
        (Idle, Command::Start { .. }) | (Paused, Command::Resume) => Some(Active),
        (Active, Command::Pause | Command::GenerationFailed { .. }) => Some(Paused),
        (Active | Paused, Command::UpdateSystemPrompts { .. }) => Some(state),
        (Idle | Active | Paused, Command::Delete) if !in_flight => Some(Terminated),
        _ => None,
    }
}

proptest! {
    #[test]
    fn prop_sequences_follow_table(
        commands in proptest::collection::vec((arb_command(), any::<bool>()), 0..30)
    ) {
        let mut state = SessionState::Idle;
        for (command, in_flight) in commands {
            let ctx = TransitionContext { generation_in_flight: in_flight };
            let want = expected(state, in_flight, &command);
            match transition(state, &ctx, command) {
                Ok(result) => {
                    prop_assert_eq!(Some(result.new_state), want);
                    state = result.new_state;
                }
                Err(_) => prop_assert_eq!(want, None),
            }
        }
    }

    #[test]
    fn prop_terminated_is_absorbing(command in arb_command(), in_flight in any::<bool>()) {
        let ctx = TransitionContext { generation_in_flight: in_flight };
        prop_assert!(transition(SessionState::Terminated, &ctx, command).is_err());
    }

    #[test]
    fn prop_spawn_loop_only_when_entering_active(
        state in arb_state(),
        command in arb_command(),
        in_flight in any::<bool>(),
    ) {
        let ctx = TransitionContext { generation_in_flight: in_flight };
        if let Ok(result) = transition(state, &ctx, command) {
            let spawns = result.effects.iter().filter(|e| **e == Effect::SpawnLoop).count();
            if spawns > 0 {
                prop_assert_eq!(spawns, 1);
                prop_assert_eq!(result.new_state, SessionState::Active);
                prop_assert_ne!(state, SessionState::Active);
            }
        }
    }

    #[test]
    fn prop_leaving_active_cancels_generation(
        command in arb_command(),
        in_flight in any::<bool>(),
    ) {
        let ctx = TransitionContext { generation_in_flight: in_flight };
        if let Ok(result) = transition(SessionState::Active, &ctx, command) {
            if result.new_state != SessionState::Active {
                prop_assert!(result.effects.contains(&Effect::CancelGeneration));
            }
        }
    }
}
