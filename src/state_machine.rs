//! Session lifecycle state machine
//!
//! Pure transitions in the Elm Architecture style: the session applies a
//! [`Command`] to its current [`SessionState`] and executes the returned
//! [`Effect`]s.

mod command;
mod effect;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use command::Command;
pub use effect::Effect;
pub use state::{SessionState, TransitionContext};
pub use transition::{transition, TransitionError};
