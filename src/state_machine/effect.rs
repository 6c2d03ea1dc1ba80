//! Effects produced by state transitions

/// Effects to be executed by the session after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append the caller's opening line as participant 1's message
    SeedTranscript { text: String },

    /// Replace participant configs with new prompts
    ReplacePrompts {
        first: Option<String>,
        second: Option<String>,
    },

    /// Persist the lifecycle state and next speaker
    PersistLifecycle,

    /// Persist the participants' system prompts
    PersistPrompts,

    /// Start a fresh orchestration loop
    SpawnLoop,

    /// Abort the outstanding generation, if any, and retire the loop
    CancelGeneration,

    /// Tell subscribers the session is gone
    NotifyClosed,

    /// Tell subscribers about a failure
    NotifyError { message: String },
}
