//! Commands that drive lifecycle transitions

/// Commands accepted by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Seed the transcript and begin generating
    Start { initial_message: String },
    Pause,
    Resume,
    /// Replace system prompts; `None` keeps the current prompt
    UpdateSystemPrompts {
        first: Option<String>,
        second: Option<String>,
    },
    Delete,
    /// Raised by the orchestration loop when the turn generator fails
    GenerationFailed { message: String },
}

impl Command {
    /// Name used in error messages and logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::UpdateSystemPrompts { .. } => "update_system_prompts",
            Command::Delete => "delete",
            Command::GenerationFailed { .. } => "generation_failed",
        }
    }
}
