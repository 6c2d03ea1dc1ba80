//! Errors returned by session commands

use crate::state_machine::{SessionState, TransitionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("cannot {command} a session that is {state}")]
    InvalidState {
        state: SessionState,
        command: &'static str,
    },
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("model call failed: {0}")]
    AdapterFailure(String),
    #[error("storage failed: {0}")]
    PersistenceFailure(String),
    #[error("{0}")]
    InvalidRequest(String),
}

/// Error classification exposed to clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidState,
    NotFound,
    Conflict,
    AdapterFailure,
    PersistenceFailure,
    InvalidRequest,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Conflict(_) => ErrorKind::Conflict,
            SessionError::AdapterFailure(_) => ErrorKind::AdapterFailure,
            SessionError::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
            SessionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

impl From<TransitionError> for SessionError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidState { state, command } => {
                SessionError::InvalidState { state, command }
            }
            TransitionError::GenerationInFlight => SessionError::Conflict(err.to_string()),
        }
    }
}
