//! Error taxonomy surfaced by the coaching core

/// Errors surfaced to callers of the orchestrator, lifecycle manager and
/// storage. Provider failures never appear here: they are recovered by the
/// gateway failover and the deterministic fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoachError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("question {number} not found in session {session_id}")]
    QuestionNotFound { session_id: String, number: u32 },

    #[error("session {0} is already completed")]
    SessionCompleted(String),

    #[error("session {0} is paused")]
    SessionPaused(String),

    #[error("session {0} was abandoned")]
    SessionAbandoned(String),

    #[error("invalid transition: cannot {event} while {from}")]
    InvalidTransition { from: String, event: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CoachResult<T> = Result<T, CoachError>;
