//! Conversation state machine
//!
//! ```text
//! not_started -> introducing -> awaiting_response -> evaluating -+-> awaiting_response
//!                    |                 |                         +-> completed
//!                    +----> paused <---+
//! ```
//!
//! `paused` remembers the state it interrupted and returns to it on resume.
//! `completed` is terminal.

use coach_common::{CoachError, CoachResult, SessionStatus};
use serde::Serialize;

/// State a paused conversation returns to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeTarget {
    Introducing,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    NotStarted,
    Introducing,
    AwaitingResponse,
    Evaluating,
    Paused { resume_to: ResumeTarget },
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    Start,
    IntroDelivered,
    ResponseReceived,
    NextQuestion,
    Complete,
    Pause,
    Resume,
}

impl ConversationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::IntroDelivered => "deliver intro",
            Self::ResponseReceived => "receive response",
            Self::NextQuestion => "ask next question",
            Self::Complete => "complete",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Introducing => "introducing",
            Self::AwaitingResponse => "awaiting_response",
            Self::Evaluating => "evaluating",
            Self::Paused { .. } => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Apply `event`, rejecting anything the diagram does not allow
    pub fn apply(self, event: ConversationEvent) -> CoachResult<Self> {
        use ConversationEvent as E;
        use ConversationState as S;

        let next = match (self, event) {
            (S::NotStarted, E::Start) => S::Introducing,
            (S::Introducing, E::IntroDelivered) => S::AwaitingResponse,
            (S::AwaitingResponse, E::ResponseReceived) => S::Evaluating,
            (S::Evaluating, E::NextQuestion) => S::AwaitingResponse,
            (S::Evaluating, E::Complete) => S::Completed,
            (S::Introducing, E::Pause) => S::Paused {
                resume_to: ResumeTarget::Introducing,
            },
            (S::AwaitingResponse, E::Pause) => S::Paused {
                resume_to: ResumeTarget::AwaitingResponse,
            },
            (S::Paused { resume_to }, E::Resume) => match resume_to {
                ResumeTarget::Introducing => S::Introducing,
                ResumeTarget::AwaitingResponse => S::AwaitingResponse,
            },
            (from, event) => {
                return Err(CoachError::InvalidTransition {
                    from: from.as_str().to_string(),
                    event: event.as_str().to_string(),
                })
            }
        };
        Ok(next)
    }

    /// Persisted status for this state
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::NotStarted => SessionStatus::NotStarted,
            Self::Introducing | Self::AwaitingResponse | Self::Evaluating => SessionStatus::Active,
            Self::Paused { .. } => SessionStatus::Paused,
            Self::Completed => SessionStatus::Completed,
        }
    }

    /// Rebuild the in-memory state from a persisted session after a restart.
    /// `has_turns` tells whether the introduction was already written.
    pub fn from_persisted(status: SessionStatus, has_turns: bool) -> Self {
        match status {
            SessionStatus::NotStarted if has_turns => Self::AwaitingResponse,
            SessionStatus::NotStarted => Self::NotStarted,
            SessionStatus::Active if !has_turns => Self::NotStarted,
            SessionStatus::Active => Self::AwaitingResponse,
            SessionStatus::Paused => Self::Paused {
                resume_to: ResumeTarget::AwaitingResponse,
            },
            SessionStatus::Completed => Self::Completed,
        }
    }
}
