//! Realtime notifier collaborator
//!
//! Fire-and-forget `emit(event, session_id, payload)`. Delivery is best
//! effort: with no subscribers, or a lagging one, events are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Session event kinds pushed to realtime subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    ConversationStarted,
    QuestionAsked,
    ResponseEvaluated,
    SessionCompleted,
    SessionPaused,
    SessionResumed,
    SessionTimedOut,
    SessionAbandoned,
    SessionArchived,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: String,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn emit(&self, kind: SessionEventKind, session_id: &str, payload: serde_json::Value);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn emit(&self, _kind: SessionEventKind, _session_id: &str, _payload: serde_json::Value) {}
}

/// Fans events out over a tokio broadcast channel
pub struct BroadcastNotifier {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn emit(&self, kind: SessionEventKind, session_id: &str, payload: serde_json::Value) {
        let event = SessionEvent {
            kind,
            session_id: session_id.to_string(),
            payload,
            at: Utc::now(),
        };
        if self.sender.send(event).is_err() {
            debug!(session_id, ?kind, "no subscribers, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_delivers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.emit(
            SessionEventKind::QuestionAsked,
            "s1",
            json!({"question_number": 2}),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::QuestionAsked);
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.payload["question_number"], 2);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::default();
        notifier.emit(SessionEventKind::SessionCompleted, "s1", json!({}));
        NoopNotifier.emit(SessionEventKind::SessionCompleted, "s1", json!({}));
    }
}
