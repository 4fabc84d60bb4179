//! Session Lifecycle Manager
//!
//! Background sweeping of session liveness, independent of live traffic:
//! - timeout: active sessions idle past the window are paused
//! - abandonment: unfinished sessions idle past the cutoff are flagged
//! - archival: completed sessions past retention are flagged
//!
//! The sweep only pushes sessions toward paused or terminal flags. A
//! completed session is never reopened, so no lock against the
//! orchestrator is needed: every write re-reads the session first.

use crate::clock::Clock;
use crate::notifier::{Notifier, SessionEventKind};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use coach_common::{CoachError, CoachResult, LifecycleConfig, Session, SessionStatus};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Why a session cannot be recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotRecoverable {
    Completed,
    Abandoned,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    pub recoverable: bool,
    pub reason: Option<NotRecoverable>,
    pub session: Session,
}

/// Session ids touched by one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub timed_out: Vec<String>,
    pub abandoned: Vec<String>,
    pub archived: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.abandoned.is_empty() && self.archived.is_empty()
    }
}

/// Told about every finished sweep, so components holding per-session
/// state can release what the sweep retired
#[async_trait]
pub trait SweepObserver: Send + Sync {
    async fn swept(&self, report: &SweepReport);
}

pub struct SessionLifecycleManager {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: LifecycleConfig,
    observers: Vec<Arc<dyn SweepObserver>>,
}

impl SessionLifecycleManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            notifier,
            config,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SweepObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Completed sessions never time out; others are active while
    /// `now < last_activity + timeout window`
    pub fn is_active(&self, session: &Session) -> bool {
        if session.is_completed() {
            return true;
        }
        // A window too large to represent never expires
        match self
            .config
            .timeout_window()
            .and_then(|window| session.last_activity.checked_add_signed(window))
        {
            Some(deadline) => self.clock.now() < deadline,
            None => true,
        }
    }

    /// Refresh `last_activity`
    pub async fn extend(&self, session_id: &str) -> CoachResult<Session> {
        let mut session = self.load(session_id).await?;
        session.touch(self.clock.now());
        self.storage.update_session(&session).await?;
        debug!(session_id, "session extended");
        Ok(session)
    }

    /// Recoverable sessions are extended as a side effect
    pub async fn recover(&self, session_id: &str) -> CoachResult<RecoveryOutcome> {
        let session = self.load(session_id).await?;

        let reason = if session.is_completed() {
            Some(NotRecoverable::Completed)
        } else if session.abandoned_at.is_some() {
            Some(NotRecoverable::Abandoned)
        } else if !self.is_active(&session) {
            Some(NotRecoverable::Expired)
        } else {
            None
        };

        if let Some(reason) = reason {
            info!(session_id, ?reason, "session not recoverable");
            return Ok(RecoveryOutcome {
                recoverable: false,
                reason: Some(reason),
                session,
            });
        }

        let session = self.extend(session_id).await?;
        info!(session_id, "session recovered");
        Ok(RecoveryOutcome {
            recoverable: true,
            reason: None,
            session,
        })
    }

    /// Pause active sessions idle past the timeout window
    pub async fn timeout_inactive(&self) -> CoachResult<Vec<String>> {
        let mut timed_out = Vec::new();
        for candidate in self.storage.list_sessions().await? {
            if candidate.status != SessionStatus::Active || self.is_active(&candidate) {
                continue;
            }
            let Some(mut session) = self.storage.get_session(&candidate.id).await? else {
                continue;
            };
            if session.status != SessionStatus::Active || self.is_active(&session) {
                continue;
            }

            session.status = SessionStatus::Paused;
            self.storage.update_session(&session).await?;
            info!(session_id = %session.id, last_activity = %session.last_activity, "session timed out");
            self.notifier.emit(
                SessionEventKind::SessionTimedOut,
                &session.id,
                json!({ "last_activity": session.last_activity }),
            );
            timed_out.push(session.id);
        }
        Ok(timed_out)
    }

    /// Flag unfinished sessions idle past the abandonment cutoff
    pub async fn cleanup_abandoned(&self) -> CoachResult<Vec<String>> {
        let now = self.clock.now();
        let cutoff = cutoff(now, self.config.abandon_after(), || {
            format!(
                "abandonment window of {} hours is out of range",
                self.config.abandon_after_hours
            )
        })?;
        let is_abandoned = |s: &Session| {
            !s.is_completed() && s.abandoned_at.is_none() && s.last_activity < cutoff
        };

        let mut abandoned = Vec::new();
        for candidate in self.storage.list_sessions().await? {
            if !is_abandoned(&candidate) {
                continue;
            }
            let Some(mut session) = self.storage.get_session(&candidate.id).await? else {
                continue;
            };
            if !is_abandoned(&session) {
                continue;
            }

            session.abandoned_at = Some(now);
            if session.status == SessionStatus::Active {
                session.status = SessionStatus::Paused;
            }
            self.storage.update_session(&session).await?;
            info!(session_id = %session.id, "session abandoned");
            self.notifier.emit(
                SessionEventKind::SessionAbandoned,
                &session.id,
                json!({ "last_activity": session.last_activity }),
            );
            abandoned.push(session.id);
        }
        Ok(abandoned)
    }

    /// Flag completed sessions older than `cutoff_days`
    pub async fn archive(&self, cutoff_days: i64) -> CoachResult<Vec<String>> {
        if cutoff_days < 0 {
            return Err(CoachError::Config(format!(
                "archive cutoff must not be negative, got {} days",
                cutoff_days
            )));
        }
        let now = self.clock.now();
        let cutoff = cutoff(now, Duration::try_days(cutoff_days), || {
            format!("archive cutoff of {} days is out of range", cutoff_days)
        })?;
        let is_due = |s: &Session| {
            s.archived_at.is_none() && s.is_completed() && s.completed_at.is_some_and(|at| at < cutoff)
        };

        let mut archived = Vec::new();
        for candidate in self.storage.list_sessions().await? {
            if !is_due(&candidate) {
                continue;
            }
            let Some(mut session) = self.storage.get_session(&candidate.id).await? else {
                continue;
            };
            if !is_due(&session) {
                continue;
            }

            session.archived_at = Some(now);
            self.storage.update_session(&session).await?;
            info!(session_id = %session.id, "session archived");
            self.notifier
                .emit(SessionEventKind::SessionArchived, &session.id, json!({}));
            archived.push(session.id);
        }
        Ok(archived)
    }

    /// One pass of every lifecycle rule
    pub async fn run_sweep(&self) -> CoachResult<SweepReport> {
        let report = SweepReport {
            timed_out: self.timeout_inactive().await?,
            abandoned: self.cleanup_abandoned().await?,
            archived: self.archive(self.config.archive_after_days).await?,
        };
        if !report.is_empty() {
            info!(
                timed_out = report.timed_out.len(),
                abandoned = report.abandoned.len(),
                archived = report.archived.len(),
                "lifecycle sweep"
            );
        }
        for observer in &self.observers {
            observer.swept(&report).await;
        }
        Ok(report)
    }

    /// Run `run_sweep` on the configured interval until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.sweep_interval());
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_sweep().await {
                    warn!("Lifecycle sweep failed: {}", e);
                }
            }
        })
    }

    async fn load(&self, session_id: &str) -> CoachResult<Session> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))
    }
}

/// `now - window`, or a config error when the window or the subtraction
/// does not fit
fn cutoff(
    now: DateTime<Utc>,
    window: Option<Duration>,
    describe: impl FnOnce() -> String,
) -> CoachResult<DateTime<Utc>> {
    window
        .and_then(|w| now.checked_sub_signed(w))
        .ok_or_else(|| CoachError::Config(describe()))
}
