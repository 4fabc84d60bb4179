//! Session Orchestrator
//!
//! Drives one coaching conversation:
//! introduction -> question -> response -> evaluation -> next question or summary.
//!
//! Every AI-backed step (intro, question, evaluation, feedback, model
//! answer, summary) has a deterministic fallback, so a full provider
//! outage lowers content quality but never blocks progression.
//!
//! Concurrency: one step per session at a time (per-session async lock);
//! different sessions progress concurrently. `pause` does not take the step
//! lock. It only stops the next generation from starting, an in-flight call
//! finishes normally.

pub mod fallback;
pub mod prompts;
pub mod sanitize;
pub mod state;

pub use sanitize::{sanitize, ExtractionStrategy, Sanitized, STRATEGIES};
pub use state::{ConversationEvent, ConversationState, ResumeTarget};

use crate::clock::Clock;
use crate::evaluator::{ResponseEvaluator, RubricContext};
use crate::gateway::{AiGateway, GenerateRequest};
use crate::lifecycle::{SweepObserver, SweepReport};
use crate::notifier::{Notifier, SessionEventKind};
use crate::storage::Storage;
use async_trait::async_trait;
use coach_common::{
    word_count, ChatMessage, CoachError, CoachResult, ContentSource, ConversationTurn,
    InputMethod, NewSession, Question, ResponseRecord, Session, SessionConfig, SessionStatus,
    Speaker, TurnKind,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A candidate answer as submitted
#[derive(Debug, Clone, Default)]
pub struct ResponseInput {
    pub text: String,
    /// Client's idea of the question being answered. Only used to log a
    /// mismatch; the number is always derived from the transcript.
    pub question_number: Option<u32>,
    pub input_method: InputMethod,
}

/// Result of one `process_response` step
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub question_number: u32,
    pub response: ResponseRecord,
    pub feedback: String,
    pub next_question: Option<Question>,
    pub summary: Option<String>,
    pub progress: u8,
    pub completed: bool,
}

pub struct SessionOrchestrator {
    storage: Arc<dyn Storage>,
    gateway: Arc<AiGateway>,
    evaluator: ResponseEvaluator,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    states: Mutex<HashMap<String, ConversationState>>,
    step_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<AiGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            evaluator: ResponseEvaluator::new(gateway.clone(), config.clone()),
            storage,
            gateway,
            notifier,
            clock,
            config,
            states: Mutex::new(HashMap::new()),
            step_locks: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a session using the configured default question target
    pub async fn create_session(&self, params: NewSession) -> CoachResult<Session> {
        let session = Session::new(params, self.config.total_questions, self.clock.now());
        let session = self.storage.create_session(session).await?;
        self.set_state(&session.id, ConversationState::NotStarted);
        info!(
            session_id = %session.id,
            position = %session.job_position,
            total_questions = session.total_questions,
            "session created"
        );
        Ok(session)
    }

    /// Write the introduction and the first question. Idempotent: once any
    /// turn exists the stored transcript is returned unchanged.
    pub async fn start_conversation(&self, session_id: &str) -> CoachResult<Vec<ConversationTurn>> {
        let lock = self.step_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.load(session_id).await?;
        let turns = self.storage.turns(session_id).await?;
        if !turns.is_empty() {
            debug!(session_id, turns = turns.len(), "conversation already started");
            return Ok(turns);
        }
        ensure_not_abandoned(&session)?;

        let previous = self.current_state(&session, false);
        let introducing = previous.apply(ConversationEvent::Start)?;
        self.set_state(session_id, introducing);

        let result = self.run_introduction(session_id).await;
        if result.is_err() {
            self.forget_state(session_id);
        }
        result
    }

    async fn run_introduction(&self, session_id: &str) -> CoachResult<Vec<ConversationTurn>> {
        let now = self.clock.now();
        let session = self
            .modify_session(session_id, |s| {
                s.status = SessionStatus::Active;
                if s.started_at.is_none() {
                    s.started_at = Some(now);
                }
                s.touch(now);
            })
            .await?;

        self.deliver_intro(&session).await?;

        if matches!(
            self.cached_state(session_id),
            Some(ConversationState::Paused { .. })
        ) {
            info!(session_id, "paused during introduction, first question deferred");
            return self.storage.turns(session_id).await;
        }

        self.deliver_first_question(session_id).await?;
        self.storage.turns(session_id).await
    }

    /// Record and evaluate an answer, then ask the next question or close
    /// the session
    pub async fn process_response(
        &self,
        session_id: &str,
        text: &str,
        question_number: Option<u32>,
    ) -> CoachResult<TurnOutcome> {
        self.process_input(
            session_id,
            ResponseInput {
                text: text.to_string(),
                question_number,
                input_method: InputMethod::Text,
            },
        )
        .await
    }

    pub async fn process_input(
        &self,
        session_id: &str,
        input: ResponseInput,
    ) -> CoachResult<TurnOutcome> {
        let lock = self.step_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.load(session_id).await?;
        if session.is_completed() {
            return Err(CoachError::SessionCompleted(session_id.to_string()));
        }
        ensure_not_abandoned(&session)?;

        let turns = self.storage.turns(session_id).await?;
        let previous = self.current_state(&session, !turns.is_empty());
        if matches!(previous, ConversationState::Paused { .. }) {
            return Err(CoachError::SessionPaused(session_id.to_string()));
        }
        let evaluating = previous.apply(ConversationEvent::ResponseReceived)?;

        let answered = turns
            .iter()
            .filter(|t| t.speaker == Speaker::Candidate)
            .count() as u32;
        let number = answered + 1;
        if let Some(claimed) = input.question_number {
            if claimed != number {
                warn!(
                    session_id,
                    claimed,
                    derived = number,
                    "client question number ignored, using transcript position"
                );
            }
        }

        let question = self
            .storage
            .question_by_number(session_id, number)
            .await?
            .ok_or_else(|| CoachError::QuestionNotFound {
                session_id: session_id.to_string(),
                number,
            })?;

        self.set_state(session_id, evaluating);
        let result = self.evaluate_and_advance(session, question, input).await;
        if result.is_err() {
            self.set_state(session_id, previous);
        }
        result
    }

    async fn evaluate_and_advance(
        &self,
        session: Session,
        question: Question,
        input: ResponseInput,
    ) -> CoachResult<TurnOutcome> {
        let id = session.id.clone();
        let number = question.sequence;
        let received_at = self.clock.now();

        let asked = question
            .translated_text
            .as_deref()
            .unwrap_or(&question.text);
        let ctx = RubricContext::for_session(&session, asked);
        let (analysis, model_answer) = tokio::join!(
            self.evaluator.evaluate(&input.text, &ctx),
            self.evaluator.model_answer(&ctx)
        );
        let (feedback, feedback_source) = self
            .generate_line(
                &session,
                prompts::feedback_messages(&session, asked, &input.text, &analysis),
                "feedback",
                fallback::feedback(&analysis),
            )
            .await;

        // Nothing is written until the response record is accepted, so a
        // failed step leaves the answer slot open for a retry
        let response = self
            .storage
            .create_response(ResponseRecord {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: id.clone(),
                question_id: question.id.clone(),
                question_number: number,
                text: input.text.trim().to_string(),
                language: session.language.clone(),
                input_method: input.input_method,
                analysis: analysis.clone(),
                model_answer,
                response_time_secs: (received_at - question.created_at).num_seconds().max(0),
                word_count: word_count(&input.text),
                created_at: received_at,
            })
            .await?;

        self.storage
            .append_turn(ConversationTurn::candidate(
                &id,
                input.text.trim(),
                number,
                received_at,
            ))
            .await?;
        self.storage
            .append_turn(ConversationTurn::coach(
                &id,
                TurnKind::Feedback,
                feedback.clone(),
                Some(number),
                feedback_source,
                self.clock.now(),
            ))
            .await?;

        info!(
            session_id = %id,
            question_number = number,
            score = analysis.overall_score(),
            heuristic = analysis.source.is_fallback(),
            "response evaluated"
        );
        self.notifier.emit(
            SessionEventKind::ResponseEvaluated,
            &id,
            json!({
                "question_number": number,
                "response_id": response.id,
                "overall_score": analysis.overall_score(),
                "fallback": analysis.source.is_fallback(),
            }),
        );

        if number < session.total_questions {
            let next = self.ask_question(&id, number + 1).await?;
            let now = self.clock.now();
            let updated = self
                .modify_session(&id, |s| {
                    s.record_progress(number);
                    s.advance_to(number + 1);
                    s.touch(now);
                })
                .await?;
            self.transition(&id, ConversationEvent::NextQuestion)?;

            return Ok(TurnOutcome {
                question_number: number,
                response,
                feedback,
                next_question: Some(next),
                summary: None,
                progress: updated.progress,
                completed: false,
            });
        }

        let summary = self.deliver_summary(&id).await?;
        let done_at = self.clock.now();
        let updated = self
            .modify_session(&id, |s| {
                s.status = SessionStatus::Completed;
                s.progress = 100;
                s.completed_at = Some(done_at);
                s.touch(done_at);
            })
            .await?;
        self.transition(&id, ConversationEvent::Complete)?;
        self.forget(&id);

        info!(session_id = %id, questions = number, "session completed");
        self.notifier.emit(
            SessionEventKind::SessionCompleted,
            &id,
            json!({ "questions_answered": number }),
        );

        Ok(TurnOutcome {
            question_number: number,
            response,
            feedback,
            next_question: None,
            summary: Some(summary),
            progress: updated.progress,
            completed: true,
        })
    }

    /// Pause from `introducing` or `awaiting_response`
    pub async fn pause(&self, session_id: &str) -> CoachResult<Session> {
        let session = self.load(session_id).await?;
        if session.is_completed() {
            return Err(CoachError::SessionCompleted(session_id.to_string()));
        }
        let has_turns = !self.storage.turns(session_id).await?.is_empty();
        let paused = self
            .current_state(&session, has_turns)
            .apply(ConversationEvent::Pause)?;
        self.set_state(session_id, paused);

        let now = self.clock.now();
        let session = self
            .modify_session(session_id, |s| {
                s.status = SessionStatus::Paused;
                s.touch(now);
            })
            .await?;

        info!(session_id, "session paused");
        self.notifier
            .emit(SessionEventKind::SessionPaused, session_id, json!({}));
        Ok(session)
    }

    /// Return to the state the pause interrupted. An interrupted
    /// introduction is finished by asking the first question.
    pub async fn resume(&self, session_id: &str) -> CoachResult<Vec<ConversationTurn>> {
        let lock = self.step_lock(session_id);
        let _guard = lock.lock().await;

        let session = self.load(session_id).await?;
        if session.is_completed() {
            return Err(CoachError::SessionCompleted(session_id.to_string()));
        }
        ensure_not_abandoned(&session)?;
        let turns = self.storage.turns(session_id).await?;
        let resumed = self
            .current_state(&session, !turns.is_empty())
            .apply(ConversationEvent::Resume)?;
        self.set_state(session_id, resumed);

        let now = self.clock.now();
        let session = self
            .modify_session(session_id, |s| {
                s.status = SessionStatus::Active;
                s.touch(now);
            })
            .await?;

        info!(session_id, state = resumed.as_str(), "session resumed");
        self.notifier
            .emit(SessionEventKind::SessionResumed, session_id, json!({}));

        if resumed == ConversationState::Introducing {
            if !turns.iter().any(|t| t.kind == TurnKind::Introduction) {
                self.deliver_intro(&session).await?;
            }
            self.deliver_first_question(session_id).await?;
        }
        self.storage.turns(session_id).await
    }

    /// Drop the cached state and step lock of a session the conversation
    /// is done with. Unknown ids are ignored.
    pub fn forget(&self, session_id: &str) {
        self.step_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
        self.forget_state(session_id);
    }

    /// Forget every tracked session that was deleted, completed or
    /// abandoned and has no step in flight. Returns how many were dropped.
    pub async fn prune(&self) -> CoachResult<usize> {
        let mut ids: Vec<String> = self
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.extend(
            self.step_locks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .keys()
                .cloned(),
        );
        ids.sort_unstable();
        ids.dedup();

        let mut pruned = 0;
        for id in ids {
            let retired = match self.storage.get_session(&id).await? {
                Some(session) => session.is_completed() || session.abandoned_at.is_some(),
                None => true,
            };
            if retired && self.forget_idle(&id) {
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, "orchestrator state pruned");
        }
        Ok(pruned)
    }

    /// Sessions with cached state or a step lock
    pub fn tracked_sessions(&self) -> usize {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let locks = self.step_locks.lock().unwrap_or_else(|e| e.into_inner());
        states.len() + locks.keys().filter(|id| !states.contains_key(*id)).count()
    }

    /// Persisted transcript in order
    pub async fn transcript(&self, session_id: &str) -> CoachResult<Vec<ConversationTurn>> {
        self.load(session_id).await?;
        self.storage.turns(session_id).await
    }

    pub async fn session(&self, session_id: &str) -> CoachResult<Session> {
        self.load(session_id).await
    }

    /// Current conversation state, rebuilt from storage when not cached
    pub async fn state(&self, session_id: &str) -> CoachResult<ConversationState> {
        let session = self.load(session_id).await?;
        let has_turns = !self.storage.turns(session_id).await?.is_empty();
        Ok(self.current_state(&session, has_turns))
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn deliver_intro(&self, session: &Session) -> CoachResult<()> {
        let (intro, source) = self
            .generate_line(
                session,
                prompts::intro_messages(session),
                "introduction",
                fallback::intro(session),
            )
            .await;
        let fallback_used = source.is_fallback();
        self.storage
            .append_turn(ConversationTurn::coach(
                &session.id,
                TurnKind::Introduction,
                intro,
                None,
                source,
                self.clock.now(),
            ))
            .await?;

        info!(session_id = %session.id, fallback = fallback_used, "conversation started");
        self.notifier.emit(
            SessionEventKind::ConversationStarted,
            &session.id,
            json!({ "total_questions": session.total_questions }),
        );
        Ok(())
    }

    async fn deliver_first_question(&self, session_id: &str) -> CoachResult<()> {
        self.ask_question(session_id, 1).await?;
        let now = self.clock.now();
        self.modify_session(session_id, |s| {
            s.advance_to(1);
            s.touch(now);
        })
        .await?;

        // A pause that landed while the question was generating now
        // resumes to awaiting the answer.
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let current = states
            .get(session_id)
            .copied()
            .unwrap_or(ConversationState::Introducing);
        let next = match current {
            ConversationState::Paused {
                resume_to: ResumeTarget::Introducing,
            } => ConversationState::Paused {
                resume_to: ResumeTarget::AwaitingResponse,
            },
            other => other.apply(ConversationEvent::IntroDelivered)?,
        };
        states.insert(session_id.to_string(), next);
        Ok(())
    }

    /// Persist question `number` and its transcript turn. An existing
    /// question with that number is returned as is.
    async fn ask_question(&self, session_id: &str, number: u32) -> CoachResult<Question> {
        if let Some(existing) = self.storage.question_by_number(session_id, number).await? {
            return Ok(existing);
        }

        let view = self
            .storage
            .session_view(session_id)
            .await?
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))?;
        let bank = fallback::question(&view.session, number);
        let (text, source) = self
            .generate_line(
                &view.session,
                prompts::question_messages(&view, number),
                "question",
                bank.text.clone(),
            )
            .await;

        let now = self.clock.now();
        let question = self
            .storage
            .create_question(Question {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                sequence: number,
                text: text.clone(),
                translated_text: None,
                category: bank.category.to_string(),
                difficulty: bank.difficulty,
                created_at: now,
            })
            .await?;

        let fallback_used = source.is_fallback();
        self.storage
            .append_turn(ConversationTurn::coach(
                session_id,
                TurnKind::Question,
                text,
                Some(number),
                source,
                now,
            ))
            .await?;

        debug!(session_id, question_number = number, fallback = fallback_used, "question asked");
        self.notifier.emit(
            SessionEventKind::QuestionAsked,
            session_id,
            json!({
                "question_number": number,
                "question_id": question.id,
                "fallback": fallback_used,
            }),
        );
        Ok(question)
    }

    async fn deliver_summary(&self, session_id: &str) -> CoachResult<String> {
        let view = self
            .storage
            .session_view(session_id)
            .await?
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))?;
        let responses: Vec<ResponseRecord> = view.responses().cloned().collect();

        let (summary, source) = self
            .generate_line(
                &view.session,
                prompts::summary_messages(&view),
                "summary",
                fallback::summary(&view.session, &responses),
            )
            .await;
        self.storage
            .append_turn(ConversationTurn::coach(
                session_id,
                TurnKind::Summary,
                summary.clone(),
                None,
                source,
                self.clock.now(),
            ))
            .await?;
        Ok(summary)
    }

    /// One gateway call, sanitized, with `default_line` as the fallback for
    /// outages and unusable output
    async fn generate_line(
        &self,
        session: &Session,
        messages: Vec<ChatMessage>,
        domain: &str,
        default_line: String,
    ) -> (String, ContentSource) {
        let request =
            GenerateRequest::new(messages, self.config.max_tokens, self.config.temperature)
                .domain(domain)
                .language(&session.language);

        match self.gateway.generate(request).await {
            Ok(generation) => {
                let cleaned = sanitize(&generation.content, &default_line);
                if cleaned.is_default() {
                    warn!(
                        session_id = %session.id,
                        domain,
                        provider = %generation.provider_used,
                        "generated text unusable, using template"
                    );
                    return (cleaned.text, ContentSource::Fallback);
                }
                if cleaned.strategy != sanitize::PASSTHROUGH {
                    debug!(session_id = %session.id, domain, strategy = cleaned.strategy, "output sanitized");
                }
                (
                    cleaned.text,
                    ContentSource::Ai {
                        provider: generation.provider_used,
                    },
                )
            }
            Err(e) => {
                warn!(session_id = %session.id, domain, error = %e, "generation unavailable, using template");
                (default_line, ContentSource::Fallback)
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, session_id: &str) -> CoachResult<Session> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoachError::SessionNotFound(session_id.to_string()))
    }

    /// Re-read, mutate and write back, so fields written concurrently by
    /// the lifecycle sweeper are not overwritten with a stale copy
    async fn modify_session<F>(&self, session_id: &str, mutate: F) -> CoachResult<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = self.load(session_id).await?;
        mutate(&mut session);
        self.storage.update_session(&session).await?;
        Ok(session)
    }

    fn step_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.step_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(session_id.to_string()).or_default().clone()
    }

    /// `forget` unless a step currently holds the session's lock
    fn forget_idle(&self, session_id: &str) -> bool {
        let mut locks = self.step_locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(session_id) {
            if lock.try_lock().is_err() {
                return false;
            }
        }
        locks.remove(session_id);
        drop(locks);
        self.forget_state(session_id);
        true
    }

    fn cached_state(&self, session_id: &str) -> Option<ConversationState> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(session_id).copied()
    }

    fn set_state(&self, session_id: &str, state: ConversationState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(session_id.to_string(), state);
    }

    fn forget_state(&self, session_id: &str) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.remove(session_id);
    }

    fn transition(&self, session_id: &str, event: ConversationEvent) -> CoachResult<ConversationState> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let current = states
            .get(session_id)
            .copied()
            .unwrap_or(ConversationState::NotStarted);
        let next = current.apply(event)?;
        states.insert(session_id.to_string(), next);
        Ok(next)
    }

    /// Cached state reconciled with the persisted status: completion always
    /// wins, and a timeout pause written by the sweeper is honored
    fn current_state(&self, session: &Session, has_turns: bool) -> ConversationState {
        let persisted = ConversationState::from_persisted(session.status, has_turns);
        match (self.cached_state(&session.id), session.status) {
            (_, SessionStatus::Completed) => ConversationState::Completed,
            (Some(paused @ ConversationState::Paused { .. }), _) => paused,
            (Some(_), SessionStatus::Paused) => persisted,
            (Some(cached), _) => cached,
            (None, _) => persisted,
        }
    }
}

#[async_trait]
impl SweepObserver for SessionOrchestrator {
    async fn swept(&self, report: &SweepReport) {
        for id in report.abandoned.iter().chain(&report.archived) {
            self.forget(id);
        }
        if let Err(e) = self.prune().await {
            warn!("Pruning orchestrator state failed: {}", e);
        }
    }
}

/// Abandoned sessions are terminal for the conversation
fn ensure_not_abandoned(session: &Session) -> CoachResult<()> {
    match session.abandoned_at {
        Some(_) => Err(CoachError::SessionAbandoned(session.id.clone())),
        None => Ok(()),
    }
}
