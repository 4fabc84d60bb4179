//! Storage collaborator
//!
//! CRUD for sessions, questions, responses and transcript turns by opaque
//! id, plus the denormalized `SessionView` used to build prompt context.
//! `InMemoryStorage` is the bundled implementation.
//!
//! Enforced invariants:
//! - a response references a question of the same session
//! - one response per question (write-once)
//! - question text is immutable; only the translation may be set later
//! - turn sequence numbers are assigned here, gapless per session

use async_trait::async_trait;
use coach_common::{
    CoachError, CoachResult, ConversationTurn, Question, QuestionView, ResponseRecord, Session,
    SessionView,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_session(&self, session: Session) -> CoachResult<Session>;
    async fn get_session(&self, id: &str) -> CoachResult<Option<Session>>;
    async fn update_session(&self, session: &Session) -> CoachResult<()>;
    async fn delete_session(&self, id: &str) -> CoachResult<bool>;
    async fn list_sessions(&self) -> CoachResult<Vec<Session>>;

    async fn create_question(&self, question: Question) -> CoachResult<Question>;
    async fn question_by_number(&self, session_id: &str, number: u32)
        -> CoachResult<Option<Question>>;
    async fn set_question_translation(&self, question_id: &str, text: &str) -> CoachResult<()>;

    async fn create_response(&self, response: ResponseRecord) -> CoachResult<ResponseRecord>;

    async fn append_turn(&self, turn: ConversationTurn) -> CoachResult<ConversationTurn>;
    async fn turns(&self, session_id: &str) -> CoachResult<Vec<ConversationTurn>>;

    async fn session_view(&self, id: &str) -> CoachResult<Option<SessionView>>;
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, Session>,
    questions: HashMap<String, Question>,
    /// question id -> response
    responses: HashMap<String, ResponseRecord>,
    turns: HashMap<String, Vec<ConversationTurn>>,
}

/// Process-local storage
#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_session(&self, session: Session) -> CoachResult<Session> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(CoachError::Storage(format!(
                "session {} already exists",
                session.id
            )));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> CoachResult<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn update_session(&self, session: &Session) -> CoachResult<()> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(CoachError::SessionNotFound(session.id.clone())),
        }
    }

    async fn delete_session(&self, id: &str) -> CoachResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.sessions.remove(id).is_none() {
            return Ok(false);
        }
        let question_ids: Vec<String> = tables
            .questions
            .values()
            .filter(|q| q.session_id == id)
            .map(|q| q.id.clone())
            .collect();
        for qid in question_ids {
            tables.questions.remove(&qid);
            tables.responses.remove(&qid);
        }
        tables.turns.remove(id);
        Ok(true)
    }

    async fn list_sessions(&self) -> CoachResult<Vec<Session>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<Session> = tables.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn create_question(&self, question: Question) -> CoachResult<Question> {
        let mut tables = self.tables.write().await;
        if !tables.sessions.contains_key(&question.session_id) {
            return Err(CoachError::SessionNotFound(question.session_id.clone()));
        }
        let duplicate = tables
            .questions
            .values()
            .any(|q| q.session_id == question.session_id && q.sequence == question.sequence);
        if duplicate {
            return Err(CoachError::Storage(format!(
                "question {} already exists in session {}",
                question.sequence, question.session_id
            )));
        }
        tables.questions.insert(question.id.clone(), question.clone());
        Ok(question)
    }

    async fn question_by_number(
        &self,
        session_id: &str,
        number: u32,
    ) -> CoachResult<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .values()
            .find(|q| q.session_id == session_id && q.sequence == number)
            .cloned())
    }

    async fn set_question_translation(&self, question_id: &str, text: &str) -> CoachResult<()> {
        let mut tables = self.tables.write().await;
        match tables.questions.get_mut(question_id) {
            Some(q) => {
                q.translated_text = Some(text.to_string());
                Ok(())
            }
            None => Err(CoachError::Storage(format!(
                "question {} not found",
                question_id
            ))),
        }
    }

    async fn create_response(&self, response: ResponseRecord) -> CoachResult<ResponseRecord> {
        let mut tables = self.tables.write().await;
        let question = tables.questions.get(&response.question_id).ok_or_else(|| {
            CoachError::Storage(format!("question {} not found", response.question_id))
        })?;
        if question.session_id != response.session_id {
            return Err(CoachError::Storage(format!(
                "question {} belongs to another session",
                response.question_id
            )));
        }
        if tables.responses.contains_key(&response.question_id) {
            return Err(CoachError::Storage(format!(
                "question {} already has a response",
                response.question_id
            )));
        }
        tables
            .responses
            .insert(response.question_id.clone(), response.clone());
        Ok(response)
    }

    async fn append_turn(&self, mut turn: ConversationTurn) -> CoachResult<ConversationTurn> {
        let mut tables = self.tables.write().await;
        if !tables.sessions.contains_key(&turn.session_id) {
            return Err(CoachError::SessionNotFound(turn.session_id.clone()));
        }
        let turns = tables.turns.entry(turn.session_id.clone()).or_default();
        turn.sequence = turns.len() as u32 + 1;
        turns.push(turn.clone());
        Ok(turn)
    }

    async fn turns(&self, session_id: &str) -> CoachResult<Vec<ConversationTurn>> {
        let tables = self.tables.read().await;
        Ok(tables.turns.get(session_id).cloned().unwrap_or_default())
    }

    async fn session_view(&self, id: &str) -> CoachResult<Option<SessionView>> {
        let tables = self.tables.read().await;
        let session = match tables.sessions.get(id) {
            Some(s) => s.clone(),
            None => return Ok(None),
        };

        let mut questions: Vec<QuestionView> = tables
            .questions
            .values()
            .filter(|q| q.session_id == id)
            .map(|q| QuestionView {
                question: q.clone(),
                response: tables.responses.get(&q.id).cloned(),
            })
            .collect();
        questions.sort_by_key(|v| v.question.sequence);

        Ok(Some(SessionView { session, questions }))
    }
}
