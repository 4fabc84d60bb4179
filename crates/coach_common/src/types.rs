//! Interview coaching data model
//!
//! A Session owns its Questions; a Question owns at most one Response.
//! ConversationTurns are the ordered transcript the candidate sees.
//!
//! Invariants:
//! - `current_question` never decreases and never exceeds `total_questions + 1`
//! - A Response always references a Question of the same Session
//! - Questions are immutable once created (translation aside)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Session
// ============================================================================

/// Persisted session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

/// Interview stage being rehearsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStage {
    HrScreening,
    #[default]
    Behavioral,
    Technical,
    Managerial,
    Final,
}

impl InterviewStage {
    pub fn label(&self) -> &'static str {
        match self {
            InterviewStage::HrScreening => "HR screening",
            InterviewStage::Behavioral => "behavioral",
            InterviewStage::Technical => "technical",
            InterviewStage::Managerial => "managerial",
            InterviewStage::Final => "final round",
        }
    }
}

/// Candidate seniority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Entry,
    #[default]
    Mid,
    Senior,
    Executive,
}

impl ExperienceLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ExperienceLevel::Entry => "entry-level",
            ExperienceLevel::Mid => "mid-level",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Executive => "executive",
        }
    }
}

/// Parameters for creating a session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewSession {
    pub job_position: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub stage: InterviewStage,
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default = "default_language")]
    pub language: String,
    /// Overrides the configured default target when set
    #[serde(default)]
    pub total_questions: Option<u32>,
}

fn default_language() -> String {
    "en".to_string()
}

/// One end-to-end coaching conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub job_position: String,
    pub industry: Option<String>,
    pub stage: InterviewStage,
    pub experience_level: ExperienceLevel,
    pub language: String,
    pub status: SessionStatus,
    /// 1-based number of the question currently asked (0 before start)
    pub current_question: u32,
    pub total_questions: u32,
    /// Percentage of answered questions, 0..=100
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set by the lifecycle sweeper once the session is considered abandoned
    pub abandoned_at: Option<DateTime<Utc>>,
    /// Set by the lifecycle sweeper once a completed session passed retention
    pub archived_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(params: NewSession, default_total: u32, now: DateTime<Utc>) -> Self {
        let language = if params.language.trim().is_empty() {
            default_language()
        } else {
            params.language.trim().to_lowercase()
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_position: params.job_position,
            industry: params.industry,
            stage: params.stage,
            experience_level: params.experience_level,
            language,
            status: SessionStatus::NotStarted,
            current_question: 0,
            total_questions: params.total_questions.unwrap_or(default_total).max(1),
            progress: 0,
            created_at: now,
            started_at: None,
            last_activity: now,
            completed_at: None,
            abandoned_at: None,
            archived_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Move the question pointer forward. Never moves backwards and never
    /// passes `total_questions + 1`.
    pub fn advance_to(&mut self, question_number: u32) {
        let capped = question_number.min(self.total_questions + 1);
        self.current_question = self.current_question.max(capped);
    }

    /// Record `answered` answered questions as progress
    pub fn record_progress(&mut self, answered: u32) {
        let pct = progress_percent(answered, self.total_questions);
        self.progress = self.progress.max(pct);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

/// Integer percentage of answered questions, clamped to 100
pub fn progress_percent(answered: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (answered as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

// ============================================================================
// Questions and responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A question asked in a session. Immutable once created except for
/// translation enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub session_id: String,
    /// 1-based position within the session
    pub sequence: u32,
    pub text: String,
    pub translated_text: Option<String>,
    pub category: String,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

/// Where a piece of generated content came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSource {
    Ai { provider: String },
    Fallback,
}

impl ContentSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ContentSource::Fallback)
    }
}

/// STAR rubric dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarDimension {
    Situation,
    Task,
    Action,
    Result,
    OverallFlow,
}

impl StarDimension {
    pub const ALL: [StarDimension; 5] = [
        StarDimension::Situation,
        StarDimension::Task,
        StarDimension::Action,
        StarDimension::Result,
        StarDimension::OverallFlow,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StarDimension::Situation => "Situation",
            StarDimension::Task => "Task",
            StarDimension::Action => "Action",
            StarDimension::Result => "Result",
            StarDimension::OverallFlow => "Overall flow",
        }
    }
}

/// Score for a single dimension, 1..=5
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarScore {
    pub score: u8,
    pub feedback: String,
    pub improvement_areas: Vec<String>,
}

impl StarScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(score: u8, feedback: impl Into<String>) -> Self {
        Self {
            score: score.clamp(Self::MIN, Self::MAX),
            feedback: feedback.into(),
            improvement_areas: Vec::new(),
        }
    }
}

/// Full STAR evaluation of one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarAnalysis {
    pub situation: StarScore,
    pub task: StarScore,
    pub action: StarScore,
    pub result: StarScore,
    pub overall_flow: StarScore,
    pub source: ContentSource,
}

impl StarAnalysis {
    /// Canonical overall score: mean of situation, task, action and result
    /// (overall flow excluded), rounded to one decimal place.
    pub fn overall_score(&self) -> f64 {
        let sum = self.situation.score as f64
            + self.task.score as f64
            + self.action.score as f64
            + self.result.score as f64;
        (sum / 4.0 * 10.0).round() / 10.0
    }

    pub fn dimension(&self, dim: StarDimension) -> &StarScore {
        match dim {
            StarDimension::Situation => &self.situation,
            StarDimension::Task => &self.task,
            StarDimension::Action => &self.action,
            StarDimension::Result => &self.result,
            StarDimension::OverallFlow => &self.overall_flow,
        }
    }

    /// Lowest scoring of the four STAR dimensions (first wins on ties)
    pub fn weakest(&self) -> StarDimension {
        StarDimension::ALL[..4]
            .iter()
            .copied()
            .min_by_key(|d| self.dimension(*d).score)
            .unwrap_or(StarDimension::Situation)
    }

    /// Highest scoring of the four STAR dimensions (first wins on ties)
    pub fn strongest(&self) -> StarDimension {
        StarDimension::ALL[..4]
            .iter()
            .copied()
            .rev()
            .max_by_key(|d| self.dimension(*d).score)
            .unwrap_or(StarDimension::Result)
    }
}

/// Reference answer shown after evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAnswer {
    pub text: String,
    pub source: ContentSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputMethod {
    #[default]
    Text,
    Voice,
}

/// Candidate answer to one question. Write-once after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub session_id: String,
    pub question_id: String,
    pub question_number: u32,
    pub text: String,
    pub language: String,
    pub input_method: InputMethod,
    pub analysis: StarAnalysis,
    pub model_answer: ModelAnswer,
    /// Seconds between the question being asked and the answer arriving
    pub response_time_secs: i64,
    pub word_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Whitespace-delimited word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ============================================================================
// Transcript
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Coach,
    Candidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Introduction,
    Question,
    Response,
    Feedback,
    Summary,
}

/// One entry of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub session_id: String,
    /// Assigned by storage, 1-based and gapless per session
    pub sequence: u32,
    pub speaker: Speaker,
    pub kind: TurnKind,
    pub content: String,
    pub question_number: Option<u32>,
    pub source: Option<ContentSource>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn coach(
        session_id: &str,
        kind: TurnKind,
        content: impl Into<String>,
        question_number: Option<u32>,
        source: ContentSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            sequence: 0,
            speaker: Speaker::Coach,
            kind,
            content: content.into(),
            question_number,
            source: Some(source),
            created_at: now,
        }
    }

    pub fn candidate(
        session_id: &str,
        content: impl Into<String>,
        question_number: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            sequence: 0,
            speaker: Speaker::Candidate,
            kind: TurnKind::Response,
            content: content.into(),
            question_number: Some(question_number),
            source: None,
            created_at: now,
        }
    }
}

/// Denormalized session view used for context building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session: Session,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionView {
    pub question: Question,
    pub response: Option<ResponseRecord>,
}

impl SessionView {
    pub fn responses(&self) -> impl Iterator<Item = &ResponseRecord> {
        self.questions.iter().filter_map(|q| q.response.as_ref())
    }
}

// ============================================================================
// Chat messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Provider-agnostic chat message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
