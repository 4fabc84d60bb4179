//! Deterministic Orchestration Tests
//!
//! Full conversations against InMemoryStorage with FakeProviders standing in
//! for every backend. A responder recognizes which step is asking (intro,
//! question, evaluation, model answer, feedback, summary) from the prompt.

use coach_common::{
    ChatMessage, ContentSource, GatewayConfig, NewSession, SessionConfig, SessionStatus,
    StarDimension, TurnKind,
};
use coachd::gateway::{AiGateway, FakeProvider, FakeReply};
use coachd::orchestrator::ResumeTarget;
use coachd::{
    BroadcastNotifier, ConversationState, InMemoryStorage, ManualClock, SessionEventKind,
    SessionOrchestrator, Storage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Harness
// ============================================================================

const EVALUATION_JSON: &str = r#"{"situation": {"score": 4, "feedback": "Clear setting."},
 "task": {"score": 4, "feedback": "Goal stated."},
 "action": {"score": 5, "feedback": "Specific steps.", "improvementAreas": []},
 "result": {"score": 3, "feedback": "Outcome vague.", "improvementAreas": ["Quantify it"]},
 "overallFlow": {"score": 4, "feedback": "Good order."}}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Intro,
    Question,
    Evaluation,
    ModelAnswer,
    Feedback,
    Summary,
}

fn step_of(messages: &[ChatMessage]) -> Step {
    let all: String = messages.iter().map(|m| m.content.as_str()).collect();
    if all.contains("scoring answers with the STAR method") {
        Step::Evaluation
    } else if all.contains("strong example answer") {
        Step::ModelAnswer
    } else if all.contains("Greet the candidate") {
        Step::Intro
    } else if all.contains("Ask exactly one new question") {
        Step::Question
    } else if all.contains("The practice interview is over") {
        Step::Summary
    } else {
        Step::Feedback
    }
}

/// Well-behaved provider; `down` switches it to rejecting everything
fn coach_provider(down: Arc<AtomicBool>) -> Arc<FakeProvider> {
    FakeProvider::with_responder("coach-ai", move |messages| {
        if down.load(Ordering::SeqCst) {
            return FakeReply::Reject("HTTP 503".to_string());
        }
        let text = match step_of(messages) {
            Step::Intro => "Hello! I'm your coach and we'll practice together today.".to_string(),
            Step::Question => "Describe a project where you made a real difference.".to_string(),
            Step::Evaluation => EVALUATION_JSON.to_string(),
            Step::ModelAnswer => "In my last role I led a migration that cut costs by 20%.".to_string(),
            Step::Feedback => "Strong actions. Add numbers to your result.".to_string(),
            Step::Summary => "Great session. Keep quantifying your results.".to_string(),
        };
        FakeReply::Text(text)
    })
}

struct Harness {
    orchestrator: SessionOrchestrator,
    storage: Arc<InMemoryStorage>,
    provider: Arc<FakeProvider>,
    down: Arc<AtomicBool>,
    notifier: Arc<BroadcastNotifier>,
}

fn harness_with(provider_for: impl FnOnce(Arc<AtomicBool>) -> Arc<FakeProvider>) -> Harness {
    let down = Arc::new(AtomicBool::new(false));
    let provider = provider_for(down.clone());
    let clock = Arc::new(ManualClock::default());
    let gateway = AiGateway::builder(&GatewayConfig::default())
        .clock(clock.clone())
        .provider(provider.clone())
        .build();
    let notifier = Arc::new(BroadcastNotifier::new(64));
    let storage = Arc::new(InMemoryStorage::new());

    let orchestrator = SessionOrchestrator::new(
        storage.clone(),
        Arc::new(gateway),
        notifier.clone(),
        clock,
        SessionConfig::default(),
    );
    Harness {
        orchestrator,
        storage,
        provider,
        down,
        notifier,
    }
}

fn harness() -> Harness {
    harness_with(coach_provider)
}

fn params(total: u32) -> NewSession {
    NewSession {
        job_position: "Backend Engineer".to_string(),
        total_questions: Some(total),
        ..Default::default()
    }
}

const ANSWER: &str = "At my previous job our deploys kept failing. My task was to fix the pipeline. \
                      I analyzed the failures and automated the rollback. As a result, failures dropped by 80%.";

// ============================================================================
// startConversation
// ============================================================================

/// Starting twice returns the same transcript and generates nothing new
#[tokio::test]
async fn test_start_conversation_is_idempotent() {
    let h = harness();
    let session = h.orchestrator.create_session(params(5)).await.unwrap();

    let first = h.orchestrator.start_conversation(&session.id).await.unwrap();
    let calls = h.provider.call_count();
    let second = h.orchestrator.start_conversation(&session.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].kind, TurnKind::Introduction);
    assert_eq!(first[1].kind, TurnKind::Question);
    assert_eq!(h.provider.call_count(), calls);

    let stored = h.orchestrator.session(&session.id).await.unwrap();
    assert_eq!(stored.current_question, 1);
    assert_eq!(stored.status, SessionStatus::Active);
    assert!(stored.started_at.is_some());
}

/// Concurrent starts on one session still produce a single introduction
#[tokio::test]
async fn test_concurrent_start_single_intro() {
    let h = harness();
    let session = h.orchestrator.create_session(params(5)).await.unwrap();

    let (a, b) = tokio::join!(
        h.orchestrator.start_conversation(&session.id),
        h.orchestrator.start_conversation(&session.id)
    );
    assert_eq!(a.unwrap(), b.unwrap());

    let transcript = h.orchestrator.transcript(&session.id).await.unwrap();
    let intros = transcript
        .iter()
        .filter(|t| t.kind == TurnKind::Introduction)
        .count();
    assert_eq!(intros, 1);
}

// ============================================================================
// processResponse
// ============================================================================

/// totalQuestions = 1: answering question 1 completes the session at 100%
#[tokio::test]
async fn test_single_question_session_completes() {
    let h = harness();
    let session = h.orchestrator.create_session(params(1)).await.unwrap();
    h.orchestrator.start_conversation(&session.id).await.unwrap();

    let outcome = h
        .orchestrator
        .process_response(&session.id, ANSWER, Some(1))
        .await
        .unwrap();

    assert!(outcome.completed);
    assert_eq!(outcome.progress, 100);
    assert!(outcome.next_question.is_none());
    assert_eq!(
        outcome.summary.as_deref(),
        Some("Great session. Keep quantifying your results.")
    );

    let stored = h.orchestrator.session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert!(stored.completed_at.is_some());
    assert!(stored.current_question <= stored.total_questions + 1);
    assert_eq!(
        h.orchestrator.state(&session.id).await.unwrap(),
        ConversationState::Completed
    );

    let transcript = h.orchestrator.transcript(&session.id).await.unwrap();
    assert_eq!(transcript.last().map(|t| t.kind), Some(TurnKind::Summary));
}

/// AI evaluation path stores the parsed analysis and model answer
#[tokio::test]
async fn test_ai_evaluation_recorded() {
    let h = harness();
    let session = h.orchestrator.create_session(params(3)).await.unwrap();
    h.orchestrator.start_conversation(&session.id).await.unwrap();

    let outcome = h
        .orchestrator
        .process_response(&session.id, ANSWER, None)
        .await
        .unwrap();
    let analysis = &outcome.response.analysis;
    assert_eq!(analysis.action.score, 5);
    assert_eq!(analysis.overall_score(), 4.0);
    assert_eq!(
        analysis.source,
        ContentSource::Ai {
            provider: "coach-ai".to_string()
        }
    );
    assert!(outcome.response.model_answer.text.contains("migration"));
    assert_eq!(outcome.feedback, "Strong actions. Add numbers to your result.");
    assert_eq!(outcome.response.word_count, ANSWER.split_whitespace().count());
}

/// Non-JSON evaluation output falls back to the heuristic, never fails
#[tokio::test]
async fn test_non_json_evaluation_uses_heuristic() {
    let h = harness_with(|_| {
        FakeProvider::with_responder("chatty", |messages| match step_of(messages) {
            Step::Evaluation => FakeReply::Text("That was a great answer, 4 out of 5!".to_string()),
            _ => FakeReply::Text("Tell me about a time you solved a hard problem.".to_string()),
        })
    });
    let session = h.orchestrator.create_session(params(2)).await.unwrap();
    h.orchestrator.start_conversation(&session.id).await.unwrap();

    let outcome = h
        .orchestrator
        .process_response(&session.id, ANSWER, None)
        .await
        .unwrap();
    let analysis = &outcome.response.analysis;
    assert!(analysis.source.is_fallback());
    for dim in StarDimension::ALL {
        let score = analysis.dimension(dim).score;
        assert!((1..=5).contains(&score), "{:?} = {}", dim, score);
    }
}

/// Provider outage during next-question generation still yields a question
#[tokio::test]
async fn test_outage_during_next_question_uses_fallback() {
    let h = harness();
    let session = h.orchestrator.create_session(params(3)).await.unwrap();
    h.orchestrator.start_conversation(&session.id).await.unwrap();

    h.down.store(true, Ordering::SeqCst);
    let outcome = h
        .orchestrator
        .process_response(&session.id, ANSWER, None)
        .await
        .unwrap();

    let next = outcome.next_question.expect("next question");
    assert_eq!(next.sequence, 2);
    assert!(!next.text.trim().is_empty());
    assert!(outcome.response.analysis.source.is_fallback());
    assert!(outcome.response.model_answer.source.is_fallback());

    let transcript = h.orchestrator.transcript(&session.id).await.unwrap();
    let question_turn = transcript
        .iter()
        .rev()
        .find(|t| t.kind == TurnKind::Question)
        .unwrap();
    assert_eq!(question_turn.question_number, Some(2));
    assert_eq!(question_turn.source, Some(ContentSource::Fallback));
}

/// A full outage from the start still completes a whole session
#[tokio::test]
async fn test_full_outage_session_completes() {
    let h = harness();
    h.down.store(true, Ordering::SeqCst);
    let session = h.orchestrator.create_session(params(3)).await.unwrap();

    let turns = h.orchestrator.start_conversation(&session.id).await.unwrap();
    assert_eq!(turns.len(), 2);

    let mut last_question = 0;
    for _ in 0..3 {
        let outcome = h
            .orchestrator
            .process_response(&session.id, ANSWER, None)
            .await
            .unwrap();
        let stored = h.orchestrator.session(&session.id).await.unwrap();
        assert!(stored.current_question >= last_question);
        assert!(stored.current_question <= stored.total_questions + 1);
        last_question = stored.current_question;
        if outcome.completed {
            assert_eq!(outcome.question_number, 3);
        }
    }

    let stored = h.orchestrator.session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.progress, 100);
}

/// Progress and question pointer advance together
#[tokio::test]
async fn test_progress_advances() {
    let h = harness();
    let session = h.orchestrator.create_session(params(4)).await.unwrap();
    h.orchestrator.start_conversation(&session.id).await.unwrap();

    let expected = [(1, 25, 2), (2, 50, 3)];
    for (number, progress, current) in expected {
        let outcome = h
            .orchestrator
            .process_response(&session.id, ANSWER, None)
            .await
            .unwrap();
        assert_eq!(outcome.question_number, number);
        assert_eq!(outcome.progress, progress);
        let stored = h.orchestrator.session(&session.id).await.unwrap();
        assert_eq!(stored.current_question, current);
    }
}

/// Model output with a chatty preamble is cleaned before it is stored
#[tokio::test]
async fn test_question_output_is_sanitized() {
    let h = harness_with(|_| {
        FakeProvider::with_responder("verbose", |messages| match step_of(messages) {
            Step::Question => FakeReply::Text(
                "<think>The user wants a question.</think>Sure! Here's your next question:\n\
                 \"How do you handle disagreements with your manager?\""
                    .to_string(),
            ),
            Step::Intro => FakeReply::Text("[Greeting placeholder]".to_string()),
            _ => FakeReply::Text("Nice work on that answer.".to_string()),
        })
    });
    let session = h.orchestrator.create_session(params(3)).await.unwrap();
    let turns = h.orchestrator.start_conversation(&session.id).await.unwrap();

    // Intro was only a placeholder, so the template was used
    assert_eq!(turns[0].source, Some(ContentSource::Fallback));
    assert!(turns[0].content.contains("Backend Engineer"));

    assert_eq!(
        turns[1].content,
        "How do you handle disagreements with your manager?"
    );
    assert_eq!(
        turns[1].source,
        Some(ContentSource::Ai {
            provider: "verbose".to_string()
        })
    );
}

// ============================================================================
// Pause and resume
// ============================================================================

/// A pause landing while the introduction generates defers the first
/// question; resuming asks it
#[tokio::test(start_paused = true)]
async fn test_pause_during_introduction_defers_first_question() {
    let h = harness_with(|_| {
        FakeProvider::with_responder("slow-intro", |messages| match step_of(messages) {
            Step::Intro => FakeReply::Delay(
                Duration::from_secs(5),
                "Hello! I'm your coach and we'll practice together today.".to_string(),
            ),
            _ => FakeReply::Text("Describe a time you changed your team's mind.".to_string()),
        })
    });
    let session = h.orchestrator.create_session(params(3)).await.unwrap();

    let (started, paused) = tokio::join!(h.orchestrator.start_conversation(&session.id), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.orchestrator.pause(&session.id).await
    });
    assert_eq!(paused.unwrap().status, SessionStatus::Paused);

    let turns = started.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].kind, TurnKind::Introduction);
    assert_eq!(
        h.orchestrator.state(&session.id).await.unwrap(),
        ConversationState::Paused {
            resume_to: ResumeTarget::Introducing
        }
    );
    let stored = h.orchestrator.session(&session.id).await.unwrap();
    assert_eq!(stored.current_question, 0);
    assert_eq!(stored.status, SessionStatus::Paused);
    assert!(matches!(
        h.orchestrator.process_response(&session.id, ANSWER, None).await,
        Err(coach_common::CoachError::SessionPaused(_))
    ));

    let turns = h.orchestrator.resume(&session.id).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].kind, TurnKind::Question);
    assert_eq!(turns[1].question_number, Some(1));
    assert_eq!(
        h.orchestrator.state(&session.id).await.unwrap(),
        ConversationState::AwaitingResponse
    );
    let stored = h.orchestrator.session(&session.id).await.unwrap();
    assert_eq!(stored.current_question, 1);
    assert_eq!(stored.status, SessionStatus::Active);

    let outcome = h
        .orchestrator
        .process_response(&session.id, ANSWER, None)
        .await
        .unwrap();
    assert_eq!(outcome.question_number, 1);
}

/// A pause landing while the first question generates keeps that question
/// and resumes straight to awaiting the answer
#[tokio::test(start_paused = true)]
async fn test_pause_during_first_question_resumes_to_answer() {
    let h = harness_with(|_| {
        FakeProvider::with_responder("slow-question", |messages| match step_of(messages) {
            Step::Question => FakeReply::Delay(
                Duration::from_secs(5),
                "Describe a time you changed your team's mind.".to_string(),
            ),
            _ => FakeReply::Text("Hello! I'm your coach and we'll practice together today.".to_string()),
        })
    });
    let session = h.orchestrator.create_session(params(3)).await.unwrap();

    let (started, paused) = tokio::join!(h.orchestrator.start_conversation(&session.id), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.orchestrator.pause(&session.id).await
    });
    paused.unwrap();

    let turns = started.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(
        h.orchestrator.state(&session.id).await.unwrap(),
        ConversationState::Paused {
            resume_to: ResumeTarget::AwaitingResponse
        }
    );
    let stored = h.orchestrator.session(&session.id).await.unwrap();
    assert_eq!(stored.current_question, 1);
    assert_eq!(stored.status, SessionStatus::Paused);

    let turns = h.orchestrator.resume(&session.id).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(
        h.orchestrator.state(&session.id).await.unwrap(),
        ConversationState::AwaitingResponse
    );
    assert!(h
        .orchestrator
        .process_response(&session.id, ANSWER, None)
        .await
        .is_ok());
}

// ============================================================================
// Per-session bookkeeping
// ============================================================================

/// Completed and deleted sessions do not stay tracked
#[tokio::test]
async fn test_finished_sessions_release_state() {
    let h = harness();
    for _ in 0..5 {
        let session = h.orchestrator.create_session(params(1)).await.unwrap();
        h.orchestrator.start_conversation(&session.id).await.unwrap();
        let outcome = h
            .orchestrator
            .process_response(&session.id, ANSWER, None)
            .await
            .unwrap();
        assert!(outcome.completed);
    }
    assert_eq!(h.orchestrator.tracked_sessions(), 0);

    let live = h.orchestrator.create_session(params(3)).await.unwrap();
    let gone = h.orchestrator.create_session(params(3)).await.unwrap();
    h.orchestrator.start_conversation(&live.id).await.unwrap();
    h.orchestrator.start_conversation(&gone.id).await.unwrap();
    assert_eq!(h.orchestrator.tracked_sessions(), 2);

    assert!(h.storage.delete_session(&gone.id).await.unwrap());
    assert_eq!(h.orchestrator.prune().await.unwrap(), 1);
    assert_eq!(h.orchestrator.tracked_sessions(), 1);
    assert_eq!(h.orchestrator.prune().await.unwrap(), 0);

    let outcome = h
        .orchestrator
        .process_response(&live.id, ANSWER, None)
        .await
        .unwrap();
    assert_eq!(outcome.question_number, 1);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_events_emitted() {
    let h = harness();
    let mut events = h.notifier.subscribe();
    let session = h.orchestrator.create_session(params(1)).await.unwrap();
    h.orchestrator.start_conversation(&session.id).await.unwrap();
    h.orchestrator
        .process_response(&session.id, ANSWER, None)
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.session_id, session.id);
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            SessionEventKind::ConversationStarted,
            SessionEventKind::QuestionAsked,
            SessionEventKind::ResponseEvaluated,
            SessionEventKind::SessionCompleted,
        ]
    );
}
