//! Coach prompts for intros, questions, feedback and summaries

use coach_common::{ChatMessage, Session, SessionView, StarAnalysis};

fn coach_persona(session: &Session) -> String {
    let industry = session
        .industry
        .as_deref()
        .map(|i| format!(" in the {} industry", i))
        .unwrap_or_default();
    format!(
        "You are a friendly, professional interview coach running a {} interview practice for a {} {} candidate{}. \
         Speak directly to the candidate. Reply in language code \"{}\". \
         Output only the words you would say, with no headings, notes, placeholders or reasoning.",
        session.stage.label(),
        session.experience_level.label(),
        session.job_position.trim(),
        industry,
        session.language,
    )
}

pub fn intro_messages(session: &Session) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(coach_persona(session)),
        ChatMessage::user(format!(
            "Greet the candidate in two or three sentences, explain that you will ask {} questions \
             and suggest answering with the STAR method. Do not ask the first question yet.",
            session.total_questions
        )),
    ]
}

/// Prompt for question `number`, listing earlier questions so none repeat
pub fn question_messages(view: &SessionView, number: u32) -> Vec<ChatMessage> {
    let session = &view.session;
    let asked: Vec<String> = view
        .questions
        .iter()
        .filter(|q| q.question.sequence < number)
        .map(|q| format!("{}. {}", q.question.sequence, q.question.text))
        .collect();

    let history = if asked.is_empty() {
        "No questions have been asked yet.".to_string()
    } else {
        format!("Already asked:\n{}", asked.join("\n"))
    };

    let last_score = view
        .responses()
        .last()
        .map(|r| {
            format!(
                "\nThe previous answer scored {:.1}/5; its weakest part was the {}.",
                r.analysis.overall_score(),
                r.analysis.weakest().label().to_lowercase()
            )
        })
        .unwrap_or_default();

    vec![
        ChatMessage::system(coach_persona(session)),
        ChatMessage::user(format!(
            "{}{}\n\nAsk question {} of {}. Ask exactly one new question, in one or two sentences.",
            history, last_score, number, session.total_questions
        )),
    ]
}

pub fn feedback_messages(
    session: &Session,
    question: &str,
    answer: &str,
    analysis: &StarAnalysis,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(coach_persona(session)),
        ChatMessage::user(format!(
            "Question: {}\nCandidate answer: {}\n\nSTAR scores: situation {}, task {}, action {}, result {}, flow {}.\n\
             Give two or three sentences of encouraging, specific feedback: one strength and one concrete improvement.",
            question,
            answer.trim(),
            analysis.situation.score,
            analysis.task.score,
            analysis.action.score,
            analysis.result.score,
            analysis.overall_flow.score,
        )),
    ]
}

pub fn summary_messages(view: &SessionView) -> Vec<ChatMessage> {
    let lines: Vec<String> = view
        .questions
        .iter()
        .filter_map(|q| {
            q.response.as_ref().map(|r| {
                format!(
                    "{}. {} -> overall {:.1}/5",
                    q.question.sequence,
                    q.question.text,
                    r.analysis.overall_score()
                )
            })
        })
        .collect();

    vec![
        ChatMessage::system(coach_persona(&view.session)),
        ChatMessage::user(format!(
            "The practice interview is over. Results:\n{}\n\n\
             Close the session in three or four sentences: overall impression, the main strength, \
             the one area to practice next, and a short encouragement.",
            lines.join("\n")
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coach_common::{Difficulty, NewSession, Question, QuestionView};

    #[test]
    fn test_question_prompt_lists_history() {
        let session = Session::new(
            NewSession {
                job_position: "Designer".to_string(),
                language: "fr".to_string(),
                ..Default::default()
            },
            4,
            Utc::now(),
        );
        let question = |n: u32, text: &str| QuestionView {
            question: Question {
                id: format!("q{}", n),
                session_id: session.id.clone(),
                sequence: n,
                text: text.to_string(),
                translated_text: None,
                category: "behavioral".to_string(),
                difficulty: Difficulty::Medium,
                created_at: Utc::now(),
            },
            response: None,
        };
        let view = SessionView {
            session: session.clone(),
            questions: vec![question(1, "Who are you?"), question(2, "Why design?")],
        };

        let messages = question_messages(&view, 3);
        assert!(messages[0].content.contains("\"fr\""));
        assert!(messages[1].content.contains("1. Who are you?\n2. Why design?"));
        assert!(messages[1].content.contains("question 3 of 4"));
    }
}
