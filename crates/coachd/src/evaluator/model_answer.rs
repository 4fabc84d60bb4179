//! Templated model answers
//!
//! Used when no provider can write one. The template is picked from
//! keywords in the question, then framed by stage and job position.

use super::RubricContext;
use coach_common::InterviewStage;

/// Question theme detected from keywords, checked in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerTheme {
    Conflict,
    Leadership,
    Failure,
    Deadline,
    Customer,
    Teamwork,
    General,
}

const THEME_KEYWORDS: &[(AnswerTheme, &[&str])] = &[
    (AnswerTheme::Conflict, &["conflict", "disagree", "disagreement", "difficult colleague", "difficult coworker"]),
    (AnswerTheme::Leadership, &["lead", "leader", "led", "mentor", "manage", "initiative"]),
    (AnswerTheme::Failure, &["fail", "failure", "mistake", "wrong", "setback"]),
    (AnswerTheme::Deadline, &["deadline", "pressure", "tight", "prioriti", "time management"]),
    (AnswerTheme::Customer, &["customer", "client", "stakeholder", "user complaint"]),
    (AnswerTheme::Teamwork, &["team", "collaborat", "cross-functional", "together"]),
];

impl AnswerTheme {
    pub fn detect(question: &str) -> Self {
        let lower = question.to_lowercase();
        THEME_KEYWORDS
            .iter()
            .find(|(_, words)| {
                words.iter().any(|w| {
                    lower
                        .split(|c: char| !c.is_alphanumeric() && c != '-')
                        .any(|token| token.starts_with(w))
                        || (w.contains(' ') && lower.contains(w))
                })
            })
            .map(|(theme, _)| *theme)
            .unwrap_or(AnswerTheme::General)
    }
}

pub fn template_answer(ctx: &RubricContext) -> String {
    let role = if ctx.job_position.trim().is_empty() {
        "my role".to_string()
    } else {
        format!("my role as {}", ctx.job_position.trim())
    };

    let (situation, task, action, result) = match AnswerTheme::detect(&ctx.question) {
        AnswerTheme::Conflict => (
            "two senior colleagues disagreed on how to approach a release, and the tension was slowing the whole team down",
            "to get the work moving again without taking sides",
            "I met each of them separately to understand their concerns, then ran a short session where we compared both options against the goals we all shared",
            "we agreed on a combined approach within a week, shipped on schedule, and the two of them continued to work well together afterwards",
        ),
        AnswerTheme::Leadership => (
            "our team had lost its lead in the middle of an important project",
            "to keep five people aligned and deliver the project on time",
            "I set up a weekly planning meeting, split the work into clear owners, and checked in one to one with anyone who was blocked",
            "we delivered two days early, and two teammates later told me the structure helped them grow",
        ),
        AnswerTheme::Failure => (
            "I underestimated the effort for a migration I had volunteered to own",
            "to recover the schedule and make sure it did not happen again",
            "I told my manager early, re-planned the remaining work with the team, and wrote down what I had missed in my estimate",
            "we finished one week late instead of four, and I now build a review step into every estimate I give",
        ),
        AnswerTheme::Deadline => (
            "a key client moved a launch forward by three weeks",
            "to deliver the essential scope in the shorter time",
            "I listed every remaining item, agreed with the client which ones were essential, and cleared my calendar of anything that could wait",
            "we launched on the new date with all essential features and added the rest in the following sprint",
        ),
        AnswerTheme::Customer => (
            "an important customer was unhappy after repeated problems with our service",
            "to rebuild their trust and keep the account",
            "I called them directly, listened to the full list of issues, and sent a weekly written update until each one was resolved",
            "they renewed their contract and later referred another customer to us",
        ),
        AnswerTheme::Teamwork => (
            "my team had to work with another department that had very different priorities",
            "to deliver a shared project that depended on both groups",
            "I proposed a shared board and a short weekly sync, and I made sure each side understood the other's constraints",
            "the project shipped on time and the joint process was adopted for later work",
        ),
        AnswerTheme::General => (
            "we faced a challenge that directly affected our main goals",
            "to find a practical solution and see it through",
            "I analysed the problem, discussed options with the people involved, and took ownership of the plan we chose",
            "the situation improved measurably and I learned a lot about handling similar problems",
        ),
    };

    let closing = match ctx.stage {
        InterviewStage::HrScreening => "This is the kind of approach I would bring to this position.",
        InterviewStage::Behavioral => "It taught me to act early and communicate clearly.",
        InterviewStage::Technical => "It also showed me how much good technical decisions depend on clear communication.",
        InterviewStage::Managerial => "As a manager I try to create that same clarity for the people I work with.",
        InterviewStage::Final => "That experience is a big part of why I am confident I can add value here.",
    };

    format!(
        "In {}, {}. My responsibility was {}. {}. As a result, {}. {}",
        role, situation, task, action, result, closing
    )
}
