//! Deterministic coach content used when no provider answers
//!
//! Each AI-backed step has a template here so a full provider outage
//! degrades content quality without blocking the conversation.

use coach_common::{
    Difficulty, InterviewStage, ResponseRecord, Session, StarAnalysis, StarDimension,
};

/// A question drawn from the built-in bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankQuestion {
    pub text: String,
    pub category: &'static str,
    pub difficulty: Difficulty,
}

const OPENERS: &[&str] = &[
    "Tell me a little about yourself and what draws you to the {role} position.",
    "Walk me through the experience that best prepares you for the {role} role.",
];

const BEHAVIORAL: &[&str] = &[
    "Tell me about a time you had to handle a conflict within your team.",
    "Describe a situation where you had to meet a tight deadline.",
    "Give me an example of a time you made a mistake at work and how you handled it.",
    "Tell me about a time you went above and beyond for a customer or stakeholder.",
    "Describe a time you had to adapt to a significant change at work.",
    "Tell me about a goal you set for yourself and how you achieved it.",
];

const TECHNICAL: &[&str] = &[
    "Describe the most technically challenging problem you solved as a {role}.",
    "Tell me about a time you had to make a trade-off between quality and speed.",
    "Walk me through how you would debug a problem you had never seen before.",
    "Describe a time you improved a process or tool your team relied on.",
];

const MANAGERIAL: &[&str] = &[
    "Tell me about a time you led a team through a difficult project.",
    "Describe how you handled an underperforming team member.",
    "Give me an example of a decision you made with incomplete information.",
    "Tell me about a time you had to align stakeholders with competing priorities.",
];

const SCREENING: &[&str] = &[
    "Why are you interested in this {role} position?",
    "What are your greatest strengths and how have they helped you at work?",
    "Where do you see your career in the next few years?",
    "Tell me about a professional achievement you are proud of.",
];

const CLOSERS: &[&str] = &[
    "Why should we choose you for this {role} position?",
    "Is there anything about your experience we have not covered that you would like to share?",
];

fn render(template: &str, session: &Session) -> String {
    template.replace("{role}", session.job_position.trim())
}

pub fn intro(session: &Session) -> String {
    let industry = session
        .industry
        .as_deref()
        .map(|i| format!(" in {}", i))
        .unwrap_or_default();
    format!(
        "Welcome! I'm your interview coach, and today we'll practice a {} interview for the {} position{}. \
         I'll ask you {} questions. Try to answer using the STAR method: describe the Situation, \
         your Task, the Actions you took and the Result. Let's begin.",
        session.stage.label(),
        session.job_position.trim(),
        industry,
        session.total_questions,
    )
}

/// Question `number` (1-based) from the bank. Opens and closes with
/// general questions and cycles through the stage bank in between.
pub fn question(session: &Session, number: u32) -> BankQuestion {
    let n = number.max(1);
    let pick = |bank: &[&str], i: u32| render(bank[i as usize % bank.len()], session);

    if n == 1 {
        return BankQuestion {
            text: pick(OPENERS, 0),
            category: "introduction",
            difficulty: Difficulty::Easy,
        };
    }
    if n == session.total_questions && n > 2 {
        return BankQuestion {
            text: pick(CLOSERS, 0),
            category: "closing",
            difficulty: Difficulty::Medium,
        };
    }

    let (bank, category) = match session.stage {
        InterviewStage::HrScreening => (SCREENING, "screening"),
        InterviewStage::Behavioral | InterviewStage::Final => (BEHAVIORAL, "behavioral"),
        InterviewStage::Technical => (TECHNICAL, "technical"),
        InterviewStage::Managerial => (MANAGERIAL, "leadership"),
    };
    let difficulty = if n * 3 <= session.total_questions {
        Difficulty::Easy
    } else if n * 3 <= session.total_questions * 2 {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    };

    BankQuestion {
        text: pick(bank, n - 2),
        category,
        difficulty,
    }
}

pub fn feedback(analysis: &StarAnalysis) -> String {
    let overall = analysis.overall_score();
    let opening = if overall >= 4.0 {
        "That was a strong answer."
    } else if overall >= 3.0 {
        "That was a solid answer with room to grow."
    } else {
        "Thanks for your answer. Let's work on the structure."
    };

    let strongest = analysis.strongest();
    let weakest = analysis.weakest();
    let tip = analysis
        .dimension(weakest)
        .improvement_areas
        .first()
        .cloned()
        .unwrap_or_else(|| format!("Give more detail on the {}.", weakest.label().to_lowercase()));

    format!(
        "{} Your {} was the clearest part ({}/5). To improve, focus on the {} ({}/5): {}",
        opening,
        strongest.label().to_lowercase(),
        analysis.dimension(strongest).score,
        weakest.label().to_lowercase(),
        analysis.dimension(weakest).score,
        tip,
    )
}

pub fn summary(session: &Session, responses: &[ResponseRecord]) -> String {
    if responses.is_empty() {
        return format!(
            "That concludes our {} practice session for the {} position. Thank you for your time.",
            session.stage.label(),
            session.job_position.trim(),
        );
    }

    let average = responses
        .iter()
        .map(|r| r.analysis.overall_score())
        .sum::<f64>()
        / responses.len() as f64;

    let dimension_mean = |dim: StarDimension| {
        responses
            .iter()
            .map(|r| r.analysis.dimension(dim).score as f64)
            .sum::<f64>()
            / responses.len() as f64
    };
    let star = &StarDimension::ALL[..4];
    let mut best = star[0];
    let mut worst = star[0];
    for dim in star.iter().copied() {
        if dimension_mean(dim) > dimension_mean(best) {
            best = dim;
        }
        if dimension_mean(dim) < dimension_mean(worst) {
            worst = dim;
        }
    }

    format!(
        "That concludes our session. You answered {} questions with an average STAR score of {:.1}/5. \
         Your strongest area was {}, and the area to practice next is {}. \
         Keep rehearsing with concrete examples and measurable results. Good luck with your {} interview!",
        responses.len(),
        average,
        best.label().to_lowercase(),
        worst.label().to_lowercase(),
        session.job_position.trim(),
    )
}
