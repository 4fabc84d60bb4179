//! Deterministic STAR scoring (no network)
//!
//! Every dimension starts at 3 and moves by one per rule:
//! - STAR signal phrase present for the dimension: +1, absent: -1
//! - answer shorter than `SHORT_ANSWER_WORDS`: -1 on all five dimensions
//! - answer at least `DETAILED_ANSWER_WORDS` long: overall flow +1
//! - quantified evidence (numbers, percentages, money): result +1
//! - three or more STAR signals: overall flow +1, one or none: -1
//!
//! Scores are clamped to 1..=5.

use coach_common::{word_count, ContentSource, StarAnalysis, StarDimension, StarScore};
use regex::Regex;
use std::sync::LazyLock;

pub const BASELINE_SCORE: i32 = 3;
pub const SHORT_ANSWER_WORDS: usize = 40;
pub const DETAILED_ANSWER_WORDS: usize = 120;

static SITUATION_SIGNALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(when i was|at my (previous|last|current) (job|role|company)|in my (previous|last|current) (job|role|position)|the situation|context|background|last year|a few years ago|during (a|the|my)|while working|we were facing|there was a)\b",
    )
    .expect("static pattern")
});

static TASK_SIGNALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(my (task|goal|role|responsibility|job) was|i was (responsible|asked|tasked|assigned)|i needed to|i had to|the goal was|the objective|our target|the challenge was|deadline)\b",
    )
    .expect("static pattern")
});

static ACTION_SIGNALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bi (decided|implemented|led|created|organized|designed|built|developed|analy[sz]ed|coordinated|proposed|introduced|negotiated|set up|started|reached out|wrote|automated|met with|took)\b",
    )
    .expect("static pattern")
});

static RESULT_SIGNALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(as a result|resulted in|the result|the outcome|in the end|ultimately|achieved|increased|reduced|improved|saved|delivered|grew|cut|launched|learned|which led to)\b",
    )
    .expect("static pattern")
});

static QUANTIFIED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?\s*(%|percent|x\b|k\b|times|hours|days|weeks|months|users|customers|people|members)|[$€£]\s*\d)")
        .expect("static pattern")
});

/// Lexical signals found in an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerSignals {
    pub word_count: usize,
    pub situation: bool,
    pub task: bool,
    pub action: bool,
    pub result: bool,
    pub quantified: bool,
}

impl AnswerSignals {
    pub fn detect(text: &str) -> Self {
        Self {
            word_count: word_count(text),
            situation: SITUATION_SIGNALS.is_match(text),
            task: TASK_SIGNALS.is_match(text),
            action: ACTION_SIGNALS.is_match(text),
            result: RESULT_SIGNALS.is_match(text),
            quantified: QUANTIFIED.is_match(text),
        }
    }

    fn star_signal_count(&self) -> usize {
        [self.situation, self.task, self.action, self.result]
            .iter()
            .filter(|s| **s)
            .count()
    }
}

/// Score an answer without any provider call
pub fn evaluate(text: &str) -> StarAnalysis {
    let signals = AnswerSignals::detect(text);
    let short = signals.word_count < SHORT_ANSWER_WORDS;
    let length_penalty = if short { -1 } else { 0 };
    let keyword = |present: bool| if present { 1 } else { -1 };

    let situation = BASELINE_SCORE + keyword(signals.situation) + length_penalty;
    let task = BASELINE_SCORE + keyword(signals.task) + length_penalty;
    let action = BASELINE_SCORE + keyword(signals.action) + length_penalty;
    let result = BASELINE_SCORE
        + keyword(signals.result)
        + if signals.quantified { 1 } else { 0 }
        + length_penalty;

    let mut flow = BASELINE_SCORE + length_penalty;
    if signals.word_count >= DETAILED_ANSWER_WORDS {
        flow += 1;
    }
    match signals.star_signal_count() {
        n if n >= 3 => flow += 1,
        n if n <= 1 => flow -= 1,
        _ => {}
    }

    StarAnalysis {
        situation: dimension(StarDimension::Situation, situation, &signals),
        task: dimension(StarDimension::Task, task, &signals),
        action: dimension(StarDimension::Action, action, &signals),
        result: dimension(StarDimension::Result, result, &signals),
        overall_flow: dimension(StarDimension::OverallFlow, flow, &signals),
        source: ContentSource::Fallback,
    }
}

fn clamp_score(raw: i32) -> u8 {
    raw.clamp(StarScore::MIN as i32, StarScore::MAX as i32) as u8
}

fn dimension(dim: StarDimension, raw: i32, signals: &AnswerSignals) -> StarScore {
    let score = clamp_score(raw);
    StarScore {
        score,
        feedback: feedback_for(dim, score),
        improvement_areas: if score < 4 {
            improvements_for(dim, signals)
        } else {
            Vec::new()
        },
    }
}

fn feedback_for(dim: StarDimension, score: u8) -> String {
    let quality = match score {
        5 => "is excellent",
        4 => "is clear and well developed",
        3 => "is present but could be sharper",
        2 => "is thin",
        _ => "is missing",
    };
    match dim {
        StarDimension::OverallFlow => format!("The structure of your answer {}.", quality),
        _ => format!("Your description of the {} {}.", dim.label().to_lowercase(), quality),
    }
}

fn improvements_for(dim: StarDimension, signals: &AnswerSignals) -> Vec<String> {
    let mut areas = Vec::new();
    match dim {
        StarDimension::Situation => {
            areas.push("Open with where and when this happened, and who was involved.".to_string());
        }
        StarDimension::Task => {
            areas.push("State your specific responsibility or goal in one sentence.".to_string());
        }
        StarDimension::Action => {
            areas.push("Describe the steps you personally took, using \"I\" rather than \"we\".".to_string());
        }
        StarDimension::Result => {
            areas.push("Close with the outcome and what changed because of your actions.".to_string());
            if !signals.quantified {
                areas.push("Quantify the impact with a number, percentage or time saved.".to_string());
            }
        }
        StarDimension::OverallFlow => {
            areas.push("Follow Situation, Task, Action, Result in that order.".to_string());
        }
    }
    if signals.word_count < SHORT_ANSWER_WORDS && dim == StarDimension::OverallFlow {
        areas.push(format!(
            "Expand your answer; aim for at least {} words.",
            SHORT_ANSWER_WORDS * 2
        ));
    }
    areas
}
