//! Response Evaluator
//!
//! Turns a free-text answer into a five-dimension STAR analysis.
//!
//! Primary path: rubric prompt, gateway call, strict JSON parse.
//! Any gateway failure or parse error falls back to the deterministic
//! heuristic scorer, so `evaluate` always returns scores in 1..=5.
//! Model answers follow the same AI-first, template-second pattern.

pub mod heuristic;
pub mod model_answer;
pub mod parse;
pub mod prompts;

pub use heuristic::AnswerSignals;
pub use model_answer::{template_answer, AnswerTheme};
pub use parse::{extract_json, parse_analysis, EvaluationParseError};

use crate::gateway::{AiGateway, GenerateRequest};
use coach_common::{
    ContentSource, ExperienceLevel, InterviewStage, ModelAnswer, Session, SessionConfig,
    StarAnalysis,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the answer is judged against
#[derive(Debug, Clone, PartialEq)]
pub struct RubricContext {
    pub question: String,
    pub job_position: String,
    pub stage: InterviewStage,
    pub experience_level: ExperienceLevel,
    pub language: String,
}

impl RubricContext {
    pub fn for_session(session: &Session, question: &str) -> Self {
        Self {
            question: question.to_string(),
            job_position: session.job_position.clone(),
            stage: session.stage,
            experience_level: session.experience_level,
            language: session.language.clone(),
        }
    }
}

pub struct ResponseEvaluator {
    gateway: Arc<AiGateway>,
    config: SessionConfig,
}

impl ResponseEvaluator {
    pub fn new(gateway: Arc<AiGateway>, config: SessionConfig) -> Self {
        Self { gateway, config }
    }

    /// Score `answer`. Never fails: AI problems degrade to the heuristic.
    pub async fn evaluate(&self, answer: &str, ctx: &RubricContext) -> StarAnalysis {
        if answer.trim().is_empty() {
            debug!("empty answer, scoring heuristically");
            return heuristic::evaluate(answer);
        }

        let request = GenerateRequest::new(
            prompts::evaluation_messages(answer, ctx),
            self.config.evaluation_max_tokens,
            self.config.evaluation_temperature,
        )
        .domain("evaluation")
        .language(&ctx.language);

        match self.gateway.generate(request).await {
            Ok(generation) => match parse_analysis(&generation.content, &generation.provider_used) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(provider = %generation.provider_used, error = %e, "unparseable evaluation, using heuristic");
                    heuristic::evaluate(answer)
                }
            },
            Err(e) => {
                warn!(error = %e, "evaluation unavailable, using heuristic");
                heuristic::evaluate(answer)
            }
        }
    }

    /// Example answer for the question in `ctx`
    pub async fn model_answer(&self, ctx: &RubricContext) -> ModelAnswer {
        let request = GenerateRequest::new(
            prompts::model_answer_messages(ctx),
            self.config.max_tokens,
            self.config.temperature,
        )
        .domain("model_answer")
        .language(&ctx.language);

        match self.gateway.generate(request).await {
            Ok(generation) if !generation.content.trim().is_empty() => ModelAnswer {
                text: generation.content.trim().to_string(),
                source: ContentSource::Ai {
                    provider: generation.provider_used,
                },
            },
            Ok(_) => template(ctx),
            Err(e) => {
                warn!(error = %e, "model answer unavailable, using template");
                template(ctx)
            }
        }
    }
}

fn template(ctx: &RubricContext) -> ModelAnswer {
    ModelAnswer {
        text: template_answer(ctx),
        source: ContentSource::Fallback,
    }
}
