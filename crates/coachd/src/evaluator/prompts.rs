//! Rubric and model-answer prompts

use super::RubricContext;
use coach_common::ChatMessage;

const RUBRIC_SYSTEM: &str = "You are an experienced interview coach scoring answers with the STAR method. \
Score each dimension from 1 (missing) to 5 (excellent):
- situation: is the context specific (where, when, who)?
- task: is the candidate's own responsibility or goal clear?
- action: are the concrete steps the candidate personally took described?
- result: is the outcome stated, ideally with measurable impact?
- overallFlow: is the answer coherent, concise and in STAR order?

Reply with ONLY a JSON object, no prose, in exactly this shape:
{\"situation\": {\"score\": 1-5, \"feedback\": \"...\", \"improvementAreas\": [\"...\"]},
 \"task\": {...}, \"action\": {...}, \"result\": {...}, \"overallFlow\": {...}}";

pub fn evaluation_messages(answer: &str, ctx: &RubricContext) -> Vec<ChatMessage> {
    let user = format!(
        "Role: {} ({} candidate)\nInterview stage: {}\nQuestion: {}\n\nCandidate answer:\n\"\"\"\n{}\n\"\"\"\n\n\
         Write the feedback in language code \"{}\".",
        ctx.job_position,
        ctx.experience_level.label(),
        ctx.stage.label(),
        ctx.question,
        answer.trim(),
        ctx.language,
    );
    vec![ChatMessage::system(RUBRIC_SYSTEM), ChatMessage::user(user)]
}

pub fn model_answer_messages(ctx: &RubricContext) -> Vec<ChatMessage> {
    let system = "You are an interview coach. Write a strong example answer a candidate could give, \
                  following the STAR method in four short paragraphs. Use first person. \
                  Do not add headings, notes or explanations.";
    let user = format!(
        "Role: {} ({} candidate)\nInterview stage: {}\nQuestion: {}\nLanguage code: {}",
        ctx.job_position,
        ctx.experience_level.label(),
        ctx.stage.label(),
        ctx.question,
        ctx.language,
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
