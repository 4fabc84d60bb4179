//! Strict parsing of AI rubric output
//!
//! Parse then validate: the model text is first reduced to its outermost
//! JSON object (prose and code fences around it are ignored), deserialized
//! into loose wire structs, then checked into a `StarAnalysis`. Any shape
//! problem is an `EvaluationParseError`; callers recover with the heuristic.

use coach_common::{ContentSource, StarAnalysis, StarDimension, StarScore};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationParseError {
    #[error("no JSON object in model output")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing dimension: {0}")]
    MissingDimension(&'static str),

    #[error("{dimension} score {value} outside 1..=5")]
    ScoreOutOfRange { dimension: &'static str, value: f64 },

    #[error("empty feedback for {0}")]
    EmptyFeedback(&'static str),
}

#[derive(Debug, Deserialize)]
struct WireScore {
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default, alias = "improvementAreas", alias = "improvements")]
    improvement_areas: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    situation: Option<WireScore>,
    task: Option<WireScore>,
    action: Option<WireScore>,
    result: Option<WireScore>,
    #[serde(alias = "overallFlow", alias = "flow")]
    overall_flow: Option<WireScore>,
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(alias = "starAnalysis", alias = "star_analysis")]
    analysis: WireAnalysis,
}

/// Slice from the first `{` to the last `}`
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse model output into a validated analysis attributed to `provider`
pub fn parse_analysis(text: &str, provider: &str) -> Result<StarAnalysis, EvaluationParseError> {
    let json = extract_json(text).ok_or(EvaluationParseError::NoJson)?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| EvaluationParseError::InvalidJson(e.to_string()))?;

    let wire = match serde_json::from_value::<WireEnvelope>(value.clone()) {
        Ok(envelope) => envelope.analysis,
        Err(_) => serde_json::from_value::<WireAnalysis>(value)
            .map_err(|e| EvaluationParseError::InvalidJson(e.to_string()))?,
    };

    Ok(StarAnalysis {
        situation: validate(StarDimension::Situation, wire.situation)?,
        task: validate(StarDimension::Task, wire.task)?,
        action: validate(StarDimension::Action, wire.action)?,
        result: validate(StarDimension::Result, wire.result)?,
        overall_flow: validate(StarDimension::OverallFlow, wire.overall_flow)?,
        source: ContentSource::Ai {
            provider: provider.to_string(),
        },
    })
}

fn validate(
    dim: StarDimension,
    wire: Option<WireScore>,
) -> Result<StarScore, EvaluationParseError> {
    let name = dim.label();
    let wire = wire.ok_or(EvaluationParseError::MissingDimension(name))?;

    let rounded = wire.score.round();
    if !wire.score.is_finite()
        || rounded < StarScore::MIN as f64
        || rounded > StarScore::MAX as f64
    {
        return Err(EvaluationParseError::ScoreOutOfRange {
            dimension: name,
            value: wire.score,
        });
    }

    let feedback = wire.feedback.trim();
    if feedback.is_empty() {
        return Err(EvaluationParseError::EmptyFeedback(name));
    }

    Ok(StarScore {
        score: rounded as u8,
        feedback: feedback.to_string(),
        improvement_areas: wire
            .improvement_areas
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "situation": {"score": 4, "feedback": "Clear context.", "improvementAreas": []},
        "task": {"score": 3, "feedback": "Goal is implied.", "improvementAreas": ["State the goal"]},
        "action": {"score": 5, "feedback": "Concrete steps."},
        "result": {"score": 2.6, "feedback": "Outcome vague.", "improvement_areas": ["Add numbers"]},
        "overallFlow": {"score": 4, "feedback": "Good order."}
    }"#;

    #[test]
    fn test_parse_valid() {
        let analysis = parse_analysis(VALID, "primary").unwrap();
        assert_eq!(analysis.situation.score, 4);
        assert_eq!(analysis.result.score, 3);
        assert_eq!(analysis.result.improvement_areas, vec!["Add numbers"]);
        assert_eq!(analysis.task.improvement_areas, vec!["State the goal"]);
        assert_eq!(
            analysis.source,
            ContentSource::Ai {
                provider: "primary".to_string()
            }
        );
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let text = format!("Here is the evaluation:\n```json\n{}\n```\nHope it helps!", VALID);
        assert!(parse_analysis(&text, "p").is_ok());
    }

    #[test]
    fn test_parse_nested_envelope() {
        let text = format!(r#"{{"starAnalysis": {}}}"#, VALID);
        let analysis = parse_analysis(&text, "p").unwrap();
        assert_eq!(analysis.action.score, 5);
    }

    #[test]
    fn test_no_json() {
        assert_eq!(
            parse_analysis("Great answer, 4/5 overall.", "p"),
            Err(EvaluationParseError::NoJson)
        );
        assert_eq!(parse_analysis("} backwards {", "p"), Err(EvaluationParseError::NoJson));
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_analysis("{situation: 4}", "p").unwrap_err();
        assert!(matches!(err, EvaluationParseError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_dimension() {
        let text = r#"{"situation": {"score": 4, "feedback": "ok"}}"#;
        assert_eq!(
            parse_analysis(text, "p"),
            Err(EvaluationParseError::MissingDimension("Task"))
        );
    }

    #[test]
    fn test_out_of_range() {
        let text = VALID.replace("\"score\": 5", "\"score\": 7");
        assert_eq!(
            parse_analysis(&text, "p"),
            Err(EvaluationParseError::ScoreOutOfRange {
                dimension: "Action",
                value: 7.0
            })
        );
        let text = VALID.replace("\"score\": 5", "\"score\": 0.2");
        assert!(parse_analysis(&text, "p").is_err());
    }

    #[test]
    fn test_empty_feedback() {
        let text = VALID.replace("Concrete steps.", "  ");
        assert_eq!(
            parse_analysis(&text, "p"),
            Err(EvaluationParseError::EmptyFeedback("Action"))
        );
    }
}
