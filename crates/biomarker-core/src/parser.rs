//! Prediction parsing
//!
//! Reduces a free-text model answer to a [`SurvivalLabel`] through an ordered
//! cascade: fenced JSON block, `<answer>` tag or whole text, then a keyword
//! fallback. The structured path is the only source of `reasoning`.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::PredictionParseError;
use crate::patient::SurvivalLabel;

pub const NO_REASONING: &str = "No reasoning provided";

const POSITIVE_KEYWORDS: &[&str] = &["good", "positive", "respond", "success", "survival"];
const NEGATIVE_KEYWORDS: &[&str] = &["bad", "negative", "fail", "poor", "death"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrediction {
    pub label: SurvivalLabel,
    pub reasoning: String,
}

impl ParsedPrediction {
    fn new(label: SurvivalLabel, reasoning: Option<&str>) -> Self {
        let reasoning = reasoning
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(NO_REASONING);
        Self {
            label,
            reasoning: reasoning.to_string(),
        }
    }
}

pub struct PredictionParser {
    json_block: Regex,
    json_block_greedy: Regex,
    answer_tag: Regex,
}

impl PredictionParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            json_block: Regex::new(r"(?s)```json\s*(\{.*?\})\s*```")?,
            json_block_greedy: Regex::new(r"(?s)```json\s*(\{.*\})\s*```")?,
            answer_tag: Regex::new(r"(?s)<answer>(.*?)</answer>")?,
        })
    }

    /// Parse one model answer
    pub fn parse(&self, response: &str) -> Result<ParsedPrediction, PredictionParseError> {
        let text = response.trim();

        if let Some(prediction) = self.parse_json_block(text) {
            return Ok(prediction);
        }

        let answer = match self.answer_tag.captures(text) {
            Some(caps) => caps[1].trim().to_lowercase(),
            None => text.to_lowercase(),
        };

        if let Some(label) = survival_phrase(&answer).or_else(|| keyword_label(&answer)) {
            return Ok(ParsedPrediction::new(label, None));
        }

        Err(PredictionParseError::new(
            "no survival label in response",
            response,
        ))
    }

    /// Parse one answer covering several patients: a fenced JSON object keyed
    /// by patient id. Each value goes through the single-answer cascade.
    pub fn parse_batched(
        &self,
        response: &str,
    ) -> Result<BTreeMap<String, Result<ParsedPrediction, PredictionParseError>>, PredictionParseError>
    {
        let caps = self
            .json_block_greedy
            .captures(response)
            .ok_or_else(|| PredictionParseError::new("no JSON block in batched response", response))?;

        let object = match serde_json::from_str::<Value>(&caps[1]) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                return Err(PredictionParseError::new(
                    "batched JSON is not an object",
                    response,
                ))
            }
            Err(e) => {
                return Err(PredictionParseError::new(
                    format!("invalid batched JSON: {}", e),
                    response,
                ))
            }
        };

        Ok(object
            .into_iter()
            .map(|(patient, value)| {
                let text = match value {
                    Value::String(text) => text,
                    other => format!("```json\n{}\n```", other),
                };
                (patient, self.parse(&text))
            })
            .collect())
    }

    /// The `reasoning` field of the first fenced JSON block that carries one
    pub fn structured_reasoning(&self, text: &str) -> Option<String> {
        self.json_objects(text).find_map(|value| {
            value
                .get("reasoning")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    /// First fenced block naming a survival label. Echoed format templates
    /// are not valid JSON and are skipped.
    fn parse_json_block(&self, text: &str) -> Option<ParsedPrediction> {
        self.json_objects(text).find_map(|value| {
            let prediction = value.get("prediction")?.as_str()?.to_lowercase();
            let label = survival_phrase(&prediction)?;
            Some(ParsedPrediction::new(
                label,
                value.get("reasoning").and_then(Value::as_str),
            ))
        })
    }

    fn json_objects<'t>(&'t self, text: &'t str) -> impl Iterator<Item = Value> + 't {
        self.json_block
            .captures_iter(text)
            .filter_map(|caps| serde_json::from_str::<Value>(&caps[1]).ok())
    }
}

fn survival_phrase(text: &str) -> Option<SurvivalLabel> {
    if text.contains("long survival") || text.contains("good responder") {
        Some(SurvivalLabel::Long)
    } else if text.contains("short survival") || text.contains("bad responder") {
        Some(SurvivalLabel::Short)
    } else {
        None
    }
}

fn keyword_label(text: &str) -> Option<SurvivalLabel> {
    if POSITIVE_KEYWORDS.iter().any(|k| text.contains(k)) {
        Some(SurvivalLabel::Long)
    } else if NEGATIVE_KEYWORDS.iter().any(|k| text.contains(k)) {
        Some(SurvivalLabel::Short)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> PredictionParser {
        PredictionParser::new().unwrap()
    }

    #[test]
    fn test_structured_long_survival() {
        let parsed = parser()
            .parse("```json\n{\"prediction\": \"long survival\", \"reasoning\": \"x\"}\n```")
            .unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Long);
        assert_eq!(parsed.reasoning, "x");
    }

    #[test]
    fn test_structured_short_survival() {
        let parsed = parser()
            .parse("```json\n{\"prediction\": \"short survival\", \"reasoning\": \"y\"}\n```")
            .unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Short);
        assert_eq!(parsed.reasoning, "y");
    }

    #[test]
    fn test_keyword_fallback() {
        let parsed = parser()
            .parse("I think this is a good responder with positive signs")
            .unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Long);
        assert_eq!(parsed.reasoning, NO_REASONING);
    }

    #[test]
    fn test_unparseable_response() {
        let err = parser().parse("no useful signal here").unwrap_err();
        assert_eq!(err.raw_preview, "no useful signal here");
    }

    #[test]
    fn test_answer_tag() {
        let parsed = parser()
            .parse("Thinking about the long survival odds...\n<answer>Short survival</answer>")
            .unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Short);
    }

    #[test]
    fn test_negative_keywords() {
        let parsed = parser().parse("Outlook is poor.").unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Short);
    }

    #[test]
    fn test_structured_without_reasoning() {
        let parsed = parser()
            .parse("```json\n{\"prediction\": \"Long Survival\"}\n```")
            .unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Long);
        assert_eq!(parsed.reasoning, NO_REASONING);
    }

    #[test]
    fn test_invalid_structured_value_falls_through() {
        // The block names no label, so the whole text goes to the keyword pass
        let parsed = parser()
            .parse("```json\n{\"prediction\": \"unclear\", \"reasoning\": \"death risk\"}\n```")
            .unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Short);
        assert_eq!(parsed.reasoning, NO_REASONING);
    }

    #[test]
    fn test_echoed_template_before_answer() {
        let response = "Format:\n```json\n{\"prediction\": \"long survival\" or \"short survival\", \"reasoning\": \"...\"}\n```\n\
                        My answer:\n```json\n{\"prediction\": \"short survival\", \"reasoning\": \"z\"}\n```";
        let parsed = parser().parse(response).unwrap();
        assert_eq!(parsed.label, SurvivalLabel::Short);
        assert_eq!(parsed.reasoning, "z");
    }

    #[test]
    fn test_first_labelled_block_wins() {
        let response = "```json\n{\"note\": \"draft\"}\n```\n```json\n{\"prediction\": \"long survival\", \"reasoning\": \"a\"}\n```\n```json\n{\"prediction\": \"short survival\"}\n```";
        let parsed = parser().parse(response).unwrap();
        assert_eq!((parsed.label, parsed.reasoning.as_str()), (SurvivalLabel::Long, "a"));
        assert_eq!(parser().structured_reasoning(response), Some("a".to_string()));
    }

    #[test]
    fn test_parse_batched() {
        let response = "```json\n{\n  \"P1\": {\"prediction\": \"long survival\", \"reasoning\": \"a\"},\n  \"P2\": {\"prediction\": \"short survival\"},\n  \"P3\": {\"prediction\": \"??\"}\n}\n```";
        let parsed = parser().parse_batched(response).unwrap();

        let p1 = parsed["P1"].as_ref().unwrap();
        assert_eq!((p1.label, p1.reasoning.as_str()), (SurvivalLabel::Long, "a"));
        // Reasoning never leaks from a previous patient
        assert_eq!(parsed["P2"].as_ref().unwrap().reasoning, NO_REASONING);
        assert!(parsed["P3"].is_err());
    }

    #[test]
    fn test_parse_batched_without_block() {
        assert!(parser().parse_batched("P1: long survival").is_err());
    }

    #[test]
    fn test_structured_reasoning() {
        let p = parser();
        assert_eq!(
            p.structured_reasoning("```json\n{\"reasoning\": \"cohort is mixed\"}\n```"),
            Some("cohort is mixed".to_string())
        );
        assert_eq!(p.structured_reasoning("plain summary"), None);
    }

    #[test]
    fn test_raw_preview_is_truncated() {
        let long = "x".repeat(500);
        let err = parser().parse(&long).unwrap_err();
        assert_eq!(err.raw_preview.chars().count(), 203);
    }
}
