//! Score evaluation: a judged verdict combined with deterministic rules.
//!
//! Local rules can only turn a pass into a failure. The judge never
//! overrides them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::EvaluationError;
use crate::generator::{Generator, JudgeRequest};
use crate::instruments;
use crate::score::Part;

pub const DEFAULT_MIN_NOTES: usize = 8;

/// Phrases that fail a verdict wherever they appear in feedback.
pub const CRITICAL_PHRASES: &[&str] = &[
    "缺乏明確的主題",
    "和聲單調",
    "無動態",
    "無表情變化",
    "缺乏旋律性",
    "過於單調",
    "缺乏和聲變化",
    "lack of thematic development",
    "lacks a clear theme",
    "monotonous harmony",
    "no dynamics",
    "no expressive variation",
    "lack of melodic character",
    "excessive repetition",
    "lack of harmonic variation",
];

/// What the judge is asked to assess.
pub const JUDGED_CRITERIA: &[&str] = &[
    "Thematic development: each part states and develops a recognisable theme",
    "Harmonic variety: the harmony moves, using modulation or borrowed chords where fitting",
    "Dynamic and expressive variation: dynamics and articulation change across the piece",
];

/// Critique aimed at one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub target: String,
    pub message: String,
}

impl FeedbackItem {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FeedbackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.target, self.message)
    }
}

/// Outcome of one evaluation round. Replaced, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    passed: bool,
    feedback: Vec<FeedbackItem>,
}

impl EvaluationResult {
    pub fn new(passed: bool, feedback: Vec<FeedbackItem>) -> Self {
        Self { passed, feedback }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn feedback(&self) -> &[FeedbackItem] {
        &self.feedback
    }
}

/// The judge's answer after contract checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub passed: bool,
    pub feedback: Vec<FeedbackItem>,
}

#[derive(Deserialize)]
struct RawVerdict {
    passed: bool,
    #[serde(default)]
    feedback: Vec<FeedbackItem>,
}

impl JudgeVerdict {
    /// Parse a judge reply. Every target must name an instrument in
    /// `allowed`; targets are folded to canonical instrument ids.
    pub fn parse(value: Value, allowed: &[String]) -> Result<Self, EvaluationError> {
        let raw: RawVerdict =
            serde_json::from_value(value).map_err(|e| EvaluationError::MalformedVerdict {
                detail: e.to_string(),
            })?;

        let mut feedback = Vec::with_capacity(raw.feedback.len());
        for item in raw.feedback {
            let target = instruments::canonical_id(&item.target);
            if !allowed.iter().any(|a| *a == target) {
                return Err(EvaluationError::UnknownTarget {
                    target: item.target,
                    allowed: allowed.to_vec(),
                });
            }
            feedback.push(FeedbackItem::new(target, item.message));
        }

        Ok(Self {
            passed: raw.passed,
            feedback,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub min_notes: usize,
    pub critical_phrases: Vec<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_notes: DEFAULT_MIN_NOTES,
            critical_phrases: CRITICAL_PHRASES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EvaluatorConfig {
    /// Built-in phrases plus `extra`; the built-in set is never replaced.
    pub fn with_extra_phrases(mut self, extra: &[String]) -> Self {
        for phrase in extra {
            let phrase = phrase.trim();
            if !phrase.is_empty() && !self.critical_phrases.iter().any(|p| p == phrase) {
                self.critical_phrases.push(phrase.to_string());
            }
        }
        self
    }
}

pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Ask the judge about the whole score, then apply the local rules.
    pub async fn evaluate(
        &self,
        generator: &dyn Generator,
        parts: &BTreeMap<String, Part>,
        instruments: &[String],
    ) -> Result<EvaluationResult, EvaluationError> {
        let score = score_as_data(parts);
        let request = JudgeRequest {
            criteria: JUDGED_CRITERIA,
            score: &score,
            instruments,
        };
        let reply = generator
            .judge(&request)
            .await
            .map_err(EvaluationError::Judge)?;
        let verdict = JudgeVerdict::parse(reply, instruments)?;
        debug!(
            judged_passed = verdict.passed,
            items = verdict.feedback.len(),
            "judge verdict received"
        );

        let result = self.combine(verdict, parts);
        info!(
            passed = result.passed(),
            feedback = result.feedback().len(),
            "evaluation complete"
        );
        Ok(result)
    }

    /// Merge a verdict with the note-count rule and keyword escalation.
    pub fn combine(&self, verdict: JudgeVerdict, parts: &BTreeMap<String, Part>) -> EvaluationResult {
        let mut passed = verdict.passed;
        let mut feedback = verdict.feedback;

        let short = self.note_count_feedback(parts);
        if !short.is_empty() {
            passed = false;
            feedback.extend(short);
        }

        if feedback.iter().any(|item| self.is_critical(&item.message)) {
            passed = false;
        }

        EvaluationResult::new(passed, feedback)
    }

    /// One item per part with fewer than `min_notes` notes.
    pub fn note_count_feedback(&self, parts: &BTreeMap<String, Part>) -> Vec<FeedbackItem> {
        parts
            .values()
            .filter(|part| part.note_count() < self.config.min_notes)
            .map(|part| {
                let name = instruments::lookup(part.instrument())
                    .map(|p| p.display_name)
                    .unwrap_or(part.instrument());
                FeedbackItem::new(
                    part.instrument(),
                    format!(
                        "{} part has only {} notes; extend it to at least {} notes.",
                        name,
                        part.note_count(),
                        self.config.min_notes
                    ),
                )
            })
            .collect()
    }

    pub fn is_critical(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.config
            .critical_phrases
            .iter()
            .any(|phrase| message.contains(&phrase.to_lowercase()))
    }
}

/// Every part in the draft format, keyed by instrument.
pub fn score_as_data(parts: &BTreeMap<String, Part>) -> Value {
    let map: Map<String, Value> = parts
        .iter()
        .map(|(instrument, part)| (instrument.clone(), part.to_draft()))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::scripted::ScriptedGenerator;
    use crate::score::test_support::valid_draft;
    use serde_json::json;

    fn part(instrument: &str, notes: usize) -> Part {
        Part::from_draft(
            &valid_draft(instrument, notes),
            instruments::lookup(instrument).unwrap(),
        )
        .unwrap()
    }

    fn score(entries: &[(&str, usize)]) -> BTreeMap<String, Part> {
        entries
            .iter()
            .map(|(name, notes)| (name.to_string(), part(name, *notes)))
            .collect()
    }

    fn roster(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(EvaluatorConfig::default())
    }

    #[tokio::test]
    async fn test_short_part_fails_even_when_judge_passes() {
        let parts = score(&[("violin", 10), ("cello", 5)]);
        let generator = ScriptedGenerator::default().with_judge(json!({"passed": true, "feedback": []}));
        let result = evaluator()
            .evaluate(&generator, &parts, &roster(&["violin", "cello"]))
            .await
            .unwrap();

        assert!(!result.passed());
        assert_eq!(result.feedback().len(), 1);
        let item = &result.feedback()[0];
        assert_eq!(item.target, "cello");
        assert_eq!(item.message, "Cello part has only 5 notes; extend it to at least 8 notes.");
    }

    #[tokio::test]
    async fn test_judged_pass_with_long_parts_passes() {
        let parts = score(&[("violin", 8), ("cello", 12)]);
        let generator = ScriptedGenerator::default().with_judge(json!({"passed": true}));
        let result = evaluator()
            .evaluate(&generator, &parts, &roster(&["violin", "cello"]))
            .await
            .unwrap();
        assert!(result.passed());
        assert!(result.feedback().is_empty());
    }

    #[tokio::test]
    async fn test_critical_phrase_overrides_judged_pass() {
        let parts = score(&[("violin", 10)]);
        let generator = ScriptedGenerator::default().with_judge(json!({
            "passed": true,
            "feedback": [{"target": "violin", "message": "旋律缺乏明確的主題"}]
        }));
        let result = evaluator()
            .evaluate(&generator, &parts, &roster(&["violin"]))
            .await
            .unwrap();
        assert!(!result.passed());
        assert_eq!(result.feedback().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let parts = score(&[("violin", 10)]);
        let generator = ScriptedGenerator::default().with_judge(json!({
            "passed": false,
            "feedback": [{"target": "tuba", "message": "too quiet"}]
        }));
        let err = evaluator()
            .evaluate(&generator, &parts, &roster(&["violin"]))
            .await
            .unwrap_err();
        match err {
            EvaluationError::UnknownTarget { target, allowed } => {
                assert_eq!(target, "tuba");
                assert_eq!(allowed, vec!["violin"]);
            }
            other => panic!("expected UnknownTarget, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_judge_failure_is_an_evaluation_error() {
        let parts = score(&[("violin", 10)]);
        let generator = ScriptedGenerator::default();
        let err = evaluator()
            .evaluate(&generator, &parts, &roster(&["violin"]))
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Judge(_)));
    }

    #[test]
    fn test_verdict_targets_are_canonicalised() {
        let verdict = JudgeVerdict::parse(
            json!({"passed": false, "feedback": [{"target": "Double_Bass", "message": "x"}]}),
            &roster(&["double bass"]),
        )
        .unwrap();
        assert_eq!(verdict.feedback[0].target, "double bass");
    }

    #[test]
    fn test_verdict_without_passed_is_malformed() {
        let err = JudgeVerdict::parse(json!({"feedback": []}), &roster(&["violin"])).unwrap_err();
        assert!(matches!(err, EvaluationError::MalformedVerdict { .. }));
    }

    #[test]
    fn test_phrase_matching_is_case_insensitive_and_extensible() {
        let evaluator = Evaluator::new(
            EvaluatorConfig::default().with_extra_phrases(&["Too Static".to_string()]),
        );
        assert!(evaluator.is_critical("The bridge shows MONOTONOUS HARMONY"));
        assert!(evaluator.is_critical("this passage is too static"));
        assert!(!evaluator.is_critical("lovely phrasing"));
        assert!(evaluator.config().critical_phrases.len() > CRITICAL_PHRASES.len());
    }

    #[test]
    fn test_local_rule_never_loosened_by_judge() {
        let parts = score(&[("cello", 3)]);
        let verdict = JudgeVerdict {
            passed: true,
            feedback: vec![],
        };
        let result = evaluator().combine(verdict, &parts);
        assert!(!result.passed());
        assert_eq!(result.feedback()[0].target, "cello");
    }
}
