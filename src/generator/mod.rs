//! The generator seam.
//!
//! Every creative decision in a run (structure, plans, notes, critique) comes
//! from a [`Generator`]. The pipeline only ever sees untrusted JSON values
//! back and is responsible for parsing and validating them.

pub mod command;
pub mod prompts;
#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::ValidationError;
use crate::instruments::InstrumentProfile;
use crate::plan::{CompositionPlan, GlobalParameters, PartInstruction, StructurePlan};
use crate::theory::{FormOption, HarmonicOption, StyleGuide};

pub use command::{CommandGenerator, GeneratorSettings};

/// An unvalidated part as returned by the generator.
pub type Draft = Value;

pub struct StructureRequest<'a> {
    pub params: &'a GlobalParameters,
    pub style: &'a StyleGuide,
    pub harmonic_options: &'a [HarmonicOption],
    pub form_options: &'a [FormOption],
}

pub struct PlanRequest<'a> {
    pub params: &'a GlobalParameters,
    pub structure: &'a StructurePlan,
}

pub struct InstructionRequest<'a> {
    pub params: &'a GlobalParameters,
    pub profile: &'a InstrumentProfile,
    pub role: &'a str,
    pub structure: &'a StructurePlan,
    pub plan: &'a CompositionPlan,
}

pub struct ComposeRequest<'a> {
    pub params: &'a GlobalParameters,
    pub profile: &'a InstrumentProfile,
    pub role: &'a str,
    pub structure: &'a StructurePlan,
    pub instruction: &'a PartInstruction,
}

pub struct RepairRequest<'a> {
    pub profile: &'a InstrumentProfile,
    pub defect: &'a DraftDefect,
    pub draft: &'a Draft,
}

pub struct ReviseRequest<'a> {
    pub params: &'a GlobalParameters,
    pub profile: &'a InstrumentProfile,
    pub current: &'a Draft,
    pub feedback: &'a str,
}

pub struct JudgeRequest<'a> {
    pub criteria: &'a [&'a str],
    pub score: &'a Value,
    pub instruments: &'a [String],
}

/// Structured description of why a draft was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftDefect {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending_value: Option<String>,
}

impl DraftDefect {
    /// The generator itself failed to answer.
    pub fn transport(err: &anyhow::Error) -> Self {
        Self {
            kind: "generator_error".to_string(),
            message: format!("{:#}", err),
            note_index: None,
            offending_value: None,
        }
    }
}

impl From<&ValidationError> for DraftDefect {
    fn from(err: &ValidationError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            note_index: err.note_index(),
            offending_value: err.offending_value(),
        }
    }
}

impl fmt::Display for DraftDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Source of every creative decision.
///
/// Real implementation: [`CommandGenerator`] (LLM CLI subprocess).
/// Test double: `scripted::ScriptedGenerator`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Overall form, themes, progression and roles for the piece.
    async fn design_structure(&self, request: &StructureRequest<'_>) -> Result<Value>;

    /// Narrative plan derived from the structure.
    async fn plan_composition(&self, request: &PlanRequest<'_>) -> Result<Value>;

    /// Performance brief for one instrument.
    async fn write_instruction(&self, request: &InstructionRequest<'_>) -> Result<Value>;

    /// First draft of one instrument's part.
    async fn compose(&self, request: &ComposeRequest<'_>) -> Result<Draft>;

    /// Complete replacement for a draft that failed validation.
    async fn repair(&self, request: &RepairRequest<'_>) -> Result<Draft>;

    /// Rewrite of a valid part in response to critique.
    async fn revise(&self, request: &ReviseRequest<'_>) -> Result<Draft>;

    /// Verdict over the whole score: `{"passed": bool, "feedback": [{"target", "message"}]}`.
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_from_validation_error_keeps_location() {
        let err = ValidationError::UnknownTechnique {
            index: 5,
            technique: "col legno".into(),
            allowed: "arco, pizz".into(),
        };
        let defect = DraftDefect::from(&err);
        assert_eq!(defect.kind, "unknown_technique");
        assert_eq!(defect.note_index, Some(5));
        assert_eq!(defect.offending_value.as_deref(), Some("col legno"));
        assert!(defect.to_string().starts_with("unknown_technique: "));
    }

    #[test]
    fn test_transport_defect_omits_location_when_serialized() {
        let defect = DraftDefect::transport(&anyhow::anyhow!("timed out"));
        let json = serde_json::to_value(&defect).unwrap();
        assert_eq!(json["kind"], "generator_error");
        assert!(json.get("note_index").is_none());
    }
}
