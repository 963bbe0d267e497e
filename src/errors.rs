//! Typed error hierarchy for the composition pipeline.
//!
//! Recoverable and fatal failures live in separate enums:
//! - `ValidationError`: a draft broke a part constraint; handled by the repair loop
//! - `RealizationError`: repair attempts ran out for one instrument
//! - `InstrumentError`: any per-instrument failure recorded during fan-out
//! - `ConfigurationError`: the run cannot start
//! - `PersistenceError`: checkpoint I/O failed
//! - `EvaluationError`: the evaluator broke its output contract
//! - `RenderError`: artifact export failed; reported, never fatal
//! - `PipelineError`: top-level failure of a run

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

/// A draft failed to become a valid part.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("part has no notes")]
    EmptyPart,

    #[error("note {index}: duration {duration} is not a positive number of quarter notes")]
    NonPositiveDuration { index: usize, duration: f64 },

    #[error("note {index}: pitch {pitch} is outside the range {low}..{high}")]
    PitchOutOfRange {
        index: usize,
        pitch: String,
        low: String,
        high: String,
    },

    #[error("note {index}: technique '{technique}' is not one of [{allowed}]")]
    UnknownTechnique {
        index: usize,
        technique: String,
        allowed: String,
    },

    #[error("note {index}: '{value}' is not a pitch name")]
    InvalidPitch { index: usize, value: String },

    #[error("malformed draft: {detail}")]
    MalformedDraft { detail: String },
}

impl ValidationError {
    /// Stable label used in repair requests and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyPart => "empty_part",
            ValidationError::NonPositiveDuration { .. } => "non_positive_duration",
            ValidationError::PitchOutOfRange { .. } => "pitch_out_of_range",
            ValidationError::UnknownTechnique { .. } => "unknown_technique",
            ValidationError::InvalidPitch { .. } => "invalid_pitch",
            ValidationError::MalformedDraft { .. } => "malformed_draft",
        }
    }

    /// Index of the offending note, when the failure is tied to one.
    pub fn note_index(&self) -> Option<usize> {
        match self {
            ValidationError::NonPositiveDuration { index, .. }
            | ValidationError::PitchOutOfRange { index, .. }
            | ValidationError::UnknownTechnique { index, .. }
            | ValidationError::InvalidPitch { index, .. } => Some(*index),
            ValidationError::EmptyPart | ValidationError::MalformedDraft { .. } => None,
        }
    }

    /// The value that broke the constraint, rendered for a prompt.
    pub fn offending_value(&self) -> Option<String> {
        match self {
            ValidationError::NonPositiveDuration { duration, .. } => Some(duration.to_string()),
            ValidationError::PitchOutOfRange { pitch, .. } => Some(pitch.clone()),
            ValidationError::UnknownTechnique { technique, .. } => Some(technique.clone()),
            ValidationError::InvalidPitch { value, .. } => Some(value.clone()),
            ValidationError::EmptyPart | ValidationError::MalformedDraft { .. } => None,
        }
    }
}

/// Repair attempts were exhausted without producing a valid part.
#[derive(Debug, Error)]
#[error("{instrument}: no valid part after {attempts} attempt(s); last error: {reason}")]
pub struct RealizationError {
    pub instrument: String,
    pub attempts: u32,
    pub reason: String,
    pub last_draft: serde_json::Value,
}

impl RealizationError {
    /// Pretty-printed last draft, cut to `max_chars` for terminal output.
    pub fn last_draft_excerpt(&self, max_chars: usize) -> String {
        let pretty = serde_json::to_string_pretty(&self.last_draft)
            .unwrap_or_else(|_| self.last_draft.to_string());
        crate::util::truncate_for_display(&pretty, max_chars)
    }
}

/// Failure isolated to one instrument during a fan-out stage or revision.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("{instrument}: generator call failed: {source:#}")]
    Generator {
        instrument: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{instrument}: generator output did not match the expected shape: {detail}")]
    Unparseable { instrument: String, detail: String },

    #[error("{instrument}: no part instruction is available")]
    MissingInstruction { instrument: String },

    #[error("{instrument}: no checkpointed part was found")]
    MissingFromCheckpoint { instrument: String },

    #[error(transparent)]
    Realization(#[from] RealizationError),
}

impl InstrumentError {
    pub fn instrument(&self) -> &str {
        match self {
            InstrumentError::Generator { instrument, .. }
            | InstrumentError::Unparseable { instrument, .. }
            | InstrumentError::MissingInstruction { instrument }
            | InstrumentError::MissingFromCheckpoint { instrument } => instrument,
            InstrumentError::Realization(err) => &err.instrument,
        }
    }
}

/// The run cannot start with the given parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("cannot start from stage '{stage}': no checkpoint for required stage '{required}'")]
    MissingCheckpoint { stage: Stage, required: Stage },

    #[error("unsupported instrument '{instrument}' (run `symphony instruments` for the roster)")]
    UnsupportedInstrument { instrument: String },

    #[error("at least one instrument is required")]
    EmptyRoster,

    #[error("instrument '{instrument}' is listed more than once")]
    DuplicateInstrument { instrument: String },

    #[error("invalid {name}: {detail}")]
    InvalidParameter { name: String, detail: String },

    #[error("unknown stage '{name}' (expected one of: {expected})")]
    UnknownStage { name: String, expected: String },
}

/// Checkpoint storage failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write checkpoint for stage '{stage}' at {path}: {source}")]
    Write {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read checkpoint for stage '{stage}' at {path}: {source}")]
    Read {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint for stage '{stage}' at {path} is corrupt: {detail}")]
    Corrupt {
        stage: Stage,
        path: PathBuf,
        detail: String,
    },

    #[error("checkpoint for stage '{stage}' has schema version {found}, expected {expected}")]
    SchemaMismatch {
        stage: Stage,
        found: u32,
        expected: u32,
    },

    #[error("failed to serialize checkpoint for stage '{stage}': {source}")]
    Serialize {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },
}

/// The evaluator broke its output contract or could not be reached.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("feedback targets '{target}', which is not in this run (allowed: {})", allowed.join(", "))]
    UnknownTarget { target: String, allowed: Vec<String> },

    #[error("judge verdict is malformed: {detail}")]
    MalformedVerdict { detail: String },

    #[error("judge call failed: {0:#}")]
    Judge(#[source] anyhow::Error),
}

/// Artifact export failures. Callers log these and continue.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode MIDI: {0}")]
    Encode(String),

    #[error("conversion to {format} failed: {detail}")]
    Conversion { format: String, detail: String },
}

/// Top-level failure of a composition run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("stage '{stage}' failed: evaluation: {0}", stage = Stage::EvaluateAndRevise)]
    Evaluation(#[from] EvaluationError),

    #[error("stage '{stage}' failed: {source:#}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("no instrument produced a valid part; nothing to evaluate")]
    NoParts,

    #[error("continue prompt failed: {0:#}")]
    Gate(#[source] anyhow::Error),
}

impl PipelineError {
    /// Configuration failures map to a distinct exit code.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}
