//! Note events and the per-note validation rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::pitch::{Pitch, PitchParseError};
use crate::errors::ValidationError;
use crate::instruments::InstrumentProfile;

/// Technique recorded on rests.
pub const REST_TECHNIQUE: &str = "none";

/// What sounds during a note event.
///
/// On the wire a chord is a single string of pitch names separated by spaces
/// and/or commas (`"C4 E4 G4"`, `"E4,G4,C5"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PitchSpec {
    Rest,
    Single(Pitch),
    Chord(Vec<Pitch>),
}

impl PitchSpec {
    pub fn parse(text: &str) -> Result<Self, PitchParseError> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("rest") {
            return Ok(PitchSpec::Rest);
        }
        Self::from_tokens(
            trimmed
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty()),
        )
        .map_err(|_| PitchParseError(text.to_string()))
    }

    /// Build from individual pitch names (one name means a single pitch).
    pub fn from_tokens<'a, I>(tokens: I) -> Result<Self, PitchParseError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pitches = tokens
            .into_iter()
            .map(Pitch::parse)
            .collect::<Result<Vec<_>, _>>()?;
        match pitches.len() {
            0 => Err(PitchParseError(String::new())),
            1 => Ok(PitchSpec::Single(pitches[0])),
            _ => Ok(PitchSpec::Chord(pitches)),
        }
    }

    /// Every sounding pitch; empty for a rest.
    pub fn pitches(&self) -> &[Pitch] {
        match self {
            PitchSpec::Rest => &[],
            PitchSpec::Single(p) => std::slice::from_ref(p),
            PitchSpec::Chord(ps) => ps,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, PitchSpec::Rest)
    }
}

impl fmt::Display for PitchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchSpec::Rest => write!(f, "rest"),
            PitchSpec::Single(p) => write!(f, "{}", p),
            PitchSpec::Chord(ps) => {
                let names: Vec<String> = ps.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", names.join(" "))
            }
        }
    }
}

impl TryFrom<String> for PitchSpec {
    type Error = PitchParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PitchSpec> for String {
    fn from(spec: PitchSpec) -> Self {
        spec.to_string()
    }
}

/// One note, chord, or rest with its length in quarter notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: PitchSpec,
    pub duration: f64,
    pub technique: String,
}

impl NoteEvent {
    pub fn new(pitch: PitchSpec, duration: f64, technique: impl Into<String>) -> Self {
        Self {
            pitch,
            duration,
            technique: technique.into(),
        }
    }

    pub fn rest(duration: f64) -> Self {
        Self::new(PitchSpec::Rest, duration, REST_TECHNIQUE)
    }
}

/// Check one event against an instrument's constraints.
///
/// Checks run in order: duration, pitch range (every chord member must fit),
/// technique. The first violation is returned.
pub fn validate_note(
    event: &NoteEvent,
    index: usize,
    profile: &InstrumentProfile,
) -> Result<(), ValidationError> {
    if !(event.duration.is_finite() && event.duration > 0.0) {
        return Err(ValidationError::NonPositiveDuration {
            index,
            duration: event.duration,
        });
    }

    if let Some(outside) = event.pitch.pitches().iter().find(|p| !profile.range.contains(p)) {
        return Err(ValidationError::PitchOutOfRange {
            index,
            pitch: outside.to_string(),
            low: profile.range.low.to_string(),
            high: profile.range.high.to_string(),
        });
    }

    let technique_ok = profile.has_technique(&event.technique)
        || (event.pitch.is_rest() && event.technique == REST_TECHNIQUE);
    if !technique_ok {
        return Err(ValidationError::UnknownTechnique {
            index,
            technique: event.technique.clone(),
            allowed: profile.techniques.join(", "),
        });
    }

    Ok(())
}
