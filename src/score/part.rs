//! Validated parts and the draft format the generator speaks.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::note::{NoteEvent, PitchSpec, REST_TECHNIQUE, validate_note};
use super::pitch::PitchRange;
use crate::errors::ValidationError;
use crate::instruments::InstrumentProfile;

/// The validated note sequence for one instrument.
///
/// Only built by [`Part::from_draft`] or by deserializing a checkpoint,
/// which callers must pass through [`Part::revalidate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    instrument: String,
    clef: String,
    range: PitchRange,
    notes: Vec<NoteEvent>,
}

#[derive(Deserialize)]
struct RawDraft {
    notes: Vec<RawNote>,
}

#[derive(Deserialize)]
struct RawNote {
    pitch: RawPitch,
    duration: RawDuration,
    #[serde(default)]
    technique: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPitch {
    Text(String),
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Number(f64),
    Text(String),
}

impl RawDuration {
    /// Accepts numbers, decimal strings and fractions such as `"1/3"`.
    fn value(&self) -> Option<f64> {
        match self {
            RawDuration::Number(n) => Some(*n),
            RawDuration::Text(text) => {
                let text = text.trim();
                match text.split_once('/') {
                    Some((num, den)) => {
                        let num: f64 = num.trim().parse().ok()?;
                        let den: f64 = den.trim().parse().ok()?;
                        Some(num / den)
                    }
                    None => text.parse().ok(),
                }
            }
        }
    }
}

impl Part {
    /// Deserialize a generator draft and validate it against `profile`.
    ///
    /// The clef and range always come from the profile; whatever the draft
    /// claims for them is ignored.
    pub fn from_draft(draft: &Value, profile: &InstrumentProfile) -> Result<Part, ValidationError> {
        let raw: RawDraft = match draft {
            Value::Array(_) => serde_json::from_value(json!({ "notes": draft })),
            _ => serde_json::from_value(draft.clone()),
        }
        .map_err(|e| ValidationError::MalformedDraft {
            detail: e.to_string(),
        })?;

        let mut notes = Vec::with_capacity(raw.notes.len());
        for (index, raw_note) in raw.notes.into_iter().enumerate() {
            notes.push(convert_note(raw_note, index)?);
        }

        let part = Part {
            instrument: profile.id.to_string(),
            clef: profile.clef.to_string(),
            range: profile.range,
            notes,
        };
        validate_part(&part, profile)?;
        Ok(part)
    }

    /// Re-check a part that was read back from storage.
    pub fn revalidate(self, profile: &InstrumentProfile) -> Result<Part, ValidationError> {
        if self.instrument != profile.id {
            return Err(ValidationError::MalformedDraft {
                detail: format!(
                    "part belongs to '{}', not '{}'",
                    self.instrument, profile.id
                ),
            });
        }
        validate_part(&self, profile)?;
        Ok(Part {
            range: profile.range,
            ..self
        })
    }

    /// The JSON shape shown to the generator when it repairs, revises or judges.
    pub fn to_draft(&self) -> Value {
        let notes: Vec<Value> = self
            .notes
            .iter()
            .map(|n| {
                json!({
                    "pitch": n.pitch.to_string(),
                    "duration": n.duration,
                    "technique": n.technique,
                })
            })
            .collect();
        json!({
            "instrument": self.instrument,
            "clef": self.clef,
            "notes": notes,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn clef(&self) -> &str {
        &self.clef
    }

    pub fn range(&self) -> PitchRange {
        self.range
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Length in quarter notes.
    pub fn total_duration(&self) -> f64 {
        self.notes.iter().map(|n| n.duration).sum()
    }
}

fn convert_note(raw: RawNote, index: usize) -> Result<NoteEvent, ValidationError> {
    let pitch = match &raw.pitch {
        RawPitch::Text(text) => PitchSpec::parse(text),
        RawPitch::List(names) => PitchSpec::from_tokens(names.iter().map(String::as_str)),
    }
    .map_err(|_| ValidationError::InvalidPitch {
        index,
        value: match &raw.pitch {
            RawPitch::Text(text) => text.clone(),
            RawPitch::List(names) => names.join(" "),
        },
    })?;

    let duration = raw
        .duration
        .value()
        .ok_or_else(|| ValidationError::MalformedDraft {
            detail: format!("note {index}: duration is not a number"),
        })?;

    let technique = match raw.technique {
        Some(t) => t.trim().to_lowercase(),
        None if pitch.is_rest() => REST_TECHNIQUE.to_string(),
        None => String::new(),
    };

    Ok(NoteEvent::new(pitch, duration, technique))
}

/// Check every invariant of a part; returns the first violation.
pub fn validate_part(part: &Part, profile: &InstrumentProfile) -> Result<(), ValidationError> {
    if part.notes.is_empty() {
        return Err(ValidationError::EmptyPart);
    }
    for (index, event) in part.notes.iter().enumerate() {
        validate_note(event, index, profile)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments;

    fn violin() -> &'static InstrumentProfile {
        instruments::lookup("violin").unwrap()
    }

    #[test]
    fn test_builds_part_from_well_formed_draft() {
        let draft = json!({
            "instrument": "Violin",
            "clef": "bass",
            "notes": [
                {"pitch": "G3", "duration": 1.0, "technique": "arco"},
                {"pitch": "rest", "duration": 0.5},
                {"pitch": ["A4", "E5"], "duration": "1/2", "technique": "Pizz"},
            ]
        });
        let part = Part::from_draft(&draft, violin()).unwrap();
        assert_eq!(part.instrument(), "violin");
        assert_eq!(part.clef(), "treble");
        assert_eq!(part.note_count(), 3);
        assert_eq!(part.notes()[1].technique, REST_TECHNIQUE);
        assert_eq!(part.notes()[2].technique, "pizz");
        assert!((part.total_duration() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_accepts_bare_note_array() {
        let draft = json!([{"pitch": "C5", "duration": 2, "technique": "arco"}]);
        assert_eq!(Part::from_draft(&draft, violin()).unwrap().note_count(), 1);
    }

    #[test]
    fn test_empty_part_is_rejected() {
        let err = Part::from_draft(&json!({"notes": []}), violin()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyPart);
    }

    #[test]
    fn test_missing_notes_field_is_malformed() {
        let err = Part::from_draft(&json!({"melody": "la la"}), violin()).unwrap_err();
        assert_eq!(err.kind(), "malformed_draft");
    }

    #[test]
    fn test_bad_pitch_name_reports_index_and_value() {
        let draft = json!({"notes": [
            {"pitch": "G3", "duration": 1.0, "technique": "arco"},
            {"pitch": "H9", "duration": 1.0, "technique": "arco"},
        ]});
        let err = Part::from_draft(&draft, violin()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPitch {
                index: 1,
                value: "H9".into()
            }
        );
    }

    #[test]
    fn test_pitched_note_without_technique_is_rejected() {
        let draft = json!({"notes": [{"pitch": "G3", "duration": 1.0}]});
        let err = Part::from_draft(&draft, violin()).unwrap_err();
        assert_eq!(err.kind(), "unknown_technique");
    }

    #[test]
    fn test_to_draft_is_accepted_back() {
        let draft = json!({"notes": [
            {"pitch": "C4 E4 G4", "duration": 1.5, "technique": "arco"},
            {"pitch": "rest", "duration": 0.5, "technique": "none"},
        ]});
        let part = Part::from_draft(&draft, violin()).unwrap();
        let again = Part::from_draft(&part.to_draft(), violin()).unwrap();
        assert_eq!(part, again);
    }

    #[test]
    fn test_revalidate_rejects_part_of_other_instrument() {
        let draft = json!({"notes": [{"pitch": "G3", "duration": 1.0, "technique": "arco"}]});
        let part = Part::from_draft(&draft, violin()).unwrap();
        let viola = instruments::lookup("viola").unwrap();
        assert!(part.clone().revalidate(viola).is_err());
        assert!(part.revalidate(violin()).is_ok());
    }
}
