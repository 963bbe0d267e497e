//! Score domain model: pitches, note events and validated parts.

pub mod note;
pub mod part;
pub mod pitch;

pub use note::{NoteEvent, PitchSpec, REST_TECHNIQUE, validate_note};
pub use part::{Part, validate_part};
pub use pitch::{Letter, Pitch, PitchParseError, PitchRange};
