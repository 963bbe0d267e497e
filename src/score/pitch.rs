//! Pitch names (`C4`, `F#3`, `Bb1`) and inclusive pitch ranges.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static PITCH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Ga-g])(##|bb|#|b|-)?(-?\d{1,2})$").expect("pitch pattern is a valid static regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a pitch name")]
pub struct PitchParseError(pub String);

/// Natural note letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

/// A spelled pitch: letter, chromatic alteration in semitones, octave.
///
/// Ordering follows sounding height (`midi_number`); enharmonic spellings of
/// the same height are then ordered by letter so that `Ord` agrees with `Eq`.
/// Range checks compare heights only, so `C#4` and `Db4` behave the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pitch {
    letter: Letter,
    alter: i8,
    octave: i8,
}

impl Pitch {
    pub const fn new(letter: Letter, alter: i8, octave: i8) -> Self {
        Self {
            letter,
            alter,
            octave,
        }
    }

    pub fn parse(text: &str) -> Result<Self, PitchParseError> {
        let trimmed = text.trim();
        let caps = PITCH_NAME
            .captures(trimmed)
            .ok_or_else(|| PitchParseError(text.to_string()))?;

        let letter = caps[1]
            .chars()
            .next()
            .and_then(Letter::from_char)
            .ok_or_else(|| PitchParseError(text.to_string()))?;
        let alter = match caps.get(2).map(|m| m.as_str()) {
            None => 0,
            Some("#") => 1,
            Some("##") => 2,
            Some("b") | Some("-") => -1,
            Some("bb") => -2,
            Some(_) => return Err(PitchParseError(text.to_string())),
        };
        let octave = caps[3]
            .parse::<i8>()
            .map_err(|_| PitchParseError(text.to_string()))?;

        Ok(Self::new(letter, alter, octave))
    }

    /// Sounding height as a MIDI note number (`C4` = 60). May fall outside
    /// 0..=127 for extreme octaves.
    pub fn midi_number(&self) -> i32 {
        (i32::from(self.octave) + 1) * 12 + self.letter.semitone() + i32::from(self.alter)
    }

    pub fn letter(&self) -> Letter {
        self.letter
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }
}

impl Ord for Pitch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.midi_number()
            .cmp(&other.midi_number())
            .then(self.letter.cmp(&other.letter))
            .then(self.alter.cmp(&other.alter))
            .then(self.octave.cmp(&other.octave))
    }
}

impl PartialOrd for Pitch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.alter {
            2 => "##",
            1 => "#",
            -1 => "b",
            -2 => "bb",
            _ => "",
        };
        write!(f, "{}{}{}", self.letter.as_char(), accidental, self.octave)
    }
}

impl FromStr for Pitch {
    type Err = PitchParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pitch {
    type Error = PitchParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pitch> for String {
    fn from(pitch: Pitch) -> Self {
        pitch.to_string()
    }
}

/// Inclusive range of playable pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchRange {
    pub low: Pitch,
    pub high: Pitch,
}

impl PitchRange {
    pub const fn new(low: Pitch, high: Pitch) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, pitch: &Pitch) -> bool {
        let n = pitch.midi_number();
        self.low.midi_number() <= n && n <= self.high.midi_number()
    }
}

impl fmt::Display for PitchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.low, self.high)
    }
}
