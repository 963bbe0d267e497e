//! Instrument capability table.
//!
//! One [`InstrumentProfile`] per supported instrument replaces a per-instrument
//! agent type: range, technique vocabulary, clef and General MIDI timbre are
//! all data, consumed by the validator, the prompts and the MIDI renderer.

use serde::Serialize;

use crate::score::{Letter, Pitch, PitchRange};

/// Everything the pipeline needs to know about one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentProfile {
    /// Canonical identifier used in parameters, checkpoints and feedback.
    pub id: &'static str,
    pub display_name: &'static str,
    /// Label for the performer persona in prompts ("Violinist").
    pub player: &'static str,
    pub clef: &'static str,
    pub techniques: &'static [&'static str],
    pub range: PitchRange,
    /// General MIDI program (0-based).
    pub gm_program: u8,
    /// Role assumed when the structure plan leaves the instrument out.
    pub default_role: &'static str,
}

impl InstrumentProfile {
    pub fn has_technique(&self, technique: &str) -> bool {
        self.techniques.contains(&technique)
    }

    /// Unpitched kit, rendered on the GM percussion channel.
    pub fn is_percussion(&self) -> bool {
        self.id == "percussion"
    }
}

const fn p(letter: Letter, alter: i8, octave: i8) -> Pitch {
    Pitch::new(letter, alter, octave)
}

const fn range(low: Pitch, high: Pitch) -> PitchRange {
    PitchRange::new(low, high)
}

const BOWED: &[&str] = &["arco", "pizz"];
const BLOWN: &[&str] = &["slur", "tongued"];

static ROSTER: [InstrumentProfile; 17] = [
    InstrumentProfile {
        id: "piano",
        display_name: "Piano",
        player: "Pianist",
        clef: "treble",
        techniques: &["normal"],
        range: range(p(Letter::A, 0, 0), p(Letter::C, 0, 8)),
        gm_program: 0,
        default_role: "harmony",
    },
    InstrumentProfile {
        id: "violin",
        display_name: "Violin",
        player: "Violinist",
        clef: "treble",
        techniques: BOWED,
        range: range(p(Letter::G, 0, 3), p(Letter::E, 0, 6)),
        gm_program: 40,
        default_role: "melody",
    },
    InstrumentProfile {
        id: "viola",
        display_name: "Viola",
        player: "Violist",
        clef: "alto",
        techniques: BOWED,
        range: range(p(Letter::C, 0, 3), p(Letter::A, 0, 5)),
        gm_program: 41,
        default_role: "harmony",
    },
    InstrumentProfile {
        id: "cello",
        display_name: "Cello",
        player: "Cellist",
        clef: "bass",
        techniques: BOWED,
        range: range(p(Letter::C, 0, 2), p(Letter::A, 0, 3)),
        gm_program: 42,
        default_role: "bass",
    },
    InstrumentProfile {
        id: "double bass",
        display_name: "Double Bass",
        player: "Bassist",
        clef: "bass",
        techniques: BOWED,
        range: range(p(Letter::E, 0, 2), p(Letter::G, 0, 4)),
        gm_program: 43,
        default_role: "bass",
    },
    InstrumentProfile {
        id: "flute",
        display_name: "Flute",
        player: "Flutist",
        clef: "treble",
        techniques: BLOWN,
        range: range(p(Letter::C, 0, 4), p(Letter::C, 0, 7)),
        gm_program: 73,
        default_role: "melody",
    },
    InstrumentProfile {
        id: "clarinet",
        display_name: "Clarinet",
        player: "Clarinetist",
        clef: "treble",
        techniques: BLOWN,
        range: range(p(Letter::E, 0, 3), p(Letter::C, 0, 7)),
        gm_program: 71,
        default_role: "harmony",
    },
    InstrumentProfile {
        id: "oboe",
        display_name: "Oboe",
        player: "Oboist",
        clef: "treble",
        techniques: BLOWN,
        range: range(p(Letter::B, -1, 3), p(Letter::G, 0, 6)),
        gm_program: 68,
        default_role: "melody",
    },
    InstrumentProfile {
        id: "bassoon",
        display_name: "Bassoon",
        player: "Bassoonist",
        clef: "bass",
        techniques: BLOWN,
        range: range(p(Letter::B, -1, 1), p(Letter::E, -1, 5)),
        gm_program: 70,
        default_role: "bass",
    },
    InstrumentProfile {
        id: "saxophone",
        display_name: "Saxophone",
        player: "Saxophonist",
        clef: "treble",
        techniques: BLOWN,
        range: range(p(Letter::B, -1, 3), p(Letter::F, 0, 6)),
        gm_program: 65,
        default_role: "melody",
    },
    InstrumentProfile {
        id: "trumpet",
        display_name: "Trumpet",
        player: "Trumpeter",
        clef: "treble",
        techniques: BLOWN,
        range: range(p(Letter::F, 1, 3), p(Letter::C, 0, 6)),
        gm_program: 56,
        default_role: "highlight",
    },
    InstrumentProfile {
        id: "horn",
        display_name: "Horn",
        player: "Hornist",
        clef: "treble",
        techniques: BLOWN,
        range: range(p(Letter::F, 0, 2), p(Letter::C, 0, 6)),
        gm_program: 60,
        default_role: "harmony",
    },
    InstrumentProfile {
        id: "trombone",
        display_name: "Trombone",
        player: "Trombonist",
        clef: "bass",
        techniques: BLOWN,
        range: range(p(Letter::E, 0, 2), p(Letter::B, -1, 4)),
        gm_program: 57,
        default_role: "harmony",
    },
    InstrumentProfile {
        id: "tuba",
        display_name: "Tuba",
        player: "Tubist",
        clef: "bass",
        techniques: BLOWN,
        range: range(p(Letter::D, 0, 1), p(Letter::F, 0, 4)),
        gm_program: 58,
        default_role: "bass",
    },
    InstrumentProfile {
        id: "timpani",
        display_name: "Timpani",
        player: "Timpanist",
        clef: "bass",
        techniques: &["roll", "strike"],
        range: range(p(Letter::C, 0, 2), p(Letter::C, 0, 4)),
        gm_program: 47,
        default_role: "rhythm",
    },
    InstrumentProfile {
        id: "harp",
        display_name: "Harp",
        player: "Harpist",
        clef: "treble",
        techniques: &["pluck"],
        range: range(p(Letter::C, -1, 1), p(Letter::G, 1, 7)),
        gm_program: 46,
        default_role: "harmony",
    },
    InstrumentProfile {
        id: "percussion",
        display_name: "Percussion",
        player: "Percussionist",
        clef: "percussion",
        techniques: &["strike"],
        range: range(p(Letter::C, 0, 4), p(Letter::C, 0, 4)),
        gm_program: 0,
        default_role: "rhythm",
    },
];

/// All supported instruments, in orchestral listing order.
pub fn roster() -> &'static [InstrumentProfile] {
    &ROSTER
}

/// Canonical spelling of an instrument identifier: lower case, single
/// spaces, known aliases folded.
pub fn canonical_id(name: &str) -> String {
    let folded = name
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    match folded.as_str() {
        "contrabass" | "string bass" | "bass" => "double bass".to_string(),
        "french horn" => "horn".to_string(),
        "sax" | "alto sax" | "alto saxophone" => "saxophone".to_string(),
        "timpano" => "timpani".to_string(),
        _ => folded,
    }
}

/// Case-insensitive lookup accepting `double_bass`, `contrabass` and similar aliases.
pub fn lookup(name: &str) -> Option<&'static InstrumentProfile> {
    let id = canonical_id(name);
    ROSTER.iter().find(|profile| profile.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_has_every_supported_instrument() {
        let ids: Vec<&str> = roster().iter().map(|p| p.id).collect();
        for expected in [
            "piano",
            "violin",
            "viola",
            "cello",
            "double bass",
            "flute",
            "clarinet",
            "oboe",
            "bassoon",
            "saxophone",
            "trumpet",
            "horn",
            "trombone",
            "tuba",
            "timpani",
            "harp",
            "percussion",
        ] {
            assert!(ids.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_every_range_is_ordered_and_every_vocabulary_non_empty() {
        for profile in roster() {
            assert!(profile.range.low <= profile.range.high, "{}", profile.id);
            assert!(!profile.techniques.is_empty(), "{}", profile.id);
            assert!(profile.gm_program < 128);
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_accepts_aliases() {
        assert_eq!(lookup("Violin").unwrap().id, "violin");
        assert_eq!(lookup("double_bass").unwrap().id, "double bass");
        assert_eq!(lookup("Contrabass").unwrap().id, "double bass");
        assert_eq!(lookup("French-Horn").unwrap().id, "horn");
        assert!(lookup("theremin").is_none());
    }

    #[test]
    fn test_ranges_match_the_instrument_table() {
        let cello = lookup("cello").unwrap();
        assert_eq!(cello.range.to_string(), "C2..A3");
        let trumpet = lookup("trumpet").unwrap();
        assert_eq!(trumpet.range.to_string(), "F#3..C6");
        let harp = lookup("harp").unwrap();
        assert_eq!(harp.range.to_string(), "Cb1..G#7");
    }

    #[test]
    fn test_only_percussion_uses_the_percussion_channel() {
        assert!(lookup("percussion").unwrap().is_percussion());
        assert!(!lookup("timpani").unwrap().is_percussion());
    }
}
