//! Static style and music-theory reference data fed to the design stage.

use serde::Serialize;

/// Guidelines for one historical style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleGuide {
    pub style: String,
    pub form_options: Vec<&'static str>,
    pub harmonic_features: &'static str,
    pub orchestration: &'static str,
    pub dynamic_character: &'static str,
    pub historical_context: &'static str,
}

impl StyleGuide {
    /// Guide for `style`; unknown styles get general-purpose guidance.
    pub fn for_style(style: &str) -> Self {
        let key = style.trim().to_lowercase();
        let (form_options, harmonic_features, orchestration, dynamic_character, historical_context) =
            match key.as_str() {
                "classical" => (
                    vec!["Sonata", "Theme and Variations", "Rondo"],
                    "Functional harmony with strong tonic-dominant relationships",
                    "Standard classical forces: strings at the core, woodwinds and brass balanced",
                    "Terraced dynamic changes with clearly articulated sections",
                    "Classical period (c. 1750-1820): balanced forms and clear structure, as in Haydn and Mozart",
                ),
                "romantic" => (
                    vec!["Symphonic Poem", "Character Piece", "Expanded Sonata"],
                    "Chromatic harmony and modulation to distant keys",
                    "Large forces with prominent brass and percussion, finely divided strings",
                    "Dramatic crescendos and sudden contrasts",
                    "Romantic period (c. 1820-1900): emotional expression and individualism, as in Tchaikovsky and Mahler",
                ),
                "baroque" => (
                    vec!["Fugue", "Concerto Grosso", "Dance Suite"],
                    "Basso continuo with figured-bass harmony",
                    "Small string ensemble over a continuo group",
                    "Terraced dynamics with detached and connected articulation in contrast",
                    "Baroque period (c. 1600-1750): intricate counterpoint and ornamentation, as in Bach and Handel",
                ),
                _ => (
                    Vec::new(),
                    "",
                    "",
                    "",
                    "General principles of composition",
                ),
            };
        Self {
            style: key,
            form_options,
            harmonic_features,
            orchestration,
            dynamic_character,
            historical_context,
        }
    }

    /// Labelled summary used verbatim in the design prompt.
    pub fn analysis(&self) -> String {
        [
            format!("[Historical context] {}", self.historical_context),
            format!("[Form options] {}", self.form_options.join(", ")),
            format!("[Harmonic features] {}", self.harmonic_features),
            format!("[Orchestration] {}", self.orchestration),
            format!("[Dynamic character] {}", self.dynamic_character),
        ]
        .join("\n")
    }
}

/// A named chord progression and what it is used for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarmonicOption {
    pub name: &'static str,
    pub sequence: &'static [&'static str],
    pub usage: &'static str,
}

/// A large-scale form with its section order and tonal plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormOption {
    pub name: &'static str,
    pub structure: &'static [&'static str],
    pub tonal_plan: &'static str,
    pub classic_example: &'static str,
}

const CLASSICAL_PROGRESSIONS: &[HarmonicOption] = &[
    HarmonicOption {
        name: "Authentic Cadence",
        sequence: &["V", "I"],
        usage: "Cadence confirming the key",
    },
    HarmonicOption {
        name: "Plagal Cadence",
        sequence: &["IV", "I"],
        usage: "Church cadence",
    },
];

const ROMANTIC_PROGRESSIONS: &[HarmonicOption] = &[
    HarmonicOption {
        name: "Chromatic Mediant",
        sequence: &["I", "III"],
        usage: "Colouristic shift of key",
    },
    HarmonicOption {
        name: "Neapolitan Chord",
        sequence: &["N6", "V"],
        usage: "Builds dramatic tension",
    },
];

const FORMS: &[FormOption] = &[
    FormOption {
        name: "sonata",
        structure: &["Exposition", "Development", "Recapitulation"],
        tonal_plan: "tonic -> dominant -> relative keys -> tonic",
        classic_example: "Mozart, Symphony No. 40, first movement",
    },
    FormOption {
        name: "rondo",
        structure: &["A", "B", "A", "C", "A"],
        tonal_plan: "repeated return to the tonic",
        classic_example: "Beethoven, Pathetique Sonata, third movement",
    },
];

pub struct TheoryDatabase;

impl TheoryDatabase {
    pub fn harmonic_options(style: &str) -> &'static [HarmonicOption] {
        match style.trim().to_lowercase().as_str() {
            "classical" => CLASSICAL_PROGRESSIONS,
            "romantic" => ROMANTIC_PROGRESSIONS,
            _ => &[],
        }
    }

    pub fn form_options() -> &'static [FormOption] {
        FORMS
    }
}
