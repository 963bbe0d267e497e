//! The five pipeline stages and their checkpoint names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "design_framework")]
    DesignFramework,
    #[serde(rename = "plan_composition")]
    PlanComposition,
    #[serde(rename = "generate_instructions")]
    GenerateInstructions,
    #[serde(rename = "generate_scores", alias = "generate_drafts")]
    GenerateDrafts,
    #[serde(rename = "evaluate_and_revise")]
    EvaluateAndRevise,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::DesignFramework,
        Stage::PlanComposition,
        Stage::GenerateInstructions,
        Stage::GenerateDrafts,
        Stage::EvaluateAndRevise,
    ];

    /// Checkpoint key and CLI value.
    pub fn name(self) -> &'static str {
        match self {
            Stage::DesignFramework => "design_framework",
            Stage::PlanComposition => "plan_composition",
            Stage::GenerateInstructions => "generate_instructions",
            Stage::GenerateDrafts => "generate_scores",
            Stage::EvaluateAndRevise => "evaluate_and_revise",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::DesignFramework => "Design the musical framework",
            Stage::PlanComposition => "Plan the composition",
            Stage::GenerateInstructions => "Brief each instrument",
            Stage::GenerateDrafts => "Compose every part",
            Stage::EvaluateAndRevise => "Evaluate and revise",
        }
    }

    /// Whether the stage's output is stored as a checkpoint.
    pub fn is_checkpointed(self) -> bool {
        self != Stage::EvaluateAndRevise
    }

    /// Checkpointed stages that must be satisfied before entering `self`.
    pub fn prerequisites(self) -> impl Iterator<Item = Stage> {
        Stage::ALL
            .into_iter()
            .filter(move |s| *s < self && s.is_checkpointed())
    }

    /// 1-based position for progress output.
    pub fn number(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).map_or(0, |i| i + 1)
    }

    fn expected_names() -> String {
        Stage::ALL
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase().replace('-', "_");
        match name.as_str() {
            "design_framework" => Ok(Stage::DesignFramework),
            "plan_composition" => Ok(Stage::PlanComposition),
            "generate_instructions" => Ok(Stage::GenerateInstructions),
            "generate_scores" | "generate_drafts" => Ok(Stage::GenerateDrafts),
            "evaluate_and_revise" => Ok(Stage::EvaluateAndRevise),
            _ => Err(ConfigurationError::UnknownStage {
                name: s.to_string(),
                expected: Stage::expected_names(),
            }),
        }
    }
}
