//! Run parameters and the plans produced by the first three stages.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::instruments::{self, InstrumentProfile};
use crate::util::short_hash;

/// Parameters fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParameters {
    pub style: String,
    pub tempo: u32,
    pub key: String,
    pub time_signature: String,
    pub measures: u32,
    pub instruments: Vec<String>,
}

impl Default for GlobalParameters {
    fn default() -> Self {
        Self {
            style: "classical".to_string(),
            tempo: 120,
            key: "C major".to_string(),
            time_signature: "4/4".to_string(),
            measures: 4,
            instruments: ["violin", "viola", "cello", "flute", "clarinet", "trumpet", "timpani"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl GlobalParameters {
    /// Check every parameter and fold instrument names to canonical ids.
    ///
    /// Returns the profiles in request order.
    pub fn validate(&mut self) -> Result<Vec<&'static InstrumentProfile>, ConfigurationError> {
        if self.tempo == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "tempo".into(),
                detail: "must be a positive number of beats per minute".into(),
            });
        }
        if self.measures == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "measures".into(),
                detail: "must be at least 1".into(),
            });
        }
        self.time_signature_parts()?;
        if self.instruments.is_empty() {
            return Err(ConfigurationError::EmptyRoster);
        }

        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(self.instruments.len());
        for name in &self.instruments {
            let profile = instruments::lookup(name).ok_or_else(|| {
                ConfigurationError::UnsupportedInstrument {
                    instrument: name.clone(),
                }
            })?;
            if !seen.insert(profile.id) {
                return Err(ConfigurationError::DuplicateInstrument {
                    instrument: profile.id.to_string(),
                });
            }
            profiles.push(profile);
        }
        self.instruments = profiles.iter().map(|p| p.id.to_string()).collect();
        Ok(profiles)
    }

    /// `(beats per bar, beat unit)` from `"N/M"`.
    pub fn time_signature_parts(&self) -> Result<(u8, u8), ConfigurationError> {
        let invalid = || ConfigurationError::InvalidParameter {
            name: "time signature".into(),
            detail: format!("'{}' is not of the form N/M", self.time_signature),
        };
        let (num, den) = self.time_signature.split_once('/').ok_or_else(invalid)?;
        let num: u8 = num.trim().parse().map_err(|_| invalid())?;
        let den: u8 = den.trim().parse().map_err(|_| invalid())?;
        if num == 0 || den == 0 || !den.is_power_of_two() {
            return Err(invalid());
        }
        Ok((num, den))
    }

    /// Stable short hash recorded in checkpoints.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        short_hash(&canonical)
    }
}

/// Output of the design stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructurePlan {
    pub form: String,
    #[serde(default)]
    pub themes: Vec<String>,
    pub harmonic_progression: Vec<String>,
    pub instrumentation_roles: BTreeMap<String, String>,
    pub dynamic_plan: String,
    #[serde(default)]
    pub rationale: String,
}

impl StructurePlan {
    /// Role assigned to `profile`, falling back to its default role.
    pub fn role_for(&self, profile: &InstrumentProfile) -> String {
        self.instrumentation_roles
            .iter()
            .find(|(name, _)| instruments::canonical_id(name) == profile.id)
            .map(|(_, role)| role.clone())
            .unwrap_or_else(|| profile.default_role.to_string())
    }
}

/// Output of the planning stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub overall_structure: String,
    pub instrument_roles: BTreeMap<String, String>,
    pub harmonic_and_dynamic_plan: String,
}

impl CompositionPlan {
    pub fn task_for(&self, profile: &InstrumentProfile) -> Option<&str> {
        self.instrument_roles
            .iter()
            .find(|(name, _)| instruments::canonical_id(name) == profile.id)
            .map(|(_, task)| task.as_str())
    }
}

/// Per-instrument performance brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInstruction {
    pub melody_position: String,
    #[serde(default)]
    pub coordination_points: Vec<String>,
    #[serde(default)]
    pub technical_challenges: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(instruments: &[&str]) -> GlobalParameters {
        GlobalParameters {
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            ..GlobalParameters::default()
        }
    }

    #[test]
    fn test_defaults_match_the_reference_setup() {
        let params = GlobalParameters::default();
        assert_eq!(params.tempo, 120);
        assert_eq!(params.key, "C major");
        assert_eq!(params.time_signature, "4/4");
        assert_eq!(params.measures, 4);
        assert_eq!(params.instruments.len(), 7);
    }

    #[test]
    fn test_validate_canonicalises_instrument_names() {
        let mut params = params(&["Violin", "double_bass"]);
        let profiles = params.validate().unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(params.instruments, vec!["violin", "double bass"]);
    }

    #[test]
    fn test_validate_rejects_unsupported_instrument() {
        let err = params(&["violin", "theremin"]).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnsupportedInstrument {
                instrument: "theremin".into()
            }
        );
    }

    #[test]
    fn test_validate_rejects_duplicates_after_aliasing() {
        let err = params(&["contrabass", "double bass"]).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateInstrument { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_roster_and_bad_numbers() {
        assert_eq!(params(&[]).validate().unwrap_err(), ConfigurationError::EmptyRoster);

        let mut bad_tempo = params(&["violin"]);
        bad_tempo.tempo = 0;
        assert!(matches!(
            bad_tempo.validate().unwrap_err(),
            ConfigurationError::InvalidParameter { .. }
        ));

        let mut bad_meter = params(&["violin"]);
        bad_meter.time_signature = "4-4".into();
        assert!(bad_meter.validate().is_err());
        bad_meter.time_signature = "3/5".into();
        assert!(bad_meter.validate().is_err());
    }

    #[test]
    fn test_time_signature_parts_parses_compound_meters() {
        let mut p = params(&["violin"]);
        p.time_signature = "6/8".into();
        assert_eq!(p.time_signature_parts().unwrap(), (6, 8));
    }

    #[test]
    fn test_content_hash_changes_with_parameters() {
        let a = GlobalParameters::default();
        let mut b = a.clone();
        b.tempo = 96;
        assert_eq!(a.content_hash(), GlobalParameters::default().content_hash());
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_structure_plan_tolerates_missing_optional_fields() {
        let plan: StructurePlan = serde_json::from_value(json!({
            "form": "sonata",
            "harmonic_progression": ["I", "IV", "V", "I"],
            "instrumentation_roles": {"Violin": "melody"},
            "dynamic_plan": "p to f"
        }))
        .unwrap();
        assert!(plan.themes.is_empty());
        let violin = instruments::lookup("violin").unwrap();
        let cello = instruments::lookup("cello").unwrap();
        assert_eq!(plan.role_for(violin), "melody");
        assert_eq!(plan.role_for(cello), "bass");
    }
}
