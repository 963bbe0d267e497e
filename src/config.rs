//! Project configuration read from `.symphony/symphony.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags. Every key is
//! optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [generator]
//! command = "claude"
//! args = ["--print"]
//! timeout_secs = 300
//!
//! [pipeline]
//! max_retries = 3
//! parallel = true
//! checkpoint_dir = ".symphony/checkpoints"
//! output_dir = "output"
//!
//! [evaluation]
//! min_notes = 8
//! extra_critical_phrases = ["no climax"]
//!
//! [render]
//! musescore_path = "mscore"
//! export_formats = ["pdf", "musicxml"]
//!
//! [defaults]
//! style = "classical"
//! tempo = 120
//! key = "C major"
//! time_signature = "4/4"
//! measures = 4
//! instruments = ["violin", "viola", "cello"]
//! ```
//!
//! `SYMPHONY_GENERATOR_CMD` replaces `generator.command` and
//! `SYMPHONY_MUSESCORE` replaces `render.musescore_path`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::evaluate::{DEFAULT_MIN_NOTES, EvaluatorConfig};
use crate::generator::command::GeneratorSettings;
use crate::plan::GlobalParameters;
use crate::realize::DEFAULT_MAX_RETRIES;

pub const ENV_GENERATOR_CMD: &str = "SYMPHONY_GENERATOR_CMD";
pub const ENV_MUSESCORE: &str = "SYMPHONY_MUSESCORE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_generator_command")]
    pub command: String,
    #[serde(default = "default_generator_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generator_command() -> String {
    "claude".to_string()
}

fn default_generator_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            command: default_generator_command(),
            args: default_generator_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Drafts validated per realization before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Run per-instrument work concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Relative paths resolve against the project directory
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_parallel() -> bool {
    true
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".symphony/checkpoints")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            parallel: default_parallel(),
            checkpoint_dir: default_checkpoint_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSection {
    #[serde(default = "default_min_notes")]
    pub min_notes: usize,
    /// Added to the built-in critical phrases, never replacing them
    #[serde(default)]
    pub extra_critical_phrases: Vec<String>,
}

fn default_min_notes() -> usize {
    DEFAULT_MIN_NOTES
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            min_notes: default_min_notes(),
            extra_critical_phrases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSection {
    /// MuseScore executable; conversion is skipped when unset
    #[serde(default)]
    pub musescore_path: Option<String>,
    #[serde(default)]
    pub export_formats: Vec<String>,
}

/// Run parameters used when the CLI does not give them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_tempo")]
    pub tempo: u32,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_time_signature")]
    pub time_signature: String,
    #[serde(default = "default_measures")]
    pub measures: u32,
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,
}

fn default_style() -> String {
    GlobalParameters::default().style
}

fn default_tempo() -> u32 {
    GlobalParameters::default().tempo
}

fn default_key() -> String {
    GlobalParameters::default().key
}

fn default_time_signature() -> String {
    GlobalParameters::default().time_signature
}

fn default_measures() -> u32 {
    GlobalParameters::default().measures
}

fn default_instruments() -> Vec<String> {
    GlobalParameters::default().instruments
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            style: default_style(),
            tempo: default_tempo(),
            key: default_key(),
            time_signature: default_time_signature(),
            measures: default_measures(),
            instruments: default_instruments(),
        }
    }
}

impl DefaultsSection {
    pub fn to_params(&self) -> GlobalParameters {
        GlobalParameters {
            style: self.style.clone(),
            tempo: self.tempo,
            key: self.key.clone(),
            time_signature: self.time_signature.clone(),
            measures: self.measures,
            instruments: self.instruments.clone(),
        }
    }
}

/// Contents of `symphony.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymphonyToml {
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub evaluation: EvaluationSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

impl SymphonyToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse symphony.toml")
    }

    /// Load `symphony.toml` from `state_dir`, or defaults if there is none.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join("symphony.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize symphony.toml")
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `SYMPHONY_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cmd) = lookup(ENV_GENERATOR_CMD).filter(|v| !v.trim().is_empty()) {
            self.generator.command = cmd;
        }
        if let Some(path) = lookup(ENV_MUSESCORE).filter(|v| !v.trim().is_empty()) {
            self.render.musescore_path = Some(path);
        }
    }

    pub fn generator_settings(&self, working_dir: &Path) -> GeneratorSettings {
        GeneratorSettings {
            command: self.generator.command.clone(),
            args: self.generator.args.clone(),
            timeout: Duration::from_secs(self.generator.timeout_secs.max(1)),
            working_dir: Some(working_dir.to_path_buf()),
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            min_notes: self.evaluation.min_notes,
            ..EvaluatorConfig::default()
        }
        .with_extra_phrases(&self.evaluation.extra_critical_phrases)
    }

    /// Problems worth telling the operator about; none of them are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.pipeline.max_retries == 0 {
            warnings.push("pipeline.max_retries = 0 is treated as 1".to_string());
        }
        if self.evaluation.min_notes == 0 {
            warnings.push("evaluation.min_notes = 0 disables the note-count rule".to_string());
        }
        if !self.render.export_formats.is_empty() && self.render.musescore_path.is_none() {
            warnings.push(
                "render.export_formats is set but no MuseScore path is configured".to_string(),
            );
        }
        warnings
    }
}

/// Locations derived from the project directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_dir: PathBuf) -> Self {
        let state_dir = project_dir.join(".symphony");
        Self {
            project_dir,
            state_dir,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join("symphony.toml")
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn checkpoint_dir(&self, toml: &SymphonyToml) -> PathBuf {
        self.resolve(&toml.pipeline.checkpoint_dir)
    }

    pub fn output_dir(&self, toml: &SymphonyToml) -> PathBuf {
        self.resolve(&toml.pipeline.output_dir)
    }

    /// Config from file plus environment.
    pub fn load_config(&self) -> Result<SymphonyToml> {
        let mut toml = SymphonyToml::load_or_default(&self.state_dir)?;
        toml.apply_env();
        Ok(toml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = SymphonyToml::parse("").unwrap();
        assert_eq!(config, SymphonyToml::default());
        assert_eq!(config.generator.command, "claude");
        assert_eq!(config.pipeline.max_retries, 3);
        assert!(config.pipeline.parallel);
        assert_eq!(config.evaluation.min_notes, 8);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = SymphonyToml::parse(
            r#"
[pipeline]
max_retries = 5

[defaults]
instruments = ["piano"]
tempo = 90
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.max_retries, 5);
        assert!(config.pipeline.parallel);
        let params = config.defaults.to_params();
        assert_eq!(params.instruments, vec!["piano"]);
        assert_eq!(params.tempo, 90);
        assert_eq!(params.key, "C major");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let err = SymphonyToml::parse("[pipeline\nmax_retries = ").unwrap_err();
        assert!(err.to_string().contains("symphony.toml"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path().to_path_buf());
        let mut config = SymphonyToml::default();
        config.render.export_formats = vec!["pdf".into()];
        config.save(&paths.config_file()).unwrap();

        let loaded = SymphonyToml::load_or_default(&paths.state_dir).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = SymphonyToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, SymphonyToml::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut config = SymphonyToml::default();
        config.apply_env_from(|name| match name {
            ENV_GENERATOR_CMD => Some("my-llm".to_string()),
            ENV_MUSESCORE => Some("/opt/mscore".to_string()),
            _ => None,
        });
        assert_eq!(config.generator.command, "my-llm");
        assert_eq!(config.render.musescore_path.as_deref(), Some("/opt/mscore"));
    }

    #[test]
    fn test_blank_environment_values_are_ignored() {
        let mut config = SymphonyToml::default();
        config.apply_env_from(|_| Some("  ".to_string()));
        assert_eq!(config.generator.command, "claude");
        assert!(config.render.musescore_path.is_none());
    }

    #[test]
    fn test_extra_phrases_extend_the_built_in_set() {
        let mut config = SymphonyToml::default();
        config.evaluation.extra_critical_phrases = vec!["no climax".into()];
        let evaluator = config.evaluator_config();
        assert!(evaluator.critical_phrases.iter().any(|p| p == "no climax"));
        assert!(evaluator.critical_phrases.iter().any(|p| p == "和聲單調"));
    }

    #[test]
    fn test_relative_paths_resolve_against_the_project() {
        let paths = ProjectPaths::new(PathBuf::from("/work/piece"));
        let config = SymphonyToml::default();
        assert_eq!(
            paths.checkpoint_dir(&config),
            PathBuf::from("/work/piece/.symphony/checkpoints")
        );
        assert_eq!(paths.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn test_validate_warns_about_formats_without_musescore() {
        let mut config = SymphonyToml::default();
        config.render.export_formats = vec!["pdf".into()];
        assert_eq!(config.validate().len(), 1);
    }
}
