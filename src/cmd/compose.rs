//! `symphony compose`: run the pipeline.

use std::path::Path;

use anyhow::Result;
use symphony::checkpoint::CheckpointStore;
use symphony::config::ProjectPaths;
use symphony::errors::InstrumentError;
use symphony::evaluate::Evaluator;
use symphony::gates::{BudgetGate, ContinueGate, InteractiveGate};
use symphony::generator::CommandGenerator;
use symphony::pipeline::{RunStatus, Sequencer, SequencerConfig, Stage};
use symphony::plan::GlobalParameters;
use symphony::render::MidiRenderer;
use symphony::ui::ComposerUI;
use tracing::warn;

use super::super::ComposeArgs;

const DRAFT_EXCERPT_CHARS: usize = 600;

/// Config-file defaults with CLI flags on top.
fn build_params(defaults: GlobalParameters, args: &ComposeArgs) -> GlobalParameters {
    GlobalParameters {
        style: args.style.clone().unwrap_or(defaults.style),
        tempo: args.tempo.unwrap_or(defaults.tempo),
        key: args.key.clone().unwrap_or(defaults.key),
        time_signature: args
            .time_signature
            .clone()
            .unwrap_or(defaults.time_signature),
        measures: args.measures.unwrap_or(defaults.measures),
        instruments: if args.instruments.is_empty() {
            defaults.instruments
        } else {
            args.instruments.clone()
        },
    }
}

pub async fn cmd_compose(project_dir: &Path, verbose: bool, args: &ComposeArgs) -> Result<()> {
    let paths = ProjectPaths::new(project_dir.to_path_buf());
    let toml = paths.load_config()?;
    for warning in toml.validate() {
        warn!("{}", warning);
    }

    let params = build_params(toml.defaults.to_params(), args);
    let start_from = args
        .start_from
        .as_deref()
        .map(str::parse::<Stage>)
        .transpose()?;

    let config = SequencerConfig {
        resumable: args.resumable,
        start_from,
        max_retries: args.max_retries.unwrap_or(toml.pipeline.max_retries),
        parallel: toml.pipeline.parallel && !args.sequential,
        output_dir: paths.output_dir(&toml),
        output_name: args.output.clone().unwrap_or_else(|| "symphony".to_string()),
    };

    let generator = CommandGenerator::new(toml.generator_settings(project_dir));
    let renderer = match &toml.render.musescore_path {
        Some(musescore) => {
            MidiRenderer::new().with_musescore(musescore.clone(), toml.render.export_formats.clone())
        }
        None => MidiRenderer::new(),
    };
    let store = CheckpointStore::new(paths.checkpoint_dir(&toml));
    let evaluator = Evaluator::new(toml.evaluator_config());
    let ui = ComposerUI::new(verbose);
    let mut gate: Box<dyn ContinueGate> = match args.max_rounds {
        Some(rounds) => Box::new(BudgetGate::new(rounds)),
        None => Box::new(InteractiveGate::new()),
    };

    let sequencer = Sequencer::new(config, &generator, &renderer, &store, &evaluator, &ui);
    let outcome = sequencer.run(params, gate.as_mut()).await?;

    ui.show_failures(outcome.failures.iter().map(|failure| {
        let mut reason = format!("{} (stage {})", failure.error, failure.stage);
        if let InstrumentError::Realization(err) = &failure.error {
            reason.push_str("\n    last draft:\n");
            reason.push_str(&err.last_draft_excerpt(DRAFT_EXCERPT_CHARS));
        }
        (failure.instrument.as_str(), reason)
    }));

    match outcome.status {
        RunStatus::Passed { rounds } => ui.passed(rounds),
        RunStatus::StoppedByUser { rounds, .. } => ui.stopped_by_user(rounds),
    }
    Ok(())
}
