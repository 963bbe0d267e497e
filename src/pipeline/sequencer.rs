//! Runs the five stages in order.
//!
//! In resumable mode a stage whose checkpoint exists is loaded instead of
//! executed; once any stage executes, every later stage executes too.
//! `start_from` loads every earlier stage (all of which must be
//! checkpointed) and executes the rest.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::agent::PartAgent;
use crate::checkpoint::CheckpointStore;
use crate::errors::{ConfigurationError, InstrumentError, PersistenceError, PipelineError};
use crate::evaluate::{EvaluationResult, Evaluator};
use crate::gates::ContinueGate;
use crate::generator::{Generator, InstructionRequest, PlanRequest, StructureRequest};
use crate::instruments::InstrumentProfile;
use crate::pipeline::revision::{CycleEnd, RevisionCycle, RoundReport, WriteBack};
use crate::pipeline::state::{InstrumentFailure, RunState};
use crate::pipeline::Stage;
use crate::plan::{CompositionPlan, GlobalParameters, PartInstruction, StructurePlan};
use crate::realize::DEFAULT_MAX_RETRIES;
use crate::render::{RenderRequest, Renderer};
use crate::score::Part;
use crate::theory::{StyleGuide, TheoryDatabase};
use crate::ui::ComposerUI;

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Load existing checkpoints and save each executed stage.
    pub resumable: bool,
    pub start_from: Option<Stage>,
    pub max_retries: u32,
    /// Run per-instrument work concurrently.
    pub parallel: bool,
    pub output_dir: PathBuf,
    /// File stem of the final score.
    pub output_name: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            resumable: false,
            start_from: None,
            max_retries: DEFAULT_MAX_RETRIES,
            parallel: true,
            output_dir: PathBuf::from("output"),
            output_name: "symphony".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum RunStatus {
    Passed {
        rounds: u32,
    },
    StoppedByUser {
        rounds: u32,
        last_evaluation: EvaluationResult,
    },
}

/// Terminal state of a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub parts: BTreeMap<String, Part>,
    pub failures: Vec<InstrumentFailure>,
    pub rounds: Vec<RoundReport>,
    pub artifacts: Vec<PathBuf>,
}

/// Decides per stage whether to load a checkpoint.
struct ResumePolicy {
    resumable: bool,
    start_from: Option<Stage>,
    executed: bool,
}

impl ResumePolicy {
    fn should_load(&self, stage: Stage) -> bool {
        match self.start_from {
            Some(start) => stage < start,
            None => self.resumable && !self.executed,
        }
    }
}

pub struct Sequencer<'a> {
    config: SequencerConfig,
    generator: &'a dyn Generator,
    renderer: &'a dyn Renderer,
    store: &'a CheckpointStore,
    evaluator: &'a Evaluator,
    ui: &'a ComposerUI,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        config: SequencerConfig,
        generator: &'a dyn Generator,
        renderer: &'a dyn Renderer,
        store: &'a CheckpointStore,
        evaluator: &'a Evaluator,
        ui: &'a ComposerUI,
    ) -> Self {
        Self {
            config,
            generator,
            renderer,
            store,
            evaluator,
            ui,
        }
    }

    /// Validate the request, then run every stage.
    ///
    /// Configuration problems (roster, parameters, missing checkpoints for
    /// `start_from`) are reported before any generator call.
    pub async fn run(
        &self,
        mut params: GlobalParameters,
        gate: &mut dyn ContinueGate,
    ) -> Result<RunOutcome, PipelineError> {
        let profiles = params.validate()?;

        if let Some(start) = self.config.start_from
            && let Some(required) = start.prerequisites().find(|s| !self.store.exists(*s))
        {
            return Err(ConfigurationError::MissingCheckpoint {
                stage: start,
                required,
            }
            .into());
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.run_stages(run_id, &params, &profiles, gate)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        params: &GlobalParameters,
        profiles: &[&'static InstrumentProfile],
        gate: &mut dyn ContinueGate,
    ) -> Result<RunOutcome, PipelineError> {
        let params_hash = params.content_hash();
        let mut policy = ResumePolicy {
            resumable: self.config.resumable,
            start_from: self.config.start_from,
            executed: false,
        };
        let mut state = RunState::default();
        info!(instruments = profiles.len(), params_hash = %params_hash, "run started");

        let stage = Stage::DesignFramework;
        self.ui.start_stage(stage);
        match self.load::<StructurePlan>(stage, &params_hash, &mut policy)? {
            Some(structure) => {
                state.set_structure(structure);
                self.ui.stage_loaded(stage);
            }
            None => {
                let structure = self.design_framework(params).await?;
                self.save(stage, &params_hash, &structure)?;
                state.set_structure(structure);
                self.ui.stage_complete(stage);
            }
        }

        let stage = Stage::PlanComposition;
        self.ui.start_stage(stage);
        match self.load::<CompositionPlan>(stage, &params_hash, &mut policy)? {
            Some(plan) => {
                state.set_plan(plan);
                self.ui.stage_loaded(stage);
            }
            None => {
                let structure = require(state.structure(), stage, "structure plan")?;
                let plan = self.plan_composition(params, structure).await?;
                self.save(stage, &params_hash, &plan)?;
                state.set_plan(plan);
                self.ui.stage_complete(stage);
            }
        }

        let stage = Stage::GenerateInstructions;
        self.ui.start_stage(stage);
        match self.load::<BTreeMap<String, PartInstruction>>(stage, &params_hash, &mut policy)? {
            Some(mut instructions) => {
                for profile in profiles {
                    if let Some(instruction) = instructions.remove(profile.id) {
                        state.add_instruction(profile.id.to_string(), instruction);
                    }
                }
                warn_dropped(stage, instructions.keys());
                self.ui.stage_loaded(stage);
            }
            None => {
                let results = {
                    let structure = require(state.structure(), stage, "structure plan")?;
                    let plan = require(state.plan(), stage, "composition plan")?;
                    self.generate_instructions(params, profiles, structure, plan)
                        .await
                };
                for (profile, result) in results {
                    match result {
                        Ok(instruction) => {
                            state.add_instruction(profile.id.to_string(), instruction)
                        }
                        Err(err) => {
                            warn!(instrument = profile.id, "instruction failed: {}", err);
                            state.record_failure(stage, err);
                        }
                    }
                }
                self.save(stage, &params_hash, state.instructions())?;
                self.ui.stage_complete(stage);
            }
        }

        let stage = Stage::GenerateDrafts;
        self.ui.start_stage(stage);
        match self.load::<BTreeMap<String, Part>>(stage, &params_hash, &mut policy)? {
            Some(mut stored) => {
                for profile in profiles {
                    match stored.remove(profile.id) {
                        Some(part) => {
                            let part = part.revalidate(profile).map_err(|e| {
                                PersistenceError::Corrupt {
                                    stage,
                                    path: self.store.path_for(stage),
                                    detail: format!("{}: {}", profile.id, e),
                                }
                            })?;
                            state.add_part(profile.id.to_string(), part);
                        }
                        None => state.record_failure(
                            stage,
                            InstrumentError::MissingFromCheckpoint {
                                instrument: profile.id.to_string(),
                            },
                        ),
                    }
                }
                warn_dropped(stage, stored.keys());
                self.ui.stage_loaded(stage);
            }
            None => {
                let (briefed, unbriefed): (Vec<_>, Vec<_>) = profiles
                    .iter()
                    .copied()
                    .partition(|p| state.instructions().contains_key(p.id));
                for profile in unbriefed {
                    let already_failed = state.failures().iter().any(|f| f.instrument == profile.id);
                    if !already_failed {
                        state.record_failure(
                            stage,
                            InstrumentError::MissingInstruction {
                                instrument: profile.id.to_string(),
                            },
                        );
                    }
                }

                let results = {
                    let structure = require(state.structure(), stage, "structure plan")?;
                    self.generate_drafts(params, &briefed, structure, state.instructions())
                        .await
                };
                for (profile, result) in results {
                    match result {
                        Ok(part) => state.add_part(profile.id.to_string(), part),
                        Err(err) => {
                            warn!(instrument = profile.id, "part failed: {}", err);
                            state.record_failure(stage, err);
                        }
                    }
                }
                self.save(stage, &params_hash, state.parts())?;
                self.ui.stage_complete(stage);
            }
        }

        if state.parts().is_empty() {
            self.ui.stage_failed(stage, "no instrument produced a part");
            return Err(PipelineError::NoParts);
        }

        let stage = Stage::EvaluateAndRevise;
        self.ui.start_stage(stage);
        info!(stage = %stage, "stage started");
        let revisions_dir = self
            .config
            .output_dir
            .join("revisions")
            .join(run_id.to_string());
        let cycle = RevisionCycle {
            params,
            generator: self.generator,
            evaluator: self.evaluator,
            renderer: self.renderer,
            ui: self.ui,
            max_retries: self.config.max_retries,
            revisions_dir: &revisions_dir,
            write_back: self.config.resumable.then_some(WriteBack {
                store: self.store,
                params_hash: &params_hash,
            }),
        };
        let cycle_outcome = cycle.run(state.parts_mut(), gate).await?;
        self.ui.stage_complete(stage);

        let artifacts = self.render_final(params, state.parts());
        let rounds = cycle_outcome.rounds.len() as u32;
        let status = match cycle_outcome.end {
            CycleEnd::Passed => RunStatus::Passed { rounds },
            CycleEnd::StoppedByUser => RunStatus::StoppedByUser {
                rounds,
                last_evaluation: cycle_outcome.last_evaluation,
            },
        };
        let (parts, failures) = state.into_results();
        info!(parts = parts.len(), failures = failures.len(), "run finished");

        Ok(RunOutcome {
            run_id,
            status,
            parts,
            failures,
            rounds: cycle_outcome.rounds,
            artifacts,
        })
    }

    /// Checkpointed output of `stage`, if the policy says to load it.
    fn load<T: DeserializeOwned>(
        &self,
        stage: Stage,
        params_hash: &str,
        policy: &mut ResumePolicy,
    ) -> Result<Option<T>, PipelineError> {
        if !policy.should_load(stage) {
            policy.executed = true;
            return Ok(None);
        }

        match self.store.load::<T>(stage)? {
            Some(checkpoint) => {
                if checkpoint.params_hash != params_hash {
                    warn!(
                        stage = %stage,
                        saved = %checkpoint.params_hash,
                        current = %params_hash,
                        "checkpoint was saved with different parameters"
                    );
                }
                info!(stage = %stage, saved_at = %checkpoint.saved_at, "stage loaded from checkpoint");
                Ok(Some(checkpoint.payload))
            }
            None => {
                if let Some(start) = policy.start_from {
                    return Err(ConfigurationError::MissingCheckpoint {
                        stage: start,
                        required: stage,
                    }
                    .into());
                }
                policy.executed = true;
                Ok(None)
            }
        }
    }

    fn save<T: serde::Serialize>(
        &self,
        stage: Stage,
        params_hash: &str,
        payload: &T,
    ) -> Result<(), PipelineError> {
        if self.config.resumable {
            self.store.save(stage, params_hash, payload)?;
        }
        Ok(())
    }

    fn stage_failed(&self, stage: Stage, source: anyhow::Error) -> PipelineError {
        self.ui.stage_failed(stage, &format!("{:#}", source));
        PipelineError::StageFailed { stage, source }
    }

    async fn design_framework(&self, params: &GlobalParameters) -> Result<StructurePlan, PipelineError> {
        let stage = Stage::DesignFramework;
        info!(stage = %stage, "stage started");
        let guide = StyleGuide::for_style(&params.style);
        let request = StructureRequest {
            params,
            style: &guide,
            harmonic_options: TheoryDatabase::harmonic_options(&params.style),
            form_options: TheoryDatabase::form_options(),
        };

        let spinner = self.ui.spinner("designing the framework");
        let reply = self.generator.design_structure(&request).await;
        self.ui.finish_spinner(spinner);

        let value = reply
            .context("structure design call failed")
            .map_err(|e| self.stage_failed(stage, e))?;
        serde_json::from_value(value)
            .context("structure reply did not match the expected shape")
            .map_err(|e| self.stage_failed(stage, e))
    }

    async fn plan_composition(
        &self,
        params: &GlobalParameters,
        structure: &StructurePlan,
    ) -> Result<CompositionPlan, PipelineError> {
        let stage = Stage::PlanComposition;
        info!(stage = %stage, "stage started");
        let request = PlanRequest { params, structure };

        let spinner = self.ui.spinner("planning the composition");
        let reply = self.generator.plan_composition(&request).await;
        self.ui.finish_spinner(spinner);

        let value = reply
            .context("composition plan call failed")
            .map_err(|e| self.stage_failed(stage, e))?;
        serde_json::from_value(value)
            .context("plan reply did not match the expected shape")
            .map_err(|e| self.stage_failed(stage, e))
    }

    async fn generate_instructions(
        &self,
        params: &GlobalParameters,
        profiles: &[&'static InstrumentProfile],
        structure: &StructurePlan,
        plan: &CompositionPlan,
    ) -> Vec<(&'static InstrumentProfile, Result<PartInstruction, InstrumentError>)> {
        info!(stage = %Stage::GenerateInstructions, "stage started");
        self.fan_out("Briefs", profiles, |profile| async move {
            let role = structure.role_for(profile);
            let request = InstructionRequest {
                params,
                profile,
                role: &role,
                structure,
                plan,
            };
            let reply = self.generator.write_instruction(&request).await;
            reply
                .map_err(|source| InstrumentError::Generator {
                    instrument: profile.id.to_string(),
                    source,
                })
                .and_then(|value| {
                    serde_json::from_value::<PartInstruction>(value).map_err(|e| {
                        InstrumentError::Unparseable {
                            instrument: profile.id.to_string(),
                            detail: e.to_string(),
                        }
                    })
                })
        })
        .await
    }

    async fn generate_drafts(
        &self,
        params: &GlobalParameters,
        profiles: &[&'static InstrumentProfile],
        structure: &StructurePlan,
        instructions: &BTreeMap<String, PartInstruction>,
    ) -> Vec<(&'static InstrumentProfile, Result<Part, InstrumentError>)> {
        info!(stage = %Stage::GenerateDrafts, "stage started");
        self.fan_out("Parts", profiles, |profile| async move {
            match instructions.get(profile.id) {
                Some(instruction) => {
                    PartAgent::new(profile, self.generator, self.config.max_retries)
                        .compose(params, structure, instruction)
                        .await
                }
                None => Err(InstrumentError::MissingInstruction {
                    instrument: profile.id.to_string(),
                }),
            }
        })
        .await
    }

    /// Run `task` once per instrument; one failure never cancels the others.
    async fn fan_out<T, F, Fut>(
        &self,
        label: &str,
        profiles: &[&'static InstrumentProfile],
        task: F,
    ) -> Vec<(&'static InstrumentProfile, Result<T, InstrumentError>)>
    where
        F: Fn(&'static InstrumentProfile) -> Fut,
        Fut: Future<Output = Result<T, InstrumentError>>,
    {
        let bar = self.ui.start_fanout(label, profiles.len());
        let run_one = |profile: &'static InstrumentProfile| {
            let work = task(profile);
            let bar = &bar;
            async move {
                let result = work.await;
                let error = result.as_ref().err().map(ToString::to_string);
                self.ui.fanout_item_done(bar, profile.id, error.as_deref());
                (profile, result)
            }
        };

        let results = if self.config.parallel {
            join_all(profiles.iter().copied().map(&run_one)).await
        } else {
            let mut results = Vec::with_capacity(profiles.len());
            for profile in profiles.iter().copied() {
                results.push(run_one(profile).await);
            }
            results
        };
        self.ui.finish_fanout(bar);
        results
    }

    fn render_final(&self, params: &GlobalParameters, parts: &BTreeMap<String, Part>) -> Vec<PathBuf> {
        let dest = self.config.output_dir.join(&self.config.output_name);
        let request = RenderRequest::new(parts, params);
        match self.renderer.render(&request, &dest) {
            Ok(artifacts) => {
                self.ui.show_artifacts(&artifacts);
                artifacts
            }
            Err(err) => {
                warn!("final render failed: {}", err);
                self.ui.render_failed(&dest, &err.to_string());
                Vec::new()
            }
        }
    }
}

fn require<'s, T>(value: Option<&'s T>, stage: Stage, what: &str) -> Result<&'s T, PipelineError> {
    value.ok_or_else(|| PipelineError::StageFailed {
        stage,
        source: anyhow!("{} is not available", what),
    })
}

fn warn_dropped<'k>(stage: Stage, extra: impl Iterator<Item = &'k String>) {
    for instrument in extra {
        warn!(stage = %stage, instrument = %instrument, "checkpoint entry is not in this run; dropped");
    }
}
