//! The evaluate / revise / ask loop run after every part is composed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::agent::PartAgent;
use crate::checkpoint::CheckpointStore;
use crate::errors::PipelineError;
use crate::evaluate::{EvaluationResult, Evaluator};
use crate::gates::ContinueGate;
use crate::generator::Generator;
use crate::instruments;
use crate::pipeline::Stage;
use crate::plan::GlobalParameters;
use crate::render::{RenderRequest, Renderer};
use crate::score::Part;
use crate::ui::ComposerUI;

/// What one revision round did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u32,
    /// Instruments whose part was replaced at least once.
    pub revised: Vec<String>,
    /// Feedback targets with no current part.
    pub skipped: Vec<String>,
    /// Instruments whose revision failed; their previous part is kept.
    pub failed: Vec<(String, String)>,
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEnd {
    Passed,
    StoppedByUser,
}

#[derive(Debug)]
pub struct CycleOutcome {
    pub end: CycleEnd,
    pub rounds: Vec<RoundReport>,
    pub last_evaluation: EvaluationResult,
}

/// Where applied rounds are written back in resumable mode.
pub struct WriteBack<'a> {
    pub store: &'a CheckpointStore,
    pub params_hash: &'a str,
}

pub struct RevisionCycle<'a> {
    pub params: &'a GlobalParameters,
    pub generator: &'a dyn Generator,
    pub evaluator: &'a Evaluator,
    pub renderer: &'a dyn Renderer,
    pub ui: &'a ComposerUI,
    pub max_retries: u32,
    pub revisions_dir: &'a Path,
    pub write_back: Option<WriteBack<'a>>,
}

impl RevisionCycle<'_> {
    /// Evaluate, revise and ask until the score passes or the gate declines.
    pub async fn run(
        &self,
        parts: &mut BTreeMap<String, Part>,
        gate: &mut dyn ContinueGate,
    ) -> Result<CycleOutcome, PipelineError> {
        let mut rounds = Vec::new();
        let mut evaluation = self.evaluate(parts).await?;
        self.ui.show_evaluation(1, &evaluation);

        let mut round = 0u32;
        while !evaluation.passed() {
            round += 1;
            let mut report = self.apply_round(round, &evaluation, parts).await;

            if !report.revised.is_empty()
                && let Some(write_back) = &self.write_back
            {
                write_back
                    .store
                    .save(Stage::GenerateDrafts, write_back.params_hash, &*parts)?;
            }

            let dest = self.revisions_dir.join(format!("revision_{}", round));
            let request = RenderRequest::new(parts, self.params);
            match self.renderer.render_preview(&request, &dest) {
                Ok(artifacts) => report.artifact = artifacts.into_iter().next(),
                Err(err) => {
                    warn!(round, "intermediate render failed: {}", err);
                    self.ui.render_failed(&dest, &err.to_string());
                }
            }

            let failed: Vec<String> = report.failed.iter().map(|(i, _)| i.clone()).collect();
            self.ui
                .show_round(round, &report.revised, &report.skipped, &failed);
            rounds.push(report);

            let carry_on = gate
                .should_continue(round, &evaluation)
                .map_err(PipelineError::Gate)?;
            if !carry_on {
                info!(round, "revision stopped by user");
                return Ok(CycleOutcome {
                    end: CycleEnd::StoppedByUser,
                    rounds,
                    last_evaluation: evaluation,
                });
            }

            evaluation = self.evaluate(parts).await?;
            self.ui.show_evaluation(round + 1, &evaluation);
        }

        info!(rounds = round, "score passed evaluation");
        Ok(CycleOutcome {
            end: CycleEnd::Passed,
            rounds,
            last_evaluation: evaluation,
        })
    }

    async fn evaluate(
        &self,
        parts: &BTreeMap<String, Part>,
    ) -> Result<EvaluationResult, PipelineError> {
        Ok(self
            .evaluator
            .evaluate(self.generator, parts, &self.params.instruments)
            .await?)
    }

    /// Apply every feedback item in order, each to the latest part.
    async fn apply_round(
        &self,
        round: u32,
        evaluation: &EvaluationResult,
        parts: &mut BTreeMap<String, Part>,
    ) -> RoundReport {
        let mut report = RoundReport {
            round,
            ..RoundReport::default()
        };

        for item in evaluation.feedback() {
            let (Some(current), Some(profile)) =
                (parts.get(&item.target), instruments::lookup(&item.target))
            else {
                warn!(instrument = %item.target, "feedback for an instrument without a part; skipped");
                if !report.skipped.contains(&item.target) {
                    report.skipped.push(item.target.clone());
                }
                continue;
            };

            let agent = PartAgent::new(profile, self.generator, self.max_retries);
            match agent.revise(self.params, current, &item.message).await {
                Ok(part) => {
                    parts.insert(item.target.clone(), part);
                    if !report.revised.contains(&item.target) {
                        report.revised.push(item.target.clone());
                    }
                }
                Err(err) => {
                    warn!(instrument = %item.target, "revision failed, keeping previous part: {}", err);
                    report.failed.push((item.target.clone(), err.to_string()));
                }
            }
        }

        report
    }
}
