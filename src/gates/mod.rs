use anyhow::Result;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing::warn;

use crate::evaluate::EvaluationResult;

/// The decision point between revision rounds. Returning `false` stops the
/// run with every part left as it is.
pub trait ContinueGate {
    fn should_continue(&mut self, round: u32, evaluation: &EvaluationResult) -> Result<bool>;
}

/// Asks the operator on the terminal.
pub struct InteractiveGate {
    theme: ColorfulTheme,
}

impl InteractiveGate {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for InteractiveGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinueGate for InteractiveGate {
    fn should_continue(&mut self, round: u32, evaluation: &EvaluationResult) -> Result<bool> {
        if !console::user_attended() {
            warn!("no terminal attached; stopping after round {}", round);
            return Ok(false);
        }

        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(format!(
                "Round {} left {} open item(s). Continue revising?",
                round,
                evaluation.feedback().len()
            ))
            .default(true)
            .interact()?;
        Ok(answer)
    }
}

/// Continues without asking until `max_rounds` rounds have been applied.
pub struct BudgetGate {
    max_rounds: u32,
}

impl BudgetGate {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }
}

impl ContinueGate for BudgetGate {
    fn should_continue(&mut self, round: u32, _evaluation: &EvaluationResult) -> Result<bool> {
        if round >= self.max_rounds {
            println!(
                "  {} revision budget of {} round(s) used",
                console::style("Stopping:").dim(),
                self.max_rounds
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Replays a fixed list of answers, then declines.
#[cfg(test)]
pub(crate) struct ScriptedGate {
    answers: std::collections::VecDeque<bool>,
    pub asked: Vec<u32>,
}

#[cfg(test)]
impl ScriptedGate {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            asked: Vec::new(),
        }
    }
}

#[cfg(test)]
impl ContinueGate for ScriptedGate {
    fn should_continue(&mut self, round: u32, _evaluation: &EvaluationResult) -> Result<bool> {
        self.asked.push(round);
        Ok(self.answers.pop_front().unwrap_or(false))
    }
}
