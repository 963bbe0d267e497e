use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::evaluate::EvaluationResult;
use crate::pipeline::Stage;
use crate::ui::icons::{CHECK, CROSS, DISK, NOTE, REVIEW, SCORE, SPARKLE, STOP, WARN};

/// Terminal output for a composition run, rendered via `indicatif`.
///
/// A stage bar tracks the five stages; fan-out stages add a per-instrument
/// bar beneath it and single-call stages a spinner. All lines go through the
/// `MultiProgress` so they never tear the bars.
pub struct ComposerUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    verbose: bool,
}

impl ComposerUI {
    pub fn new(verbose: bool) -> Self {
        Self::with_multi(MultiProgress::new(), verbose)
    }

    /// A UI that draws nothing, for tests and non-interactive callers.
    pub fn hidden() -> Self {
        Self::with_multi(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            false,
        )
    }

    fn with_multi(multi: MultiProgress, verbose: bool) -> Self {
        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(Stage::ALL.len() as u64));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        Self {
            multi,
            stage_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!`.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn start_stage(&self, stage: Stage) {
        self.stage_bar.set_message(format!(
            "{}: {}",
            style(stage.name()).yellow(),
            stage.description()
        ));
    }

    pub fn stage_loaded(&self, stage: Stage) {
        self.stage_bar.inc(1);
        self.print_line(format!(
            "{} Stage {} {} loaded from checkpoint",
            DISK,
            stage.number(),
            style(stage.name()).cyan()
        ));
    }

    pub fn stage_complete(&self, stage: Stage) {
        self.stage_bar.inc(1);
        self.print_line(format!(
            "{} Stage {} {} complete",
            CHECK,
            stage.number(),
            style(stage.name()).green().bold()
        ));
    }

    pub fn stage_failed(&self, stage: Stage, reason: &str) {
        self.print_line(format!(
            "{} Stage {} {} failed: {}",
            CROSS,
            stage.number(),
            style(stage.name()).red().bold(),
            reason
        ));
    }

    /// Spinner for a single generator call. Finish it with [`Self::finish_spinner`].
    pub fn spinner(&self, msg: &str) -> ProgressBar {
        let spinner = self.multi.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner} {msg} {elapsed:.dim}")
                .expect("progress bar template is a valid static string"),
        );
        spinner.set_message(msg.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    pub fn finish_spinner(&self, spinner: ProgressBar) {
        spinner.finish_and_clear();
        self.multi.remove(&spinner);
    }

    /// Bar counting instruments through a fan-out stage.
    pub fn start_fanout(&self, label: &str, total: usize) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {prefix:.dim} [{bar:30.green/white}] {pos}/{len} {msg}")
                .expect("progress bar template is a valid static string")
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());
        bar
    }

    pub fn fanout_item_done(&self, bar: &ProgressBar, instrument: &str, error: Option<&str>) {
        bar.inc(1);
        match error {
            None => {
                bar.set_message(instrument.to_string());
                if self.verbose {
                    self.print_line(format!("    {} {}", NOTE, style(instrument).green()));
                }
            }
            Some(reason) => self.print_line(format!(
                "    {} {}: {}",
                CROSS,
                style(instrument).red(),
                reason
            )),
        }
    }

    pub fn finish_fanout(&self, bar: ProgressBar) {
        bar.finish_and_clear();
        self.multi.remove(&bar);
    }

    pub fn show_evaluation(&self, round: u32, evaluation: &EvaluationResult) {
        let verdict = if evaluation.passed() {
            style("passed").green().bold()
        } else {
            style("needs revision").yellow().bold()
        };
        self.print_line(format!("{} Evaluation {}: {}", REVIEW, round, verdict));
        for item in evaluation.feedback() {
            self.print_line(format!(
                "    {} {}",
                style(format!("[{}]", item.target)).cyan(),
                item.message
            ));
        }
    }

    pub fn show_round(&self, round: u32, revised: &[String], skipped: &[String], failed: &[String]) {
        self.print_line(format!(
            "  Round {}: {} revised, {} skipped, {} failed",
            style(round).cyan(),
            style(revised.len()).green(),
            style(skipped.len()).dim(),
            style(failed.len()).red()
        ));
        for instrument in failed {
            self.print_line(format!("    {} {} kept its previous part", WARN, instrument));
        }
    }

    pub fn render_failed(&self, dest: &Path, reason: &str) {
        self.print_line(format!(
            "  {} could not render {}: {}",
            WARN,
            dest.display(),
            style(reason).yellow()
        ));
    }

    pub fn show_artifacts(&self, artifacts: &[PathBuf]) {
        for path in artifacts {
            self.print_line(format!("  {} {}", SCORE, path.display()));
        }
    }

    pub fn passed(&self, rounds: u32) {
        self.stage_bar.finish_and_clear();
        self.print_line(format!(
            "\n{} Score passed evaluation after {} revision round(s)\n",
            SPARKLE,
            style(rounds).green().bold()
        ));
    }

    pub fn stopped_by_user(&self, rounds: u32) {
        self.stage_bar.finish_and_clear();
        self.print_line(format!(
            "\n{} Stopped by user after {} revision round(s); parts kept as they are\n",
            STOP,
            style(rounds).yellow().bold()
        ));
    }

    pub fn show_failures<'a>(&self, failures: impl IntoIterator<Item = (&'a str, String)>) {
        for (instrument, reason) in failures {
            self.print_line(format!(
                "  {} {}: {}",
                CROSS,
                style(instrument).red().bold(),
                reason
            ));
        }
    }
}
