//! `symphony checkpoints`: list or clear stage checkpoints.

use std::path::Path;

use anyhow::Result;
use symphony::checkpoint::CheckpointStore;
use symphony::config::ProjectPaths;
use symphony::pipeline::Stage;

use super::super::CheckpointCommands;

pub fn cmd_checkpoints(project_dir: &Path, command: Option<CheckpointCommands>) -> Result<()> {
    let paths = ProjectPaths::new(project_dir.to_path_buf());
    let toml = paths.load_config()?;
    let store = CheckpointStore::new(paths.checkpoint_dir(&toml));

    match command {
        None | Some(CheckpointCommands::List) => {
            let summaries = store.list()?;
            println!();
            if summaries.is_empty() {
                println!("No checkpoints in {}", store.dir().display());
                println!();
                return Ok(());
            }
            println!("Checkpoints in {}", store.dir().display());
            println!();
            println!("{:<3} {:<22} {:<26} Params", "#", "Stage", "Saved at");
            println!("{:<3} {:<22} {:<26} ------", "-", "-----", "--------");
            for summary in summaries {
                println!(
                    "{:<3} {:<22} {:<26} {}",
                    summary.stage.number(),
                    summary.stage.name(),
                    summary.saved_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                    console::style(&summary.params_hash).dim()
                );
            }
            println!();
        }
        Some(CheckpointCommands::Clear { stage: Some(name) }) => {
            let stage: Stage = name.parse()?;
            if store.clear(stage)? {
                println!("Cleared checkpoint for {}", stage);
            } else {
                println!("No checkpoint for {}", stage);
            }
        }
        Some(CheckpointCommands::Clear { stage: None }) => {
            let removed = store.clear_all()?;
            println!("Cleared {} checkpoint(s)", removed);
        }
    }
    Ok(())
}
