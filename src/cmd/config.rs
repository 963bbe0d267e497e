//! Configuration view, validation and initialization: `symphony config`.

use std::path::Path;

use anyhow::Result;
use symphony::config::{ENV_GENERATOR_CMD, ENV_MUSESCORE, ProjectPaths, SymphonyToml};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let paths = ProjectPaths::new(project_dir.to_path_buf());
    let config_path = paths.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Symphony Configuration");
            println!("======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No symphony.toml found at {}; using defaults.", config_path.display());
            }
            println!(
                "Environment overrides: {}, {}",
                ENV_GENERATOR_CMD, ENV_MUSESCORE
            );
            println!();

            let toml = paths.load_config()?;
            println!("{}", toml.to_toml_string()?);

            if !config_path.exists() {
                println!("Run 'symphony config init' to create a symphony.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            if !config_path.exists() {
                println!("No symphony.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = SymphonyToml::load(&config_path)?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("symphony.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            SymphonyToml::default().save(&config_path)?;

            println!("Created symphony.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [generator] command, args, timeout_secs");
            println!("  - [pipeline] max_retries, parallel, checkpoint_dir, output_dir");
            println!("  - [evaluation] min_notes, extra_critical_phrases");
            println!("  - [render] musescore_path, export_formats");
            println!("  - [defaults] style, tempo, key, time_signature, measures, instruments");
            println!();
        }
    }
    Ok(())
}
