use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use symphony::errors::{ConfigurationError, PipelineError};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "symphony")]
#[command(version, about = "Staged, resumable multi-part score composer")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compose a score, stage by stage
    Compose(ComposeArgs),
    /// List the supported instruments
    Instruments,
    /// Inspect or clear stage checkpoints
    Checkpoints {
        #[command(subcommand)]
        command: Option<CheckpointCommands>,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct ComposeArgs {
    /// Musical style (classical, romantic, baroque, ...)
    #[arg(long)]
    pub style: Option<String>,

    /// Beats per minute
    #[arg(long)]
    pub tempo: Option<u32>,

    /// Key, e.g. "D minor"
    #[arg(long)]
    pub key: Option<String>,

    /// Time signature as N/M
    #[arg(long)]
    pub time_signature: Option<String>,

    #[arg(long)]
    pub measures: Option<u32>,

    /// Instrument to include; repeat for each one
    #[arg(short, long = "instrument")]
    pub instruments: Vec<String>,

    /// Load existing checkpoints and save each completed stage
    #[arg(long)]
    pub resumable: bool,

    /// Rerun from this stage, loading every earlier stage from its checkpoint
    #[arg(long)]
    pub start_from: Option<String>,

    /// Drafts validated per part before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Revise without prompting, for at most this many rounds
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// File name (without extension) of the final score
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compose one instrument at a time
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Subcommand, Clone)]
pub enum CheckpointCommands {
    /// Show stored checkpoints
    List,
    /// Delete one checkpoint, or all of them
    Clear {
        #[arg(long)]
        stage: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default symphony.toml file
    Init,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "symphony=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Configuration problems exit with 2, everything else with 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigurationError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<PipelineError>() {
        Some(pipeline) if pipeline.is_configuration() => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Compose(args) => cmd::cmd_compose(&project_dir, cli.verbose, args).await?,
        Commands::Instruments => cmd::cmd_instruments(),
        Commands::Checkpoints { command } => cmd::cmd_checkpoints(&project_dir, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", console::style("error:").red().bold(), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}
