use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Settings;
use crate::definition::WorkflowDefinition;

#[derive(Parser, Debug)]
#[command(name = "cloudflow")]
#[command(about = "Compose shell commands, cloud jobs and bulk transfers into one controlled run")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true)]
    pub verbose: bool,

    #[arg(long, short, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow definition
    Run {
        #[arg(help = "Path to workflow definition file")]
        file: PathBuf,

        #[arg(long, conflicts_with = "only", help = "Start at this step and run the rest")]
        from: Option<String>,

        #[arg(long, help = "Run this step alone")]
        only: Option<String>,
    },

    /// Print the step listing of a workflow definition
    Summary {
        #[arg(help = "Path to workflow definition file")]
        file: PathBuf,
    },

    /// Initialize config
    Init {
        #[arg(short, long, help = "Force overwrite existing configuration")]
        force: bool,
    },
}

pub async fn execute(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Run { file, from, only } => {
            handle_run_command(file, from.as_deref(), only.as_deref(), args.config.as_deref()).await
        },
        Commands::Summary { file } => {
            handle_summary_command(file, args.config.as_deref())
        },
        Commands::Init { force } => {
            handle_init_command(*force, args.config.as_deref())
        },
    }
}

async fn handle_run_command(
    file: &Path,
    from: Option<&str>,
    only: Option<&str>,
    config: Option<&Path>,
) -> Result<()> {
    let settings = Settings::load(config)?;
    let workflow = WorkflowDefinition::load(file)?.build(&settings)?;
    info!("Running workflow {} ({} steps)", file.display(), workflow.len());

    let outcome = match (from, only) {
        (Some(name), _) => workflow.run_from(name).await,
        (None, Some(name)) => workflow.run_only(name).await,
        (None, None) => workflow.run().await,
    };
    outcome.with_context(|| format!("Workflow {} failed", file.display()))
}

fn handle_summary_command(file: &Path, config: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config)?;
    let workflow = WorkflowDefinition::load(file)?.build(&settings)?;
    println!("{}", workflow.summary());
    Ok(())
}

fn handle_init_command(force: bool, config: Option<&Path>) -> Result<()> {
    let path = match config {
        Some(path) => {
            Settings::init_at(path, force)?;
            path.to_path_buf()
        },
        None => Settings::init(force)?,
    };
    println!("Configuration initialized at {}", path.display());
    Ok(())
}
