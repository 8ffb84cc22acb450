use anyhow::Result;
use clap::{Parser, Subcommand};
use lifecycle::orchestrator::FailedLevelTeardown;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "lifecycle")]
#[command(
    version,
    about = "Run class-level setup and teardown hooks with strict stack discipline"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the order a successful run would invoke callbacks in
    Order {
        /// Path to the plan file (TOML)
        plan: PathBuf,
    },
    /// Check a plan file for errors and warnings
    Validate {
        /// Path to the plan file (TOML)
        plan: PathBuf,
    },
    /// Execute the class lifecycle described by a plan
    #[command(after_help = "Ctrl-C cancels the remaining setup; teardown of what was \
already set up still runs. Press Ctrl-C a second time to abort immediately \
(exit code 130) without finishing teardown.")]
    Run {
        /// Path to the plan file (TOML)
        plan: PathBuf,

        /// Print the execution outcome as JSON
        #[arg(long)]
        json: bool,

        /// Whether the level whose setup failed is torn down (skip, run).
        /// Overrides the plan's setting.
        #[arg(long)]
        failed_level_teardown: Option<FailedLevelTeardown>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    lifecycle::logging::init_subscriber(cli.verbose);

    match &cli.command {
        Commands::Order { plan } => cmd::cmd_order(plan)?,
        Commands::Validate { plan } => cmd::cmd_validate(plan)?,
        Commands::Run {
            plan,
            json,
            failed_level_teardown,
        } => cmd::cmd_run(plan, *json, *failed_level_teardown).await?,
    }

    Ok(())
}
