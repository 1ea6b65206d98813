use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "prgate",
    version,
    about = "Pull-request gate: generate persona scenarios, dispatch an agent, verify outcomes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Full gate for one change: persist, dispatch, verify
    Run(RunArgs),
    /// Print the scenario set that `run` would persist
    Plan(PlanArgs),
    /// Re-verify an existing run from the store
    Verify(VerifyArgs),
    /// Print a run's hierarchy as JSON
    Show(ShowArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Change reference: a pull request URL or owner/repo#N
    #[arg(long, env = "PRGATE_PR")]
    pub pr: String,

    /// Pre-authored scenarios (YAML or JSON); skips the LLM and the GitHub fetch
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides `db_path` from the config
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Overrides `deployment_url` from the config
    #[arg(long)]
    pub deployment: Option<String>,

    /// Also write a JUnit XML report
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Treat unknown config keys as errors
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Clone)]
pub struct PlanArgs {
    #[arg(long)]
    pub pr: Option<String>,

    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub deployment: Option<String>,
}

#[derive(Parser, Clone)]
pub struct VerifyArgs {
    #[arg(long)]
    pub run_id: i64,

    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub junit: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct ShowArgs {
    #[arg(long)]
    pub run_id: i64,

    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,
}
