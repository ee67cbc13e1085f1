use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::ENV_COOKBOOK;

#[derive(Parser)]
#[command(name = "watchpost")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge monitoring agents on managed hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the host facts rules are evaluated against
    Facts(FactsArgs),

    /// Preview what apply would change
    Plan(RunArgs),

    /// Converge this host
    Apply(ApplyArgs),

    /// List built-in recipes
    Recipes(RecipesArgs),

    /// Load and validate the cookbook without touching the host
    Validate(SourceArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

/// Where rules come from
#[derive(Args, Clone, Default)]
pub struct SourceArgs {
    /// Cookbook file (.toml or .json)
    #[arg(short, long, env = ENV_COOKBOOK)]
    pub cookbook: Option<PathBuf>,

    /// Built-in recipe to run (repeatable, runs in the given order)
    #[arg(short, long = "recipe", value_name = "NAME")]
    pub recipes: Vec<String>,
}

impl SourceArgs {
    pub fn is_empty(&self) -> bool {
        self.cookbook.is_none() && self.recipes.is_empty()
    }
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// JSON file of facts that override what the host reports
    #[arg(long, value_name = "FILE")]
    pub facts: Option<PathBuf>,

    /// Fail rules that reference a missing fact
    #[arg(long)]
    pub strict: bool,

    /// Kill external commands after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print a JSON report instead of a table
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct FactsArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Extra fact key to look up (repeatable), e.g. `directory:/etc/dd-agent`
    #[arg(short, long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    /// JSON file of facts that override what the host reports
    #[arg(long, value_name = "FILE")]
    pub facts: Option<PathBuf>,

    /// Print facts as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RecipesArgs {
    /// Show the rules of one recipe
    pub name: Option<String>,

    /// Print rules as JSON
    #[arg(long)]
    pub json: bool,
}
