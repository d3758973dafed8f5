//! CLI definitions for tuflow-inspect.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tuflow-inspect",
    version,
    about = "Inspect a TUFLOW model without running it",
    after_help = "Examples:\n  tuflow-inspect inputs model.tcf\n  tuflow-inspect files model.tcf -s D01 -e Q100\n  tuflow-inspect conditions model.tcf --settings review.toml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every control file as it would be written.
    Preview(ModelArgs),
    /// List inputs; with -s/-e only the active ones, values substituted.
    Inputs(ModelArgs),
    /// List referenced files; with -s/-e only those of active inputs.
    Files(ModelArgs),
    /// List missing files, unparsed lines and block problems.
    Conditions(ModelArgs),
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Root control file (.tcf).
    pub tcf: PathBuf,
    /// Scenario, in slot order (repeatable).
    #[arg(short = 's', long = "scenario")]
    pub scenarios: Vec<String>,
    /// Event, in slot order (repeatable).
    #[arg(short = 'e', long = "event")]
    pub events: Vec<String>,
    /// Settings file; defaults to tuflow-model.toml beside the control file.
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

impl ModelArgs {
    /// Returns `true` when a scenario or event was selected.
    pub fn has_context(&self) -> bool {
        !self.scenarios.is_empty() || !self.events.is_empty()
    }
}
