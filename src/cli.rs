//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mindmeld", version, about = "Synthesize mindmaps from long markdown documents")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the synthesis pipeline over a document.
    Run {
        /// Input markdown file.
        input: PathBuf,

        /// Run name; defaults to the input file stem.
        #[arg(long)]
        run_name: Option<String>,

        /// Recompute every step, ignoring cached artifacts.
        #[arg(long)]
        force: bool,

        /// Comma-separated subset of steps to execute
        /// (segment,qa,summarize,cluster,merge,refine,map,qa-map).
        #[arg(long, value_delimiter = ',')]
        steps: Option<Vec<String>>,

        /// Generate and map question/answer pairs.
        #[arg(long)]
        qa: bool,
    },

    /// Load and validate the configuration, then exit.
    ValidateConfig,
}
