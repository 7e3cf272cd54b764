//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use parley_core::Direction;

/// Parley - Capture transactions by talking about them
#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Conversational capture of financial transactions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Date that relative phrases ("yesterday", "last Monday") resolve against
    ///
    /// Format YYYY-MM-DD. Defaults to today.
    #[arg(long, global = true)]
    pub reference_date: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive conversation
    ///
    /// Type `/reset` to start over, `/quit` or Ctrl-D to leave.
    Chat,

    /// Extract transactions from text and print them as JSON
    Extract {
        /// Text to extract from
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// File to read the text from
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Import a pasted statement through the bulk pipeline
    Import {
        /// Statement text file
        #[arg(short, long)]
        file: PathBuf,

        /// Label every imported transaction with this direction
        #[arg(short, long)]
        direction: Option<DirectionArg>,

        /// Print the imported transactions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the LLM backend connection and model routing
    Check,

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

/// Direction override accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Income,
    Expense,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Income => Direction::In,
            DirectionArg::Expense => Direction::Out,
        }
    }
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show the content of a prompt
    Show {
        /// Prompt ID (e.g., "extract_transactions")
        prompt_id: String,
    },

    /// Print the override directory
    Path,
}
