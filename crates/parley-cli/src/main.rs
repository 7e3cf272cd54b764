//! Parley CLI - Conversational transaction capture
//!
//! Usage:
//!   parley chat                       Talk about your transactions
//!   parley extract --text "..."       Extract transactions as JSON
//!   parley import --file statement    Import a pasted statement
//!   parley check                      Test the LLM backend

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let reference = commands::resolve_reference_date(cli.reference_date.as_deref())?;

    match cli.command {
        Commands::Chat => commands::cmd_chat(reference).await,
        Commands::Extract { text, file } => {
            let text = commands::read_input(text, file.as_deref())?;
            commands::cmd_extract(&text, reference).await
        }
        Commands::Import {
            file,
            direction,
            json,
        } => commands::cmd_import(&file, direction.map(Into::into), json, reference).await,
        Commands::Check => commands::cmd_check().await,
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
