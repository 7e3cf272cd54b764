//! Interactive conversation command

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parley_core::{InMemoryStore, Session};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::open_services;

/// Read messages from stdin until `/quit` or end of input
pub async fn cmd_chat(reference: NaiveDate) -> Result<()> {
    let services = open_services()?;
    let session = Session::new(services, Arc::new(InMemoryStore::new())).with_reference_date(reference);

    println!("💬 Tell me about your transactions. /reset starts over, /quit leaves.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            println!();
            break;
        };
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset().await;
                println!("parley> Starting over.");
                continue;
            }
            _ => {}
        }

        let outcome = session.handle_message(message).await;
        println!("parley> {}", outcome.reply);

        // Background imports post their report into the log when done
        if let Some(handle) = outcome.background {
            handle.await.context("Background import panicked")?;
            if let Some(report) = session.snapshot().await.messages.last() {
                println!("parley> {}", report.content);
            }
        }
    }

    let stored = session.store().list()?;
    println!("Captured {} transaction(s) this session.", stored.len());
    for tx in &stored {
        println!("  {}", tx.summary());
    }
    Ok(())
}
