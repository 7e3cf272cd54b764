//! Bulk statement import command

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parley_core::{BulkEvent, BulkReport, Direction, InMemoryStore, Services, TransactionStore};
use tokio::sync::mpsc;

use super::{open_services, truncate};

pub async fn cmd_import(
    file: &Path,
    direction: Option<Direction>,
    json: bool,
    reference: NaiveDate,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    println!("📥 Importing {}...", file.display());

    let services = open_services()?;
    let store = InMemoryStore::new();
    let report = import_text(&services, &text, direction, reference, &store).await?;

    for chunk in report.chunks.iter().filter(|c| c.error.is_some()) {
        println!(
            "   ⚠️  Chunk {} failed: {} ({})",
            chunk.index + 1,
            chunk.error.as_deref().unwrap_or("unknown error"),
            truncate(chunk.text.lines().next().unwrap_or(""), 40)
        );
    }

    println!("\n✅ {}", report.message());
    if report.needs_direction {
        println!("   Directions are unknown. Re-run with --direction income|expense to label them.");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&store.list()?)?);
    } else {
        for tx in &report.added {
            println!("   {}", tx.summary());
        }
    }

    Ok(())
}

/// Run the bulk pipeline on `text` and commit the result into `store`
///
/// Progress is printed to stderr while chunks are extracted.
pub async fn import_text(
    services: &Services,
    text: &str,
    direction: Option<Direction>,
    reference: NaiveDate,
    store: &dyn TransactionStore,
) -> Result<BulkReport> {
    let (events, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BulkEvent::Segmented { chunks } => eprintln!("   Split into {} chunk(s)", chunks),
                BulkEvent::Progress {
                    completed,
                    total,
                    percent,
                } => eprintln!("   {:>3}% ({}/{} chunks)", percent, completed, total),
            }
        }
    });

    let result = services
        .bulk
        .run_and_commit(text, reference, store, direction, Some(&events))
        .await;
    drop(events);
    let _ = printer.await;

    result.context("Import failed")
}
