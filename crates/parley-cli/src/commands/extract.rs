//! One-shot extraction command

use anyhow::Result;
use chrono::NaiveDate;
use parley_core::ExtractionResult;
use serde_json::json;

use super::open_services;

/// Run the extraction cascade on `text` and print the result as JSON
pub async fn cmd_extract(text: &str, reference: NaiveDate) -> Result<()> {
    let services = open_services()?;
    let result = services.orchestrator.extract(text, reference).await;
    println!("{}", serde_json::to_string_pretty(&extraction_json(&result))?);
    Ok(())
}

pub fn extraction_json(result: &ExtractionResult) -> serde_json::Value {
    json!({
        "batchId": result.batch_id,
        "strategy": result.strategy.as_str(),
        "count": result.transactions.len(),
        "transactions": result.transactions,
    })
}
