//! CLI command tests

use std::io::Write;

use chrono::NaiveDate;
use clap::Parser;
use parley_core::{
    Direction, InMemoryStore, PipelineConfig, PromptId, PromptLibrary, Services, TransactionStore,
};

use crate::cli::{Cli, Commands, DirectionArg, PromptsAction};
use crate::commands::{self, truncate};

fn local_services() -> Services {
    let mut config = PipelineConfig::default();
    config.bulk.threshold_chars = 100;
    config.bulk.batch_pause = std::time::Duration::ZERO;
    Services::with_prompts(None, config, PromptLibrary::embedded_only())
}

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_chat_with_globals() {
    let cli = Cli::try_parse_from(["parley", "chat", "--verbose", "--reference-date", "2025-04-14"])
        .unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.reference_date.as_deref(), Some("2025-04-14"));
    assert!(matches!(cli.command, Commands::Chat));
}

#[test]
fn test_parse_extract_text() {
    let cli = Cli::try_parse_from(["parley", "extract", "--text", "Amazon $40"]).unwrap();
    match cli.command {
        Commands::Extract { text, file } => {
            assert_eq!(text.as_deref(), Some("Amazon $40"));
            assert!(file.is_none());
        }
        _ => panic!("expected extract"),
    }
}

#[test]
fn test_parse_extract_text_and_file_conflict() {
    let result = Cli::try_parse_from(["parley", "extract", "--text", "x", "--file", "a.txt"]);
    assert!(result.is_err());
}

#[test]
fn test_parse_import_direction() {
    let cli = Cli::try_parse_from([
        "parley",
        "import",
        "--file",
        "statement.txt",
        "--direction",
        "expense",
    ])
    .unwrap();
    match cli.command {
        Commands::Import {
            file,
            direction,
            json,
        } => {
            assert_eq!(file.to_str(), Some("statement.txt"));
            assert_eq!(direction, Some(DirectionArg::Expense));
            assert!(!json);
        }
        _ => panic!("expected import"),
    }

    let bad = Cli::try_parse_from(["parley", "import", "-f", "s.txt", "-d", "sideways"]);
    assert!(bad.is_err());
}

#[test]
fn test_parse_prompts_default_action() {
    let cli = Cli::try_parse_from(["parley", "prompts"]).unwrap();
    assert!(matches!(cli.command, Commands::Prompts { action: None }));

    let cli = Cli::try_parse_from(["parley", "prompts", "show", "segment_statement"]).unwrap();
    match cli.command {
        Commands::Prompts {
            action: Some(PromptsAction::Show { prompt_id }),
        } => assert_eq!(prompt_id, "segment_statement"),
        _ => panic!("expected prompts show"),
    }
}

#[test]
fn test_direction_arg_maps_to_direction() {
    assert_eq!(Direction::from(DirectionArg::Income), Direction::In);
    assert_eq!(Direction::from(DirectionArg::Expense), Direction::Out);
}

// ========== Shared Utility Tests ==========

#[test]
fn test_resolve_reference_date() {
    assert_eq!(
        commands::resolve_reference_date(Some("2025-04-14")).unwrap(),
        reference()
    );
    assert!(commands::resolve_reference_date(Some("04/14/2025")).is_err());
    assert!(commands::resolve_reference_date(None).is_ok());
}

#[test]
fn test_read_input_prefers_text() {
    let input = commands::read_input(Some("hello".into()), None).unwrap();
    assert_eq!(input, "hello");
    assert!(commands::read_input(None, None).is_err());
}

#[test]
fn test_read_input_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "Amazon $40.00 4/1/2025").unwrap();

    let input = commands::read_input(None, Some(file.path())).unwrap();
    assert_eq!(input, "Amazon $40.00 4/1/2025");

    let missing = commands::read_input(None, Some(std::path::Path::new("/nonexistent/x.txt")));
    assert!(missing.is_err());
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a longer line of text", 10), "a longe...");
}

// ========== Command Tests ==========

#[tokio::test]
async fn test_extraction_json_shape() {
    let services = local_services();
    let result = services
        .orchestrator
        .extract("I spent $20 at Target yesterday", reference())
        .await;

    let value = commands::extraction_json(&result);
    assert_eq!(value["strategy"], "conversational");
    assert_eq!(value["count"], 1);
    assert_eq!(value["transactions"][0]["description"], "Target");
    assert_eq!(value["transactions"][0]["direction"], "OUT");
}

#[tokio::test]
async fn test_import_text_commits_with_override() {
    let services = local_services();
    let store = InMemoryStore::new();
    let text = (1..=6)
        .map(|i| format!("04/{:02}/2025 MERCHANT NUMBER {} ${}.00", i, i, i * 10))
        .collect::<Vec<_>>()
        .join("\n");

    let report = commands::import_text(&services, &text, Some(Direction::In), reference(), &store)
        .await
        .unwrap();

    assert_eq!(report.added.len(), 6);
    assert!(!report.needs_direction);
    let stored = store.list().unwrap();
    assert_eq!(stored.len(), 6);
    assert!(stored.iter().all(|t| t.direction == Direction::In));

    // Running the same statement again only finds duplicates
    let again = commands::import_text(&services, &text, Some(Direction::In), reference(), &store)
        .await
        .unwrap();
    assert!(again.added.is_empty());
    assert_eq!(again.duplicates, 6);
}

#[tokio::test]
async fn test_import_text_without_amounts_fails() {
    let services = local_services();
    let store = InMemoryStore::new();
    let result =
        commands::import_text(&services, "nothing here at all", None, reference(), &store).await;
    assert!(result.is_err());
    assert!(store.is_empty());
}

#[test]
fn test_parse_prompt_id() {
    for id in PromptId::all() {
        assert_eq!(commands::parse_prompt_id(id.as_str()).unwrap(), *id);
    }
    let err = commands::parse_prompt_id("classify_merchant").unwrap_err();
    assert!(err.to_string().contains("extract_transactions"));
}
