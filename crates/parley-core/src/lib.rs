//! Parley Core Library
//!
//! Conversational capture of financial transactions:
//! - Extraction orchestrator (statement blocks, conversational templates, LLM)
//! - Bulk chunking and batch scheduling with per-chunk isolation
//! - Deduplication of semantically identical transactions
//! - Conversation state machine, intent router and session controller
//! - Pluggable LLM backends (Ollama, OpenAI-compatible) with a model router
//! - Prompt library with user overrides

pub mod ai;
pub mod bulk;
pub mod categorize;
pub mod config;
pub mod conversation;
pub mod dedupe;
pub mod direction;
pub mod error;
pub mod extract;
pub mod model_router;
pub mod models;
pub mod prompts;
pub mod store;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    ChatMessage, ChatOptions, LlmBackend, LlmClient, MockBackend, OllamaBackend,
    OpenAICompatibleBackend, RouterInfo,
};
pub use bulk::{BulkEvent, BulkPipeline, BulkReport};
pub use categorize::{CategoryClassifier, KeywordClassifier};
pub use config::PipelineConfig;
pub use conversation::{ConversationSnapshot, Intent, Services, Session, TurnOutcome};
pub use dedupe::{dedupe, DedupeOutcome};
pub use error::{Error, Result};
pub use extract::{ExtractionOrchestrator, ExtractionResult, LlmExtractor, Strategy};
pub use model_router::{ModelRouter, RouterConfig, TaskType};
pub use models::{Category, Direction, Transaction, TxDate};
pub use prompts::{PromptId, PromptLibrary};
pub use store::{InMemoryStore, TransactionStore};
