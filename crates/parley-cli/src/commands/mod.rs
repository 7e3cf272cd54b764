//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (services, reference date, input)
//! - `chat` - Interactive conversation
//! - `extract` - One-shot extraction to JSON
//! - `import` - Bulk statement import
//! - `check` - LLM backend health and routing
//! - `prompts` - Prompt library management commands

pub mod chat;
pub mod check;
pub mod core;
pub mod extract;
pub mod import;
pub mod prompts;

// Re-export command functions for main.rs
pub use chat::*;
pub use check::*;
pub use core::*;
pub use extract::*;
pub use import::*;
pub use prompts::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
