//! Multi-turn dialogue
//!
//! - `state`: conversation state and the clarification state machine
//! - `intent`: per-turn intent classification
//! - `handlers`: one handler per intent
//! - `router`: priority dispatch with logging, persistence and recovery
//! - `session`: the controller that owns a conversation

pub mod handlers;
pub mod intent;
pub mod router;
pub mod session;
pub mod state;

pub use handlers::{BulkJob, Handler, HandlerResult, Services, TurnContext};
pub use intent::Intent;
pub use router::{Dispatch, TurnRouter};
pub use session::{Session, TurnOutcome};
pub use state::{
    ClarificationMode, ConversationSnapshot, ConversationState, Correction, Message, Mood,
    SavedClarification, Speaker,
};
