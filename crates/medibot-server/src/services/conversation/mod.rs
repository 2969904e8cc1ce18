//! Conversation memory
//!
//! Per-sender topic tracking used by the orchestrator:
//! - Thread-safe storage (DashMap)
//! - Per-sender serialisation of read-modify-write cycles
//! - No expiry: state lives for the life of the process

mod memory;
pub mod types;

pub use memory::{ConversationMemory, SenderGuard};
pub use types::ConversationState;
