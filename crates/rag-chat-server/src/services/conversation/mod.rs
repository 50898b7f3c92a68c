//! Conversation memory and turn orchestration
//!
//! - Process-lifetime session store with per-session turn serialisation
//! - Prompt assembly from summary, retrieved context and history
//! - Budget enforcement by summary substitution
//! - Two-phase turns committed only on full stream consumption

mod budget;
pub mod manager;
pub mod prompt;
mod store;
mod turn;
pub mod types;

pub use budget::{BudgetEnforcer, TRUNCATION_NOTICE, TRUNCATION_SYSTEM_NOTE};
pub use manager::{ChatService, ChatStream};
pub use prompt::PromptAssembler;
pub use store::{SessionEntry, SessionStore};
pub use turn::PendingTurn;
pub use types::{ChatOptions, SessionState, TurnSettings};
