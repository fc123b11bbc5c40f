mod core;
pub use self::core::{Chat, ChatBuilder, PendingTurn, TurnError, failure_message};
pub mod db;
pub mod models;
pub use models::{Conversation, ConversationId, ConversationSummary, SessionState};
mod store;
pub use store::SessionStore;
