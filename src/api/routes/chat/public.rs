//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::ai::chat::{ConversationId, ConversationSummary};
use crate::openai::Message;

#[derive(Serialize)]
pub struct ChatSessionsResponse {
    pub sessions: Vec<ConversationSummary>,
    pub active_id: Option<ConversationId>,
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub id: ConversationId,
}

#[derive(Serialize)]
pub struct ActiveSessionResponse {
    pub active_id: Option<ConversationId>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub conversation_id: ConversationId,
    pub message: Message,
    // Set when `message` describes a failed completion
    pub failed: bool,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}
