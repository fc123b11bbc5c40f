use anyhow::{Error, Result};

use super::models::{Conversation, ConversationId, DEFAULT_TITLE, SessionState};
use crate::core::db::KeyValueStore;
use crate::openai::Message;

pub const CONVERSATIONS_KEY: &str = "conversations";
pub const ACTIVE_CONVERSATION_KEY: &str = "activeConversationId";
pub const TERMS_ACCEPTED_KEY: &str = "termsAccepted";
// Single unnamed conversation stored as a flat message array by
// earlier versions
pub const LEGACY_HISTORY_KEY: &str = "chatHistory";

/// Saves and loads the whole session state to a `KeyValueStore`.
pub struct Persistence<S: KeyValueStore> {
    kv: S,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn save(&mut self, state: &SessionState) -> Result<(), Error> {
        let data = serde_json::to_string(&state.conversations)?;
        self.kv.set(CONVERSATIONS_KEY, &data)?;
        match &state.active_id {
            Some(id) => self.kv.set(ACTIVE_CONVERSATION_KEY, id.as_str())?,
            None => self.kv.remove(ACTIVE_CONVERSATION_KEY)?,
        }
        Ok(())
    }

    /// Load the saved state. Missing or unreadable data loads as an
    /// empty state rather than an error.
    pub fn load(&mut self) -> SessionState {
        let mut conversations = match self.kv.get(CONVERSATIONS_KEY) {
            Ok(Some(data)) => match serde_json::from_str::<Vec<Conversation>>(&data) {
                Ok(conversations) => conversations,
                Err(e) => {
                    tracing::warn!("Discarding malformed conversation history: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => return self.migrate_legacy_history(),
            Err(e) => {
                tracing::warn!("Failed to read conversation history: {}", e);
                Vec::new()
            }
        };

        // Records written before `titleDerived` existed
        for convo in conversations.iter_mut() {
            if !convo.messages.is_empty() || convo.title != DEFAULT_TITLE {
                convo.title_derived = true;
            }
        }

        let saved_active = match self.kv.get(ACTIVE_CONVERSATION_KEY) {
            Ok(id) => id.map(ConversationId::from),
            Err(e) => {
                tracing::warn!("Failed to read active conversation: {}", e);
                None
            }
        };

        let mut state = SessionState {
            conversations,
            active_id: None,
        };
        state.active_id = match saved_active {
            Some(id) if state.contains(&id) => Some(id),
            Some(id) => {
                tracing::warn!("Active conversation {} no longer exists", id);
                state.conversations.first().map(|c| c.id.clone())
            }
            None => state.conversations.first().map(|c| c.id.clone()),
        };

        state
    }

    fn migrate_legacy_history(&mut self) -> SessionState {
        let data = match self.kv.get(LEGACY_HISTORY_KEY) {
            Ok(Some(data)) => data,
            Ok(None) => return SessionState::default(),
            Err(e) => {
                tracing::warn!("Failed to read legacy chat history: {}", e);
                return SessionState::default();
            }
        };

        let mut state = SessionState::default();
        match serde_json::from_str::<Vec<Message>>(&data) {
            Ok(messages) if !messages.is_empty() => {
                let mut convo = Conversation::new();
                convo.derive_title_once(&messages[0]);
                convo.messages = messages;
                tracing::info!(
                    "Migrating {} legacy messages into conversation {}",
                    convo.messages.len(),
                    convo.id
                );
                state.active_id = Some(convo.id.clone());
                state.conversations.push(convo);
                if let Err(e) = self.save(&state) {
                    // Keep the legacy record so the migration runs again
                    // next time
                    tracing::error!("Failed to save migrated chat history: {}", e);
                    return state;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Discarding malformed legacy chat history: {}", e),
        }

        if let Err(e) = self.kv.remove(LEGACY_HISTORY_KEY) {
            tracing::warn!("Failed to remove legacy chat history: {}", e);
        }
        state
    }

    pub fn terms_accepted(&self) -> bool {
        matches!(self.kv.get(TERMS_ACCEPTED_KEY), Ok(Some(value)) if value == "true")
    }

    pub fn set_terms_accepted(&mut self, accepted: bool) -> Result<(), Error> {
        if accepted {
            self.kv.set(TERMS_ACCEPTED_KEY, "true")
        } else {
            self.kv.remove(TERMS_ACCEPTED_KEY)
        }
    }
}
