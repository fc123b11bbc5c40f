//! The core models for keeping track of conversations with an LLM.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::openai::Message;

/// Title of a conversation until one is derived from its first message.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Derived titles keep at most this many characters of the first
/// message.
pub const TITLE_MAX_CHARS: usize = 30;

const TITLE_ELLIPSIS: &str = "...";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// A fresh id. UUIDv7 so ids sort by creation time.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(rename = "timestamp")]
    pub last_updated: DateTime<Utc>,
    /// Set once the title has been derived from the first message.
    /// Records saved without it are repaired on load.
    #[serde(rename = "titleDerived", default)]
    pub title_derived: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::generate(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            last_updated: Utc::now(),
            title_derived: false,
        }
    }

    /// Derive the title from `first` unless that already happened.
    pub fn derive_title_once(&mut self, first: &Message) {
        if !self.title_derived {
            self.title = derive_title(&first.content);
            self.title_derived = true;
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            last_updated: self.last_updated,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// What the history list shows for each conversation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    #[serde(rename = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

/// Everything the session store owns. Conversations are ordered most
/// recently created first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub conversations: Vec<Conversation>,
    pub active_id: Option<ConversationId>,
}

impl SessionState {
    pub fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.position(id).is_some()
    }
}

/// Title for a conversation whose first message is `content`.
pub fn derive_title(content: &str) -> String {
    if content.chars().count() > TITLE_MAX_CHARS {
        let prefix: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}{}", prefix, TITLE_ELLIPSIS)
    } else {
        content.to_string()
    }
}
