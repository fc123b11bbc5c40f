use std::time::{Duration, Instant};

use chrono::Utc;

use super::db::Persistence;
use super::models::{
    Conversation, ConversationId, ConversationSummary, SessionState,
};
use crate::core::db::KeyValueStore;
use crate::openai::Message;

/// The in-memory owner of every conversation and of the active
/// conversation pointer.
///
/// Every mutation is written through to the backing `KeyValueStore`
/// before the method returns. A failed write is logged and the
/// in-memory state is kept, so the next successful write catches the
/// store up.
///
/// Invariant: `active_id`, when set, names a conversation in the
/// list.
pub struct SessionStore<S: KeyValueStore> {
    state: SessionState,
    persistence: Persistence<S>,
    create_debounce: Duration,
    // Set by `create_conversation` so a repeated "new chat" within
    // `create_debounce` reuses the conversation it just made
    create_in_flight: Option<(ConversationId, Instant)>,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Load the saved state from `kv`.
    pub fn open(kv: S, create_debounce: Duration) -> Self {
        let mut persistence = Persistence::new(kv);
        let state = persistence.load();
        tracing::debug!(
            "Loaded {} conversations (active: {:?})",
            state.conversations.len(),
            state.active_id
        );

        Self {
            state,
            persistence,
            create_debounce,
            create_in_flight: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut Persistence<S> {
        &mut self.persistence
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.state.active_id.as_ref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.state.active_id.as_ref().and_then(|id| self.state.get(id))
    }

    /// Messages of the active conversation, empty when nothing is
    /// active.
    pub fn active_messages(&self) -> &[Message] {
        self.active_conversation()
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.state.get(id)
    }

    pub fn list_conversations(&self) -> Vec<ConversationSummary> {
        self.state
            .conversations
            .iter()
            .map(Conversation::summary)
            .collect()
    }

    /// Start a new, empty conversation and make it active.
    ///
    /// Calling this again within the debounce window returns the
    /// conversation created by the first call and makes it active again.
    pub fn create_conversation(&mut self) -> ConversationId {
        let reused = self.create_in_flight.as_ref().and_then(|(id, started)| {
            (started.elapsed() < self.create_debounce && self.state.contains(id))
                .then(|| id.clone())
        });
        if let Some(id) = reused {
            tracing::debug!("Ignoring repeated create, reusing conversation {}", id);
            if self.state.active_id.as_ref() != Some(&id) {
                self.state.active_id = Some(id.clone());
                self.persist();
            }
            return id;
        }

        let id = self.insert_new_conversation();
        self.create_in_flight = Some((id.clone(), Instant::now()));
        id
    }

    pub fn switch_active(&mut self, id: &ConversationId) {
        if !self.state.contains(id) {
            tracing::debug!("Ignoring switch to unknown conversation {}", id);
            return;
        }
        self.state.active_id = Some(id.clone());
        self.persist();
    }

    /// Replace the messages of conversation `id` with `messages`.
    ///
    /// The title is derived from the first message the first time the
    /// list is non-empty and never changes automatically afterwards.
    pub fn append_messages(&mut self, id: &ConversationId, messages: Vec<Message>) {
        let Some(convo) = self.state.get_mut(id) else {
            tracing::debug!("Ignoring messages for unknown conversation {}", id);
            return;
        };

        if let Some(first) = messages.first() {
            convo.derive_title_once(first);
        }
        convo.messages = messages;
        convo.last_updated = Utc::now();
        self.persist();
    }

    /// Remove conversation `id`. A new empty conversation is created
    /// when none remain. Otherwise, when the deleted one was active, the
    /// most recently created remaining conversation becomes active.
    pub fn delete_conversation(&mut self, id: &ConversationId) {
        let Some(idx) = self.state.position(id) else {
            tracing::debug!("Ignoring delete of unknown conversation {}", id);
            return;
        };
        self.state.conversations.remove(idx);

        let Some(first) = self.state.conversations.first() else {
            // Persists as part of the insert
            self.insert_new_conversation();
            return;
        };
        if self.state.active_id.as_ref() == Some(id) || self.state.active_id.is_none() {
            self.state.active_id = Some(first.id.clone());
        }
        self.persist();
    }

    fn insert_new_conversation(&mut self) -> ConversationId {
        let convo = Conversation::new();
        let id = convo.id.clone();
        tracing::debug!("Created conversation {}", id);

        self.state.conversations.insert(0, convo);
        self.state.active_id = Some(id.clone());
        self.persist();
        id
    }

    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(&self.state) {
            tracing::error!("Failed to save chat history: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::chat::db::CONVERSATIONS_KEY;
    use crate::ai::chat::models::DEFAULT_TITLE;
    use crate::core::db::MemoryKv;
    use crate::openai::Role;
    use anyhow::{Error, anyhow};

    fn store() -> SessionStore<MemoryKv> {
        SessionStore::open(MemoryKv::new(), Duration::ZERO)
    }

    fn debounced_store() -> SessionStore<MemoryKv> {
        SessionStore::open(MemoryKv::new(), Duration::from_secs(60))
    }

    fn reopen(store: &SessionStore<MemoryKv>) -> SessionStore<MemoryKv> {
        SessionStore::open(store.persistence().kv().clone(), Duration::ZERO)
    }

    #[test]
    fn test_create_conversation() {
        let mut store = store();
        let id = store.create_conversation();

        assert_eq!(store.active_id(), Some(&id));
        let convo = store.active_conversation().unwrap();
        assert_eq!(convo.title, DEFAULT_TITLE);
        assert!(convo.messages.is_empty());
    }

    #[test]
    fn test_create_inserts_most_recent_first() {
        let mut store = store();
        let first = store.create_conversation();
        let second = store.create_conversation();

        let ids: Vec<ConversationId> = store
            .list_conversations()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![second.clone(), first]);
        assert_eq!(store.active_id(), Some(&second));
    }

    #[test]
    fn test_create_twice_within_debounce_window() {
        let mut store = debounced_store();
        let first = store.create_conversation();
        let second = store.create_conversation();

        assert_eq!(first, second);
        assert_eq!(store.list_conversations().len(), 1);
    }

    #[test]
    fn test_debounced_create_makes_reused_conversation_active() {
        let mut kv = MemoryKv::new();
        let older = Conversation::new();
        kv.set(
            CONVERSATIONS_KEY,
            &serde_json::to_string(&vec![older.clone()]).unwrap(),
        )
        .unwrap();
        let mut store = SessionStore::open(kv, Duration::from_secs(60));

        let created = store.create_conversation();
        store.switch_active(&older.id);
        let again = store.create_conversation();

        assert_eq!(again, created);
        assert_eq!(store.active_id(), Some(&created));
        assert_eq!(store.list_conversations().len(), 2);
        assert_eq!(reopen(&store).active_id(), Some(&created));
    }

    #[test]
    fn test_debounce_does_not_reuse_deleted_conversation() {
        let mut store = debounced_store();
        let first = store.create_conversation();
        let other = store.create_conversation();
        assert_eq!(first, other);

        store.delete_conversation(&first);
        // Deleting the only conversation made a replacement
        let replacement = store.active_id().cloned().unwrap();
        assert_ne!(replacement, first);

        let created = store.create_conversation();
        assert_ne!(created, first);
        assert_eq!(store.active_id(), Some(&created));
    }

    #[test]
    fn test_title_from_first_message() {
        let mut store = store();
        let id = store.create_conversation();

        let user = Message::new(Role::User, "Can you explain how lifetimes work in Rust?");
        store.append_messages(&id, vec![user.clone()]);
        let assistant = Message::new(Role::Assistant, "Sure, lifetimes are...");
        store.append_messages(&id, vec![user, assistant]);

        let summaries = store.list_conversations();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, "Can you explain how lifetimes ...");
        assert_eq!(store.active_messages().len(), 2);
    }

    #[test]
    fn test_title_short_first_message() {
        let mut store = store();
        let id = store.create_conversation();
        store.append_messages(&id, vec![Message::new(Role::User, "Hello")]);

        assert_eq!(store.list_conversations()[0].title, "Hello");
    }

    #[test]
    fn test_title_is_derived_once() {
        let mut store = store();
        let id = store.create_conversation();
        store.append_messages(&id, vec![Message::new(Role::User, "First")]);
        store.append_messages(&id, vec![Message::new(Role::User, "Replaced")]);

        assert_eq!(store.conversation(&id).unwrap().title, "First");
    }

    #[test]
    fn test_title_matching_placeholder_is_derived_once() {
        let mut store = store();
        let id = store.create_conversation();
        store.append_messages(&id, vec![Message::new(Role::User, DEFAULT_TITLE)]);
        store.append_messages(&id, vec![Message::new(Role::User, "Replaced")]);

        assert_eq!(store.conversation(&id).unwrap().title, DEFAULT_TITLE);
    }

    #[test]
    fn test_title_kept_after_clear() {
        let mut store = store();
        let id = store.create_conversation();
        store.append_messages(&id, vec![Message::new(Role::User, "First")]);
        store.append_messages(&id, Vec::new());
        store.append_messages(&id, vec![Message::new(Role::User, "Second")]);

        assert_eq!(store.conversation(&id).unwrap().title, "First");
    }

    #[test]
    fn test_empty_list_keeps_default_title() {
        let mut store = store();
        let id = store.create_conversation();
        store.append_messages(&id, Vec::new());

        assert_eq!(store.conversation(&id).unwrap().title, DEFAULT_TITLE);
    }

    #[test]
    fn test_append_updates_last_updated() {
        let mut store = store();
        let id = store.create_conversation();
        let before = store.conversation(&id).unwrap().last_updated;

        store.append_messages(&id, vec![Message::new(Role::User, "Hi")]);
        assert!(store.conversation(&id).unwrap().last_updated >= before);
    }

    #[test]
    fn test_append_to_unknown_conversation_is_noop() {
        let mut store = store();
        let id = store.create_conversation();
        let before = store.state().clone();

        store.append_messages(
            &ConversationId::from("missing"),
            vec![Message::new(Role::User, "Hi")],
        );
        assert_eq!(store.state(), &before);
        assert_eq!(store.active_id(), Some(&id));
    }

    #[test]
    fn test_switch_active() {
        let mut store = store();
        let first = store.create_conversation();
        store.append_messages(&first, vec![Message::new(Role::User, "In the first")]);
        let second = store.create_conversation();
        assert_eq!(store.active_id(), Some(&second));
        assert!(store.active_messages().is_empty());

        store.switch_active(&first);
        assert_eq!(store.active_id(), Some(&first));
        assert_eq!(store.active_messages()[0].content, "In the first");
    }

    #[test]
    fn test_switch_to_unknown_conversation_is_noop() {
        let mut store = store();
        let id = store.create_conversation();

        store.switch_active(&ConversationId::from("missing"));
        assert_eq!(store.active_id(), Some(&id));
    }

    #[test]
    fn test_delete_only_conversation_creates_replacement() {
        let mut store = store();
        let id = store.create_conversation();

        store.delete_conversation(&id);

        let summaries = store.list_conversations();
        assert_eq!(summaries.len(), 1);
        assert_ne!(summaries[0].id, id);
        assert_eq!(store.active_id(), Some(&summaries[0].id));
    }

    #[test]
    fn test_delete_only_conversation_saved_without_active_id() {
        let mut kv = MemoryKv::new();
        let saved = Conversation::new();
        kv.set(
            CONVERSATIONS_KEY,
            &serde_json::to_string(&vec![saved.clone()]).unwrap(),
        )
        .unwrap();
        let mut store = SessionStore::open(kv, Duration::ZERO);
        assert_eq!(store.active_id(), Some(&saved.id));

        // Clear the pointer to reach the state directly
        store.state.active_id = None;
        store.delete_conversation(&saved.id);

        let summaries = store.list_conversations();
        assert_eq!(summaries.len(), 1);
        assert_ne!(summaries[0].id, saved.id);
        assert_eq!(store.active_id(), Some(&summaries[0].id));
    }

    #[test]
    fn test_delete_active_selects_most_recent_remaining() {
        let mut store = store();
        let oldest = store.create_conversation();
        let middle = store.create_conversation();
        let newest = store.create_conversation();

        store.delete_conversation(&newest);
        assert_eq!(store.active_id(), Some(&middle));

        store.delete_conversation(&middle);
        assert_eq!(store.active_id(), Some(&oldest));
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let mut store = store();
        let first = store.create_conversation();
        let second = store.create_conversation();

        store.delete_conversation(&first);
        assert_eq!(store.active_id(), Some(&second));
        assert_eq!(store.list_conversations().len(), 1);
    }

    #[test]
    fn test_delete_unknown_conversation_is_noop() {
        let mut store = store();
        store.create_conversation();
        let before = store.state().clone();

        store.delete_conversation(&ConversationId::from("missing"));
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let mut store = store();
        let first = store.create_conversation();
        assert_eq!(reopen(&store).state(), store.state());

        store.append_messages(&first, vec![Message::new(Role::User, "Persist me")]);
        assert_eq!(reopen(&store).state(), store.state());

        let second = store.create_conversation();
        store.switch_active(&first);
        assert_eq!(reopen(&store).active_id(), Some(&first));

        store.delete_conversation(&second);
        let reopened = reopen(&store);
        assert_eq!(reopened.state(), store.state());
        assert_eq!(reopened.list_conversations().len(), 1);
    }

    #[test]
    fn test_opens_empty_store() {
        let store = store();
        assert!(store.list_conversations().is_empty());
        assert_eq!(store.active_id(), None);
        assert!(store.active_messages().is_empty());
    }

    /// Accepts reads but fails every write
    #[derive(Default)]
    struct ReadOnlyKv(MemoryKv);

    impl KeyValueStore for ReadOnlyKv {
        fn get(&self, key: &str) -> Result<Option<String>, Error> {
            self.0.get(key)
        }
        fn set(&mut self, _key: &str, _value: &str) -> Result<(), Error> {
            Err(anyhow!("disk full"))
        }
        fn remove(&mut self, _key: &str) -> Result<(), Error> {
            Err(anyhow!("disk full"))
        }
    }

    #[test]
    fn test_failed_writes_keep_in_memory_state() {
        let mut store = SessionStore::open(ReadOnlyKv::default(), Duration::ZERO);
        let id = store.create_conversation();
        store.append_messages(&id, vec![Message::new(Role::User, "Still here")]);

        assert_eq!(store.active_messages()[0].content, "Still here");
    }
}
