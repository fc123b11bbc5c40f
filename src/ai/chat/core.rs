use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::models::ConversationId;
use super::store::SessionStore;
use crate::core::DEFAULT_SYSTEM_MESSAGE;
use crate::core::db::KeyValueStore;
use crate::openai::{CompletionClient, CompletionError, Message, Role};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("a response is still being generated")]
    Busy,
    #[error("message is empty")]
    EmptyInput,
}

/// A user message that has been recorded and is waiting on the LLM.
///
/// Produced by `Chat::begin_turn` and handed back to
/// `Chat::finish_turn` along with the completion result.
#[derive(Debug)]
pub struct PendingTurn {
    conversation_id: ConversationId,
    request: Vec<Message>,
    cancel: CancellationToken,
}

impl PendingTurn {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Messages to send, system instruction first.
    pub fn request(&self) -> &[Message] {
        &self.request
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Drives a chat with an LLM one turn at a time on top of a
/// `SessionStore`.
///
/// Only one turn can be in flight. The turn is split into
/// `begin_turn` and `finish_turn` so the network call can happen
/// without holding on to the chat, e.g. while a lock guarding it is
/// released.
///
/// Use `ChatBuilder` to construct a `Chat`.
pub struct Chat<S: KeyValueStore> {
    store: SessionStore<S>,
    system_message: Message,
    in_flight: Option<CancellationToken>,
}

impl<S: KeyValueStore> Chat<S> {
    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore<S> {
        &mut self.store
    }

    pub fn system_message(&self) -> &Message {
        &self.system_message
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Record `input` as the next user message of the active
    /// conversation and return what needs to be sent to the LLM. A
    /// conversation is created if none is active.
    pub fn begin_turn(&mut self, input: &str) -> Result<PendingTurn, TurnError> {
        if self.is_busy() {
            return Err(TurnError::Busy);
        }
        if input.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let conversation_id = match self.store.active_id() {
            Some(id) => id.clone(),
            None => self.store.create_conversation(),
        };

        let mut messages = self.store.active_messages().to_vec();
        messages.push(Message::new(Role::User, input));
        self.store
            .append_messages(&conversation_id, messages.clone());

        let mut request = Vec::with_capacity(messages.len() + 1);
        request.push(self.system_message.clone());
        request.extend(messages);

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());

        Ok(PendingTurn {
            conversation_id,
            request,
            cancel,
        })
    }

    /// Record the outcome of `turn` in the conversation it started in
    /// and return the message that was appended. Failures are recorded
    /// as an assistant message describing the error.
    pub fn finish_turn(
        &mut self,
        turn: PendingTurn,
        result: Result<Message, CompletionError>,
    ) -> Message {
        self.in_flight = None;

        let reply = match result {
            Ok(msg) => Message::new(Role::Assistant, &msg.content),
            Err(e) => {
                tracing::warn!(
                    "Completion failed for conversation {}: {}",
                    turn.conversation_id,
                    e
                );
                failure_message(&e)
            }
        };

        // The conversation may have been deleted while waiting
        if let Some(convo) = self.store.conversation(&turn.conversation_id) {
            let mut messages = convo.messages.clone();
            messages.push(reply.clone());
            self.store.append_messages(&turn.conversation_id, messages);
        }

        reply
    }

    /// Cancel the in-flight request, if any. Returns whether there
    /// was one.
    pub fn cancel(&self) -> bool {
        match &self.in_flight {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run a complete turn: record `input`, ask the LLM and record the
    /// reply.
    pub async fn send(
        &mut self,
        client: &CompletionClient,
        input: &str,
    ) -> Result<Message, TurnError> {
        let turn = self.begin_turn(input)?;
        let result = client.complete(turn.request(), &turn.cancel).await;
        Ok(self.finish_turn(turn, result))
    }
}

/// The assistant message shown in place of a reply that failed.
pub fn failure_message(err: &CompletionError) -> Message {
    Message::new(
        Role::Assistant,
        &format!("Error: {}. Please try again.", err),
    )
}

pub struct ChatBuilder<S: KeyValueStore> {
    store: SessionStore<S>,
    system_message: String,
}

impl<S: KeyValueStore> ChatBuilder<S> {
    pub fn new(store: SessionStore<S>) -> Self {
        Self {
            store,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        }
    }

    pub fn system_message(mut self, system_message: &str) -> Self {
        self.system_message = system_message.to_string();
        self
    }

    pub fn build(self) -> Chat<S> {
        Chat {
            store: self.store,
            system_message: Message::new(Role::System, &self.system_message),
            in_flight: None,
        }
    }
}
