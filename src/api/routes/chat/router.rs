//! Router for the chat API

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use super::public;
use crate::ai::chat::{ConversationId, TurnError};
use crate::api::public::ApiError;
use crate::api::state::AppState;

type SharedState = Arc<Mutex<AppState>>;

/// List all chat sessions, most recently created first
async fn session_list(State(state): State<SharedState>) -> Json<public::ChatSessionsResponse> {
    let shared_state = state.lock().expect("Unable to lock shared state");
    let store = shared_state.chat.store();

    Json(public::ChatSessionsResponse {
        sessions: store.list_conversations(),
        active_id: store.active_id().cloned(),
    })
}

/// Start a new chat session and make it the active one
async fn session_create(State(state): State<SharedState>) -> impl IntoResponse {
    let id = state
        .lock()
        .expect("Unable to lock shared state")
        .chat
        .store_mut()
        .create_conversation();

    (StatusCode::CREATED, Json(public::CreateSessionResponse { id }))
}

/// Get a single chat session by ID
async fn session_get(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let shared_state = state.lock().expect("Unable to lock shared state");

    match shared_state
        .chat
        .store()
        .conversation(&ConversationId::from(id.as_str()))
    {
        Some(convo) => Json(convo.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            format!("Chat session {} not found", id),
        )
            .into_response(),
    }
}

/// Make a session the active one. Unknown IDs leave the active
/// session as it was.
async fn session_activate(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<public::ActiveSessionResponse> {
    let mut shared_state = state.lock().expect("Unable to lock shared state");
    let store = shared_state.chat.store_mut();
    store.switch_active(&ConversationId::from(id));

    Json(public::ActiveSessionResponse {
        active_id: store.active_id().cloned(),
    })
}

async fn session_delete(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<public::ActiveSessionResponse> {
    let mut shared_state = state.lock().expect("Unable to lock shared state");
    let store = shared_state.chat.store_mut();
    store.delete_conversation(&ConversationId::from(id));

    Json(public::ActiveSessionResponse {
        active_id: store.active_id().cloned(),
    })
}

/// Send a message to the active session and wait for the reply
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<public::ChatRequest>,
) -> Result<Response, ApiError> {
    let (turn, client) = {
        let mut shared_state = state.lock().expect("Unable to lock shared state");
        match shared_state.chat.begin_turn(&payload.message) {
            Ok(turn) => (turn, shared_state.client.clone()),
            Err(e @ TurnError::Busy) => {
                return Ok((StatusCode::CONFLICT, e.to_string()).into_response());
            }
            Err(e @ TurnError::EmptyInput) => {
                return Ok((StatusCode::BAD_REQUEST, e.to_string()).into_response());
            }
        }
    };

    // Finish the turn in its own task so the chat is never left busy
    // when the client goes away before the reply arrives
    let task_state = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        let cancel = turn.cancel_token();
        let result = client.complete(turn.request(), &cancel).await;
        let failed = result.is_err();
        let conversation_id = turn.conversation_id().clone();
        let message = task_state
            .lock()
            .expect("Unable to lock shared state")
            .chat
            .finish_turn(turn, result);

        public::ChatResponse {
            conversation_id,
            message,
            failed,
        }
    });

    Ok(Json(handle.await?).into_response())
}

/// Abandon the in-flight request, if there is one
async fn cancel_handler(State(state): State<SharedState>) -> Json<public::CancelResponse> {
    let cancelled = state
        .lock()
        .expect("Unable to lock shared state")
        .chat
        .cancel();

    Json(public::CancelResponse { cancelled })
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/cancel", post(cancel_handler))
        .route("/sessions", get(session_list).post(session_create))
        .route("/sessions/{id}", get(session_get).delete(session_delete))
        .route("/sessions/{id}/activate", post(session_activate))
}
