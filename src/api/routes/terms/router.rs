//! Router for the terms API (whether the usage notice was accepted)

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::get};

use super::public::TermsStatus;
use crate::api::public::ApiError;
use crate::api::state::AppState;

type SharedState = Arc<Mutex<AppState>>;

async fn terms_get(State(state): State<SharedState>) -> Json<TermsStatus> {
    let accepted = state
        .lock()
        .expect("Unable to lock shared state")
        .chat
        .store()
        .persistence()
        .terms_accepted();

    Json(TermsStatus { accepted })
}

async fn terms_set(
    State(state): State<SharedState>,
    Json(data): Json<TermsStatus>,
) -> Result<Json<TermsStatus>, ApiError> {
    state
        .lock()
        .expect("Unable to lock shared state")
        .chat
        .store_mut()
        .persistence_mut()
        .set_terms_accepted(data.accepted)?;

    Ok(Json(TermsStatus {
        accepted: data.accepted,
    }))
}

/// Create the terms router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(terms_get).post(terms_set))
}
