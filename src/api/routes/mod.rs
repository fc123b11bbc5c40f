//! API routes module

pub mod chat;
pub mod terms;

use std::sync::{Arc, Mutex};

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<Mutex<AppState>>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Chat session routes
        .nest("/chat", chat::router())
        // Terms of use flag
        .nest("/terms", terms::router())
}
