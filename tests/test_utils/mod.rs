//! Test utilities for integration tests
#![allow(dead_code)]
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Router, body::Body};
use tokio_util::sync::CancellationToken;

use parley::ai::chat::{ChatBuilder, SessionStore};
use parley::api::AppState;
use parley::api::app;
use parley::core::AppConfig;
use parley::core::db::SqliteKv;
use parley::openai::CompletionClient;

/// Creates a test application router backed by an in-memory database
/// and a completion endpoint that nothing listens on.
pub async fn test_app() -> Router {
    test_app_with_endpoint("http://127.0.0.1:9").await
}

/// Creates a test application router whose completion requests go to
/// `endpoint`, e.g. a `mockito` server.
pub async fn test_app_with_endpoint(endpoint: &str) -> Router {
    let mut config = AppConfig::with_storage_path("./");
    config.api_endpoint = endpoint.to_string();
    config.api_key = String::from("test-api-key");
    config.model = String::from("gpt-4o");
    // Tests create sessions back to back
    config.create_debounce = Duration::ZERO;

    let kv = SqliteKv::open_in_memory().expect("Failed to open in-memory db");
    let store = SessionStore::open(kv, config.create_debounce);
    let chat = ChatBuilder::new(store)
        .system_message(&config.system_message)
        .build();
    let client = CompletionClient::from_config(&config);

    let app_state = AppState::new(chat, client, config);
    app(Arc::new(Mutex::new(app_state)))
}

/// An endpoint that accepts connections and never answers them, so a
/// chat turn sent to it stays in flight. The returned token fires once
/// the first connection is accepted.
pub async fn stalled_endpoint() -> (String, CancellationToken) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let url = format!("http://{}", listener.local_addr().expect("No local address"));
    let connected = CancellationToken::new();
    let notify = connected.clone();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
            notify.cancel();
        }
    });
    (url, connected)
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    let body = body_to_string(body).await;
    serde_json::from_str(&body).expect("Body is not JSON")
}
