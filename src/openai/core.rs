use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::AppConfig;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Everything that can go wrong with a single completion request.
///
/// Callers are not expected to recover differently per variant: the
/// chat loop turns any of these into a visible assistant message.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("API error: {status}{}", upstream_suffix(.message))]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("request cancelled")]
    Cancelled,
}

fn upstream_suffix(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!(" ({})", msg),
        None => String::new(),
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    stream: bool,
}

// {"choices": [{"message": {"role": "assistant", "content": "..."}}]}
#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI compatible chat completions endpoint.
///
/// One call to `complete` is exactly one HTTP request. There are no
/// retries and no streaming.
#[derive(Clone, Debug)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.api_endpoint,
            &config.api_key,
            &config.model,
        )
        .temperature(config.temperature)
        .timeout(config.request_timeout)
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    /// Request the next assistant message for `messages`.
    ///
    /// The request is abandoned as soon as `cancel` fires, in which
    /// case `CompletionError::Cancelled` is returned without waiting on
    /// the network.
    pub async fn complete(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Message, CompletionError> {
        if cancel.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Completion request to {} cancelled", self.url());
                Err(CompletionError::Cancelled)
            }
            result = self.request(messages) => result,
        }
    }

    async fn request(&self, messages: &[Message]) -> Result<Message, CompletionError> {
        let url = self.url();
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };

        tracing::debug!(
            "Sending {} messages to {} using model {}",
            messages.len(),
            url,
            self.model
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            // The body is only used to enrich the error so a failure to
            // read it is not worth reporting separately
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Completion request failed with status {}", status);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;
        parse_completion(&body)
    }

    fn transport_error(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::Request(err)
        }
    }
}

/// Pull a human readable reason out of an error body. OpenAI style
/// APIs use `{"error": {"message": ...}}`, some proxies a top level
/// `message`.
fn upstream_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"]
        .as_str()
        .or_else(|| value["message"].as_str())
        .map(str::to_string)
}

fn parse_completion(body: &str) -> Result<Message, CompletionError> {
    let resp: CompletionResponse = serde_json::from_str(body)
        .map_err(|err| CompletionError::MalformedResponse(err.to_string()))?;
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            CompletionError::MalformedResponse(String::from(
                "missing choices[0].message.content",
            ))
        })?;

    Ok(Message::new(Role::Assistant, &content))
}
