use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::openai::{DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT};

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";
pub const DEFAULT_CREATE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub api_endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub request_timeout: Duration,
    pub system_message: String,
    pub create_debounce: Duration,
}

impl AppConfig {
    /// Config rooted at `storage_path` with every other setting at its
    /// default. Does not read the environment.
    pub fn with_storage_path(storage_path: &str) -> Self {
        Self {
            storage_path: storage_path.to_string(),
            db_path: db_path_for(storage_path),
            api_endpoint: String::from("https://api.openai.com/v1"),
            api_key: String::from("thiswontworkforopenai"),
            model: String::from("gpt-4.1-mini"),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: DEFAULT_TIMEOUT,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            create_debounce: DEFAULT_CREATE_DEBOUNCE,
        }
    }
}

fn db_path_for(storage_path: &str) -> String {
    let path: PathBuf = Path::new(storage_path).join("parley.db");
    path.display().to_string()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {}", key, value);
            None
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("PARLEY_STORAGE_PATH").unwrap_or("./".to_string());
        let defaults = Self::with_storage_path(&storage_path);

        let api_endpoint = env::var("PARLEY_API_ENDPOINT").unwrap_or(defaults.api_endpoint);
        let api_key = env::var("PARLEY_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .unwrap_or(defaults.api_key);
        let model = env::var("PARLEY_MODEL").unwrap_or(defaults.model);
        let temperature = env_parse("PARLEY_TEMPERATURE").unwrap_or(defaults.temperature);
        let request_timeout = env_parse("PARLEY_REQUEST_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let system_message =
            env::var("PARLEY_SYSTEM_MESSAGE").unwrap_or(defaults.system_message);
        let create_debounce = env_parse("PARLEY_CREATE_DEBOUNCE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.create_debounce);

        Self {
            storage_path,
            db_path: defaults.db_path,
            api_endpoint,
            api_key,
            model,
            temperature,
            request_timeout,
            system_message,
            create_debounce,
        }
    }
}
