use anyhow::{Error, Result};

use crate::ai::chat::{Chat, ChatBuilder, SessionStore};
use crate::core::AppConfig;
use crate::core::db::SqliteKv;
use crate::openai::CompletionClient;

pub struct AppState {
    pub chat: Chat<SqliteKv>,
    pub client: CompletionClient,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(chat: Chat<SqliteKv>, client: CompletionClient, config: AppConfig) -> Self {
        Self {
            chat,
            client,
            config,
        }
    }

    /// Open the chat history at `config.db_path` and set up the
    /// completion client.
    pub fn from_config(config: AppConfig) -> Result<Self, Error> {
        let kv = SqliteKv::open(&config.db_path)?;
        let store = SessionStore::open(kv, config.create_debounce);
        let chat = ChatBuilder::new(store)
            .system_message(&config.system_message)
            .build();
        let client = CompletionClient::from_config(&config);

        Ok(Self::new(chat, client, config))
    }
}
