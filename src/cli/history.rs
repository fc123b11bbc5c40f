use anyhow::Result;

use crate::ai::chat::SessionStore;
use crate::core::AppConfig;
use crate::core::db::SqliteKv;

pub fn run(config: &AppConfig) -> Result<()> {
    let kv = SqliteKv::open(&config.db_path)?;
    let store = SessionStore::open(kv, config.create_debounce);

    let summaries = store.list_conversations();
    if summaries.is_empty() {
        println!("No conversations yet");
        return Ok(());
    }

    let active_id = store.active_id();
    for (idx, summary) in summaries.iter().enumerate() {
        let marker = if Some(&summary.id) == active_id { "*" } else { " " };
        println!(
            "{} {:>3}. {}  ({})  {}",
            marker,
            idx + 1,
            summary.title,
            summary.last_updated.format("%Y-%m-%d %H:%M"),
            summary.id
        );
    }

    Ok(())
}
