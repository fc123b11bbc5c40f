use anyhow::Result;
use std::fs;

use crate::core::AppConfig;
use crate::core::db::SqliteKv;

pub fn run(config: &AppConfig) -> Result<()> {
    println!("Initializing storage in {}...", config.storage_path);
    fs::create_dir_all(&config.storage_path)?;

    // Opening the database creates the schema if needed
    SqliteKv::open(&config.db_path)?;
    println!("Finished initializing db at {}", config.db_path);

    Ok(())
}
