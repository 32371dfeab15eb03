pub mod config;
pub mod genres;
pub mod ping;
pub mod similar;

use anyhow::{Context, Result};
use serde::Serialize;
use sonority_search::{Config, EmbeddingStore};

/// Print a response as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{json}");
    Ok(())
}

pub fn open_store(config: &Config) -> Result<EmbeddingStore> {
    log::debug!("Using Milvus at {}", config.milvus_uri);
    Ok(EmbeddingStore::from_config(config)?)
}
