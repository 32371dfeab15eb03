use anyhow::{Context, Result};
use sonority_core::catalog::SqliteCatalog;
use sonority_core::model::EntityId;
use sonority_search::{Config, SearchSettings, SimilarityEngine};

use super::{open_store, print_json};

fn engine(config: &Config) -> Result<SimilarityEngine> {
    let store = open_store(config)?;
    let engine = SimilarityEngine::new(store, SearchSettings::from_config(config))
        .context("Invalid search settings")?;
    Ok(engine)
}

fn parse_id(raw: &str) -> Result<EntityId> {
    raw.parse()
        .map_err(|e| sonority_core::Error::InvalidInput(format!("bad entity id {raw:?}: {e}")))
        .map_err(Into::into)
}

pub async fn show_entity(config: &Config, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let response = engine(config)?.embedding_by_id(id).await?;
    print_json(&response)
}

pub async fn similar_by_id(config: &Config, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let response = engine(config)?.similar_full_by_id(id).await?;
    print_json(&response)
}

pub async fn similar_by_paths(config: &Config, paths: &[String], short: bool) -> Result<()> {
    let engine = engine(config)?;
    if short {
        print_json(&engine.similar_short_by_paths(paths).await?)
    } else {
        print_json(&engine.similar_full_by_paths(paths).await?)
    }
}

pub async fn similar_by_catalog(config: &Config, path: &str) -> Result<()> {
    let catalog_path = config.catalog_path.as_ref().ok_or_else(|| {
        anyhow::anyhow!("No catalog configured\n\nPass --catalog or set catalog_path in the config file.")
    })?;
    let catalog = SqliteCatalog::open(catalog_path)
        .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;
    let response = engine(config)?
        .similar_full_by_catalog_path(&catalog, path)
        .await?;
    print_json(&response)
}
