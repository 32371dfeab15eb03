use std::sync::Arc;

use anyhow::{Context, Result};
use sonority_core::taxonomy::SharedTaxonomy;
use sonority_search::{Config, GenreSummarizer};

use super::{open_store, print_json};

pub async fn run_genres(config: &Config, path: &str, plot: bool) -> Result<()> {
    let taxonomy = SharedTaxonomy::load(&config.taxonomy_path).with_context(|| {
        format!(
            "Failed to load genre taxonomy from {}",
            config.taxonomy_path.display()
        )
    })?;
    let summarizer = GenreSummarizer::new(open_store(config)?, Arc::new(taxonomy))
        .with_top_k(config.genre_top_k);

    if plot {
        println!("{}", summarizer.plot_path(path).await?);
        return Ok(());
    }
    print_json(&summarizer.summarize_path(path).await?)
}
