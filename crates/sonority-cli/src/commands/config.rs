use anyhow::Result;
use sonority_search::{config, Config};

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!(
        "File exists: {}\n",
        if exists { "yes" } else { "no (using defaults)" }
    );

    println!("Index:");
    println!("  milvus_uri: {}", config.milvus_uri);
    println!(
        "  milvus_api_key: {}",
        if config.milvus_api_key.is_some() { "<set>" } else { "<not set>" }
    );
    println!("  full_collection: {}", config.full_collection);
    println!("  activation_collection: {}", config.activation_collection);
    println!("  embedding_dim: {}", config.embedding_dim);

    println!("\nSearch:");
    println!("  nprobe: {}", config.nprobe);
    println!("  candidate_pool: {}", config.candidate_pool);
    println!("  full_result_count: {}", config.full_result_count);
    println!("  rerank_target: {}", config.rerank_target);
    println!("  genre_top_k: {}", config.genre_top_k);

    println!("\nNetwork:");
    println!("  request_timeout: {:?}", config.request_timeout());
    println!("  connect_timeout: {:?}", config.connect_timeout());
    println!("  retry_max_times: {}", config.retry_max_times);
    println!("  retry_min_delay_ms: {}", config.retry_min_delay_ms);
    println!("  keepalive_interval: {:?}", config.keepalive_interval());

    println!("\nFiles:");
    println!("  taxonomy_path: {}", config.taxonomy_path.display());
    println!(
        "  catalog_path: {}",
        config
            .catalog_path
            .as_ref()
            .map_or_else(|| "<not set>".to_string(), |p| p.display().to_string())
    );

    println!("\nPriority: CLI args > ENV vars (SONORITY_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure sonority.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
