use std::time::Duration;

use anyhow::Result;
use sonority_search::{Config, KeepAlive};
use tokio::sync::watch;

use super::{open_store, print_json};

pub async fn run_ping(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let report = store.ping().await;
    print_json(&report)
}

pub async fn run_keepalive(config: &Config, interval_secs: Option<u64>) -> Result<()> {
    let store = open_store(config)?;
    let interval = interval_secs.map_or_else(|| config.keepalive_interval(), Duration::from_secs);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping keep-alive");
        }
        if shutdown_tx.send(true).is_err() {
            log::debug!("Keep-alive already stopped");
        }
    });

    let pings = KeepAlive::new(store, interval).run(shutdown_rx).await;
    println!("Sent {pings} keep-alive ping(s)");
    Ok(())
}
