//! Periodic liveness pings.
//!
//! Serverless index tiers suspend after a period without traffic; pinging
//! on a fixed schedule keeps them warm regardless of user load.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::store::EmbeddingStore;

#[derive(Debug, Clone)]
pub struct KeepAlive {
    store: EmbeddingStore,
    interval: Duration,
}

impl KeepAlive {
    #[must_use]
    pub fn new(store: EmbeddingStore, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Ping immediately, then once per interval, until `shutdown` turns
    /// true or its sender is dropped. Returns the number of pings sent.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pings = 0;

        log::info!("Keep-alive started, interval {:?}", self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.store.ping().await;
                    pings += 1;
                    if report.is_success() {
                        log::info!("Keep-alive ping: {}", report.message);
                    } else {
                        log::warn!("Keep-alive ping failed: {}", report.message);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Keep-alive stopped after {pings} ping(s)");
        pings
    }
}
