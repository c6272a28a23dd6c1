use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cache::{Clock, SnapshotCache};
use crate::fetch::FetchStrategy;
use crate::models::{MonitorTarget, ScrapeResult, Snapshot};

/// Runs the fetch strategies over every target and keeps the latest snapshot.
///
/// Targets are scraped one after another; a second caller asking for a scrape
/// while one is running waits for it to finish instead of interleaving.
pub struct Monitor {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    cache: Mutex<SnapshotCache>,
    scrape_gate: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    /// `strategies` are tried in order for each target until one succeeds.
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            strategies,
            cache: Mutex::new(SnapshotCache::new(ttl, clock.clone())),
            scrape_gate: Mutex::new(()),
            clock,
        }
    }

    /// Scrapes a single target. Never fails: errors end up in the result.
    pub async fn scrape_target(&self, target: &MonitorTarget) -> ScrapeResult {
        let mut last_error = None;

        for strategy in &self.strategies {
            match strategy.fetch(target).await {
                Ok(reading) => return ScrapeResult::success(target, reading),
                Err(e) => {
                    warn!("{} fetch failed for {}: {}", strategy.name(), target.name, e);
                    last_error = Some(format!("{} fetch failed: {e}", strategy.name()));
                }
            }
        }

        ScrapeResult::failure(
            target,
            last_error.unwrap_or_else(|| "No fetch strategy configured".to_string()),
        )
    }

    /// Scrapes every target in order and installs the result as the current snapshot.
    pub async fn run_scrape(&self, targets: &[MonitorTarget]) -> Snapshot {
        let _running = self.scrape_gate.lock().await;
        info!("Scraping {} targets", targets.len());

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(self.scrape_target(target).await);
        }

        let snapshot = Snapshot {
            results,
            taken_at: self.clock.now(),
        };

        let failed = snapshot.failures().count();
        if failed > 0 {
            warn!("Scrape finished with {} of {} targets failing", failed, targets.len());
        } else {
            info!("Scrape finished for {} targets", targets.len());
        }

        self.cache.lock().await.install(snapshot.clone());
        snapshot
    }

    /// The last snapshot if it is still within the TTL.
    pub async fn cached_snapshot(&self) -> Option<Snapshot> {
        self.cache.lock().await.get().cloned()
    }

    /// Drops the cached snapshot once expired.
    pub async fn sweep(&self) -> bool {
        self.cache.lock().await.sweep()
    }
}
