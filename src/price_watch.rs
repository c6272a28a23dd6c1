use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::Clock;
use crate::catalog::TargetStore;
use crate::config::Settings;
use crate::fetch::{BrowserStrategy, FetchStrategy, HttpStrategy, RetryPolicy};
use crate::models::{ScrapeResult, Snapshot};
use crate::monitor::Monitor;
use crate::pagination::{NavigationError, NavigationEvent, PageView, PageViewRegistry, RenderedPage, SurfaceId};
use crate::ranking::{DEFAULT_RESULT_COUNT, PriceAnswer, PricedResult, answer_price_query};

/// Everything an operator can ask of the price monitor
#[derive(Clone)]
pub struct PriceWatch {
    store: Arc<dyn TargetStore>,
    monitor: Arc<Monitor>,
    views: Arc<Mutex<PageViewRegistry>>,
    next_surface: Arc<AtomicU64>,
    page_size: usize,
}

impl PriceWatch {
    pub fn new(
        store: Arc<dyn TargetStore>,
        strategies: Vec<Arc<dyn FetchStrategy>>,
        settings: &Settings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            monitor: Arc::new(Monitor::new(strategies, settings.cache_ttl, clock.clone())),
            views: Arc::new(Mutex::new(PageViewRegistry::new(settings.cache_ttl, clock))),
            next_surface: Arc::new(AtomicU64::new(1)),
            page_size: settings.page_size,
        }
    }

    /// Rendered browser first, plain HTTP as the fallback.
    pub fn default_strategies(settings: &Settings) -> Result<Vec<Arc<dyn FetchStrategy>>> {
        let mut strategies: Vec<Arc<dyn FetchStrategy>> = Vec::new();
        if settings.disable_browser {
            info!("Browser rendering disabled, using plain HTTP only");
        } else {
            strategies.push(Arc::new(BrowserStrategy::new(
                RetryPolicy::default(),
                settings.chrome_executable.clone(),
            )));
        }
        strategies.push(Arc::new(HttpStrategy::new()?));
        Ok(strategies)
    }

    /// Scrapes every target now, whatever is cached.
    pub async fn refresh(&self) -> Result<Snapshot> {
        let targets = self.store.list().await?;
        Ok(self.monitor.run_scrape(&targets).await)
    }

    /// The cached snapshot, scraping first if it has expired.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        match self.monitor.cached_snapshot().await {
            Some(snapshot) => Ok(snapshot),
            None => self.refresh().await,
        }
    }

    /// Fresh status of every target, paged. `None` when nothing is monitored.
    ///
    /// The returned surface id identifies the view for later navigation.
    pub async fn products(&self) -> Result<Option<(SurfaceId, RenderedPage)>> {
        let snapshot = self.refresh().await?;
        let Some(view) = PageView::new(&snapshot.results, self.page_size) else {
            return Ok(None);
        };

        let surface = self.next_surface.fetch_add(1, Ordering::Relaxed);
        let page = self.views.lock().await.open(surface, view);
        debug!("Opened paged view on surface {}", surface);
        Ok(Some((surface, page)))
    }

    pub async fn navigate(
        &self,
        surface: SurfaceId,
        event: &NavigationEvent,
    ) -> Result<RenderedPage, NavigationError> {
        self.views.lock().await.navigate(surface, event)
    }

    /// Targets whose last scrape failed.
    pub async fn invalid(&self) -> Result<Vec<ScrapeResult>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.failures().cloned().collect())
    }

    /// Targets priced closest to `target`, or the price spread when nothing matches exactly.
    pub async fn prices(&self, target: f64) -> Result<PriceAnswer> {
        let snapshot = match self.monitor.cached_snapshot().await {
            Some(snapshot) if !snapshot.results.is_empty() => snapshot,
            _ => {
                info!("Price data stale, scraping before answering");
                self.refresh().await?
            }
        };
        Ok(answer_price_query(&snapshot, target, DEFAULT_RESULT_COUNT))
    }

    /// Reaps expired snapshot and page views.
    pub async fn sweep(&self) {
        let snapshot_dropped = self.monitor.sweep().await;
        let views_dropped = self.views.lock().await.sweep();
        debug!(
            "Cache sweep: snapshot dropped: {}, page views dropped: {}",
            snapshot_dropped, views_dropped
        );
    }
}

pub fn render_invalid(failures: &[ScrapeResult]) -> String {
    if failures.is_empty() {
        return "✅ All products are working correctly!".to_string();
    }

    let list: Vec<String> = failures
        .iter()
        .map(|r| {
            format!(
                "[{}] **{}**\n{}\nError: {}",
                r.id,
                r.name,
                r.url,
                r.error().unwrap_or_default()
            )
        })
        .collect();

    format!(
        "⚠️ **Invalid Products ({})**\n\n{}",
        failures.len(),
        list.join("\n\n")
    )
}

pub fn render_prices(target: f64, answer: &PriceAnswer) -> String {
    let entries: &[PricedResult] = match answer {
        PriceAnswer::Closest(found) | PriceAnswer::Spread(found) => found,
        PriceAnswer::NoPriceData => return "❌ No valid price data available".to_string(),
    };

    let list: Vec<String> = entries
        .iter()
        .map(|p| {
            let difference = p
                .difference
                .map_or_else(|| "N/A".to_string(), |d| format!("{d:.2}"));
            format!(
                "[{}] **{}**\nPrice: `{}` ({:.2})\nDifference: `{}`",
                p.result.id,
                p.result.name,
                p.result.price().unwrap_or_default(),
                p.price_num,
                difference
            )
        })
        .collect();

    format!(
        "💰 **Product Prices (Target: {})**\n\n{}",
        target,
        list.join("\n\n")
    )
}
