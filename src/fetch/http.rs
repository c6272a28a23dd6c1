//! Static fallback: plain HTTP GET and a DOM query over the returned HTML

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use super::{FetchStrategy, USER_AGENT};
use crate::models::{MonitorTarget, NOT_AVAILABLE, PageReading};

/// Fetches the raw page without running scripts
pub struct HttpStrategy {
    client: Client,
}

impl HttpStrategy {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(15))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, target: &MonitorTarget) -> Result<PageReading> {
        debug!("Fetching {} over plain HTTP", target.url);

        let response = self.client.get(&target.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to fetch {}: {}",
                target.url,
                response.status()
            ));
        }

        let html = response.text().await?;
        extract_reading(&html, &target.price_selector, &target.stock_selector)
    }
}

/// Applies the price and stock selectors to a static HTML document.
///
/// Only the first match of each selector counts; blank text is reported as `N/A`.
pub fn extract_reading(html: &str, price_selector: &str, stock_selector: &str) -> Result<PageReading> {
    let price_sel = Selector::parse(price_selector)
        .map_err(|e| anyhow!("Failed to parse price selector {price_selector:?}: {e:?}"))?;
    let stock_sel = Selector::parse(stock_selector)
        .map_err(|e| anyhow!("Failed to parse stock selector {stock_selector:?}: {e:?}"))?;

    let document = Html::parse_document(html);

    let first_text = |selector: &Selector| {
        document
            .select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };

    Ok(PageReading {
        price: first_text(&price_sel),
        stock: first_text(&stock_sel),
    })
}
