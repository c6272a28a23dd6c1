//! Primary strategy: render the page in an isolated headless Chrome session

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, SetLifecycleEventsEnabledParams};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::{FetchStrategy, RetryPolicy, USER_AGENT};
use crate::models::{MonitorTarget, PageReading};

const LAUNCH_ARGS: [&str; 3] = [
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-http2",
];

/// Lifecycle event fired once the new document has committed
const DOCUMENT_COMMITTED: &str = "init";
/// At most two connections in flight for 500ms
const NETWORK_ALMOST_IDLE: &str = "networkAlmostIdle";
const NETWORK_IDLE: &str = "networkIdle";

/// Launches a fresh browser per target and always tears it down afterwards
pub struct BrowserStrategy {
    retry: RetryPolicy,
    executable: Option<PathBuf>,
}

impl BrowserStrategy {
    pub fn new(retry: RetryPolicy, executable: Option<PathBuf>) -> Self {
        Self { retry, executable }
    }

    fn config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.retry.attempt_timeout);
        for arg in LAUNCH_ARGS {
            builder = builder.arg(arg);
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(|e| anyhow!("Invalid browser config: {e}"))
    }

    async fn read(&self, browser: &Browser, target: &MonitorTarget) -> Result<PageReading> {
        let page = browser.new_page("about:blank").await?;
        page.set_user_agent(SetUserAgentOverrideParams::new(USER_AGENT))
            .await?;
        page.execute(SetLifecycleEventsEnabledParams::new(true)).await?;

        let page_ref = &page;
        let url = target.url.as_str();
        self.retry
            .run(&format!("Navigation to {url}"), move || async move {
                // subscribe first so events raised during goto are buffered
                let lifecycle = page_ref
                    .event_listener::<EventLifecycleEvent>()
                    .await?
                    .map(|event| event.name.clone());
                page_ref.goto(url).await?;
                wait_for_network_idle(lifecycle).await
            })
            .await?;

        let reading = page
            .evaluate(selector_script(&target.price_selector, &target.stock_selector)?.as_str())
            .await?
            .into_value::<PageReading>()?;

        Ok(reading)
    }
}

#[async_trait]
impl FetchStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, target: &MonitorTarget) -> Result<PageReading> {
        let (mut browser, mut handler) = Browser::launch(self.config()?).await?;
        let driver = tokio::spawn(async move { while handler.next().await.is_some() {} });

        debug!("Browser launched for {}", target.url);
        let reading = self.read(&browser, target).await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser for {}: {}", target.url, e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Browser process for {} did not exit cleanly: {}", target.url, e);
        }
        driver.abort();

        reading
    }
}

/// Resolves once the network settles after a new document has committed.
///
/// Events from the previous document are ignored until `init` is seen. The
/// caller bounds the wait with the navigation timeout.
async fn wait_for_network_idle(names: impl Stream<Item = String>) -> Result<()> {
    let mut names = std::pin::pin!(names);
    let mut committed = false;

    while let Some(name) = names.next().await {
        match name.as_str() {
            DOCUMENT_COMMITTED => committed = true,
            NETWORK_ALMOST_IDLE | NETWORK_IDLE if committed => {
                debug!("Network idle ({})", name);
                return Ok(());
            }
            _ => {}
        }
    }

    Err(anyhow!("Page closed before the network went idle"))
}

/// Script evaluated in the rendered page; returns `{price, stock}` with `N/A`
/// for selectors that match nothing.
fn selector_script(price_selector: &str, stock_selector: &str) -> Result<String> {
    let price = serde_json::to_string(price_selector)?;
    let stock = serde_json::to_string(stock_selector)?;

    Ok(format!(
        r#"(() => {{
    const read = (selector) => {{
        const el = document.querySelector(selector);
        return el ? el.innerText.trim() : "N/A";
    }};
    return {{ price: read({price}), stock: read({stock}) }};
}})()"#
    ))
}
