//! Data models for monitored targets, scrape results and Discord message payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used when a selector matches nothing on the page
pub const NOT_AVAILABLE: &str = "N/A";

/// One external product page being watched for price and stock changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub id: u32,
    pub name: String,
    pub url: String,
    pub price_selector: String,
    pub stock_selector: String,
    pub check_text: String,
}

/// What a fetch managed to read off a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReading {
    pub price: String,
    pub stock: String,
}

/// Outcome of scraping a single target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Success {
        price: String,
        stock: String,
        check_text: String,
    },
    Failure {
        error: String,
    },
}

/// Result of one target within one scrape run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    pub id: u32,
    pub name: String,
    pub url: String,
    pub outcome: ScrapeOutcome,
}

impl ScrapeResult {
    pub fn success(target: &MonitorTarget, reading: PageReading) -> Self {
        Self {
            id: target.id,
            name: target.name.clone(),
            url: target.url.clone(),
            outcome: ScrapeOutcome::Success {
                price: reading.price,
                stock: reading.stock,
                check_text: target.check_text.clone(),
            },
        }
    }

    pub fn failure(target: &MonitorTarget, error: impl Into<String>) -> Self {
        Self {
            id: target.id,
            name: target.name.clone(),
            url: target.url.clone(),
            outcome: ScrapeOutcome::Failure {
                error: error.into(),
            },
        }
    }

    /// Price text for successful scrapes
    pub fn price(&self) -> Option<&str> {
        match &self.outcome {
            ScrapeOutcome::Success { price, .. } => Some(price),
            ScrapeOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ScrapeOutcome::Success { .. } => None,
            ScrapeOutcome::Failure { error } => Some(error),
        }
    }

    /// Whether the stock text contains the target's check text, case-insensitively.
    ///
    /// Failed scrapes are never reported as out of stock.
    pub fn is_out_of_stock(&self) -> bool {
        match &self.outcome {
            ScrapeOutcome::Success {
                stock, check_text, ..
            } => stock
                .to_lowercase()
                .contains(&check_text.to_lowercase()),
            ScrapeOutcome::Failure { .. } => false,
        }
    }
}

/// Every result of one full scrape run, in target order
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub results: Vec<ScrapeResult>,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn failures(&self) -> impl Iterator<Item = &ScrapeResult> {
        self.results.iter().filter(|r| r.error().is_some())
    }
}

/// Discord message payload carrying a rendered page and its controls
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<DiscordActionRow>,
}

/// Row of interactive components (component type 1)
#[derive(Debug, Serialize)]
pub struct DiscordActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<DiscordComponent>,
}

/// Button (type 2) or string select (type 3)
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DiscordComponent {
    Button {
        #[serde(rename = "type")]
        kind: u8,
        style: u8,
        label: String,
        custom_id: String,
    },
    Select {
        #[serde(rename = "type")]
        kind: u8,
        custom_id: String,
        placeholder: String,
        options: Vec<DiscordSelectOption>,
    },
}

#[derive(Debug, Serialize)]
pub struct DiscordSelectOption {
    pub label: String,
    pub description: String,
    pub value: String,
}
