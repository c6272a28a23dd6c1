use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction, migrate::MigrateDatabase};
use thiserror::Error;
use tracing::info;

use crate::models::MonitorTarget;

/// IDs are allocated from `1..=MAX_TARGETS`
pub const MAX_TARGETS: u32 = 100;

pub const DEFAULT_PRICE_SELECTOR: &str = "b[class^='productPrice_price']";
pub const DEFAULT_STOCK_SELECTOR: &str = "button[class*='productButton_soldout']";
pub const DEFAULT_CHECK_TEXT: &str = "Sold Out";

const UNNAMED_TARGET: &str = "Unnamed Product";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("maximum target limit reached ({} targets)", MAX_TARGETS)]
    CapacityExhausted,
    #[error("target with ID {0} not found")]
    NotFound(u32),
    #[error("these IDs are invalid: {}", join_ids(.0))]
    InvalidIds(Vec<u32>),
    #[error("invalid import: {0}")]
    InvalidImport(String),
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read side of the target list, as the monitor sees it
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Every target, ordered by ID
    async fn list(&self) -> Result<Vec<MonitorTarget>>;
}

/// A target as supplied by an operator; missing fields take defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDraft {
    pub name: Option<String>,
    pub url: Option<String>,
    pub price_selector: Option<String>,
    pub stock_selector: Option<String>,
    pub check_text: Option<String>,
}

impl TargetDraft {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    fn into_target(self, id: u32) -> MonitorTarget {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        MonitorTarget {
            id,
            name: or_default(self.name, UNNAMED_TARGET),
            url: self.url.unwrap_or_default(),
            price_selector: or_default(self.price_selector, DEFAULT_PRICE_SELECTOR),
            stock_selector: or_default(self.stock_selector, DEFAULT_STOCK_SELECTOR),
            check_text: or_default(self.check_text, DEFAULT_CHECK_TEXT),
        }
    }
}

/// Parses a bulk-import document: a JSON array of target drafts.
pub fn parse_import(json: &str) -> Result<Vec<TargetDraft>, CatalogError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| CatalogError::InvalidImport(e.to_string()))?;
    if !value.is_array() {
        return Err(CatalogError::InvalidImport(
            "expected an array of products".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| CatalogError::InvalidImport(e.to_string()))
}

/// First ID in `1..=MAX_TARGETS` not already taken.
pub fn next_free_id(used: &HashSet<u32>) -> Option<u32> {
    (1..=MAX_TARGETS).find(|id| !used.contains(id))
}

/// SQLite-backed target list.
///
/// IDs stay dense: every removal renumbers the remaining targets `1..=n` in
/// ID order within the same transaction.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !db_url.contains(":memory:") && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            let path = db_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            if let Some(dir) = std::path::Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await?;
            }
            Sqlite::create_database(db_url).await?;
        }

        // An in-memory database only lives as long as its one connection
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Target catalog ready");
        Ok(Self { pool })
    }

    pub async fn get(&self, id: u32) -> Result<Option<MonitorTarget>> {
        let row = sqlx::query(
            "SELECT id, name, url, price_selector, stock_selector, check_text FROM targets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| target_from_row(&row)))
    }

    /// Adds one target under the lowest free ID.
    pub async fn add(&self, draft: TargetDraft) -> Result<MonitorTarget> {
        let mut added = self.add_all(vec![draft]).await?;
        Ok(added.remove(0))
    }

    /// Adds every draft or none of them.
    pub async fn bulk_import(&self, drafts: Vec<TargetDraft>) -> Result<Vec<MonitorTarget>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        self.add_all(drafts).await
    }

    async fn add_all(&self, drafts: Vec<TargetDraft>) -> Result<Vec<MonitorTarget>> {
        let mut tx = self.pool.begin().await?;
        let mut used = used_ids(&mut tx).await?;

        let mut added = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = next_free_id(&used).ok_or(CatalogError::CapacityExhausted)?;
            used.insert(id);
            let target = draft.into_target(id);

            sqlx::query(
                r"
                INSERT INTO targets (id, name, url, price_selector, stock_selector, check_text)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(target.id)
            .bind(&target.name)
            .bind(&target.url)
            .bind(&target.price_selector)
            .bind(&target.stock_selector)
            .bind(&target.check_text)
            .execute(&mut *tx)
            .await?;

            added.push(target);
        }

        tx.commit().await?;
        info!("Added {} targets", added.len());
        Ok(added)
    }

    /// Removes one target and renumbers the rest. Returns the removed target.
    pub async fn remove(&self, id: u32) -> Result<MonitorTarget> {
        let target = self.get(id).await?.ok_or(CatalogError::NotFound(id))?;
        self.remove_many(&[id]).await?;
        Ok(target)
    }

    /// Removes several targets at once; refuses the whole batch if any ID is unknown.
    pub async fn remove_many(&self, ids: &[u32]) -> Result<Vec<MonitorTarget>> {
        let mut tx = self.pool.begin().await?;
        let used = used_ids(&mut tx).await?;

        let invalid: Vec<u32> = ids.iter().copied().filter(|id| !used.contains(id)).collect();
        if !invalid.is_empty() {
            return Err(CatalogError::InvalidIds(invalid).into());
        }

        let mut removed = Vec::with_capacity(ids.len());
        for target in list_targets(&mut *tx).await? {
            if ids.contains(&target.id) {
                sqlx::query("DELETE FROM targets WHERE id = ?")
                    .bind(target.id)
                    .execute(&mut *tx)
                    .await?;
                removed.push(target);
            }
        }

        renumber(&mut tx).await?;
        tx.commit().await?;

        info!("Removed {} targets", removed.len());
        Ok(removed)
    }
}

#[async_trait]
impl TargetStore for Catalog {
    async fn list(&self) -> Result<Vec<MonitorTarget>> {
        let mut conn = self.pool.acquire().await?;
        list_targets(&mut *conn).await
    }
}

fn target_from_row(row: &sqlx::sqlite::SqliteRow) -> MonitorTarget {
    MonitorTarget {
        id: row.get::<u32, _>("id"),
        name: row.get("name"),
        url: row.get("url"),
        price_selector: row.get("price_selector"),
        stock_selector: row.get("stock_selector"),
        check_text: row.get("check_text"),
    }
}

async fn list_targets(conn: &mut sqlx::SqliteConnection) -> Result<Vec<MonitorTarget>> {
    let rows = sqlx::query(
        "SELECT id, name, url, price_selector, stock_selector, check_text FROM targets ORDER BY id",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.iter().map(target_from_row).collect())
}

async fn used_ids(tx: &mut Transaction<'_, Sqlite>) -> Result<HashSet<u32>> {
    let rows = sqlx::query("SELECT id FROM targets")
        .fetch_all(&mut **tx)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.get::<u32, _>("id"))
        .collect())
}

/// Reassigns IDs `1..=n` in current ID order.
async fn renumber(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    let rows = sqlx::query("SELECT id FROM targets ORDER BY id")
        .fetch_all(&mut **tx)
        .await?;

    // Ascending order only ever moves an ID down into a slot already vacated
    for (index, row) in rows.iter().enumerate() {
        let old_id = row.get::<u32, _>("id");
        let new_id = index as u32 + 1;
        if old_id != new_id {
            sqlx::query("UPDATE targets SET id = ? WHERE id = ?")
                .bind(new_id)
                .bind(old_id)
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn catalog() -> Catalog {
        Catalog::connect("sqlite::memory:").await.unwrap()
    }

    fn ids(targets: &[MonitorTarget]) -> Vec<u32> {
        targets.iter().map(|t| t.id).collect()
    }

    fn names(targets: &[MonitorTarget]) -> Vec<&str> {
        targets.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn next_free_id_scans_from_one() {
        assert_eq!(next_free_id(&HashSet::new()), Some(1));
        assert_eq!(next_free_id(&HashSet::from([1, 2, 4])), Some(3));
        let full: HashSet<u32> = (1..=MAX_TARGETS).collect();
        assert_eq!(next_free_id(&full), None);
    }

    #[test]
    fn import_requires_an_array() {
        assert!(matches!(
            parse_import(r#"{"name": "x"}"#),
            Err(CatalogError::InvalidImport(_))
        ));
        assert!(matches!(parse_import("not json"), Err(CatalogError::InvalidImport(_))));

        let drafts = parse_import(r#"[{"name": "Lamp", "url": "https://a", "checkText": "Gone"}, {}]"#).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].check_text.as_deref(), Some("Gone"));
    }

    #[tokio::test]
    async fn add_uses_defaults_and_dense_ids() {
        let catalog = catalog().await;
        let lamp = catalog.add(TargetDraft::new("Lamp", "https://shop.example/lamp")).await.unwrap();
        let desk = catalog.add(TargetDraft::new("Desk", "https://shop.example/desk")).await.unwrap();

        assert_eq!((lamp.id, desk.id), (1, 2));
        assert_eq!(lamp.price_selector, DEFAULT_PRICE_SELECTOR);
        assert_eq!(lamp.stock_selector, DEFAULT_STOCK_SELECTOR);
        assert_eq!(lamp.check_text, DEFAULT_CHECK_TEXT);
        assert_eq!(catalog.list().await.unwrap(), vec![lamp, desk]);
    }

    #[tokio::test]
    async fn removal_renumbers_remaining_targets() {
        let catalog = catalog().await;
        for name in ["a", "b", "c", "d"] {
            catalog.add(TargetDraft::new(name, format!("https://shop.example/{name}"))).await.unwrap();
        }

        let removed = catalog.remove(2).await.unwrap();
        assert_eq!(removed.name, "b");

        let targets = catalog.list().await.unwrap();
        assert_eq!(ids(&targets), vec![1, 2, 3]);
        assert_eq!(names(&targets), vec!["a", "c", "d"]);

        let next = catalog.add(TargetDraft::new("e", "https://shop.example/e")).await.unwrap();
        assert_eq!(next.id, 4);
    }

    #[tokio::test]
    async fn removing_unknown_id_is_reported() {
        let catalog = catalog().await;
        let err = catalog.remove(9).await.unwrap_err();
        assert_eq!(err.downcast_ref::<CatalogError>(), Some(&CatalogError::NotFound(9)));
    }

    #[tokio::test]
    async fn bulk_remove_validates_every_id_first() {
        let catalog = catalog().await;
        for name in ["a", "b", "c", "d", "e"] {
            catalog.add(TargetDraft::new(name, "https://shop.example")).await.unwrap();
        }

        let err = catalog.remove_many(&[2, 7, 8]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<CatalogError>(),
            Some(&CatalogError::InvalidIds(vec![7, 8]))
        );
        assert_eq!(catalog.list().await.unwrap().len(), 5);

        let removed = catalog.remove_many(&[4, 1]).await.unwrap();
        assert_eq!(names(&removed), vec!["a", "d"]);

        let targets = catalog.list().await.unwrap();
        assert_eq!(ids(&targets), vec![1, 2, 3]);
        assert_eq!(names(&targets), vec!["b", "c", "e"]);
    }

    #[tokio::test]
    async fn bulk_import_fills_defaults() {
        let catalog = catalog().await;
        let drafts = parse_import(
            r#"[{"name": "Chair", "url": "https://shop.example/chair", "priceSelector": ".p"}, {"url": "https://shop.example/x"}]"#,
        )
        .unwrap();

        let added = catalog.bulk_import(drafts).await.unwrap();
        assert_eq!(ids(&added), vec![1, 2]);
        assert_eq!(added[0].price_selector, ".p");
        assert_eq!(added[1].name, UNNAMED_TARGET);
    }

    #[tokio::test]
    async fn capacity_is_enforced_all_or_nothing() {
        let catalog = catalog().await;
        let drafts: Vec<TargetDraft> = (0..98)
            .map(|i| TargetDraft::new(format!("t{i}"), "https://shop.example"))
            .collect();
        catalog.bulk_import(drafts).await.unwrap();

        let overflow: Vec<TargetDraft> = (0..3)
            .map(|i| TargetDraft::new(format!("x{i}"), "https://shop.example"))
            .collect();
        let err = catalog.bulk_import(overflow).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<CatalogError>(),
            Some(&CatalogError::CapacityExhausted)
        );
        assert_eq!(catalog.list().await.unwrap().len(), 98);

        catalog.add(TargetDraft::new("99", "https://shop.example")).await.unwrap();
        catalog.add(TargetDraft::new("100", "https://shop.example")).await.unwrap();
        assert!(catalog.add(TargetDraft::new("101", "https://shop.example")).await.is_err());
    }
}
