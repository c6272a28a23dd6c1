//! Environment-driven settings

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use tracing::warn;

use crate::pagination::DEFAULT_PAGE_SIZE;

const DEFAULT_DATABASE_URL: &str = "sqlite:database/targets.db";
const DEFAULT_CACHE_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// How long snapshots and page views stay valid
    pub cache_ttl: Duration,
    pub page_size: usize,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub chrome_executable: Option<PathBuf>,
    /// Skip the rendered strategy and go straight to plain HTTP
    pub disable_browser: bool,
    pub discord_webhook_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            cache_ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            chrome_executable: None,
            disable_browser: false,
            discord_webhook_url: None,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ttl_secs = parse_or(
            "PRICE_WATCH_CACHE_TTL_SECS",
            non_empty("PRICE_WATCH_CACHE_TTL_SECS"),
            DEFAULT_CACHE_TTL_SECS,
        );
        let page_size = parse_or(
            "PRICE_WATCH_PAGE_SIZE",
            non_empty("PRICE_WATCH_PAGE_SIZE"),
            defaults.page_size,
        );

        let cache_ttl = Duration::try_seconds(ttl_secs.max(0)).unwrap_or_else(|| {
            warn!("Ignoring out-of-range PRICE_WATCH_CACHE_TTL_SECS={}, using default", ttl_secs);
            defaults.cache_ttl
        });

        Self {
            database_url: non_empty("PRICE_WATCH_DATABASE_URL").unwrap_or(defaults.database_url),
            cache_ttl,
            page_size: page_size.max(1),
            chrome_executable: non_empty("PRICE_WATCH_CHROME").map(PathBuf::from),
            disable_browser: non_empty("PRICE_WATCH_DISABLE_BROWSER")
                .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes")),
            discord_webhook_url: non_empty("DISCORD_WEBHOOK_URL"),
        }
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[]);
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.cache_ttl, Duration::minutes(5));
        assert_eq!(s.page_size, 5);
        assert!(!s.disable_browser);
        assert!(s.discord_webhook_url.is_none());
    }

    #[test]
    fn overrides_and_bad_values() {
        let s = settings(&[
            ("PRICE_WATCH_CACHE_TTL_SECS", "60"),
            ("PRICE_WATCH_PAGE_SIZE", "ten"),
            ("PRICE_WATCH_DISABLE_BROWSER", "True"),
            ("PRICE_WATCH_CHROME", "/opt/chrome"),
            ("DISCORD_WEBHOOK_URL", "  "),
        ]);
        assert_eq!(s.cache_ttl, Duration::seconds(60));
        assert_eq!(s.page_size, 5);
        assert!(s.disable_browser);
        assert_eq!(s.chrome_executable, Some(PathBuf::from("/opt/chrome")));
        assert!(s.discord_webhook_url.is_none());
    }

    #[test]
    fn huge_ttl_falls_back_to_default() {
        let s = settings(&[("PRICE_WATCH_CACHE_TTL_SECS", "99999999999999999")]);
        assert_eq!(s.cache_ttl, Duration::minutes(5));

        let s = settings(&[("PRICE_WATCH_CACHE_TTL_SECS", "-10")]);
        assert_eq!(s.cache_ttl, Duration::zero());
    }
}
