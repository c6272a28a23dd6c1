//! Price ranking over a snapshot: nearest matches to a target and the overall spread

use crate::models::{ScrapeResult, Snapshot};
use crate::price::parse_price;

/// Number of results returned by a price query
pub const DEFAULT_RESULT_COUNT: usize = 5;

/// A scrape result whose price text parsed to a number
#[derive(Debug, Clone, PartialEq)]
pub struct PricedResult {
    pub result: ScrapeResult,
    pub price_num: f64,
    /// Distance from the queried price; only set by [`closest_by_price`]
    pub difference: Option<f64>,
}

/// Answer to a price query
#[derive(Debug, Clone, PartialEq)]
pub enum PriceAnswer {
    /// At least one result matched the target exactly
    Closest(Vec<PricedResult>),
    /// No exact match: lowest, highest and middle prices instead
    Spread(Vec<PricedResult>),
    /// Nothing in the snapshot has a usable price
    NoPriceData,
}

/// Successful results with a parseable price, in scrape order.
pub fn priced(snapshot: &Snapshot) -> Vec<PricedResult> {
    snapshot
        .results
        .iter()
        .filter_map(|result| {
            let price_num = parse_price(result.price()?)?;
            Some(PricedResult {
                result: result.clone(),
                price_num,
                difference: None,
            })
        })
        .collect()
}

/// The `count` results whose price is closest to `target`.
///
/// Equal differences keep their scrape order.
pub fn closest_by_price(priced: &[PricedResult], target: f64, count: usize) -> Vec<PricedResult> {
    let mut ranked: Vec<PricedResult> = priced
        .iter()
        .map(|p| PricedResult {
            difference: Some((p.price_num - target).abs()),
            ..p.clone()
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| {
        a.difference
            .unwrap_or(f64::INFINITY)
            .total_cmp(&b.difference.unwrap_or(f64::INFINITY))
    });
    ranked.truncate(count);
    ranked
}

/// Minimum, maximum and the element at index `len / 2` of the price-sorted set,
/// in that order. At most three entries.
pub fn price_range(priced: &[PricedResult]) -> Vec<PricedResult> {
    let mut sorted = priced.to_vec();
    sorted.sort_by(|a, b| a.price_num.total_cmp(&b.price_num));

    let mut picks = Vec::with_capacity(3);
    if let Some(first) = sorted.first() {
        picks.push(first.clone());
    }
    if sorted.len() > 1 {
        picks.push(sorted[sorted.len() - 1].clone());
    }
    if sorted.len() > 2 {
        picks.push(sorted[sorted.len() / 2].clone());
    }
    picks.truncate(DEFAULT_RESULT_COUNT);
    picks
}

/// Closest matches when the best one is exact, otherwise the spread.
pub fn answer_price_query(snapshot: &Snapshot, target: f64, count: usize) -> PriceAnswer {
    let priced = priced(snapshot);
    if priced.is_empty() {
        return PriceAnswer::NoPriceData;
    }

    let closest = closest_by_price(&priced, target, count);
    let exact = closest
        .first()
        .and_then(|best| best.difference)
        .is_some_and(|d| d == 0.0);

    if exact {
        PriceAnswer::Closest(closest)
    } else {
        PriceAnswer::Spread(price_range(&priced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MonitorTarget, PageReading};
    use chrono::Utc;

    fn result(id: u32, price: &str) -> ScrapeResult {
        let target = MonitorTarget {
            id,
            name: format!("Product {id}"),
            url: format!("https://shop.example/{id}"),
            price_selector: ".price".to_string(),
            stock_selector: ".stock".to_string(),
            check_text: "Sold Out".to_string(),
        };
        ScrapeResult::success(
            &target,
            PageReading {
                price: price.to_string(),
                stock: "In stock".to_string(),
            },
        )
    }

    fn snapshot(prices: &[&str]) -> Snapshot {
        Snapshot {
            results: prices
                .iter()
                .enumerate()
                .map(|(i, p)| result(i as u32 + 1, p))
                .collect(),
            taken_at: Utc::now(),
        }
    }

    fn ids(results: &[PricedResult]) -> Vec<u32> {
        results.iter().map(|p| p.result.id).collect()
    }

    #[test]
    fn unparseable_and_failed_results_are_excluded() {
        let mut snap = snapshot(&["$10", "N/A", "$30"]);
        let broken = MonitorTarget {
            id: 4,
            name: "Broken".to_string(),
            url: "https://shop.example/4".to_string(),
            price_selector: ".price".to_string(),
            stock_selector: ".stock".to_string(),
            check_text: String::new(),
        };
        snap.results.push(ScrapeResult::failure(&broken, "timeout"));

        assert_eq!(ids(&priced(&snap)), vec![1, 3]);
    }

    #[test]
    fn closest_sorted_by_difference_and_capped() {
        let snap = snapshot(&["$100", "$48", "$55", "$10", "$51", "$200", "$49"]);
        let closest = closest_by_price(&priced(&snap), 50.0, 5);

        assert_eq!(closest.len(), 5);
        let diffs: Vec<f64> = closest.iter().filter_map(|p| p.difference).collect();
        assert!(diffs.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ids(&closest), vec![5, 7, 2, 3, 4]);
    }

    #[test]
    fn closest_returns_fewer_when_set_is_small() {
        let snap = snapshot(&["$5", "$6"]);
        assert_eq!(closest_by_price(&priced(&snap), 1.0, 5).len(), 2);
    }

    #[test]
    fn ties_keep_scrape_order() {
        let snap = snapshot(&["$60", "$40", "$60", "$40"]);
        let closest = closest_by_price(&priced(&snap), 50.0, 5);
        assert_eq!(ids(&closest), vec![1, 2, 3, 4]);
    }

    #[test]
    fn range_of_four_is_min_max_then_index_two() {
        let snap = snapshot(&["30", "10", "40", "20"]);
        let range = price_range(&priced(&snap));
        let prices: Vec<f64> = range.iter().map(|p| p.price_num).collect();
        assert_eq!(prices, vec![10.0, 40.0, 30.0]);
    }

    #[test]
    fn range_of_small_sets() {
        assert!(price_range(&[]).is_empty());

        let one = priced(&snapshot(&["7"]));
        assert_eq!(price_range(&one).len(), 1);

        let two = priced(&snapshot(&["9", "7"]));
        let prices: Vec<f64> = price_range(&two).iter().map(|p| p.price_num).collect();
        assert_eq!(prices, vec![7.0, 9.0]);
    }

    #[test]
    fn empty_priced_set_yields_empty_results() {
        assert!(closest_by_price(&[], 10.0, 5).is_empty());
        assert_eq!(
            answer_price_query(&snapshot(&["N/A"]), 10.0, 5),
            PriceAnswer::NoPriceData
        );
    }

    #[test]
    fn exact_match_returns_closest() {
        let snap = snapshot(&["$20", "$10", "$11"]);
        match answer_price_query(&snap, 10.0, 5) {
            PriceAnswer::Closest(found) => assert_eq!(ids(&found), vec![2, 3, 1]),
            other => panic!("expected closest, got {other:?}"),
        }
    }

    #[test]
    fn near_miss_falls_back_to_spread() {
        let snap = snapshot(&["$20", "$10.01", "$11"]);
        match answer_price_query(&snap, 10.0, 5) {
            PriceAnswer::Spread(found) => {
                assert_eq!(ids(&found), vec![2, 1, 3]);
                assert!(found.iter().all(|p| p.difference.is_none()));
            }
            other => panic!("expected spread, got {other:?}"),
        }
    }
}
