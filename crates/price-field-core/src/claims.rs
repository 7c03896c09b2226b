//! Turning market order records into located observations.
//!
//! Orders reference a claim, not a coordinate. A `LocationLookup` resolves claim ids
//! to map coordinates; orders whose claim cannot be located are skipped.

use crate::observation::{Observation, Side};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

const PROGRESS_EVERY_ORDERS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(alias = "X")]
    pub x: f64,
    #[serde(alias = "Z")]
    pub z: f64,
}

impl Location {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }
}

/// Resolves a claim id to its map location.
pub trait LocationLookup {
    fn lookup(&mut self, claim_id: &str) -> Option<Location>;
}

/// In-memory claim id → location table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationTable {
    entries: HashMap<String, Location>,
}

impl LocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, claim_id: &str) -> Option<Location> {
        self.entries.get(claim_id).copied()
    }

    pub fn insert(&mut self, claim_id: impl Into<String>, location: Location) {
        self.entries.insert(claim_id.into(), location);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocationLookup for LocationTable {
    fn lookup(&mut self, claim_id: &str) -> Option<Location> {
        self.get(claim_id)
    }
}

/// Read-through lookup: serve from the table, fall back to `fetch` on a miss and
/// remember what it returns.
pub struct ReadThroughLookup<'t, F> {
    table: &'t mut LocationTable,
    fetch: F,
    fetched: usize,
    failed: usize,
}

impl<'t, F> ReadThroughLookup<'t, F>
where
    F: FnMut(&str) -> Option<Location>,
{
    pub fn new(table: &'t mut LocationTable, fetch: F) -> Self {
        Self {
            table,
            fetch,
            fetched: 0,
            failed: 0,
        }
    }

    /// Misses the fallback resolved and stored.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Misses the fallback could not resolve.
    pub fn failed(&self) -> usize {
        self.failed
    }
}

impl<F> LocationLookup for ReadThroughLookup<'_, F>
where
    F: FnMut(&str) -> Option<Location>,
{
    fn lookup(&mut self, claim_id: &str) -> Option<Location> {
        if let Some(location) = self.table.get(claim_id) {
            return Some(location);
        }
        match (self.fetch)(claim_id) {
            Some(location) => {
                debug!(claim_id, x = location.x, z = location.z, "fetched claim location");
                self.table.insert(claim_id, location);
                self.fetched += 1;
                Some(location)
            }
            None => {
                self.failed += 1;
                None
            }
        }
    }
}

/// Order thresholds arrive as either JSON numbers or numeric strings.
fn price_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub claim_entity_id: String,
    #[serde(default)]
    pub claim_name: String,
    #[serde(deserialize_with = "price_from_number_or_string")]
    pub price_threshold: u64,
}

/// Buy and sell order books for one item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketOrders {
    pub buy_orders: Vec<OrderRecord>,
    pub sell_orders: Vec<OrderRecord>,
}

impl MarketOrders {
    fn sided(&self) -> impl Iterator<Item = (Side, &OrderRecord)> {
        self.buy_orders
            .iter()
            .map(|o| (Side::Buy, o))
            .chain(self.sell_orders.iter().map(|o| (Side::Sell, o)))
    }

    pub fn len(&self) -> usize {
        self.buy_orders.len() + self.sell_orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssembledObservations {
    pub observations: Vec<Observation>,
    /// Claim ids with no known location, sorted and deduplicated.
    pub unresolved_claims: Vec<String>,
}

/// Resolve every order's claim and emit one observation per located order.
pub fn assemble_observations(
    orders: &MarketOrders,
    lookup: &mut impl LocationLookup,
) -> AssembledObservations {
    let total = orders.len();
    let mut observations = Vec::with_capacity(total);
    let mut unresolved = Vec::new();

    for (n, (side, order)) in orders.sided().enumerate() {
        if n % PROGRESS_EVERY_ORDERS == 0 {
            debug!(
                done = n,
                total,
                "parsing orders {:.2}%",
                100.0 * n as f64 / total as f64
            );
        }
        match lookup.lookup(&order.claim_entity_id) {
            Some(location) => observations.push(Observation {
                x: location.x,
                z: location.z,
                price: order.price_threshold,
                side,
            }),
            None => {
                warn!(
                    claim_id = %order.claim_entity_id,
                    claim_name = %order.claim_name,
                    "claim location unknown, skipping order"
                );
                unresolved.push(order.claim_entity_id.clone());
            }
        }
    }
    unresolved.sort();
    unresolved.dedup();

    info!(
        observations = observations.len(),
        unresolved_claims = unresolved.len(),
        "assembled observations from market orders"
    );
    AssembledObservations {
        observations,
        unresolved_claims: unresolved,
    }
}

/// Per-claim extremes for marker rendering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimMarker {
    pub claim_id: String,
    pub location: Location,
    pub max_buy: Option<u64>,
    pub min_sell: Option<u64>,
}

/// Highest buy and lowest sell threshold per located claim, sorted by claim id.
pub fn claim_markers(orders: &MarketOrders, lookup: &mut impl LocationLookup) -> Vec<ClaimMarker> {
    let mut extremes: BTreeMap<&str, (Option<u64>, Option<u64>)> = BTreeMap::new();
    for (side, order) in orders.sided() {
        let entry = extremes.entry(order.claim_entity_id.as_str()).or_default();
        let price = order.price_threshold;
        match side {
            Side::Buy => entry.0 = Some(entry.0.map_or(price, |p| p.max(price))),
            Side::Sell => entry.1 = Some(entry.1.map_or(price, |p| p.min(price))),
        }
    }

    extremes
        .into_iter()
        .filter_map(|(claim_id, (max_buy, min_sell))| {
            lookup.lookup(claim_id).map(|location| ClaimMarker {
                claim_id: claim_id.to_string(),
                location,
                max_buy,
                min_sell,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(claim: &str, price: u64) -> OrderRecord {
        OrderRecord {
            claim_entity_id: claim.to_string(),
            claim_name: format!("claim {claim}"),
            price_threshold: price,
        }
    }

    fn table() -> LocationTable {
        let mut table = LocationTable::new();
        table.insert("a", Location::new(10.0, 20.0));
        table.insert("b", Location::new(300.0, 40.0));
        table
    }

    #[test]
    fn parses_market_json_with_string_prices() {
        let json = r#"{
            "buyOrders": [{"claimEntityId": "a", "claimName": "Alpha", "priceThreshold": "12"}],
            "sellOrders": [{"claimEntityId": "b", "priceThreshold": 30}],
            "item": {"name": "ignored"}
        }"#;
        let orders: MarketOrders = serde_json::from_str(json).expect("orders should parse");
        assert_eq!(orders.buy_orders[0].price_threshold, 12);
        assert_eq!(orders.buy_orders[0].claim_name, "Alpha");
        assert_eq!(orders.sell_orders[0].price_threshold, 30);
        assert!(serde_json::from_str::<OrderRecord>(
            r#"{"claimEntityId": "a", "priceThreshold": "cheap"}"#
        )
        .is_err());
    }

    #[test]
    fn location_table_accepts_cache_column_names() {
        let table: LocationTable =
            serde_json::from_str(r#"{"a": {"X": 1.5, "Z": 2.5}, "b": {"x": 3.0, "z": 4.0}}"#)
                .unwrap();
        assert_eq!(table.get("a"), Some(Location::new(1.5, 2.5)));
        assert_eq!(table.get("b"), Some(Location::new(3.0, 4.0)));
    }

    #[test]
    fn assembly_skips_unlocated_claims() {
        let orders = MarketOrders {
            buy_orders: vec![order("a", 5), order("ghost", 9), order("b", 7)],
            sell_orders: vec![order("ghost", 11), order("a", 15)],
        };
        let mut lookup = table();
        let assembled = assemble_observations(&orders, &mut lookup);
        assert_eq!(
            assembled.observations,
            vec![
                Observation::buy(10.0, 20.0, 5),
                Observation::buy(300.0, 40.0, 7),
                Observation::sell(10.0, 20.0, 15),
            ]
        );
        assert_eq!(assembled.unresolved_claims, vec!["ghost".to_string()]);
    }

    #[test]
    fn read_through_caches_fetched_locations() {
        let mut table = table();
        let mut calls = Vec::new();
        {
            let mut lookup = ReadThroughLookup::new(&mut table, |id: &str| {
                calls.push(id.to_string());
                (id == "c").then(|| Location::new(7.0, 8.0))
            });
            assert_eq!(lookup.lookup("a"), Some(Location::new(10.0, 20.0)));
            assert_eq!(lookup.lookup("c"), Some(Location::new(7.0, 8.0)));
            assert_eq!(lookup.lookup("c"), Some(Location::new(7.0, 8.0)));
            assert_eq!(lookup.lookup("d"), None);
            assert_eq!(lookup.fetched(), 1);
            assert_eq!(lookup.failed(), 1);
        }
        assert_eq!(calls, vec!["c".to_string(), "d".to_string()]);
        assert_eq!(table.get("c"), Some(Location::new(7.0, 8.0)));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn markers_keep_per_claim_extremes() {
        let orders = MarketOrders {
            buy_orders: vec![order("a", 5), order("a", 9), order("b", 2), order("ghost", 1)],
            sell_orders: vec![order("a", 15), order("a", 12)],
        };
        let markers = claim_markers(&orders, &mut table());
        assert_eq!(
            markers,
            vec![
                ClaimMarker {
                    claim_id: "a".to_string(),
                    location: Location::new(10.0, 20.0),
                    max_buy: Some(9),
                    min_sell: Some(12),
                },
                ClaimMarker {
                    claim_id: "b".to_string(),
                    location: Location::new(300.0, 40.0),
                    max_buy: Some(2),
                    min_sell: None,
                },
            ]
        );
    }
}
