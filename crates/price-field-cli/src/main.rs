mod location_cache;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use location_cache::LocationCache;
use price_field_core::{
    assemble_observations, claim_markers, AssembledObservations, ClaimMarker, FieldConfig,
    FieldReport, Location, LocationTable, MarketOrders, Observation, OutOfRegionPolicy, PriceMap,
    ReadThroughLookup,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Interpolate a map-wide price field from buy/sell orders")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve from a JSON list of located observations
    Solve {
        /// Observation list: [{"x":..,"z":..,"price":..,"side":"buy"|"sell"}, ...]
        #[arg(long)]
        observations: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Solve from a market order listing, resolving claims through a location cache
    Market {
        /// Market listing with `buyOrders` and `sellOrders`
        #[arg(long)]
        orders: PathBuf,
        /// Claim id → {X, Z} cache, updated in place when new claims are resolved
        #[arg(long, default_value = "saved_claim_locations.json")]
        locations: PathBuf,
        /// Claim records ({entityId, locationX, locationZ}) used for cache misses
        #[arg(long)]
        claim_records: Option<PathBuf>,
        /// Attach per-claim buy/sell markers to the report
        #[arg(long, default_value_t = false)]
        markers: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON field configuration; missing keys take defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the grid resolution
    #[arg(long)]
    resolution: Option<usize>,
    /// Override the iteration budget
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Override the out-of-region policy
    #[arg(long, value_parser = parse_policy)]
    out_of_region: Option<OutOfRegionPolicy>,
    /// Include reconciled bound grids in the report
    #[arg(long, default_value_t = false)]
    include_bounds: bool,
    /// Where to write the report JSON
    #[arg(long, default_value = "price_field.json")]
    output: PathBuf,
}

fn parse_policy(raw: &str) -> Result<OutOfRegionPolicy, String> {
    match raw {
        "drop" => Ok(OutOfRegionPolicy::Drop),
        "clamp" => Ok(OutOfRegionPolicy::Clamp),
        "reject" => Ok(OutOfRegionPolicy::Reject),
        other => Err(format!("unknown policy {other:?}, expected drop|clamp|reject")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRecord {
    entity_id: String,
    location_x: f64,
    location_z: f64,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn load_config(args: &CommonArgs) -> Result<FieldConfig> {
    let mut config = match &args.config {
        Some(path) => read_json(path)?,
        None => FieldConfig::default(),
    };
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(policy) = args.out_of_region {
        config.out_of_region = policy;
    }
    Ok(config)
}

fn solve_and_write(
    args: &CommonArgs,
    observations: &[Observation],
    markers: Vec<ClaimMarker>,
) -> Result<()> {
    let config = load_config(args)?;
    let region = config.region;
    let map = PriceMap::try_new(config).context("invalid field configuration")?;
    let run = map.solve(observations)?;
    if !run.outcome.is_converged() {
        warn!(
            iterations = run.outcome.iterations(),
            residual = run.outcome.residual(),
            "writing best-effort field"
        );
    }

    let report = FieldReport::from_run(&run, region, args.include_bounds).with_markers(markers);
    let json = serde_json::to_string(&report)?;
    fs::write(&args.output, json)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        min = run.summary.min,
        max = run.summary.max,
        total_us = run.timings.total_us,
        "wrote price field report"
    );
    Ok(())
}

/// Resolve claims through `fetch` while assembling observations, then build markers
/// from the table alone so claims that failed are not fetched again.
fn resolve_market<F>(
    orders: &MarketOrders,
    table: &mut LocationTable,
    fetch: F,
    markers: bool,
) -> (AssembledObservations, Vec<ClaimMarker>)
where
    F: FnMut(&str) -> Option<Location>,
{
    let mut lookup = ReadThroughLookup::new(table, fetch);
    let assembled = assemble_observations(orders, &mut lookup);
    info!(
        fetched = lookup.fetched(),
        failed = lookup.failed(),
        "resolved claim locations"
    );
    if !markers {
        return (assembled, Vec::new());
    }
    (assembled, claim_markers(orders, table))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("===== price field starting =====");

    match cli.command {
        Command::Solve {
            observations,
            common,
        } => {
            let observations: Vec<Observation> = read_json(&observations)?;
            solve_and_write(&common, &observations, Vec::new())?;
        }
        Command::Market {
            orders,
            locations,
            claim_records,
            markers,
            common,
        } => {
            let orders: MarketOrders = read_json(&orders)?;
            let records: HashMap<String, Location> = match claim_records {
                Some(path) => read_json::<Vec<ClaimRecord>>(&path)?
                    .into_iter()
                    .map(|r| (r.entity_id, Location::new(r.location_x, r.location_z)))
                    .collect(),
                None => HashMap::new(),
            };

            let mut cache = LocationCache::load(&locations);
            let (assembled, marker_list) = resolve_market(
                &orders,
                cache.table_mut(),
                |id| records.get(id).copied(),
                markers,
            );
            cache.save()?;
            solve_and_write(&common, &assembled.observations, marker_list)?;
        }
    }

    info!("===== price field shutting down =====");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use price_field_core::OrderRecord;

    fn order(claim: &str, price: u64) -> OrderRecord {
        OrderRecord {
            claim_entity_id: claim.to_string(),
            claim_name: String::new(),
            price_threshold: price,
        }
    }

    #[test]
    fn markers_do_not_refetch_unresolved_claims() {
        let orders = MarketOrders {
            buy_orders: vec![order("known", 10), order("missing", 12)],
            sell_orders: vec![order("known", 40)],
        };
        let mut table = LocationTable::new();
        let mut calls: Vec<String> = Vec::new();
        let (assembled, markers) = resolve_market(
            &orders,
            &mut table,
            |id| {
                calls.push(id.to_string());
                (id == "known").then(|| Location::new(5.0, 6.0))
            },
            true,
        );

        assert_eq!(calls, vec!["known", "missing"]);
        assert_eq!(assembled.observations.len(), 2);
        assert_eq!(assembled.unresolved_claims, vec!["missing"]);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].claim_id, "known");
        assert_eq!(markers[0].max_buy, Some(10));
        assert_eq!(markers[0].min_sell, Some(40));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn markers_are_skipped_when_not_requested() {
        let orders = MarketOrders {
            buy_orders: vec![order("known", 10)],
            sell_orders: Vec::new(),
        };
        let mut table = LocationTable::new();
        table.insert("known", Location::new(1.0, 1.0));
        let (assembled, markers) = resolve_market(&orders, &mut table, |_| None, false);
        assert_eq!(assembled.observations.len(), 1);
        assert!(markers.is_empty());
    }
}
