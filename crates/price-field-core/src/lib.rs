//! Dense price fields from sparse, map-anchored buy/sell observations.
//!
//! Observations are binned onto a square grid, folded into per-cell buy floors and
//! sell ceilings, reconciled where the two cross, and then relaxed toward a discrete
//! harmonic field that respects those bounds.

pub mod bounds;
pub mod claims;
pub mod config;
pub mod error;
pub mod grid;
pub mod map;
pub mod observation;
pub mod report;
pub mod solver;
pub mod spatial;
pub mod summary;

pub use bounds::{accumulate, AccumulationStats, BoundGrids, RawBounds};
pub use claims::{
    assemble_observations, claim_markers, AssembledObservations, ClaimMarker, Location,
    LocationLookup, LocationTable, MarketOrders, OrderRecord, ReadThroughLookup,
};
pub use config::{FieldConfig, FieldConfigError, OutOfRegionPolicy, Region};
pub use error::FieldError;
pub use grid::Grid;
pub use map::{FieldRun, PriceMap};
pub use observation::{Observation, Side};
pub use report::FieldReport;
pub use solver::{FieldSolver, SolveOutcome, SolverState};
pub use spatial::{bin, Binner, CellIndex, Placement};
pub use summary::{summarize, FieldSummary};
