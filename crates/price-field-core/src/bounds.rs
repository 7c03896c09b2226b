//! Per-cell price bounds derived from observations.
//!
//! Buy observations raise a cell's lower edge of the admissible window (nobody sells
//! below the best local buyer); sell observations lower its upper edge (nobody buys
//! above the cheapest local seller). The grids are named after the solver's clamp:
//! `upper` holds the buy-side floor, `lower` the sell-side ceiling.

use crate::error::{FieldError, Result};
use crate::grid::Grid;
use crate::observation::{Observation, Side};
use crate::spatial::{Binner, Placement};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Neutral buy-side floor: no buyer seen.
pub const NO_BUY_BOUND: f64 = 0.0;
/// Neutral sell-side ceiling: no seller seen.
pub const NO_SELL_BOUND: f64 = f64::INFINITY;

const MIN_OBSERVATIONS_PER_TASK: usize = 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationStats {
    /// Observations written into a cell, clamped ones included.
    pub binned: usize,
    pub clamped: usize,
    pub dropped: usize,
}

impl AccumulationStats {
    fn merge(self, other: Self) -> Self {
        Self {
            binned: self.binned + other.binned,
            clamped: self.clamped + other.clamped,
            dropped: self.dropped + other.dropped,
        }
    }
}

/// Bound grids straight out of accumulation. May still be infeasible.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBounds {
    upper: Grid,
    lower: Grid,
}

/// Reconciled bounds: `upper[c] <= lower[c]` for every cell.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundGrids {
    upper: Grid,
    lower: Grid,
}

struct Partial {
    bounds: RawBounds,
    stats: AccumulationStats,
}

impl Partial {
    fn new(resolution: usize) -> Self {
        Self {
            bounds: RawBounds::unconstrained(resolution),
            stats: AccumulationStats::default(),
        }
    }

    fn absorb(mut self, obs: &Observation, binner: &Binner) -> Result<Self> {
        let cell = match binner.place(obs.x, obs.z)? {
            Placement::Inside(cell) => cell,
            Placement::Clamped(cell) => {
                self.stats.clamped += 1;
                cell
            }
            Placement::Dropped => {
                debug!(x = obs.x, z = obs.z, "dropping out-of-region observation");
                self.stats.dropped += 1;
                return Ok(self);
            }
        };
        self.stats.binned += 1;
        let price = obs.price as f64;
        match obs.side {
            Side::Buy => {
                let current = self.bounds.upper.get(cell);
                self.bounds.upper.set(cell, current.max(price));
            }
            Side::Sell => {
                let current = self.bounds.lower.get(cell);
                self.bounds.lower.set(cell, current.min(price));
            }
        }
        Ok(self)
    }

    fn merge(mut self, other: Self) -> Self {
        self.bounds.upper.merge_max(&other.bounds.upper);
        self.bounds.lower.merge_min(&other.bounds.lower);
        self.stats = self.stats.merge(other.stats);
        self
    }
}

/// Fold observations into per-cell extremal bounds.
///
/// Max and min are order independent, so the observation slice is split across the
/// rayon pool and the partial grids are reduced element-wise.
pub fn accumulate(
    observations: &[Observation],
    binner: &Binner,
) -> Result<(RawBounds, AccumulationStats)> {
    let resolution = binner.resolution();
    let partial = observations
        .par_iter()
        .with_min_len(MIN_OBSERVATIONS_PER_TASK)
        .try_fold(
            || Partial::new(resolution),
            |acc, obs| acc.absorb(obs, binner),
        )
        .try_reduce(|| Partial::new(resolution), |a, b| Ok(a.merge(b)))?;

    if partial.stats.dropped > 0 {
        warn!(
            dropped = partial.stats.dropped,
            "observations outside the region were dropped"
        );
    }
    if partial.stats.clamped > 0 {
        warn!(
            clamped = partial.stats.clamped,
            "observations outside the region were clamped to edge cells"
        );
    }
    Ok((partial.bounds, partial.stats))
}

impl RawBounds {
    pub fn unconstrained(resolution: usize) -> Self {
        Self {
            upper: Grid::filled(resolution, NO_BUY_BOUND),
            lower: Grid::filled(resolution, NO_SELL_BOUND),
        }
    }

    pub fn from_grids(upper: Grid, lower: Grid) -> Result<Self> {
        if upper.resolution() != lower.resolution() {
            return Err(FieldError::ShapeMismatch {
                expected: upper.resolution(),
                actual: lower.resolution(),
            });
        }
        Ok(Self { upper, lower })
    }

    pub fn resolution(&self) -> usize {
        self.upper.resolution()
    }

    pub fn upper(&self) -> &Grid {
        &self.upper
    }

    pub fn lower(&self) -> &Grid {
        &self.lower
    }

    /// Collapse every crossed cell (`upper > lower`) to its midpoint.
    /// Returns the reconciled bounds and the number of cells that were crossed.
    pub fn reconcile(self) -> (BoundGrids, usize) {
        let Self {
            mut upper,
            mut lower,
        } = self;
        let mut crossed = 0usize;
        for (u, l) in upper.as_mut_slice().iter_mut().zip(lower.as_mut_slice()) {
            if *u > *l {
                let midpoint = (*u + *l) / 2.0;
                *u = midpoint;
                *l = midpoint;
                crossed += 1;
            }
        }
        if crossed > 0 {
            info!(cells = crossed, "reconciled crossed buy/sell bounds");
        }
        (BoundGrids { upper, lower }, crossed)
    }
}

impl BoundGrids {
    pub fn resolution(&self) -> usize {
        self.upper.resolution()
    }

    /// Buy-side floor per cell.
    pub fn upper(&self) -> &Grid {
        &self.upper
    }

    /// Sell-side ceiling per cell.
    pub fn lower(&self) -> &Grid {
        &self.lower
    }

    /// Clamp into the admissible window of cell `offset`.
    #[inline]
    pub(crate) fn clamp_at(&self, offset: usize, value: f64) -> f64 {
        value
            .max(self.upper.as_slice()[offset])
            .min(self.lower.as_slice()[offset])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutOfRegionPolicy, Region};
    use crate::spatial::CellIndex;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    fn binner(resolution: usize, policy: OutOfRegionPolicy) -> Binner {
        Binner::new(Region::square(100.0), resolution, policy).unwrap()
    }

    #[test]
    fn keeps_extremal_price_per_side_per_cell() {
        let observations = vec![
            Observation::buy(1.0, 1.0, 10),
            Observation::buy(2.0, 3.0, 25),
            Observation::buy(4.0, 4.0, 5),
            Observation::sell(1.0, 1.0, 90),
            Observation::sell(3.0, 2.0, 60),
            Observation::sell(60.0, 60.0, 70),
        ];
        let (raw, stats) =
            accumulate(&observations, &binner(2, OutOfRegionPolicy::Drop)).expect("in region");
        let origin = CellIndex::new(0, 0);
        assert_eq!(raw.upper().get(origin), 25.0);
        assert_eq!(raw.lower().get(origin), 60.0);
        assert_eq!(raw.lower().get(CellIndex::new(1, 1)), 70.0);
        assert_eq!(raw.upper().get(CellIndex::new(1, 1)), NO_BUY_BOUND);
        assert_eq!(raw.lower().get(CellIndex::new(0, 1)), NO_SELL_BOUND);
        assert_eq!(
            stats,
            AccumulationStats {
                binned: 6,
                clamped: 0,
                dropped: 0
            }
        );
    }

    #[test]
    fn result_is_independent_of_observation_order() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut observations: Vec<Observation> = (0..20_000)
            .map(|_| {
                let x = rng.random::<f64>() * 100.0;
                let z = rng.random::<f64>() * 100.0;
                let price = rng.random_range(1..1000u64);
                if rng.random::<bool>() {
                    Observation::buy(x, z, price)
                } else {
                    Observation::sell(x, z, price)
                }
            })
            .collect();
        let binner = binner(16, OutOfRegionPolicy::Drop);
        let (expected, _) = accumulate(&observations, &binner).unwrap();
        for _ in 0..3 {
            observations.shuffle(&mut rng);
            let (shuffled, stats) = accumulate(&observations, &binner).unwrap();
            assert_eq!(shuffled, expected);
            assert_eq!(stats.binned, 20_000);
        }
    }

    #[test]
    fn out_of_region_observations_never_touch_other_cells() {
        let observations = vec![
            Observation::buy(150.0, 10.0, 40),
            Observation::sell(-5.0, 10.0, 3),
            Observation::buy(10.0, 10.0, 7),
        ];
        let (raw, stats) = accumulate(&observations, &binner(4, OutOfRegionPolicy::Drop)).unwrap();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.binned, 1);
        let touched: Vec<f64> = raw
            .upper()
            .as_slice()
            .iter()
            .copied()
            .filter(|&v| v != NO_BUY_BOUND)
            .collect();
        assert_eq!(touched, vec![7.0]);
        assert!(raw.lower().as_slice().iter().all(|&v| v == NO_SELL_BOUND));
    }

    #[test]
    fn clamp_policy_lands_on_edge_cell() {
        let observations = vec![Observation::buy(150.0, 10.0, 40)];
        let (raw, stats) =
            accumulate(&observations, &binner(4, OutOfRegionPolicy::Clamp)).unwrap();
        assert_eq!(stats.clamped, 1);
        assert_eq!(raw.upper().get(CellIndex::new(3, 0)), 40.0);
    }

    #[test]
    fn reject_policy_fails_accumulation() {
        let observations = vec![
            Observation::buy(10.0, 10.0, 7),
            Observation::sell(10.0, 100.0, 9),
        ];
        let err = accumulate(&observations, &binner(4, OutOfRegionPolicy::Reject)).unwrap_err();
        assert!(matches!(
            err,
            FieldError::OutOfRegionObservation { raw_j: 4, .. }
        ));
    }

    #[test]
    fn reconcile_collapses_crossed_cells_to_midpoint() {
        let upper = Grid::from_vec(2, vec![80.0, 10.0, 0.0, 30.0]).unwrap();
        let lower = Grid::from_vec(2, vec![20.0, 50.0, f64::INFINITY, 30.0]).unwrap();
        let (bounds, crossed) = RawBounds::from_grids(upper, lower).unwrap().reconcile();
        assert_eq!(crossed, 1);
        assert_eq!(bounds.upper().as_slice(), &[50.0, 10.0, 0.0, 30.0]);
        assert_eq!(bounds.lower().as_slice(), &[50.0, 50.0, f64::INFINITY, 30.0]);
    }

    #[test]
    fn reconciled_bounds_are_ordered() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let observations: Vec<Observation> = (0..500)
            .map(|k| {
                let x = rng.random::<f64>() * 100.0;
                let z = rng.random::<f64>() * 100.0;
                let price = rng.random_range(1..200u64);
                if k % 2 == 0 {
                    Observation::buy(x, z, price)
                } else {
                    Observation::sell(x, z, price)
                }
            })
            .collect();
        let (raw, _) = accumulate(&observations, &binner(8, OutOfRegionPolicy::Drop)).unwrap();
        let (bounds, _) = raw.reconcile();
        assert!(bounds
            .upper()
            .as_slice()
            .iter()
            .zip(bounds.lower().as_slice())
            .all(|(u, l)| u <= l));
    }

    #[test]
    fn from_grids_checks_shapes() {
        let err = RawBounds::from_grids(Grid::filled(2, 0.0), Grid::filled(3, 1.0)).unwrap_err();
        assert_eq!(
            err,
            FieldError::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        );
    }
}
