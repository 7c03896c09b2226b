use crate::bounds::{self, AccumulationStats, BoundGrids};
use crate::config::FieldConfig;
use crate::error::Result;
use crate::grid::Grid;
use crate::observation::Observation;
use crate::solver::{FieldSolver, SolveOutcome};
use crate::spatial::Binner;
use crate::summary::{self, FieldSummary};
use std::time::Instant;
use tracing::info;

#[derive(Clone, Debug)]
pub struct StageTimings {
    pub accumulate_us: u64,
    pub solve_us: u64,
    pub total_us: u64,
}

/// Everything one solve produced.
#[derive(Clone, Debug)]
pub struct FieldRun {
    pub bounds: BoundGrids,
    pub outcome: SolveOutcome,
    pub summary: FieldSummary,
    pub stats: AccumulationStats,
    /// Cells whose buy floor exceeded the sell ceiling before reconciliation.
    pub reconciled_cells: usize,
    pub timings: StageTimings,
}

impl FieldRun {
    pub fn field(&self) -> &Grid {
        self.outcome.field()
    }
}

/// Validated configuration plus the observation → field pipeline.
#[derive(Clone, Debug)]
pub struct PriceMap {
    config: FieldConfig,
    binner: Binner,
}

impl PriceMap {
    pub fn new(config: FieldConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(config: FieldConfig) -> Result<Self> {
        config.validate()?;
        let binner = Binner::new(config.region, config.resolution, config.out_of_region)?;
        Ok(Self { config, binner })
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn binner(&self) -> &Binner {
        &self.binner
    }

    /// Accumulate and reconcile bounds. Returns the bounds, accumulation counts and
    /// the number of reconciled cells.
    pub fn build_bounds(
        &self,
        observations: &[Observation],
    ) -> Result<(BoundGrids, AccumulationStats, usize)> {
        let (raw, stats) = bounds::accumulate(observations, &self.binner)?;
        let (bounds, reconciled) = raw.reconcile();
        Ok((bounds, stats, reconciled))
    }

    pub fn solve(&self, observations: &[Observation]) -> Result<FieldRun> {
        self.run(observations, None)
    }

    /// Solve starting from `seed` instead of the buy-side floor, e.g. a previous
    /// field for the same item.
    pub fn solve_seeded(&self, observations: &[Observation], seed: Grid) -> Result<FieldRun> {
        self.run(observations, Some(seed))
    }

    fn run(&self, observations: &[Observation], seed: Option<Grid>) -> Result<FieldRun> {
        let total_start = Instant::now();
        info!(
            observations = observations.len(),
            resolution = self.config.resolution,
            "building price bounds"
        );

        let t0 = Instant::now();
        let (bounds, stats, reconciled_cells) = self.build_bounds(observations)?;
        let accumulate_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        let solver = match seed {
            Some(seed) => FieldSolver::with_seed(&bounds, &self.config, seed)?,
            None => FieldSolver::new(&bounds, &self.config)?,
        };
        let outcome = solver.run();
        let solve_us = t1.elapsed().as_micros() as u64;

        let summary = summary::summarize(outcome.field());
        info!(
            min = summary.min,
            max = summary.max,
            converged = outcome.is_converged(),
            "price field ready"
        );

        Ok(FieldRun {
            bounds,
            outcome,
            summary,
            stats,
            reconciled_cells,
            timings: StageTimings {
                accumulate_us,
                solve_us,
                total_us: total_start.elapsed().as_micros() as u64,
            },
        })
    }
}
