//! Bound-constrained relaxation of the price field.
//!
//! Each iteration adds `relaxation × ∇²f` (5-point stencil, edge values replicated
//! outward) and clamps every cell back into `[upper, lower]`. The field diffuses
//! freely through unconstrained cells and is pinned wherever observations fix a bound.


use crate::bounds::BoundGrids;
use crate::config::FieldConfig;
use crate::error::{FieldError, Result};
use crate::grid::Grid;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Grids smaller than this relax on the calling thread.
const PARALLEL_MIN_CELLS: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverState {
    /// Field seeded, no iteration run yet.
    Initializing,
    Relaxing,
    Converged,
    /// Iteration budget spent before reaching the threshold.
    Exhausted,
}

/// Terminal result of a solve.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveOutcome {
    Converged {
        field: Grid,
        iterations: usize,
        residual: f64,
    },
    /// Best field available when the iteration budget ran out.
    BestEffort {
        field: Grid,
        iterations: usize,
        residual: f64,
    },
}

impl SolveOutcome {
    pub fn field(&self) -> &Grid {
        match self {
            SolveOutcome::Converged { field, .. } | SolveOutcome::BestEffort { field, .. } => field,
        }
    }

    pub fn into_field(self) -> Grid {
        match self {
            SolveOutcome::Converged { field, .. } | SolveOutcome::BestEffort { field, .. } => field,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            SolveOutcome::Converged { iterations, .. }
            | SolveOutcome::BestEffort { iterations, .. } => *iterations,
        }
    }

    /// Largest squared per-cell change of the final iteration.
    pub fn residual(&self) -> f64 {
        match self {
            SolveOutcome::Converged { residual, .. }
            | SolveOutcome::BestEffort { residual, .. } => *residual,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, SolveOutcome::Converged { .. })
    }

    /// The field if it converged, `FieldError::NonConvergence` otherwise.
    pub fn into_converged(self) -> Result<Grid> {
        match self {
            SolveOutcome::Converged { field, .. } => Ok(field),
            SolveOutcome::BestEffort {
                iterations,
                residual,
                ..
            } => Err(FieldError::NonConvergence {
                iterations,
                residual,
            }),
        }
    }
}

/// Damped Jacobi solver over a double-buffered field.
pub struct FieldSolver<'a> {
    bounds: &'a BoundGrids,
    field: Grid,
    scratch: Grid,
    relaxation: f64,
    convergence_threshold: f64,
    max_iterations: usize,
    progress_every: usize,
    state: SolverState,
    iterations: usize,
    residual: f64,
}

impl<'a> FieldSolver<'a> {
    /// Seed the field with the buy-side floor, which already lies inside the bounds.
    pub fn new(bounds: &'a BoundGrids, config: &FieldConfig) -> Result<Self> {
        Self::with_seed(bounds, config, bounds.upper().clone())
    }

    /// Seed the field with `seed`, clamped into the bounds. Non-finite seed cells
    /// start at the buy-side floor.
    pub fn with_seed(bounds: &'a BoundGrids, config: &FieldConfig, seed: Grid) -> Result<Self> {
        config.validate()?;
        for resolution in [bounds.resolution(), seed.resolution()] {
            if resolution != config.resolution {
                return Err(FieldError::ShapeMismatch {
                    expected: config.resolution,
                    actual: resolution,
                });
            }
        }

        let mut field = seed;
        let floor = bounds.upper().as_slice();
        for (offset, value) in field.as_mut_slice().iter_mut().enumerate() {
            let start = if value.is_finite() {
                *value
            } else {
                floor[offset]
            };
            *value = bounds.clamp_at(offset, start);
        }
        let scratch = field.clone();

        Ok(Self {
            bounds,
            field,
            scratch,
            relaxation: config.relaxation,
            convergence_threshold: config.convergence_threshold,
            max_iterations: config.max_iterations,
            progress_every: config.progress_every,
            state: SolverState::Initializing,
            iterations: 0,
            residual: f64::INFINITY,
        })
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn field(&self) -> &Grid {
        &self.field
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Run one smoothing + clamp iteration and return its residual.
    pub fn step(&mut self) -> f64 {
        let n = self.field.resolution();
        let relaxation = self.relaxation;
        let bounds = self.bounds;
        let previous = self.field.as_slice();
        let next = self.scratch.as_mut_slice();
        let parallel = n * n >= PARALLEL_MIN_CELLS;

        let relax = |(i, row): (usize, &mut [f64])| {
            relax_row(previous, n, i, row, bounds, relaxation);
        };
        if parallel {
            next.par_chunks_mut(n).enumerate().for_each(relax);
        } else {
            next.chunks_mut(n).enumerate().for_each(relax);
        }

        let next = self.scratch.as_slice();
        let squared_change = |(a, b): (&f64, &f64)| (b - a) * (b - a);
        let residual = if parallel {
            previous
                .par_iter()
                .zip(next.par_iter())
                .map(squared_change)
                .reduce(|| 0.0, f64::max)
        } else {
            previous
                .iter()
                .zip(next.iter())
                .map(squared_change)
                .fold(0.0, f64::max)
        };

        std::mem::swap(&mut self.field, &mut self.scratch);
        self.iterations += 1;
        self.residual = residual;
        self.state = SolverState::Relaxing;
        residual
    }

    /// Iterate until the residual drops to the threshold or the budget runs out.
    pub fn run(mut self) -> SolveOutcome {
        debug!(
            resolution = self.field.resolution(),
            max_iterations = self.max_iterations,
            "relaxing price field"
        );
        loop {
            let residual = self.step();
            if residual <= self.convergence_threshold {
                self.state = SolverState::Converged;
                info!(
                    iterations = self.iterations,
                    residual, "price field converged"
                );
                return SolveOutcome::Converged {
                    field: self.field,
                    iterations: self.iterations,
                    residual,
                };
            }
            if self.iterations >= self.max_iterations {
                self.state = SolverState::Exhausted;
                warn!(
                    iterations = self.iterations,
                    residual,
                    threshold = self.convergence_threshold,
                    "iteration budget exhausted before convergence"
                );
                return SolveOutcome::BestEffort {
                    field: self.field,
                    iterations: self.iterations,
                    residual,
                };
            }
            if self.progress_every > 0 && self.iterations % self.progress_every == 0 {
                let progress = convergence_progress(residual, self.convergence_threshold);
                info!(
                    iterations = self.iterations,
                    residual,
                    "field convergence {:.2}%",
                    progress.unwrap_or(0.0)
                );
            }
        }
    }
}

/// Relax row `i` of `field` into `out`, clamping each cell into its bounds.
fn relax_row(
    field: &[f64],
    n: usize,
    i: usize,
    out: &mut [f64],
    bounds: &BoundGrids,
    relaxation: f64,
) {
    let row = i * n;
    let north = i.saturating_sub(1) * n;
    let south = (i + 1).min(n - 1) * n;
    for (j, cell) in out.iter_mut().enumerate() {
        let west = j.saturating_sub(1);
        let east = (j + 1).min(n - 1);
        let centre = field[row + j];
        let laplacian =
            field[north + j] + field[south + j] + field[row + west] + field[row + east]
                - 4.0 * centre;
        *cell = bounds.clamp_at(row + j, centre + relaxation * laplacian);
    }
}

/// Progress toward the threshold on a log scale, in percent.
/// `None` when the threshold is zero and no log scale exists.
pub fn convergence_progress(residual: f64, threshold: f64) -> Option<f64> {
    if threshold <= 0.0 || threshold >= 1.0 {
        return None;
    }
    if residual <= threshold {
        return Some(100.0);
    }
    Some((100.0 * residual.log10() / threshold.log10()).clamp(0.0, 100.0))
}
