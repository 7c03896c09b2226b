use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physical extent of the modeled map, in map units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub width_units: f64,
    pub height_units: f64,
}

impl Region {
    /// Nine regions of 2560 medium hexes, each three small hexes wide.
    pub const DEFAULT_SIDE_UNITS: f64 = 2560.0 * 3.0 * 3.0;

    pub fn new(width_units: f64, height_units: f64) -> Self {
        Self {
            width_units,
            height_units,
        }
    }

    pub fn square(side_units: f64) -> Self {
        Self::new(side_units, side_units)
    }

    pub fn validate(&self) -> Result<(), FieldConfigError> {
        if !(self.width_units.is_finite() && self.width_units > 0.0) {
            return Err(FieldConfigError::InvalidRegionWidth(self.width_units));
        }
        if !(self.height_units.is_finite() && self.height_units > 0.0) {
            return Err(FieldConfigError::InvalidRegionHeight(self.height_units));
        }
        Ok(())
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::square(Self::DEFAULT_SIDE_UNITS)
    }
}

/// What to do with an observation whose coordinate bins outside the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRegionPolicy {
    /// Skip the observation and count it as dropped.
    #[default]
    Drop,
    /// Snap finite coordinates to the nearest edge cell. Non-finite ones are dropped.
    Clamp,
    /// Fail accumulation with `FieldError::OutOfRegionObservation`.
    Reject,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub region: Region,
    /// Grid side length in cells.
    pub resolution: usize,
    /// Fraction of the discrete Laplacian added per iteration.
    pub relaxation: f64,
    /// Largest squared per-cell change accepted as "no change".
    pub convergence_threshold: f64,
    pub max_iterations: usize,
    /// Log convergence progress every N iterations. Zero disables progress logging.
    pub progress_every: usize,
    pub out_of_region: OutOfRegionPolicy,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            resolution: 100,
            relaxation: 0.1,
            convergence_threshold: 1e-32,
            max_iterations: 2_000_000,
            progress_every: 1000,
            out_of_region: OutOfRegionPolicy::Drop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldConfigError {
    #[error("region width must be positive and finite, got {0}")]
    InvalidRegionWidth(f64),
    #[error("region height must be positive and finite, got {0}")]
    InvalidRegionHeight(f64),
    #[error("resolution must be at least 1")]
    ZeroResolution,
    #[error("resolution ({actual}) exceeds supported maximum ({max})")]
    ResolutionTooLarge { max: usize, actual: usize },
    #[error("relaxation must be in (0, {max}], got {actual}")]
    InvalidRelaxation { max: f64, actual: f64 },
    #[error("convergence_threshold must be finite and non-negative, got {0}")]
    InvalidConvergenceThreshold(f64),
    #[error("max_iterations must be positive")]
    ZeroIterationBudget,
}

impl FieldConfig {
    pub const MAX_RESOLUTION: usize = 4096;
    /// Stability limit of the explicit 5-point Laplacian step.
    pub const MAX_RELAXATION: f64 = 0.25;

    pub fn with_resolution(resolution: usize) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FieldConfigError> {
        self.region.validate()?;
        if self.resolution == 0 {
            return Err(FieldConfigError::ZeroResolution);
        }
        if self.resolution > Self::MAX_RESOLUTION {
            return Err(FieldConfigError::ResolutionTooLarge {
                max: Self::MAX_RESOLUTION,
                actual: self.resolution,
            });
        }
        if !(self.relaxation > 0.0 && self.relaxation <= Self::MAX_RELAXATION) {
            return Err(FieldConfigError::InvalidRelaxation {
                max: Self::MAX_RELAXATION,
                actual: self.relaxation,
            });
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0) {
            return Err(FieldConfigError::InvalidConvergenceThreshold(
                self.convergence_threshold,
            ));
        }
        if self.max_iterations == 0 {
            return Err(FieldConfigError::ZeroIterationBudget);
        }
        Ok(())
    }
}
