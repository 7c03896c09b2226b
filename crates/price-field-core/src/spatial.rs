use crate::config::{FieldConfig, FieldConfigError, OutOfRegionPolicy, Region};
use crate::error::FieldError;
use serde::{Deserialize, Serialize};

/// Discrete grid coordinate: `i` bins the x axis, `j` bins the z axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub i: usize,
    pub j: usize,
}

impl CellIndex {
    pub fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }
}

/// Scale a coordinate onto `[0, resolution)` and floor it. May be negative, too
/// large, or NaN; callers decide what that means.
fn scaled_floor(value: f64, extent: f64, resolution: usize) -> f64 {
    (value * resolution as f64 / extent).floor()
}

fn in_range(raw: f64, resolution: usize) -> bool {
    raw >= 0.0 && raw < resolution as f64
}

/// Map `(x, z)` to the cell containing it.
///
/// Coordinates outside `[0, width) × [0, height)` (including NaN and infinities)
/// produce `FieldError::OutOfRegionObservation` instead of an index.
pub fn bin(x: f64, z: f64, region: &Region, resolution: usize) -> Result<CellIndex, FieldError> {
    let raw_i = scaled_floor(x, region.width_units, resolution);
    let raw_j = scaled_floor(z, region.height_units, resolution);
    if in_range(raw_i, resolution) && in_range(raw_j, resolution) {
        Ok(CellIndex::new(raw_i as usize, raw_j as usize))
    } else {
        Err(FieldError::OutOfRegionObservation {
            x,
            z,
            raw_i: raw_i as i64,
            raw_j: raw_j as i64,
        })
    }
}

/// Result of binning one coordinate under an `OutOfRegionPolicy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Inside(CellIndex),
    Clamped(CellIndex),
    Dropped,
}

/// Binner bound to one region, resolution and out-of-region policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Binner {
    region: Region,
    resolution: usize,
    policy: OutOfRegionPolicy,
}

impl Binner {
    /// Rejects an invalid region and resolutions outside `1..=MAX_RESOLUTION`.
    pub fn new(
        region: Region,
        resolution: usize,
        policy: OutOfRegionPolicy,
    ) -> Result<Self, FieldConfigError> {
        region.validate()?;
        if resolution == 0 {
            return Err(FieldConfigError::ZeroResolution);
        }
        if resolution > FieldConfig::MAX_RESOLUTION {
            return Err(FieldConfigError::ResolutionTooLarge {
                max: FieldConfig::MAX_RESOLUTION,
                actual: resolution,
            });
        }
        Ok(Self {
            region,
            resolution,
            policy,
        })
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn place(&self, x: f64, z: f64) -> Result<Placement, FieldError> {
        match bin(x, z, &self.region, self.resolution) {
            Ok(cell) => Ok(Placement::Inside(cell)),
            Err(err) => match self.policy {
                OutOfRegionPolicy::Drop => Ok(Placement::Dropped),
                OutOfRegionPolicy::Reject => Err(err),
                OutOfRegionPolicy::Clamp => {
                    if !(x.is_finite() && z.is_finite()) {
                        return Ok(Placement::Dropped);
                    }
                    let last = (self.resolution - 1) as f64;
                    let clamp = |raw: f64| raw.max(0.0).min(last) as usize;
                    let i = clamp(scaled_floor(x, self.region.width_units, self.resolution));
                    let j = clamp(scaled_floor(z, self.region.height_units, self.resolution));
                    Ok(Placement::Clamped(CellIndex::new(i, j)))
                }
            },
        }
    }
}
