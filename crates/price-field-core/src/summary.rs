use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// Value range of a field, used to normalise colour scales downstream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub min: f64,
    pub max: f64,
}

impl FieldSummary {
    /// Map `value` onto `[0, 1]` relative to the field's range.
    /// A flat field maps everything to the midpoint.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

pub fn summarize(field: &Grid) -> FieldSummary {
    field.as_slice().iter().fold(
        FieldSummary {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        },
        |acc, &v| FieldSummary {
            min: acc.min.min(v),
            max: acc.max.max(v),
        },
    )
}
