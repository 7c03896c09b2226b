use crate::config::FieldConfigError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] FieldConfigError),

    #[error("observation at ({x}, {z}) bins to cell ({raw_i}, {raw_j}) outside the grid")]
    OutOfRegionObservation { x: f64, z: f64, raw_i: i64, raw_j: i64 },

    #[error("field did not converge after {iterations} iterations (residual {residual:e})")]
    NonConvergence { iterations: usize, residual: f64 },

    #[error("grid resolution {actual} does not match configured resolution {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, FieldError>;
