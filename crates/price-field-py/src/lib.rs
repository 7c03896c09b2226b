use price_field_core::{FieldConfig, FieldReport, Observation, PriceMap};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Python bindings for price-field-core. Inputs and outputs travel as JSON so the
/// plotting side only needs the standard library to read them.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Solve a price field. Returns the `FieldReport` JSON, bounds included.
#[pyfunction]
fn solve_price_field(config_json: &str, observations_json: &str) -> PyResult<String> {
    let config: FieldConfig = serde_json::from_str(config_json)
        .map_err(|e| PyValueError::new_err(format!("invalid config: {e}")))?;
    let observations: Vec<Observation> = serde_json::from_str(observations_json)
        .map_err(|e| PyValueError::new_err(format!("invalid observations: {e}")))?;

    let region = config.region;
    let map = PriceMap::try_new(config).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let run = map
        .solve(&observations)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    serde_json::to_string(&FieldReport::from_run(&run, region, true))
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(solve_price_field, m)?)?;
    Ok(())
}
