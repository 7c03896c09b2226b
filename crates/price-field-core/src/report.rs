use crate::bounds::AccumulationStats;
use crate::claims::ClaimMarker;
use crate::config::Region;
use crate::map::FieldRun;
use crate::summary::FieldSummary;
use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

/// Serializable snapshot of a solve, handed to the presentation layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub region: Region,
    pub resolution: usize,
    pub converged: bool,
    pub iterations: usize,
    pub residual: f64,
    pub summary: FieldSummary,
    pub stats: AccumulationStats,
    #[serde(default)]
    pub reconciled_cells: usize,
    /// Row `i` covers x-bin `i`; column `j` covers z-bin `j`.
    pub field: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bounds: Option<Vec<Vec<f64>>>,
    /// Unconstrained cells are `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bounds: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<ClaimMarker>,
}

impl FieldReport {
    pub fn from_run(run: &FieldRun, region: Region, include_bounds: bool) -> Self {
        let (upper_bounds, lower_bounds) = if include_bounds {
            let lower = run
                .bounds
                .lower()
                .rows()
                .map(|row| {
                    row.iter()
                        .map(|&v| v.is_finite().then_some(v))
                        .collect()
                })
                .collect();
            (Some(run.bounds.upper().to_rows()), Some(lower))
        } else {
            (None, None)
        };

        Self {
            schema_version: default_schema_version(),
            region,
            resolution: run.field().resolution(),
            converged: run.outcome.is_converged(),
            iterations: run.outcome.iterations(),
            residual: run.outcome.residual(),
            summary: run.summary,
            stats: run.stats,
            reconciled_cells: run.reconciled_cells,
            field: run.field().to_rows(),
            upper_bounds,
            lower_bounds,
            markers: Vec::new(),
        }
    }

    pub fn with_markers(mut self, markers: Vec<ClaimMarker>) -> Self {
        self.markers = markers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::map::PriceMap;
    use crate::observation::Observation;

    #[test]
    fn report_serializes_unconstrained_bounds_as_null() {
        let config = FieldConfig {
            region: Region::square(20.0),
            resolution: 2,
            ..FieldConfig::default()
        };
        let map = PriceMap::new(config.clone());
        let run = map
            .solve(&[Observation::sell(1.0, 1.0, 40), Observation::buy(15.0, 15.0, 10)])
            .unwrap();
        let report = FieldReport::from_run(&run, config.region, true);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["resolution"], 2);
        assert_eq!(json["lower_bounds"][0][0], 40.0);
        assert!(json["lower_bounds"][1][1].is_null());
        assert_eq!(json["upper_bounds"][1][1], 10.0);
        assert!(json.get("markers").is_none());

        let parsed: FieldReport = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.field, report.field);
    }

    #[test]
    fn bounds_are_omitted_unless_requested() {
        let config = FieldConfig::with_resolution(3);
        let run = PriceMap::new(config.clone()).solve(&[]).unwrap();
        let json = serde_json::to_value(FieldReport::from_run(&run, config.region, false)).unwrap();
        assert!(json.get("upper_bounds").is_none());
        assert!(json.get("lower_bounds").is_none());
        assert_eq!(json["field"].as_array().map(Vec::len), Some(3));
    }
}
