use price_field_core::{FieldConfig, Observation, PriceMap, Region};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::time::Instant;

fn create_observations(config: &FieldConfig, count: usize, seed: u64) -> Vec<Observation> {
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x = rng.random::<f64>() * config.region.width_units;
            let z = rng.random::<f64>() * config.region.height_units;
            // Buyers bid low, sellers ask high, with overlap so some cells cross.
            if rng.random::<bool>() {
                Observation::buy(x, z, rng.random_range(50..150u64))
            } else {
                Observation::sell(x, z, rng.random_range(120..400u64))
            }
        })
        .collect()
}

fn main() {
    let observation_count = 20_000;
    let resolutions = [25, 50, 100];
    println!(
        "Benchmarking {} observations at resolutions {:?}",
        observation_count, resolutions
    );

    for resolution in resolutions {
        let config = FieldConfig {
            region: Region::default(),
            resolution,
            convergence_threshold: 1e-12,
            max_iterations: 200_000,
            progress_every: 0,
            ..FieldConfig::default()
        };
        let observations = create_observations(&config, observation_count, 42);
        let map = PriceMap::new(config);

        let start = Instant::now();
        let run = match map.solve(&observations) {
            Ok(run) => run,
            Err(e) => {
                eprintln!("resolution {resolution}: solve failed: {e}");
                continue;
            }
        };
        let elapsed = start.elapsed();

        println!(
            "resolution {:>4}: {:?} total (accumulate {} us, solve {} us), {} iterations, converged: {}, range [{:.2}, {:.2}], reconciled cells: {}",
            resolution,
            elapsed,
            run.timings.accumulate_us,
            run.timings.solve_us,
            run.outcome.iterations(),
            run.outcome.is_converged(),
            run.summary.min,
            run.summary.max,
            run.reconciled_cells,
        );
    }
}
