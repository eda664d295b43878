use crate::{models::*, parser::StateParser, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// (name, typical half-life in hours, typical dose in mg)
const CATALOG: [(&str, f64, f64); 8] = [
    ("Caffeine", 5.0, 100.0),
    ("Ibuprofen", 2.0, 400.0),
    ("Paracetamol", 2.5, 500.0),
    ("Sertraline", 26.0, 50.0),
    ("Diazepam", 43.0, 5.0),
    ("Melatonin", 0.75, 3.0),
    ("Fluoxetine", 96.0, 20.0),
    ("Cholecalciferol", 360.0, 0.05),
];

const PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#808000",
];

const SCHEDULE_DAYS: i64 = 7;
const HOUR_MS: i64 = 3_600_000;

pub struct ExampleDataGenerator;

impl ExampleDataGenerator {
    /// Reproducible state with up to eight substances, each dosed on a fixed
    /// interval for a week starting at `start`.
    pub fn generate_state(n_substances: usize, start: Instant) -> Result<StateSnapshot> {
        let mut rng = StdRng::seed_from_u64(42); // Reproducible results
        let mut snapshot = StateSnapshot::default();

        for (index, &(name, half_life, dose)) in CATALOG.iter().take(n_substances).enumerate() {
            let substance_id = format!("drug-{}", index + 1);
            let half_life = half_life * rng.gen_range(0.8..1.2);
            snapshot.substances.push(Substance::new(
                substance_id.clone(),
                name,
                (half_life * 100.0).round() / 100.0,
                PALETTE[index % PALETTE.len()],
            )?);

            let interval_hours: i64 = [6, 8, 12, 24][rng.gen_range(0..4)];
            let n_doses = SCHEDULE_DAYS * 24 / interval_hours;

            for k in 0..n_doses {
                // Roughly one dose in ten is skipped.
                if rng.gen_bool(0.1) {
                    continue;
                }
                let jitter_ms = rng.gen_range(-30..=30) * 60_000;
                let time = start + k * interval_hours * HOUR_MS + jitter_ms;
                let amount = dose * rng.gen_range(0.75..1.25);

                snapshot.dose_events.push(DoseEvent::new(
                    format!("{}-dose-{}", substance_id, k + 1),
                    substance_id.clone(),
                    (amount * 1000.0).round() / 1000.0,
                    time,
                )?);
            }
        }

        log::info!(
            "Generated example state with {} substances and {} doses",
            snapshot.substances.len(),
            snapshot.dose_events.len()
        );
        Ok(snapshot)
    }

    pub fn generate_state_file<P: AsRef<Path>>(
        output_path: P,
        n_substances: usize,
        start: Instant,
    ) -> Result<StateSnapshot> {
        let snapshot = Self::generate_state(n_substances, start)?;
        StateParser::save_state(&snapshot, output_path)?;
        Ok(snapshot)
    }
}
