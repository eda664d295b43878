//! Choice of the instants at which a decay curve is evaluated.
//!
//! A fixed number of evenly spaced samples either aliases (wide window, short
//! half-life) or wastes work (narrow window). The sampler instead sizes the
//! regular grid by how many half-lives the window spans, then pins every dose
//! instant inside the window together with guard samples around it so the
//! upward jump at a dose is drawn as a sharp edge.

use crate::{errors::DecayError, models::*, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// How the regular grid for one window/half-life pair was sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPlan {
    /// Number of intervals of the regular grid (points = intervals + 1).
    pub intervals: usize,
    pub step_ms: f64,
    /// Regular samples per half-life actually achieved.
    pub samples_per_half_life: f64,
    /// True when the ceiling cut the grid below the requested density.
    pub clamped: bool,
}

#[derive(Debug, Clone)]
pub struct AdaptiveSampler {
    config: SamplerConfig,
}

impl Default for AdaptiveSampler {
    fn default() -> Self {
        Self {
            config: SamplerConfig::default(),
        }
    }
}

impl AdaptiveSampler {
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Size the regular grid for `window` and a substance of the given half-life.
    pub fn plan(&self, window: &TimeWindow, half_life_hours: f64) -> Result<SamplingPlan> {
        if !half_life_hours.is_finite() || half_life_hours <= 0.0 {
            return Err(DecayError::MathError(format!(
                "Cannot sample a substance with half-life {} h",
                half_life_hours
            )));
        }

        let duration_ms = window.duration_ms();
        if duration_ms <= 0 {
            return Ok(SamplingPlan {
                intervals: 0,
                step_ms: 0.0,
                samples_per_half_life: 0.0,
                clamped: false,
            });
        }

        let half_lives = duration_ms as f64 / (half_life_hours * MS_PER_HOUR);
        let wanted = (half_lives * self.config.samples_per_half_life).ceil();

        let clamped = wanted > self.config.max_intervals as f64;
        let mut intervals = if clamped {
            self.config.max_intervals
        } else {
            (wanted as usize).max(self.config.min_intervals)
        };
        // Integer-millisecond instants cannot be finer than one per millisecond.
        intervals = intervals.min(duration_ms as usize);

        Ok(SamplingPlan {
            intervals,
            step_ms: duration_ms as f64 / intervals as f64,
            samples_per_half_life: intervals as f64 / half_lives,
            clamped,
        })
    }

    /// Evenly spaced instants covering the window, both ends included.
    pub fn regular_instants(&self, window: &TimeWindow, plan: &SamplingPlan) -> Vec<Instant> {
        if window.is_inverted() {
            return Vec::new();
        }
        if plan.intervals == 0 {
            return vec![window.start];
        }

        let duration = window.end as i128 - window.start as i128;
        let intervals = plan.intervals as i128;
        (0..=intervals)
            .map(|i| (window.start as i128 + i * duration / intervals) as i64)
            .collect()
    }

    /// Dose instants inside the window plus the samples around each one.
    ///
    /// Every dose keeps its own instant and the millisecond before it. The
    /// guard pair at ±`guard_fraction` half-lives is added only while the
    /// doses in the window need no more than `max_intervals` forced samples.
    pub fn forced_instants(
        &self,
        window: &TimeWindow,
        half_life_hours: f64,
        dose_times: &[Instant],
    ) -> Vec<Instant> {
        let in_window: Vec<Instant> = dose_times
            .iter()
            .copied()
            .filter(|&t| window.contains(t))
            .collect();

        let with_guards = in_window.len().saturating_mul(4) <= self.config.max_intervals;
        if !with_guards {
            log::debug!(
                "{} doses in window; dropping guard samples to stay within {} intervals",
                in_window.len(),
                self.config.max_intervals
            );
        }
        let guard = self.guard_offset_ms(half_life_hours);

        in_window
            .into_iter()
            .flat_map(|t| {
                let edge = [t.saturating_sub(1), t];
                let guards = [t.saturating_sub(guard), t.saturating_add(guard)];
                edge.into_iter().chain(guards.into_iter().filter(move |_| with_guards))
            })
            .filter(|&t| window.contains(t))
            .collect()
    }

    /// Ordered, deduplicated instants at which to evaluate one substance's curve.
    ///
    /// `dose_times` are all administration instants of the substance, inside
    /// the window or not. No doses means no curve.
    pub fn sample_instants(
        &self,
        window: &TimeWindow,
        half_life_hours: f64,
        dose_times: &[Instant],
    ) -> Result<Vec<Instant>> {
        if window.is_inverted() || dose_times.is_empty() {
            return Ok(Vec::new());
        }

        let plan = self.plan(window, half_life_hours)?;
        if plan.clamped {
            log::debug!(
                "Sample ceiling reached: {} intervals give {:.2} samples per half-life",
                plan.intervals,
                plan.samples_per_half_life
            );
        }

        let regular = self.regular_instants(window, &plan);
        let forced = self.forced_instants(window, half_life_hours, dose_times);

        Ok(regular
            .into_iter()
            .chain(forced)
            .sorted_unstable()
            .dedup()
            .collect())
    }

    fn guard_offset_ms(&self, half_life_hours: f64) -> i64 {
        let offset = (self.config.guard_fraction * half_life_hours * MS_PER_HOUR).round();
        if offset.is_finite() && offset >= 1.0 {
            offset as i64
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn window_hours(hours: i64) -> TimeWindow {
        TimeWindow::new(0, hours * HOUR).unwrap()
    }

    #[test]
    fn test_density_follows_half_lives_spanned() {
        let sampler = AdaptiveSampler::default();
        let plan = sampler.plan(&window_hours(960), 24.0).unwrap();
        assert_eq!(plan.intervals, 400);
        assert!(!plan.clamped);

        // Narrow window falls back to the floor.
        let plan = sampler.plan(&window_hours(24), 24.0).unwrap();
        assert_eq!(plan.intervals, 200);
    }

    #[test]
    fn test_doubling_window_keeps_minimum_density() {
        let sampler = AdaptiveSampler::default();
        let density = sampler.config().samples_per_half_life;
        let mut hours = 12;
        while hours <= 12 * 256 {
            let plan = sampler.plan(&window_hours(hours), 6.0).unwrap();
            if !plan.clamped {
                assert!(
                    plan.samples_per_half_life >= density,
                    "{} h window gave {} samples per half-life",
                    hours,
                    plan.samples_per_half_life
                );
            }
            hours *= 2;
        }
    }

    #[test]
    fn test_ceiling_bounds_point_count() {
        let sampler = AdaptiveSampler::default();
        let window = window_hours(24 * 365);
        let plan = sampler.plan(&window, 0.01).unwrap();
        assert!(plan.clamped);
        assert_eq!(plan.intervals, 4000);

        let instants = sampler.sample_instants(&window, 0.01, &[0]).unwrap();
        assert!(instants.len() <= 4001 + 4);
    }

    #[test]
    fn test_dose_instants_always_included() {
        let sampler = AdaptiveSampler::default();
        let window = window_hours(240);
        let doses = [0, 7 * HOUR + 13, 100 * HOUR + 999, 239 * HOUR + 1, 500 * HOUR];
        let instants = sampler.sample_instants(&window, 8.0, &doses).unwrap();

        for &t in &doses[..4] {
            assert!(instants.contains(&t), "missing dose instant {}", t);
            if t > 0 {
                assert!(instants.contains(&(t - 1)));
            }
        }
        assert!(!instants.contains(&(500 * HOUR)));
    }

    #[test]
    fn test_guard_points_surround_dose() {
        let sampler = AdaptiveSampler::default();
        let window = window_hours(100);
        let dose = 50 * HOUR + 7;
        let instants = sampler.sample_instants(&window, 10.0, &[dose]).unwrap();
        assert!(instants.contains(&(dose - HOUR)));
        assert!(instants.contains(&(dose + HOUR)));
    }

    #[test]
    fn test_output_sorted_unique_and_inside_window() {
        let sampler = AdaptiveSampler::default();
        let window = TimeWindow::new(5 * HOUR, 77 * HOUR).unwrap();
        let doses = [0, 5 * HOUR, 6 * HOUR, 6 * HOUR, 77 * HOUR];
        let instants = sampler.sample_instants(&window, 3.0, &doses).unwrap();

        assert_eq!(instants.first(), Some(&window.start));
        assert_eq!(instants.last(), Some(&window.end));
        assert!(instants.windows(2).all(|w| w[0] < w[1]));
        assert!(instants.iter().all(|&t| window.contains(t)));
    }

    #[test]
    fn test_no_doses_no_samples() {
        let sampler = AdaptiveSampler::default();
        assert!(sampler.sample_instants(&window_hours(10), 1.0, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_zero_width_window() {
        let sampler = AdaptiveSampler::default();
        let window = TimeWindow::new(42, 42).unwrap();
        assert_eq!(sampler.sample_instants(&window, 1.0, &[0]).unwrap(), vec![42]);
        assert_eq!(sampler.sample_instants(&window, 1.0, &[42]).unwrap(), vec![42]);
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let sampler = AdaptiveSampler::default();
        let window = TimeWindow { start: 10, end: 0 };
        assert!(sampler.sample_instants(&window, 1.0, &[5]).unwrap().is_empty());
    }

    #[test]
    fn test_tiny_window_does_not_duplicate() {
        let sampler = AdaptiveSampler::default();
        let window = TimeWindow::new(0, 50).unwrap();
        let instants = sampler.sample_instants(&window, 24.0, &[0]).unwrap();
        assert_eq!(instants.len(), 51);
    }

    #[test]
    fn test_dense_dosing_drops_guards_but_keeps_edges() {
        let sampler = AdaptiveSampler::default();
        let window = window_hours(24 * 365);
        let doses: Vec<Instant> = (0..24 * 365).map(|k| k * HOUR + 30_000).collect();
        let instants = sampler.sample_instants(&window, 5.0, &doses).unwrap();

        let max_intervals = sampler.config().max_intervals;
        assert!(instants.len() <= max_intervals + 1 + 2 * doses.len());
        for &t in &doses {
            assert!(instants.binary_search(&t).is_ok(), "missing dose instant {}", t);
            assert!(instants.binary_search(&(t - 1)).is_ok());
        }
        // Guard offset is 30 minutes; with this many doses it is not forced.
        assert!(instants.binary_search(&(HOUR + 30_000 + HOUR / 2)).is_err());
    }

    #[test]
    fn test_guards_kept_while_forced_set_fits() {
        let sampler = AdaptiveSampler::default();
        let window = window_hours(24 * 365);
        let max_intervals = sampler.config().max_intervals as i64;
        let doses: Vec<Instant> = (0..max_intervals / 4).map(|k| k * 2 * HOUR + 7).collect();
        let instants = sampler.sample_instants(&window, 5.0, &doses).unwrap();

        for &t in &doses {
            assert!(instants.binary_search(&(t + HOUR / 2)).is_ok());
        }
    }

    #[test]
    fn test_extreme_instants_do_not_overflow() {
        let sampler = AdaptiveSampler::default();
        let window = TimeWindow {
            start: i64::MIN,
            end: i64::MAX,
        };
        let instants = sampler
            .sample_instants(&window, 1e6, &[i64::MIN, 0, i64::MAX])
            .unwrap();
        assert_eq!(instants.first(), Some(&i64::MIN));
        assert_eq!(instants.last(), Some(&i64::MAX));
        assert!(instants.contains(&0));
        assert!(instants.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SamplerConfig {
            guard_fraction: 0.0,
            ..SamplerConfig::default()
        };
        assert!(AdaptiveSampler::new(config).is_err());
    }
}
