use crate::{
    decay::{total_at, totals_along},
    models::*,
    sampler::AdaptiveSampler,
    Result,
};
use itertools::Itertools;
use std::collections::HashSet;

/// Projects a state snapshot onto plot-ready series, one per dosed substance.
#[derive(Debug, Clone, Default)]
pub struct CurveBuilder {
    sampler: AdaptiveSampler,
}

impl CurveBuilder {
    pub fn new(sampler: AdaptiveSampler) -> Self {
        Self { sampler }
    }

    pub fn with_config(config: SamplerConfig) -> Result<Self> {
        Ok(Self::new(AdaptiveSampler::new(config)?))
    }

    pub fn sampler(&self) -> &AdaptiveSampler {
        &self.sampler
    }

    /// Build curves for every substance that has at least one dose.
    ///
    /// Doses pointing at unknown substances are ignored, as are records with
    /// unusable amounts. A substance whose half-life is invalid is reported in
    /// `rejected` instead of failing the whole render.
    pub fn build(&self, snapshot: &StateSnapshot, window: &TimeWindow) -> Result<CurveSet> {
        if window.is_inverted() {
            log::warn!(
                "Window start {} is after end {}; nothing to render",
                window.start,
                window.end
            );
            return Ok(CurveSet::empty(*window));
        }

        let mut doses_by_substance = snapshot
            .dose_events
            .iter()
            .filter(|dose| dose.is_usable())
            .into_group_map_by(|dose| dose.substance_id.as_str());

        let mut result = CurveSet::empty(*window);
        let mut seen = HashSet::new();

        for substance in &snapshot.substances {
            if !seen.insert(substance.id.as_str()) {
                log::warn!(
                    "Skipping substance {} ({}): id already used by an earlier substance",
                    substance.id,
                    substance.name
                );
                result.rejected.push(RejectedSubstance {
                    substance_id: substance.id.clone(),
                    reason: "duplicate substance id".to_string(),
                });
                continue;
            }

            let Some(mut doses) = doses_by_substance.remove(substance.id.as_str()) else {
                continue;
            };

            if !substance.half_life.is_finite() || substance.half_life <= 0.0 {
                log::warn!(
                    "Skipping substance {} ({}): invalid half-life {}",
                    substance.id,
                    substance.name,
                    substance.half_life
                );
                result.rejected.push(RejectedSubstance {
                    substance_id: substance.id.clone(),
                    reason: format!("invalid half-life {} h", substance.half_life),
                });
                continue;
            }

            doses.sort_by_key(|dose| dose.time);
            let curve = self.build_substance(substance, &doses, window)?;
            log::debug!(
                "Substance {}: {} curve points, {} dose markers",
                substance.id,
                curve.decay_curve.len(),
                curve.dose_markers.len()
            );
            result.curves.push(curve);
        }

        if !doses_by_substance.is_empty() {
            let dangling: usize = doses_by_substance.values().map(Vec::len).sum();
            log::debug!(
                "Ignoring {} dose events referencing unknown substances {:?}",
                dangling,
                doses_by_substance.keys().sorted().collect::<Vec<_>>()
            );
        }

        Ok(result)
    }

    /// Series for one substance. `doses` must all belong to `substance` and be
    /// sorted by administration instant.
    pub fn build_substance(
        &self,
        substance: &Substance,
        doses: &[&DoseEvent],
        window: &TimeWindow,
    ) -> Result<SubstanceCurve> {
        let half_life = substance.half_life;
        let dose_times: Vec<Instant> = doses.iter().map(|dose| dose.time).collect();

        let instants = self.sampler.sample_instants(window, half_life, &dose_times)?;
        let totals = totals_along(doses, half_life, &instants)?;
        let decay_curve: Vec<SamplePoint> = instants
            .into_iter()
            .zip(totals)
            .map(|(time, concentration)| SamplePoint {
                time,
                concentration,
                dose_id: None,
            })
            .collect();

        // Markers reuse the sampled value so they sit exactly on the line.
        let dose_markers = doses
            .iter()
            .filter(|dose| window.contains(dose.time))
            .map(|dose| -> Result<SamplePoint> {
                let concentration = match decay_curve.binary_search_by_key(&dose.time, |p| p.time) {
                    Ok(index) => decay_curve[index].concentration,
                    Err(_) => total_at(doses.iter().copied(), half_life, dose.time)?,
                };
                Ok(SamplePoint {
                    time: dose.time,
                    concentration,
                    dose_id: Some(dose.id.clone()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SubstanceCurve {
            substance_id: substance.id.clone(),
            name: substance.name.clone(),
            color: substance.color.clone(),
            half_life,
            decay_curve,
            dose_markers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HOUR: i64 = 3_600_000;

    fn snapshot() -> StateSnapshot {
        StateSnapshot {
            substances: vec![
                Substance::new("a", "Alpha", 24.0, "#ff0000").unwrap(),
                Substance::new("b", "Beta", 4.0, "#00ff00").unwrap(),
                Substance::new("c", "Gamma", 12.0, "#0000ff").unwrap(),
            ],
            dose_events: vec![
                DoseEvent::new("a2", "a", 50.0, 12 * HOUR).unwrap(),
                DoseEvent::new("a1", "a", 100.0, 0).unwrap(),
                DoseEvent::new("b1", "b", 20.0, 6 * HOUR).unwrap(),
                DoseEvent::new("x1", "ghost", 999.0, 6 * HOUR).unwrap(),
            ],
        }
    }

    #[test]
    fn test_substances_without_doses_are_excluded() {
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&snapshot(), &window).unwrap();

        let ids: Vec<&str> = curves.curves.iter().map(|c| c.substance_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(curves.curve("c").is_none());
        assert!(curves.rejected.is_empty());
    }

    #[test]
    fn test_dangling_doses_contribute_nothing() {
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&snapshot(), &window).unwrap();
        let beta = curves.curve("b").unwrap();

        let marker = &beta.dose_markers[0];
        assert_eq!(marker.concentration, 20.0);
        assert!(beta.decay_curve.iter().all(|p| p.concentration <= 20.0));
    }

    #[test]
    fn test_markers_sit_on_curve() {
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&snapshot(), &window).unwrap();
        let alpha = curves.curve("a").unwrap();

        assert_eq!(alpha.dose_markers.len(), 2);
        assert_eq!(alpha.dose_markers[0].dose_id.as_deref(), Some("a1"));
        assert_eq!(alpha.dose_markers[1].dose_id.as_deref(), Some("a2"));

        for marker in &alpha.dose_markers {
            let on_curve = alpha
                .decay_curve
                .iter()
                .find(|p| p.time == marker.time)
                .expect("dose instant sampled");
            assert_eq!(on_curve.concentration, marker.concentration);
            assert!(on_curve.dose_id.is_none());
        }

        let expected = 100.0 * 0.5_f64.powf(0.5) + 50.0;
        assert_relative_eq!(alpha.dose_markers[1].concentration, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_jump_at_dose_is_sharp() {
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&snapshot(), &window).unwrap();
        let alpha = curves.curve("a").unwrap();

        let idx = alpha
            .decay_curve
            .iter()
            .position(|p| p.time == 12 * HOUR)
            .unwrap();
        let before = &alpha.decay_curve[idx - 1];
        let at = &alpha.decay_curve[idx];
        assert_eq!(before.time, 12 * HOUR - 1);
        assert_relative_eq!(at.concentration - before.concentration, 50.0, epsilon = 1e-6);
    }

    #[test]
    fn test_curve_non_increasing_between_doses() {
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&snapshot(), &window).unwrap();
        let alpha = curves.curve("a").unwrap();

        for pair in alpha.decay_curve.windows(2) {
            let crosses_dose = pair[0].time < 12 * HOUR && pair[1].time >= 12 * HOUR;
            if !crosses_dose {
                assert!(pair[1].concentration <= pair[0].concentration);
            }
        }
    }

    #[test]
    fn test_markers_only_inside_window() {
        let window = TimeWindow::new(6 * HOUR, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&snapshot(), &window).unwrap();
        let alpha = curves.curve("a").unwrap();

        assert_eq!(alpha.dose_markers.len(), 1);
        // The dose before the window still shapes the curve.
        assert_relative_eq!(
            alpha.decay_curve[0].concentration,
            100.0 * 0.5_f64.powf(0.25),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_empty_and_inverted_inputs() {
        let builder = CurveBuilder::default();
        let window = TimeWindow::new(0, HOUR).unwrap();
        assert!(builder.build(&StateSnapshot::default(), &window).unwrap().curves.is_empty());

        let inverted = TimeWindow { start: HOUR, end: 0 };
        assert!(builder.build(&snapshot(), &inverted).unwrap().curves.is_empty());
    }

    #[test]
    fn test_invalid_half_life_is_rejected_not_fatal() {
        let mut state = snapshot();
        state.substances[1].half_life = 0.0;
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&state, &window).unwrap();

        assert!(curves.curve("a").is_some());
        assert!(curves.curve("b").is_none());
        assert_eq!(curves.rejected.len(), 1);
        assert_eq!(curves.rejected[0].substance_id, "b");
    }

    #[test]
    fn test_duplicate_substance_id_is_reported() {
        let mut state = snapshot();
        state
            .substances
            .push(Substance::new("a", "Alpha copy", 2.0, "#ffffff").unwrap());
        let window = TimeWindow::new(0, 48 * HOUR).unwrap();
        let curves = CurveBuilder::default().build(&state, &window).unwrap();

        let alpha = curves.curve("a").unwrap();
        assert_eq!(alpha.name, "Alpha");
        assert_eq!(alpha.dose_markers.len(), 2);
        assert_eq!(curves.curves.iter().filter(|c| c.substance_id == "a").count(), 1);
        assert_eq!(curves.rejected.len(), 1);
        assert_eq!(curves.rejected[0].substance_id, "a");
        assert_eq!(curves.rejected[0].reason, "duplicate substance id");
    }

    #[test]
    fn test_dense_dosing_stays_bounded_and_keeps_every_dose() {
        // Hourly doses of a 5 h substance for a whole year.
        let doses: Vec<DoseEvent> = (0..24 * 365)
            .map(|k| DoseEvent::new(format!("d{}", k), "a", 1.0, k * HOUR).unwrap())
            .collect();
        let state = StateSnapshot {
            substances: vec![Substance::new("a", "Alpha", 5.0, "#ff0000").unwrap()],
            dose_events: doses,
        };
        let window = TimeWindow::new(0, 24 * 365 * HOUR).unwrap();
        let builder = CurveBuilder::default();
        let curves = builder.build(&state, &window).unwrap();
        let curve = curves.curve("a").unwrap();

        let max_intervals = builder.sampler().config().max_intervals;
        let n_doses = state.dose_events.len();
        assert!(curve.decay_curve.len() <= max_intervals + 1 + 2 * n_doses);
        assert_eq!(curve.dose_markers.len(), n_doses);
        for dose in &state.dose_events {
            let found = curve
                .decay_curve
                .binary_search_by_key(&dose.time, |p| p.time)
                .is_ok();
            assert!(found, "dose instant {} not sampled", dose.time);
        }

        // Steady state of 1 mg every hour with a 5 h half-life, read one
        // hour after the last dose.
        let r = 0.5_f64.powf(0.2);
        let last = curve.decay_curve.last().unwrap();
        assert_relative_eq!(last.concentration, r / (1.0 - r), max_relative = 1e-6);
    }
}
