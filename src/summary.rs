use crate::models::*;
use statrs::statistics::Statistics;

pub struct SummaryCalculator;

impl SummaryCalculator {
    pub fn summarize_all(curves: &CurveSet, snapshot: &StateSnapshot) -> Vec<CurveSummary> {
        curves
            .curves
            .iter()
            .filter_map(|curve| Self::summarize(curve, snapshot, &curves.window))
            .collect()
    }

    /// Inspection figures for one curve; `None` when the curve has no points.
    pub fn summarize(
        curve: &SubstanceCurve,
        snapshot: &StateSnapshot,
        window: &TimeWindow,
    ) -> Option<CurveSummary> {
        let first = curve.decay_curve.first()?;
        let last = curve.decay_curve.last()?;

        let concentrations: Vec<f64> = curve.decay_curve.iter().map(|p| p.concentration).collect();
        let peak = Statistics::max(&concentrations);
        let trough = Statistics::min(&concentrations);
        let peak_time = curve
            .decay_curve
            .iter()
            .find(|p| p.concentration == peak)
            .map_or(first.time, |p| p.time);

        let total_dosed: f64 = snapshot
            .doses_for(&curve.substance_id)
            .filter(|dose| dose.is_usable() && window.contains(dose.time))
            .map(|dose| dose.amount)
            .sum();

        let auc = Self::area_under_curve(&curve.decay_curve);
        let duration_hours = window.duration_hours();
        let mean_concentration = if duration_hours > 0.0 {
            auc / duration_hours
        } else {
            first.concentration
        };

        Some(CurveSummary {
            substance_id: curve.substance_id.clone(),
            name: curve.name.clone(),
            n_doses: curve.dose_markers.len(),
            total_dosed,
            peak,
            peak_time,
            trough,
            final_concentration: last.concentration,
            mean_concentration,
            auc,
        })
    }

    /// Linear-up/log-down trapezoidal area in concentration·hours.
    ///
    /// Falling segments of a first-order curve are exponential, so the log
    /// trapezoid is exact on them; rises only happen across dose edges.
    pub fn area_under_curve(points: &[SamplePoint]) -> f64 {
        let mut auc = 0.0;

        for pair in points.windows(2) {
            let t1 = pair[0].time as f64 / MS_PER_HOUR;
            let t2 = pair[1].time as f64 / MS_PER_HOUR;
            let c1 = pair[0].concentration;
            let c2 = pair[1].concentration;

            if t2 <= t1 {
                continue;
            }

            if c2 >= c1 || c2 <= 0.0 {
                auc += (t2 - t1) * (c1 + c2) / 2.0;
            } else {
                let ln_ratio = c1.ln() - c2.ln();
                if ln_ratio.abs() < 1e-10 {
                    auc += (t2 - t1) * (c1 + c2) / 2.0;
                } else {
                    auc += (t2 - t1) * (c1 - c2) / ln_ratio;
                }
            }
        }

        auc
    }
}
