//! First-order decay of a single dose and superposition over many doses.
//!
//! Both functions are pure: nothing is cached between calls, so removing a dose
//! from the input removes its contribution from the very next evaluation.

use crate::{errors::DecayError, models::*, Result};
use std::borrow::Borrow;

/// Amount remaining `elapsed_ms` after administering `amount` of a substance
/// with the given half-life (hours).
///
/// Elapsed time is compared as an exact integer: a dose read at its own
/// administration instant returns `amount` untouched, and a dose read before
/// administration returns exactly zero.
pub fn decay(amount: f64, half_life_hours: f64, elapsed_ms: i64) -> Result<f64> {
    if !half_life_hours.is_finite() || half_life_hours <= 0.0 {
        return Err(DecayError::MathError(format!(
            "Half-life must be positive and finite (got {} h)",
            half_life_hours
        )));
    }

    if elapsed_ms < 0 {
        return Ok(0.0);
    }
    if elapsed_ms == 0 {
        return Ok(amount);
    }

    let half_lives = elapsed_ms as f64 / (half_life_hours * MS_PER_HOUR);
    Ok(amount * 0.5_f64.powf(half_lives))
}

/// Total amount present at `instant` from every dose in `doses`.
///
/// Doses administered exactly at `instant` count in full, later doses count
/// zero. Records with a non-finite or negative amount are skipped.
pub fn total_at<I>(doses: I, half_life_hours: f64, instant: Instant) -> Result<f64>
where
    I: IntoIterator,
    I::Item: Borrow<DoseEvent>,
{
    let mut total = 0.0;

    for dose in doses {
        let dose = dose.borrow();
        if !dose.is_usable() {
            continue;
        }
        total += decay(dose.amount, half_life_hours, instant.saturating_sub(dose.time))?;
    }

    Ok(total)
}

/// Totals at each of `instants`, for doses and instants both sorted ascending.
///
/// Walks the instants once, carrying the running total forward by decaying it
/// over each gap and folding in the doses administered since the previous
/// instant. Cost is linear in samples plus doses. Unsorted input falls back to
/// evaluating `total_at` at every instant.
pub fn totals_along(doses: &[&DoseEvent], half_life_hours: f64, instants: &[Instant]) -> Result<Vec<f64>> {
    let sorted = instants.windows(2).all(|w| w[0] <= w[1])
        && doses.windows(2).all(|w| w[0].time <= w[1].time);
    if !sorted {
        return instants
            .iter()
            .map(|&instant| total_at(doses.iter().copied(), half_life_hours, instant))
            .collect();
    }

    let mut totals = Vec::with_capacity(instants.len());
    let mut total = 0.0;
    let mut previous: Option<Instant> = None;
    let mut next_dose = 0;

    for &instant in instants {
        if let Some(previous) = previous {
            total = decay(total, half_life_hours, instant.saturating_sub(previous))?;
        }

        while let Some(dose) = doses.get(next_dose).filter(|dose| dose.time <= instant) {
            if dose.is_usable() {
                total += decay(dose.amount, half_life_hours, instant.saturating_sub(dose.time))?;
            }
            next_dose += 1;
        }

        previous = Some(instant);
        totals.push(total);
    }

    Ok(totals)
}
