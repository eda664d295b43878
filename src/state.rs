//! Add/remove operations on a state snapshot.
//!
//! Every operation leaves the receiver untouched and returns the next snapshot,
//! so a caller keeping an undo history only has to store the values it gets back.

use crate::{errors::DecayError, models::*, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh record id of the form `<prefix>-<unix millis>-<counter>`.
pub fn next_id(prefix: &str) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), seq)
}

impl StateSnapshot {
    pub fn add_substance(&self, substance: Substance) -> Result<Self> {
        if self.substance(&substance.id).is_some() {
            return Err(DecayError::ValidationError(format!(
                "Substance id {} already exists",
                substance.id
            )));
        }

        let mut next = self.clone();
        next.substances.push(substance);
        Ok(next)
    }

    /// Remove a substance and every dose that references it.
    /// The flag reports whether anything was removed.
    pub fn remove_substance(&self, substance_id: &str) -> (Self, bool) {
        if self.substance(substance_id).is_none() {
            return (self.clone(), false);
        }

        let next = Self {
            substances: self
                .substances
                .iter()
                .filter(|s| s.id != substance_id)
                .cloned()
                .collect(),
            dose_events: self
                .dose_events
                .iter()
                .filter(|d| d.substance_id != substance_id)
                .cloned()
                .collect(),
        };
        log::debug!(
            "Removed substance {} and {} of its doses",
            substance_id,
            self.dose_events.len() - next.dose_events.len()
        );
        (next, true)
    }

    pub fn add_dose(&self, dose: DoseEvent) -> Result<Self> {
        if self.substance(&dose.substance_id).is_none() {
            return Err(DecayError::InvalidDosing(format!(
                "Dose {} references unknown substance {}",
                dose.id, dose.substance_id
            )));
        }
        if self.dose_events.iter().any(|d| d.id == dose.id) {
            return Err(DecayError::InvalidDosing(format!(
                "Dose id {} already exists",
                dose.id
            )));
        }

        let mut next = self.clone();
        next.dose_events.push(dose);
        Ok(next)
    }

    pub fn remove_dose(&self, dose_id: &str) -> (Self, bool) {
        let mut next = self.clone();
        let before = next.dose_events.len();
        next.dose_events.retain(|d| d.id != dose_id);
        let removed = next.dose_events.len() != before;
        (next, removed)
    }

    /// Drop doses whose substance no longer exists, returning how many went.
    pub fn without_dangling_doses(&self) -> (Self, usize) {
        let mut next = self.clone();
        next.dose_events
            .retain(|d| self.substances.iter().any(|s| s.id == d.substance_id));
        let dropped = self.dose_events.len() - next.dose_events.len();
        (next, dropped)
    }

    /// Append imported doses, skipping ids already present.
    pub fn merge_doses(&self, doses: Vec<DoseEvent>) -> (Self, usize) {
        let mut next = self.clone();
        let mut added = 0;
        for dose in doses {
            if next.dose_events.iter().any(|d| d.id == dose.id) {
                log::warn!("Skipping imported dose {}: id already present", dose.id);
                continue;
            }
            next.dose_events.push(dose);
            added += 1;
        }
        (next, added)
    }

    /// First and last administration instants across all doses.
    pub fn dose_span(&self) -> Option<(Instant, Instant)> {
        let first = self.dose_events.iter().map(|d| d.time).min()?;
        let last = self.dose_events.iter().map(|d| d.time).max()?;
        Some((first, last))
    }
}
