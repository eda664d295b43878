use crate::{errors::DecayError, Result};
use serde::{Deserialize, Serialize};

/// Absolute timestamp in milliseconds since the Unix epoch.
pub type Instant = i64;

pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// A drug definition: something that is dosed and decays with a fixed half-life.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Substance {
    pub id: String,
    pub name: String,
    /// Half-life in hours.
    #[serde(rename = "halfLife")]
    pub half_life: f64,
    pub color: String,
}

impl Substance {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        half_life: f64,
        color: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DecayError::ValidationError(
                "Substance name must not be empty".to_string(),
            ));
        }
        if !half_life.is_finite() || half_life <= 0.0 {
            return Err(DecayError::ValidationError(format!(
                "Half-life of {} must be a positive number of hours (got {})",
                name, half_life
            )));
        }

        Ok(Self {
            id: id.into(),
            name,
            half_life,
            color: color.into(),
        })
    }

    pub fn half_life_ms(&self) -> f64 {
        self.half_life * MS_PER_HOUR
    }
}

/// One administration of a substance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoseEvent {
    pub id: String,
    #[serde(rename = "drugId")]
    pub substance_id: String,
    /// Amount in mg.
    pub amount: f64,
    pub time: Instant,
}

impl DoseEvent {
    pub fn new(
        id: impl Into<String>,
        substance_id: impl Into<String>,
        amount: f64,
        time: Instant,
    ) -> Result<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DecayError::InvalidDosing(format!(
                "Dose amount must be a non-negative number (got {})",
                amount
            )));
        }

        Ok(Self {
            id: id.into(),
            substance_id: substance_id.into(),
            amount,
            time,
        })
    }

    /// Records that bypassed `new` (e.g. hand-edited imports) may carry garbage amounts.
    pub fn is_usable(&self) -> bool {
        self.amount.is_finite() && self.amount >= 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Instant,
    pub end: Instant,
}

impl TimeWindow {
    pub fn new(start: Instant, end: Instant) -> Result<Self> {
        if start > end {
            return Err(DecayError::InvalidWindow(format!(
                "Window start {} is after window end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn from_hours(start: Instant, hours: f64) -> Result<Self> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(DecayError::InvalidWindow(format!(
                "Window length must be a non-negative number of hours (got {})",
                hours
            )));
        }
        let end = start
            .checked_add((hours * MS_PER_HOUR).round() as i64)
            .ok_or_else(|| {
                DecayError::InvalidWindow(format!(
                    "Window of {} h from {} ends past the representable range",
                    hours, start
                ))
            })?;
        Self::new(start, end)
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// Window length, saturating at `i64::MAX` for extreme bounds.
    pub fn duration_ms(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_ms() as f64 / MS_PER_HOUR
    }

    pub fn contains(&self, instant: Instant) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Full application state handed to the curve engine for one render pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub substances: Vec<Substance>,
    #[serde(rename = "doseEvents")]
    pub dose_events: Vec<DoseEvent>,
}

impl StateSnapshot {
    pub fn substance(&self, id: &str) -> Option<&Substance> {
        self.substances.iter().find(|s| s.id == id)
    }

    pub fn doses_for<'a>(&'a self, substance_id: &'a str) -> impl Iterator<Item = &'a DoseEvent> + 'a {
        self.dose_events
            .iter()
            .filter(move |dose| dose.substance_id == substance_id)
    }

    pub fn is_empty(&self) -> bool {
        self.substances.is_empty() && self.dose_events.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplePoint {
    pub time: Instant,
    pub concentration: f64,
    #[serde(rename = "doseId", skip_serializing_if = "Option::is_none", default)]
    pub dose_id: Option<String>,
}

/// Plot-ready series for one substance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstanceCurve {
    pub substance_id: String,
    pub name: String,
    pub color: String,
    pub half_life: f64,
    pub decay_curve: Vec<SamplePoint>,
    pub dose_markers: Vec<SamplePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedSubstance {
    pub substance_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveSet {
    pub window: TimeWindow,
    pub curves: Vec<SubstanceCurve>,
    pub rejected: Vec<RejectedSubstance>,
}

impl CurveSet {
    pub fn empty(window: TimeWindow) -> Self {
        Self {
            window,
            curves: Vec::new(),
            rejected: Vec::new(),
        }
    }

    pub fn curve(&self, substance_id: &str) -> Option<&SubstanceCurve> {
        self.curves.iter().find(|c| c.substance_id == substance_id)
    }
}

/// Inspection figures for one rendered curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveSummary {
    pub substance_id: String,
    pub name: String,
    pub n_doses: usize,
    pub total_dosed: f64,
    pub peak: f64,
    pub peak_time: Instant,
    pub trough: f64,
    pub final_concentration: f64,
    pub mean_concentration: f64,
    /// mg·h over the window.
    pub auc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub samples_per_half_life: f64,
    pub min_intervals: usize,
    pub max_intervals: usize,
    /// Offset of the guard samples around a dose, as a fraction of the half-life.
    pub guard_fraction: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            samples_per_half_life: 10.0,
            min_intervals: 200,
            max_intervals: 4000,
            guard_fraction: 0.1,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.samples_per_half_life.is_finite() || self.samples_per_half_life <= 0.0 {
            return Err(DecayError::ValidationError(
                "Samples per half-life must be positive".to_string(),
            ));
        }
        if self.min_intervals == 0 {
            return Err(DecayError::ValidationError(
                "Minimum interval count must be at least 1".to_string(),
            ));
        }
        if self.max_intervals < self.min_intervals {
            return Err(DecayError::ValidationError(format!(
                "Interval ceiling ({}) is below the floor ({})",
                self.max_intervals, self.min_intervals
            )));
        }
        if !self.guard_fraction.is_finite() || self.guard_fraction <= 0.0 || self.guard_fraction >= 1.0 {
            return Err(DecayError::ValidationError(
                "Guard fraction must lie strictly between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub sampler: SamplerConfig,
    pub window: TimeWindow,
    pub output_path: String,
    pub concentration_units: String,
    pub time_units: String,
}
