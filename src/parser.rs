//! Reading and writing state documents.
//!
//! On disk, timestamps are ISO-8601 strings. They are converted to epoch
//! milliseconds here, before anything reaches the curve engine.

use crate::{errors::DecayError, models::*, state::next_id, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// Serialized form of the application state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "exportedAt", default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub substances: Vec<Substance>,
    #[serde(rename = "doseEvents", alias = "doses", default)]
    pub dose_events: Vec<DoseRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseRecord {
    pub id: String,
    #[serde(rename = "drugId")]
    pub drug_id: String,
    pub amount: f64,
    pub time: String,
}

#[derive(Debug, Deserialize)]
struct DoseLogRow {
    #[serde(rename = "DOSE_ID", default)]
    dose_id: Option<String>,
    #[serde(rename = "DRUG_ID")]
    drug_id: String,
    #[serde(rename = "AMOUNT")]
    amount: f64,
    #[serde(rename = "TIME")]
    time: String,
}

/// Parse an ISO-8601 timestamp into epoch milliseconds.
///
/// Accepts RFC 3339 with an offset, or a bare local date-time
/// (`2024-03-01T08:30`, `2024-03-01T08:30:00`) which is read as UTC.
pub fn parse_timestamp(value: &str) -> Result<Instant> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")?;
    Ok(naive.and_utc().timestamp_millis())
}

pub fn format_timestamp(instant: Instant) -> Result<String> {
    Utc.timestamp_millis_opt(instant)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| DecayError::ParseError(format!("Timestamp {} is out of range", instant)))
}

pub struct StateParser;

impl StateParser {
    pub fn load_state<P: AsRef<Path>>(path: P) -> Result<StateSnapshot> {
        let content = fs::read_to_string(path.as_ref())?;
        let snapshot = Self::from_json_str(&content)?;
        log::info!(
            "Loaded {} substances and {} doses from {}",
            snapshot.substances.len(),
            snapshot.dose_events.len(),
            path.as_ref().display()
        );
        Ok(snapshot)
    }

    pub fn save_state<P: AsRef<Path>>(snapshot: &StateSnapshot, path: P) -> Result<()> {
        let document = Self::to_document(snapshot)?;
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, &document)?;
        log::info!("State written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn from_json_str(content: &str) -> Result<StateSnapshot> {
        let document: StateDocument = serde_json::from_str(content)?;
        Self::from_document(document)
    }

    pub fn to_json_string(snapshot: &StateSnapshot) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::to_document(snapshot)?)?)
    }

    /// Convert a document into a snapshot. Referential integrity is not
    /// checked; dangling `drugId`s are left for the curve engine to ignore.
    pub fn from_document(document: StateDocument) -> Result<StateSnapshot> {
        if document.version > DOCUMENT_VERSION {
            return Err(DecayError::ParseError(format!(
                "Unsupported document version {} (newest known is {})",
                document.version, DOCUMENT_VERSION
            )));
        }

        for substance in &document.substances {
            if !substance.half_life.is_finite() || substance.half_life <= 0.0 {
                log::warn!(
                    "Imported substance {} has invalid half-life {}",
                    substance.id,
                    substance.half_life
                );
            }
        }

        let dose_events = document
            .dose_events
            .into_iter()
            .map(|record| -> Result<DoseEvent> {
                let time = parse_timestamp(&record.time).map_err(|e| {
                    DecayError::ParseError(format!(
                        "Dose {} has unreadable time '{}': {}",
                        record.id, record.time, e
                    ))
                })?;
                Ok(DoseEvent {
                    id: record.id,
                    substance_id: record.drug_id,
                    amount: record.amount,
                    time,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StateSnapshot {
            substances: document.substances,
            dose_events,
        })
    }

    pub fn to_document(snapshot: &StateSnapshot) -> Result<StateDocument> {
        let dose_events = snapshot
            .dose_events
            .iter()
            .map(|dose| -> Result<DoseRecord> {
                Ok(DoseRecord {
                    id: dose.id.clone(),
                    drug_id: dose.substance_id.clone(),
                    amount: dose.amount,
                    time: format_timestamp(dose.time)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StateDocument {
            version: DOCUMENT_VERSION,
            exported_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            substances: snapshot.substances.clone(),
            dose_events,
        })
    }

    /// Read a CSV dose log with columns `DOSE_ID,DRUG_ID,AMOUNT,TIME`.
    /// Rows without a `DOSE_ID` get a generated one.
    pub fn parse_dose_log<P: AsRef<Path>>(path: P) -> Result<Vec<DoseEvent>> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut doses = Vec::new();
        for (line, row) in reader.deserialize::<DoseLogRow>().enumerate() {
            let row = row?;
            let id = match row.dose_id {
                Some(id) if !id.is_empty() => id,
                _ => next_id("dose"),
            };
            let time = parse_timestamp(&row.time).map_err(|e| {
                DecayError::ParseError(format!("Row {}: unreadable time '{}': {}", line + 1, row.time, e))
            })?;
            let dose = DoseEvent::new(id, row.drug_id, row.amount, time)
                .map_err(|e| DecayError::ParseError(format!("Row {}: {}", line + 1, e)))?;
            doses.push(dose);
        }

        Ok(doses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z").unwrap(), 0);
        assert_eq!(parse_timestamp("1970-01-01T01:00:00.250Z").unwrap(), 3_600_250);
        assert_eq!(parse_timestamp("1970-01-01T02:00:00+01:00").unwrap(), 3_600_000);
        assert_eq!(parse_timestamp("1970-01-01T00:01").unwrap(), 60_000);
        assert_eq!(parse_timestamp(" 1970-01-01T00:00:01 ").unwrap(), 1_000);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0).unwrap(), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_timestamp(1_500).unwrap(), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn test_document_tolerates_dangling_and_missing_version() {
        let json = r##"{
            "substances": [{"id": "a", "name": "Alpha", "halfLife": 24, "color": "#f00"}],
            "doses": [
                {"id": "d1", "drugId": "a", "amount": 100, "time": "2024-01-01T00:00:00Z"},
                {"id": "d2", "drugId": "gone", "amount": 5, "time": "2024-01-01T08:00"}
            ]
        }"##;
        let snapshot = StateParser::from_json_str(json).unwrap();
        assert_eq!(snapshot.substances.len(), 1);
        assert_eq!(snapshot.dose_events.len(), 2);
        assert_eq!(snapshot.dose_events[1].substance_id, "gone");
        assert_eq!(
            snapshot.dose_events[1].time - snapshot.dose_events[0].time,
            8 * 3_600_000
        );
    }

    #[test]
    fn test_newer_version_rejected() {
        let json = r##"{"version": 99, "substances": [], "doseEvents": []}"##;
        assert!(matches!(
            StateParser::from_json_str(json),
            Err(DecayError::ParseError(_))
        ));
    }

    #[test]
    fn test_bad_time_reports_dose() {
        let json = r##"{"substances": [], "doseEvents": [
            {"id": "d1", "drugId": "a", "amount": 1, "time": "soon"}
        ]}"##;
        let err = StateParser::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("d1"));
    }
}
