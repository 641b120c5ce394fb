//! Core data types for the rotation system.

use chrono::{DateTime, Utc};
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A dealer on the roster with the stations they may work.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub display_name: String,
    /// Ordered, de-duplicated station identifiers. Empty until resolved.
    #[pyo3(get, set)]
    #[serde(default)]
    pub eligible_stations: Vec<String>,
}

impl Worker {
    pub fn with_stations(id: &str, display_name: &str, stations: &[&str]) -> Self {
        let mut eligible_stations: Vec<String> = Vec::with_capacity(stations.len());
        for station in stations {
            if !eligible_stations.iter().any(|s| s == station) {
                eligible_stations.push(station.to_string());
            }
        }
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            eligible_stations,
        }
    }
}

#[pymethods]
impl Worker {
    #[new]
    #[pyo3(signature = (id, display_name, eligible_stations=None))]
    fn new(id: String, display_name: String, eligible_stations: Option<Vec<String>>) -> Self {
        let stations = eligible_stations.unwrap_or_default();
        let refs: Vec<&str> = stations.iter().map(|s| s.as_str()).collect();
        Self::with_stations(&id, &display_name, &refs)
    }

    fn __repr__(&self) -> String {
        format!(
            "Worker(id={:?}, display_name={:?}, stations={})",
            self.id,
            self.display_name,
            self.eligible_stations.len()
        )
    }
}

/// Day or night shift. Both are 24 half-hour slots; only the start time differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftType {
    Day,
    Night,
}

impl ShiftType {
    /// Minutes after midnight at which the first slot starts.
    pub fn start_minutes(self) -> u32 {
        match self {
            ShiftType::Day => 8 * 60,
            ShiftType::Night => 20 * 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShiftType::Day => "day",
            ShiftType::Night => "night",
        }
    }
}

/// Error returned when a shift type string is not `day` or `night`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseShiftTypeError(pub String);

impl fmt::Display for ParseShiftTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown shift type: {} (expected \"day\" or \"night\")", self.0)
    }
}

impl std::error::Error for ParseShiftTypeError {}

impl FromStr for ShiftType {
    type Err = ParseShiftTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(ShiftType::Day),
            "night" => Ok(ShiftType::Night),
            _ => Err(ParseShiftTypeError(s.to_string())),
        }
    }
}

/// Why a worker's break was pinned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    DealerRequest,
    LateForTable,
    ScheduleNeeds,
    Other,
}

/// Defers a worker's first break until they have worked `tables_to_work` rotations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Punishment {
    pub active: bool,
    pub tables_to_work: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstBreakPreference {
    pub worker_id: String,
    pub reason_code: ReasonCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punishment: Option<Punishment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastBreakPreference {
    pub worker_id: String,
    pub reason_code: ReasonCode,
}

/// Caller-supplied break pins, echoed into the persisted schedule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakPreferences {
    #[serde(default)]
    pub first_break: Vec<FirstBreakPreference>,
    #[serde(default)]
    pub last_break: Vec<LastBreakPreference>,
}

impl BreakPreferences {
    pub fn is_empty(&self) -> bool {
        self.first_break.is_empty() && self.last_break.is_empty()
    }

    /// Rotations the worker must complete before their first break, if punished.
    pub fn punishment_for(&self, worker_id: &str) -> Option<u32> {
        self.first_break
            .iter()
            .find(|p| p.worker_id == worker_id)
            .and_then(|p| p.punishment)
            .filter(|p| p.active && p.tables_to_work > 0)
            .map(|p| p.tables_to_work)
    }

    /// Workers pinned to a break in the first slot. Punished workers are skipped.
    pub fn pinned_first(&self) -> impl Iterator<Item = &str> + '_ {
        self.first_break
            .iter()
            .filter(move |p| self.punishment_for(&p.worker_id).is_none())
            .map(|p| p.worker_id.as_str())
    }

    pub fn pinned_last(&self) -> impl Iterator<Item = &str> + '_ {
        self.last_break.iter().map(|p| p.worker_id.as_str())
    }
}

/// A worker leaving mid-shift.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceRecord {
    pub worker_id: String,
    pub from_slot_label: String,
    pub reason_code: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    ExtraBreak,
    Swap,
}

/// Entry in the append-only log of ad-hoc changes applied after generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAdjustment {
    pub worker_id: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
    pub reason: String,
    pub slot_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_type_parse() {
        assert_eq!("day".parse::<ShiftType>(), Ok(ShiftType::Day));
        assert_eq!(" Night ".parse::<ShiftType>(), Ok(ShiftType::Night));
        assert!("evening".parse::<ShiftType>().is_err());
    }

    #[test]
    fn test_worker_dedups_stations() {
        let w = Worker::with_stations("d1", "Ann", &["BJ1", "ROU1", "BJ1"]);
        assert_eq!(w.eligible_stations, vec!["BJ1", "ROU1"]);
    }

    #[test]
    fn test_punished_worker_not_pinned_first() {
        let prefs = BreakPreferences {
            first_break: vec![
                FirstBreakPreference {
                    worker_id: "a".to_string(),
                    reason_code: ReasonCode::DealerRequest,
                    punishment: None,
                },
                FirstBreakPreference {
                    worker_id: "b".to_string(),
                    reason_code: ReasonCode::LateForTable,
                    punishment: Some(Punishment {
                        active: true,
                        tables_to_work: 4,
                    }),
                },
            ],
            last_break: vec![],
        };

        let pinned: Vec<&str> = prefs.pinned_first().collect();
        assert_eq!(pinned, vec!["a"]);
        assert_eq!(prefs.punishment_for("b"), Some(4));
        assert_eq!(prefs.punishment_for("a"), None);
    }

    #[test]
    fn test_preferences_json_shape() {
        let json = r#"{
            "firstBreak": [{"workerId": "b", "reasonCode": "late_for_table",
                            "punishment": {"active": true, "tablesToWork": 4}}],
            "lastBreak": [{"workerId": "c", "reasonCode": "other"}]
        }"#;
        let prefs: BreakPreferences = serde_json::from_str(json).unwrap();
        assert_eq!(prefs.first_break[0].reason_code, ReasonCode::LateForTable);
        assert_eq!(prefs.last_break[0].worker_id, "c");
        assert_eq!(prefs.punishment_for("b"), Some(4));
    }
}
