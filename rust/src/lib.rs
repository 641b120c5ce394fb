//! Rust implementation of the rota dealer rotation engine.
//!
//! Generates break and station schedules for a shift of dealers, repairs
//! rule violations, and previews manual edits against a stored schedule.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::sync::Arc;

pub mod adjust;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod grid;
pub mod logging;
pub mod models;
pub mod params;
pub mod rotation;
pub mod schedule;
pub mod slots;

pub use adjust::{
    apply_adjustment, handle_absence, handle_absence_record, handle_absences, AbsenceOutcome,
    AdjustmentPreview,
};
pub use config::RotationConfig;
pub use eligibility::{CachedEligibility, EligibilitySource, StaticEligibility};
pub use error::RotationError;
pub use grid::{AssignmentGrid, Cell, Roster};
pub use models::{
    AbsenceRecord, AdjustmentKind, BreakPreferences, ManualAdjustment, ReasonCode, ShiftType,
    Worker,
};
pub use params::ScheduleParameters;
pub use rotation::{GenerationOutcome, GenerationRequest, RotationEngine, Violation};
pub use schedule::{ScheduleData, ScheduleLease, VersionedSchedule};
pub use slots::{generate_time_slots, TimeSlot};

fn value_error(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse_shift(shift_type: &str) -> PyResult<ShiftType> {
    shift_type.parse::<ShiftType>().map_err(value_error)
}

fn load_grid(schedule_json: &str, workers: Vec<Worker>) -> Result<Arc<AssignmentGrid>, RotationError> {
    let data = ScheduleData::from_json(schedule_json)?;
    Ok(Arc::new(AssignmentGrid::from_schedule_data(&data, workers)?))
}

/// Slot labels for a shift type ("day" or "night").
#[pyfunction]
fn time_slots(shift_type: &str) -> PyResult<Vec<String>> {
    Ok(generate_time_slots(parse_shift(shift_type)?)
        .into_iter()
        .map(|s| s.label)
        .collect())
}

/// Generate a schedule and return the persisted JSON document.
///
/// # Arguments
/// * `workers` - Workers with their eligible stations already attached
/// * `shift_type` - "day" or "night"
/// * `preferences_json` - `{"firstBreak": [...], "lastBreak": [...]}`
/// * `absences_json` - `[{"workerId", "fromSlotLabel", "reasonCode"}]`
/// * `config` - Engine tuning; defaults when omitted
///
/// # Raises
/// * ValueError on an unknown shift type or malformed JSON input
#[pyfunction]
#[pyo3(signature = (workers, shift_type, preferences_json=None, absences_json=None, config=None))]
fn generate_schedule(
    workers: Vec<Worker>,
    shift_type: &str,
    preferences_json: Option<&str>,
    absences_json: Option<&str>,
    config: Option<RotationConfig>,
) -> PyResult<String> {
    let preferences: BreakPreferences = match preferences_json {
        Some(json) => serde_json::from_str(json).map_err(value_error)?,
        None => BreakPreferences::default(),
    };
    let absences: Vec<AbsenceRecord> = match absences_json {
        Some(json) => serde_json::from_str(json).map_err(value_error)?,
        None => Vec::new(),
    };

    let request = GenerationRequest::new(workers, parse_shift(shift_type)?)
        .with_preferences(preferences)
        .with_absences(absences);
    let mut engine = RotationEngine::new(config.unwrap_or_default());
    let outcome = engine.generate(&request, &mut StaticEligibility::new());
    outcome.to_schedule_data().to_json().map_err(value_error)
}

/// Preview an extra break for `worker_id` at `slot_label`. Returns JSON.
#[pyfunction]
#[pyo3(name = "preview_extra_break", signature = (schedule_json, workers, worker_id, slot_label, reason=""))]
fn py_preview_extra_break(
    schedule_json: &str,
    workers: Vec<Worker>,
    worker_id: &str,
    slot_label: &str,
    reason: &str,
) -> PyResult<String> {
    let grid = load_grid(schedule_json, workers).map_err(value_error)?;
    let slot = slots::slot_index_for_label(grid.slots(), slot_label).map_err(value_error)?;
    let preview =
        adjust::preview_extra_break(&grid, worker_id, slot, reason).map_err(value_error)?;
    serde_json::to_string(&preview.summary(slot)).map_err(value_error)
}

/// Preview swapping the stations of two workers at `slot_label`. Returns JSON.
#[pyfunction]
#[pyo3(name = "preview_swap", signature = (schedule_json, workers, first_id, second_id, slot_label, reason=""))]
fn py_preview_swap(
    schedule_json: &str,
    workers: Vec<Worker>,
    first_id: &str,
    second_id: &str,
    slot_label: &str,
    reason: &str,
) -> PyResult<String> {
    let grid = load_grid(schedule_json, workers).map_err(value_error)?;
    let slot = slots::slot_index_for_label(grid.slots(), slot_label).map_err(value_error)?;
    let preview =
        adjust::preview_swap(&grid, first_id, second_id, slot, reason).map_err(value_error)?;
    serde_json::to_string(&preview.summary(slot)).map_err(value_error)
}

/// The rota.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<Worker>()?;

    // Config types
    m.add_class::<RotationConfig>()?;

    // Generation and adjustments
    m.add_function(wrap_pyfunction!(time_slots, m)?)?;
    m.add_function(wrap_pyfunction!(generate_schedule, m)?)?;
    m.add_function(wrap_pyfunction!(py_preview_extra_break, m)?)?;
    m.add_function(wrap_pyfunction!(py_preview_swap, m)?)?;

    Ok(())
}
