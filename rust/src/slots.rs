//! Time-slot generation for a 12-hour shift.

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::RotationError;
use crate::models::ShiftType;

/// Slots per shift (12 hours at 30-minute granularity), independent of shift type.
pub const SLOTS_PER_SHIFT: usize = 24;

/// Slot length in minutes.
pub const SLOT_MINUTES: i64 = 30;

/// One half-hour slot of the shift.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub index: usize,
    pub label: String,
}

/// Produce the ordered, labeled slots for a shift type.
///
/// Day shifts start at 08:00, night shifts at 20:00; labels wrap past midnight.
pub fn generate_time_slots(shift_type: ShiftType) -> Vec<TimeSlot> {
    let start = NaiveTime::from_num_seconds_from_midnight_opt(shift_type.start_minutes() * 60, 0)
        .unwrap_or(NaiveTime::MIN);

    (0..SLOTS_PER_SHIFT)
        .map(|index| {
            let (time, _) =
                start.overflowing_add_signed(Duration::minutes(SLOT_MINUTES * index as i64));
            TimeSlot {
                index,
                label: time.format("%H:%M").to_string(),
            }
        })
        .collect()
}

/// Find the slot index for a label like "14:30".
pub fn slot_index_for_label(slots: &[TimeSlot], label: &str) -> Result<usize, RotationError> {
    let wanted = label.trim();
    slots
        .iter()
        .find(|s| s.label == wanted)
        .map(|s| s.index)
        .ok_or_else(|| RotationError::UnknownSlotLabel(label.to_string()))
}
