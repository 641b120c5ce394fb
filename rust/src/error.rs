//! Boundary errors for the rotation engine.
//!
//! The engine itself is fail-soft; these errors only surface at the edges
//! (lookups, persisted documents, stale commits, bad caller input).

use thiserror::Error;

/// Errors that can occur at the engine boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotationError {
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),
    #[error("Unknown station: {0}")]
    UnknownStation(String),
    #[error("Slot index {index} out of range (shift has {len} slots)")]
    SlotOutOfRange { index: usize, len: usize },
    #[error("Unknown slot label: {0}")]
    UnknownSlotLabel(String),
    #[error("Eligibility lookup failed for {worker_id}: {reason}")]
    EligibilityLookup { worker_id: String, reason: String },
    #[error("Stale schedule version: leased {leased}, current {current}")]
    StaleVersion { leased: u64, current: u64 },
    #[error("Malformed schedule document: {0}")]
    MalformedSchedule(String),
    #[error("Adjustment rejected: {0}")]
    RejectedAdjustment(String),
}

impl From<serde_json::Error> for RotationError {
    fn from(err: serde_json::Error) -> Self {
        RotationError::MalformedSchedule(err.to_string())
    }
}
