//! Ad-hoc edits after generation: extra breaks and two-worker swaps.
//!
//! A preview computes a candidate grid from a snapshot and never touches the
//! stored schedule. `apply_adjustment` commits a valid preview through the
//! schedule's lease check and appends it to the manual-adjustment log.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::error::RotationError;
use crate::grid::{AssignmentGrid, Cell};
use crate::models::{AdjustmentKind, ManualAdjustment};
use crate::schedule::{ScheduleLease, VersionedSchedule};

/// Outcome of a preview: what would change and whether it may be applied.
#[derive(Debug, Clone)]
pub struct AdjustmentPreview {
    pub is_valid: bool,
    pub message: String,
    pub warnings: Vec<String>,
    pub candidate: Arc<AssignmentGrid>,
    /// Log entry written on apply; `None` for invalid previews.
    pub adjustment: Option<ManualAdjustment>,
}

/// JSON shape returned to callers outside the crate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary<'a> {
    pub is_valid: bool,
    pub message: &'a str,
    pub warnings: &'a [String],
    pub slot_label: &'a str,
    pub slot: Vec<(&'a str, &'a str)>,
}

impl AdjustmentPreview {
    fn invalid(base: &Arc<AssignmentGrid>, message: String, warnings: Vec<String>) -> Self {
        Self {
            is_valid: false,
            message,
            warnings,
            candidate: Arc::clone(base),
            adjustment: None,
        }
    }

    /// The candidate's assignments for `slot` as (worker id, rendered cell).
    pub fn summary(&self, slot: usize) -> PreviewSummary<'_> {
        let grid = self.candidate.as_ref();
        PreviewSummary {
            is_valid: self.is_valid,
            message: &self.message,
            warnings: &self.warnings,
            slot_label: &grid.slots()[slot].label,
            slot: grid
                .roster()
                .workers()
                .iter()
                .enumerate()
                .map(|(w, worker)| (worker.id.as_str(), grid.render(grid.cell(slot, w))))
                .collect(),
        }
    }
}

fn locate(grid: &AssignmentGrid, worker_id: &str, slot: usize) -> Result<usize, RotationError> {
    if slot >= grid.slot_count() {
        return Err(RotationError::SlotOutOfRange {
            index: slot,
            len: grid.slot_count(),
        });
    }
    grid.roster()
        .worker_index(worker_id)
        .ok_or_else(|| RotationError::UnknownWorker(worker_id.to_string()))
}

/// Would holding `station` at `slot` put `w` on it twice in a row?
fn repeats_station(grid: &AssignmentGrid, w: usize, slot: usize, station: u32) -> bool {
    grid.cell_at(slot as isize - 1, w) == Some(Cell::Station(station))
        || grid.cell_at(slot as isize + 1, w) == Some(Cell::Station(station))
}

/// Preview sending `worker_id` on an extra break at `slot`.
///
/// The cover is the eligible worker resting (or idle) in that slot with the
/// fewest work slots; they take over the requester's station.
pub fn preview_extra_break(
    grid: &Arc<AssignmentGrid>,
    worker_id: &str,
    slot: usize,
    reason: &str,
) -> Result<AdjustmentPreview, RotationError> {
    let w = locate(grid, worker_id, slot)?;
    let roster = grid.roster();
    let label = &grid.slots()[slot].label;

    let Some(station) = grid.cell(slot, w).station() else {
        return Ok(AdjustmentPreview::invalid(
            grid,
            format!("{} is not working at {}, nothing to vacate", worker_id, label),
            vec![format!("{} is on break or idle at {}", worker_id, label)],
        ));
    };
    let station_name = roster.station_name(station);

    let mut covers: Vec<usize> = (0..grid.worker_count())
        .filter(|&v| v != w && grid.cell(slot, v).station().is_none())
        .filter(|&v| roster.is_eligible(v, station) && !repeats_station(grid, v, slot, station))
        .collect();
    covers.sort_by_key(|&v| (grid.rotations(v), v));

    let Some(&cover) = covers.first() else {
        return Ok(AdjustmentPreview::invalid(
            grid,
            format!(
                "No one on break at {} can cover {} for {}",
                label, station_name, worker_id
            ),
            vec![format!("no eligible cover for {} at {}", station_name, label)],
        ));
    };

    let mut candidate = grid.as_ref().clone();
    candidate.set(slot, w, Cell::Break);
    candidate.set(slot, cover, Cell::Station(station));

    let mut warnings = Vec::new();
    if candidate.cell_at(slot as isize - 1, w) == Some(Cell::Break)
        || candidate.cell_at(slot as isize + 1, w) == Some(Cell::Break)
    {
        warnings.push(format!("{} will have back-to-back breaks around {}", worker_id, label));
    }
    let cover_id = roster.worker(cover).id.clone();

    Ok(AdjustmentPreview {
        is_valid: true,
        message: format!("{} takes a break at {}; {} covers {}", worker_id, label, cover_id, station_name),
        warnings,
        candidate: Arc::new(candidate),
        adjustment: Some(ManualAdjustment {
            worker_id: worker_id.to_string(),
            kind: AdjustmentKind::ExtraBreak,
            reason: reason.to_string(),
            slot_label: label.clone(),
            counterpart_id: Some(cover_id),
            timestamp: Utc::now(),
        }),
    })
}

/// Preview exchanging the stations of two workers at `slot`.
///
/// Both must be working and eligible for the other's station. A swap that
/// leaves someone on the same station twice in a row is still valid but warns.
pub fn preview_swap(
    grid: &Arc<AssignmentGrid>,
    first_id: &str,
    second_id: &str,
    slot: usize,
    reason: &str,
) -> Result<AdjustmentPreview, RotationError> {
    let a = locate(grid, first_id, slot)?;
    let b = locate(grid, second_id, slot)?;
    let roster = grid.roster();
    let label = &grid.slots()[slot].label;

    if a == b {
        return Ok(AdjustmentPreview::invalid(
            grid,
            format!("Cannot swap {} with themselves", first_id),
            Vec::new(),
        ));
    }

    let mut warnings = Vec::new();
    let station_a = grid.cell(slot, a).station();
    let station_b = grid.cell(slot, b).station();
    if station_a.is_none() {
        warnings.push(format!("{} is on break or idle at {}", first_id, label));
    }
    if station_b.is_none() {
        warnings.push(format!("{} is on break or idle at {}", second_id, label));
    }

    if let (Some(sa), Some(sb)) = (station_a, station_b) {
        if !roster.is_eligible(a, sb) {
            warnings.push(format!("{} is not eligible for {}", first_id, roster.station_name(sb)));
        }
        if !roster.is_eligible(b, sa) {
            warnings.push(format!("{} is not eligible for {}", second_id, roster.station_name(sa)));
        }
        // Adjacent repeats are reported but do not block the swap.
        let eligible = warnings.is_empty();
        if repeats_station(grid, a, slot, sb) {
            warnings.push(format!(
                "{} would stay on {} across consecutive slots",
                first_id,
                roster.station_name(sb)
            ));
        }
        if repeats_station(grid, b, slot, sa) {
            warnings.push(format!(
                "{} would stay on {} across consecutive slots",
                second_id,
                roster.station_name(sa)
            ));
        }

        if eligible {
            let mut candidate = grid.as_ref().clone();
            candidate.set(slot, a, Cell::Station(sb));
            candidate.set(slot, b, Cell::Station(sa));
            return Ok(AdjustmentPreview {
                is_valid: true,
                message: format!(
                    "{} moves to {} and {} to {} at {}",
                    first_id,
                    roster.station_name(sb),
                    second_id,
                    roster.station_name(sa),
                    label
                ),
                warnings,
                candidate: Arc::new(candidate),
                adjustment: Some(ManualAdjustment {
                    worker_id: first_id.to_string(),
                    kind: AdjustmentKind::Swap,
                    reason: reason.to_string(),
                    slot_label: label.clone(),
                    counterpart_id: Some(second_id.to_string()),
                    timestamp: Utc::now(),
                }),
            });
        }
    }

    Ok(AdjustmentPreview::invalid(
        grid,
        format!("Swap of {} and {} at {} is not possible", first_id, second_id, label),
        warnings,
    ))
}

/// Commit a previewed adjustment. Invalid previews and stale leases are rejected.
pub fn apply_adjustment(
    schedule: &mut VersionedSchedule,
    lease: ScheduleLease,
    preview: &AdjustmentPreview,
) -> Result<u64, RotationError> {
    let Some(adjustment) = preview.adjustment.clone().filter(|_| preview.is_valid) else {
        return Err(RotationError::RejectedAdjustment(preview.message.clone()));
    };
    let version = schedule.commit(lease, Arc::clone(&preview.candidate))?;
    schedule.record_adjustment(ManualAdjustment {
        timestamp: Utc::now(),
        ..adjustment
    });
    Ok(version)
}
