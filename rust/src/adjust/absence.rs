//! Mid-shift departures: the leaver rests for the rest of the shift and the
//! stations they vacate are handed to colleagues who are on break.

use crate::error::RotationError;
use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::models::AbsenceRecord;
use crate::slots::slot_index_for_label;
use crate::{log_changes, log_error};

/// A vacated station picked up by a colleague.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backfill {
    pub slot: usize,
    pub station: StationIdx,
    pub worker: usize,
}

/// Result of handling one absence.
#[derive(Debug, Clone)]
pub struct AbsenceOutcome {
    /// The adjusted grid, or an untouched copy of the input on error.
    pub grid: AssignmentGrid,
    pub worker: Option<usize>,
    pub from_slot: usize,
    pub backfilled: Vec<Backfill>,
    /// (slot, station) pairs nobody could cover.
    pub unfilled: Vec<(usize, StationIdx)>,
    pub error: Option<RotationError>,
}

impl AbsenceOutcome {
    pub fn is_applied(&self) -> bool {
        self.error.is_none()
    }

    fn untouched(grid: &AssignmentGrid, from_slot: usize, error: RotationError) -> Self {
        Self {
            grid: grid.clone(),
            worker: None,
            from_slot,
            backfilled: Vec::new(),
            unfilled: Vec::new(),
            error: Some(error),
        }
    }
}

/// Remove `worker_id` from `from_slot` onward and back-fill what they vacate.
///
/// `remaining` lists the workers who may cover; an empty slice means every
/// other worker in the roster. Any error leaves the input grid as it was.
pub fn handle_absence(
    grid: &AssignmentGrid,
    worker_id: &str,
    from_slot: usize,
    remaining: &[String],
    verbosity: u8,
) -> AbsenceOutcome {
    match apply_absence(grid, worker_id, from_slot, remaining, &[], verbosity) {
        Ok(outcome) => outcome,
        Err(e) => {
            log_error!("Absence for {} not applied: {}", worker_id, e);
            AbsenceOutcome::untouched(grid, from_slot, e)
        }
    }
}

/// Same as `handle_absence`, with the start slot given by its label.
pub fn handle_absence_record(
    grid: &AssignmentGrid,
    record: &AbsenceRecord,
    remaining: &[String],
    verbosity: u8,
) -> AbsenceOutcome {
    match slot_index_for_label(grid.slots(), &record.from_slot_label) {
        Ok(from_slot) => handle_absence(grid, &record.worker_id, from_slot, remaining, verbosity),
        Err(e) => {
            log_error!("Absence for {} not applied: {}", record.worker_id, e);
            AbsenceOutcome::untouched(grid, 0, e)
        }
    }
}

/// Apply several departures to one grid, in record order.
///
/// Every other worker may cover, but only in slots before their own
/// departure, so an early leaver's stations can go to a colleague who leaves
/// later. Returns the final grid and one outcome per record.
pub fn handle_absences(
    grid: &AssignmentGrid,
    records: &[AbsenceRecord],
    verbosity: u8,
) -> (AssignmentGrid, Vec<AbsenceOutcome>) {
    let roster = grid.roster();
    let mut departures: Vec<Option<usize>> = vec![None; grid.worker_count()];
    for record in records {
        let Some(w) = roster.worker_index(&record.worker_id) else {
            continue;
        };
        if let Ok(slot) = slot_index_for_label(grid.slots(), &record.from_slot_label) {
            departures[w] = Some(departures[w].map_or(slot, |d| d.min(slot)));
        }
    }

    let mut current = grid.clone();
    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        let applied = slot_index_for_label(current.slots(), &record.from_slot_label).and_then(|from_slot| {
            apply_absence(&current, &record.worker_id, from_slot, &[], &departures, verbosity)
        });
        let outcome = match applied {
            Ok(outcome) => {
                current = outcome.grid.clone();
                outcome
            }
            Err(e) => {
                log_error!("Absence for {} not applied: {}", record.worker_id, e);
                AbsenceOutcome::untouched(&current, 0, e)
            }
        };
        outcomes.push(outcome);
    }
    (current, outcomes)
}

/// `departures[v]` is the slot from which `v` can no longer cover.
fn apply_absence(
    grid: &AssignmentGrid,
    worker_id: &str,
    from_slot: usize,
    remaining: &[String],
    departures: &[Option<usize>],
    verbosity: u8,
) -> Result<AbsenceOutcome, RotationError> {
    let roster = grid.roster();
    let leaver = roster
        .worker_index(worker_id)
        .ok_or_else(|| RotationError::UnknownWorker(worker_id.to_string()))?;
    if from_slot >= grid.slot_count() {
        return Err(RotationError::SlotOutOfRange {
            index: from_slot,
            len: grid.slot_count(),
        });
    }

    let pool: Vec<usize> = if remaining.is_empty() {
        (0..grid.worker_count()).filter(|&v| v != leaver).collect()
    } else {
        let mut pool = Vec::with_capacity(remaining.len());
        for id in remaining {
            let v = roster
                .worker_index(id)
                .ok_or_else(|| RotationError::UnknownWorker(id.clone()))?;
            if v != leaver {
                pool.push(v);
            }
        }
        pool
    };

    let mut next = grid.clone();
    let mut vacated = Vec::new();
    for slot in from_slot..next.slot_count() {
        if let Some(station) = next.cell(slot, leaver).station() {
            vacated.push((slot, station));
        }
        next.set(slot, leaver, Cell::Break);
    }
    log_changes!(
        verbosity,
        "{} leaves at {}: {} station slot(s) to cover",
        worker_id,
        next.slots()[from_slot].label,
        vacated.len()
    );

    let mut backfilled = Vec::new();
    let mut unfilled = Vec::new();
    for (slot, station) in vacated {
        let mut candidates: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&v| {
                departures.get(v).copied().flatten().map_or(true, |d| slot < d)
                    && next.cell(slot, v).is_break()
                    && next.roster().is_eligible(v, station)
                    && next.cell_at(slot as isize - 1, v) != Some(Cell::Station(station))
                    && next.cell_at(slot as isize + 1, v) != Some(Cell::Station(station))
            })
            .collect();
        candidates.sort_by_key(|&v| (next.rotations(v), v));

        match candidates.first() {
            Some(&v) if next.is_station_free(slot, station) => {
                next.set(slot, v, Cell::Station(station));
                log_changes!(
                    verbosity,
                    "  {} covers {} at {}",
                    next.roster().worker(v).id,
                    next.roster().station_name(station),
                    next.slots()[slot].label
                );
                backfilled.push(Backfill {
                    slot,
                    station,
                    worker: v,
                });
            }
            _ => {
                log_error!(
                    "No cover for {} at {} after {} left",
                    next.roster().station_name(station),
                    next.slots()[slot].label,
                    worker_id
                );
                unfilled.push((slot, station));
            }
        }
    }

    Ok(AbsenceOutcome {
        grid: next,
        worker: Some(leaver),
        from_slot,
        backfilled,
        unfilled,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Roster;
    use crate::models::{ShiftType, Worker};
    use std::sync::Arc;

    const BJ1: StationIdx = 0;
    const BJ2: StationIdx = 1;
    const ROU1: StationIdx = 2;

    fn make_grid() -> AssignmentGrid {
        let roster = Roster::new(vec![
            Worker::with_stations("c", "Cleo", &["BJ1", "BJ2", "ROU1"]),
            Worker::with_stations("e", "Eli", &["BJ1", "ROU1"]),
            Worker::with_stations("f", "Fay", &["BJ2", "ROU1"]),
            Worker::with_stations("g", "Gus", &["BJ1", "BJ2"]),
        ]);
        let mut grid = AssignmentGrid::new(ShiftType::Day, Arc::new(roster));
        for slot in 0..12 {
            grid.set(slot, 0, Cell::Station([BJ1, BJ2][slot % 2]));
        }
        grid.set(12, 0, Cell::Station(ROU1));
        grid.set(13, 0, Cell::Station(BJ1));

        for slot in 0..5 {
            grid.set(slot, 1, Cell::Station([ROU1, BJ1][slot % 2]));
        }
        grid.set(12, 1, Cell::Break);
        grid.set(13, 1, Cell::Break);

        grid.set(0, 2, Cell::Station(ROU1));
        grid.set(1, 2, Cell::Station(BJ2));
        grid.set(12, 2, Cell::Break);

        grid.set(12, 3, Cell::Break);
        grid
    }

    #[test]
    fn test_leaver_rests_and_fewest_worked_covers() {
        let grid = make_grid();
        let outcome = handle_absence(&grid, "c", 12, &[], 0);
        assert!(outcome.is_applied());
        let next = &outcome.grid;

        for slot in 12..24 {
            assert_eq!(next.cell(slot, 0), Cell::Break);
        }
        // f has worked 2 slots against e's 5; g cannot deal roulette.
        assert_eq!(next.cell(12, 2), Cell::Station(ROU1));
        assert_eq!(next.cell(12, 1), Cell::Break);
        assert_eq!(next.cell(12, 3), Cell::Break);
        assert_eq!(next.cell(13, 1), Cell::Station(BJ1));
        assert_eq!(outcome.backfilled.len(), 2);
        assert!(outcome.unfilled.is_empty());

        for slot in 0..12 {
            assert_eq!(next.cell(slot, 0), grid.cell(slot, 0));
        }
        // Input untouched.
        assert_eq!(grid.cell(12, 0), Cell::Station(ROU1));
    }

    #[test]
    fn test_uncovered_station_reported() {
        let grid = make_grid();
        // Only g may cover, and g is not eligible for roulette.
        let outcome = handle_absence(&grid, "c", 12, &["g".to_string()], 0);
        assert!(outcome.is_applied());
        assert_eq!(outcome.unfilled, vec![(12, ROU1), (13, BJ1)]);
    }

    fn leaves_at(worker_id: &str, label: &str) -> AbsenceRecord {
        AbsenceRecord {
            worker_id: worker_id.to_string(),
            from_slot_label: label.to_string(),
            reason_code: "sick".to_string(),
        }
    }

    #[test]
    fn test_later_leaver_covers_earlier_leaver() {
        let grid = make_grid();
        // c goes at slot 12, f only at slot 20.
        let records = vec![leaves_at("c", "14:00"), leaves_at("f", "18:00")];
        let (next, outcomes) = handle_absences(&grid, &records, 0);

        assert!(outcomes.iter().all(|o| o.is_applied()));
        assert_eq!(outcomes[0].from_slot, 12);
        assert_eq!(outcomes[1].from_slot, 20);
        // f is still on shift at 12 and has worked least.
        assert_eq!(next.cell(12, 2), Cell::Station(ROU1));
        assert_eq!(next.cell(13, 1), Cell::Station(BJ1));
        assert!(outcomes[0].unfilled.is_empty());
        for slot in 12..24 {
            assert_eq!(next.cell(slot, 0), Cell::Break);
        }
        for slot in 20..24 {
            assert_eq!(next.cell(slot, 2), Cell::Break);
        }
    }

    #[test]
    fn test_departed_worker_never_covers() {
        let grid = make_grid();
        // f rests at 12 but leaves at 12 too, so e takes roulette.
        let records = vec![leaves_at("c", "14:00"), leaves_at("f", "14:00")];
        let (next, outcomes) = handle_absences(&grid, &records, 0);

        assert_eq!(next.cell(12, 1), Cell::Station(ROU1));
        assert_eq!(next.cell(12, 2), Cell::Break);
        assert_eq!(next.cell(13, 1), Cell::Station(BJ1));
        assert!(outcomes[1].backfilled.is_empty());
    }

    #[test]
    fn test_bad_record_skipped_others_applied() {
        let grid = make_grid();
        let records = vec![leaves_at("nobody", "14:00"), leaves_at("c", "14:00")];
        let (next, outcomes) = handle_absences(&grid, &records, 0);

        assert!(!outcomes[0].is_applied());
        assert!(outcomes[1].is_applied());
        assert_eq!(next.cell(12, 0), Cell::Break);
    }

    #[test]
    fn test_unknown_worker_returns_original() {
        let grid = make_grid();
        let outcome = handle_absence(&grid, "nobody", 12, &[], 0);
        assert_eq!(
            outcome.error,
            Some(RotationError::UnknownWorker("nobody".to_string()))
        );
        assert!(outcome.grid.same_cells(&grid));
    }

    #[test]
    fn test_bad_label_returns_original() {
        let grid = make_grid();
        let record = AbsenceRecord {
            worker_id: "c".to_string(),
            from_slot_label: "25:00".to_string(),
            reason_code: "sick".to_string(),
        };
        let outcome = handle_absence_record(&grid, &record, &[], 0);
        assert!(!outcome.is_applied());
        assert!(outcome.grid.same_cells(&grid));
    }
}
