//! Full-grid validation and the shared helpers repair rules are built on.

use std::fmt;

use crate::config::RotationConfig;
use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::params::ScheduleParameters;

use super::skeleton::{ideal_positions, LockedCells};

/// Everything the validator needs besides the grid itself.
#[derive(Debug, Clone, Default)]
pub struct ValidationScope {
    /// Pinned cells: never reported as fixable violations.
    pub locked: LockedCells,
    /// Per worker: slot from which they have left the shift.
    pub absent_from: Vec<Option<usize>>,
    /// Per worker: rotations owed before the first break.
    pub punishment: Vec<Option<u32>>,
}

impl ValidationScope {
    pub fn for_workers(worker_count: usize) -> Self {
        Self {
            locked: LockedCells::default(),
            absent_from: vec![None; worker_count],
            punishment: vec![None; worker_count],
        }
    }

    #[inline]
    pub fn is_locked(&self, slot: usize, w: usize) -> bool {
        self.locked.contains(&(slot, w))
    }

    /// True once the worker has left the shift at `slot`.
    #[inline]
    pub fn is_absent(&self, slot: usize, w: usize) -> bool {
        matches!(self.absent_from.get(w), Some(Some(from)) if slot >= *from)
    }

    /// Whether the cell may be changed by a repair.
    #[inline]
    pub fn is_mutable(&self, slot: usize, w: usize) -> bool {
        !self.is_locked(slot, w) && !self.is_absent(slot, w)
    }

    pub fn has_absence(&self, w: usize) -> bool {
        matches!(self.absent_from.get(w), Some(Some(_)))
    }
}

/// A rule violation found in the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DoubleBooked { slot: usize, station: StationIdx },
    Unfilled { worker: usize, slot: usize },
    /// `slot` is the later of the two break slots.
    ConsecutiveBreak { worker: usize, slot: usize },
    /// `slot` is the later of the two slots on the same station.
    RepeatedStation { worker: usize, slot: usize, station: StationIdx },
    TooFewStations { worker: usize, slot: usize, distinct: usize, required: usize },
    BreakDuringPunishment { worker: usize, slot: usize },
    RotationImbalance { worker: usize, actual: usize, target: usize },
    UnevenBreaks { worker: usize, deviation: usize },
}

impl Violation {
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::DoubleBooked { .. } => "double_booked",
            Violation::Unfilled { .. } => "unfilled",
            Violation::ConsecutiveBreak { .. } => "consecutive_break",
            Violation::RepeatedStation { .. } => "repeated_station",
            Violation::TooFewStations { .. } => "too_few_stations",
            Violation::BreakDuringPunishment { .. } => "break_during_punishment",
            Violation::RotationImbalance { .. } => "rotation_imbalance",
            Violation::UnevenBreaks { .. } => "uneven_breaks",
        }
    }

    /// Hard violations break the grid's basic invariants.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            Violation::DoubleBooked { .. }
                | Violation::Unfilled { .. }
                | Violation::ConsecutiveBreak { .. }
                | Violation::RepeatedStation { .. }
                | Violation::BreakDuringPunishment { .. }
        )
    }

    /// Advisory violations are reported but never keep the repair loop
    /// running on their own or make a schedule invalid.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Violation::UnevenBreaks { .. })
    }

    pub fn describe(&self, grid: &AssignmentGrid) -> String {
        let roster = grid.roster();
        let name = |w: usize| roster.worker(w).id.as_str();
        let label = |s: usize| grid.slots()[s].label.as_str();
        match self {
            Violation::DoubleBooked { slot, station } => format!(
                "{} booked twice at {}",
                roster.station_name(*station),
                label(*slot)
            ),
            Violation::Unfilled { worker, slot } => {
                format!("{} has no station at {}", name(*worker), label(*slot))
            }
            Violation::ConsecutiveBreak { worker, slot } => {
                format!("{} has consecutive breaks ending {}", name(*worker), label(*slot))
            }
            Violation::RepeatedStation {
                worker,
                slot,
                station,
            } => format!(
                "{} stays on {} into {}",
                name(*worker),
                roster.station_name(*station),
                label(*slot)
            ),
            Violation::TooFewStations {
                worker,
                slot,
                distinct,
                required,
            } => format!(
                "{} breaks at {} after {} of {} required stations",
                name(*worker),
                label(*slot),
                distinct,
                required
            ),
            Violation::BreakDuringPunishment { worker, slot } => format!(
                "{} gets a break at {} before finishing punishment",
                name(*worker),
                label(*slot)
            ),
            Violation::RotationImbalance {
                worker,
                actual,
                target,
            } => format!(
                "{} works {} rotations, target {}",
                name(*worker),
                actual,
                target
            ),
            Violation::UnevenBreaks { worker, deviation } => format!(
                "{} breaks sit up to {} slots from even spacing",
                name(*worker),
                deviation
            ),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.kind(), self)
    }
}

/// The worked run immediately before `slot`: (start slot, stations in order).
pub fn segment_before(grid: &AssignmentGrid, w: usize, slot: usize) -> (usize, Vec<StationIdx>) {
    let mut start = slot;
    let mut stations = Vec::new();
    while start > 0 {
        match grid.cell(start - 1, w) {
            Cell::Station(st) => {
                stations.push(st);
                start -= 1;
            }
            _ => break,
        }
    }
    stations.reverse();
    (start, stations)
}

pub fn distinct_count(stations: &[StationIdx]) -> usize {
    let mut seen: Vec<StationIdx> = Vec::with_capacity(stations.len());
    for st in stations {
        if !seen.contains(st) {
            seen.push(*st);
        }
    }
    seen.len()
}

/// A segment is the worker's first when nothing was worked before it.
pub fn is_first_segment(grid: &AssignmentGrid, w: usize, segment_start: usize) -> bool {
    (0..segment_start).all(|s| grid.cell(s, w).station().is_none())
}

/// Distinct stations required before a break at `break_slot`.
///
/// The early-window threshold wins whenever the break falls inside the
/// window; otherwise first vs. later segment decides. The result is capped by
/// the worker's eligible station count and average segment length.
pub fn required_distinct(
    grid: &AssignmentGrid,
    params: &ScheduleParameters,
    config: &RotationConfig,
    w: usize,
    break_slot: usize,
    first_segment: bool,
) -> usize {
    let threshold = if break_slot < config.early_window_slots as usize {
        config.early_window_min_stations
    } else if first_segment {
        config.first_segment_min_stations
    } else {
        config.later_segment_min_stations
    };
    let base = threshold as usize;
    let feasible = params.average_segment_len(w).max(1);
    let eligible = grid.roster().eligible_stations(w).len().max(1);
    base.min(feasible).min(eligible)
}

/// Check a break at `slot` against the distinct-station rule.
/// Returns (distinct, required) when it falls short.
///
/// A segment can never show more stations than slots it spans, so the
/// requirement is capped by the segment length.
pub fn station_shortfall(
    grid: &AssignmentGrid,
    params: &ScheduleParameters,
    config: &RotationConfig,
    w: usize,
    slot: usize,
) -> Option<(usize, usize)> {
    let (start, stations) = segment_before(grid, w, slot);
    if stations.is_empty() {
        return None;
    }
    let distinct = distinct_count(&stations);
    let required = required_distinct(grid, params, config, w, slot, is_first_segment(grid, w, start))
        .min(stations.len());
    (distinct < required).then_some((distinct, required))
}

/// First slot at which a punished worker may take a break: one past their
/// `target`-th worked slot, or the end of the shift if never reached.
pub fn punishment_release(grid: &AssignmentGrid, w: usize, target: u32) -> usize {
    let mut worked = 0u32;
    for slot in 0..grid.slot_count() {
        if grid.cell(slot, w).station().is_some() {
            worked += 1;
            if worked >= target {
                return slot + 1;
            }
        }
    }
    grid.slot_count()
}

/// Largest distance between a worker's unpinned breaks and their even-spacing ideals.
pub fn break_deviation(grid: &AssignmentGrid, scope: &ValidationScope, w: usize) -> usize {
    let breaks = grid.break_slots(w);
    let ideals = ideal_positions(grid.slot_count(), breaks.len());
    breaks
        .iter()
        .zip(ideals.iter())
        .filter(|(b, _)| !scope.is_locked(**b, w))
        .map(|(b, i)| b.abs_diff(*i))
        .max()
        .unwrap_or(0)
}

/// Run every check over the grid.
pub fn validate(
    grid: &AssignmentGrid,
    params: &ScheduleParameters,
    config: &RotationConfig,
    scope: &ValidationScope,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let slot_count = grid.slot_count();
    let station_count = grid.roster().station_count();

    for slot in 0..slot_count {
        let mut seen = vec![0usize; station_count];
        for cell in grid.row(slot) {
            if let Some(st) = cell.station() {
                seen[st as usize] += 1;
            }
        }
        for (st, count) in seen.into_iter().enumerate() {
            if count > 1 {
                violations.push(Violation::DoubleBooked {
                    slot,
                    station: st as StationIdx,
                });
            }
        }
    }

    for w in 0..grid.worker_count() {
        for slot in 0..slot_count {
            if scope.is_absent(slot, w) {
                continue;
            }
            let cell = grid.cell(slot, w);
            if cell == Cell::Unfilled {
                violations.push(Violation::Unfilled { worker: w, slot });
            }
            if slot == 0 {
                continue;
            }
            let prev = grid.cell(slot - 1, w);
            if prev.is_break() && cell.is_break() {
                violations.push(Violation::ConsecutiveBreak { worker: w, slot });
            }
            if let (Some(a), Some(b)) = (prev.station(), cell.station()) {
                if a == b {
                    violations.push(Violation::RepeatedStation {
                        worker: w,
                        slot,
                        station: b,
                    });
                }
            }
            if cell.is_break() && !scope.is_locked(slot, w) {
                if let Some((distinct, required)) = station_shortfall(grid, params, config, w, slot)
                {
                    violations.push(Violation::TooFewStations {
                        worker: w,
                        slot,
                        distinct,
                        required,
                    });
                }
            }
        }

        if let Some(Some(target)) = scope.punishment.get(w) {
            let release = punishment_release(grid, w, *target);
            for slot in 0..release.min(slot_count) {
                if grid.cell(slot, w).is_break() && !scope.is_absent(slot, w) {
                    violations.push(Violation::BreakDuringPunishment { worker: w, slot });
                }
            }
        }

        if scope.has_absence(w) {
            continue;
        }

        let actual = grid.rotations(w);
        let target = params.target_rotations(w);
        if actual.abs_diff(target) > config.balance_tolerance as usize {
            violations.push(Violation::RotationImbalance {
                worker: w,
                actual,
                target,
            });
        }

        let deviation = break_deviation(grid, scope, w);
        if deviation > config.spread_tolerance as usize {
            violations.push(Violation::UnevenBreaks {
                worker: w,
                deviation,
            });
        }
    }

    violations
}
