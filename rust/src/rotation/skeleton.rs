//! Break skeleton planning: coarse, evenly spaced break placement before
//! slot-by-slot resolution.

use rustc_hash::FxHashSet;

use crate::config::RotationConfig;
use crate::grid::Roster;
use crate::models::BreakPreferences;
use crate::params::ScheduleParameters;
use crate::{log_changes, log_checks, log_debug};

use super::state::WorkerStates;

/// Cells the repair loop must not touch: (slot, worker).
pub type LockedCells = FxHashSet<(usize, usize)>;

/// Planned breaks per worker plus the pinned cells among them.
#[derive(Debug, Clone, Default)]
pub struct BreakSkeleton {
    /// planned[w][slot]
    planned: Vec<Vec<bool>>,
    pub locked: LockedCells,
    /// (worker, placed, quota) for workers whose quota did not fit
    pub under_filled: Vec<(usize, usize, usize)>,
}

impl BreakSkeleton {
    #[inline]
    pub fn is_planned(&self, w: usize, slot: usize) -> bool {
        self.planned[w][slot]
    }

    pub fn planned_slots(&self, w: usize) -> Vec<usize> {
        self.planned[w]
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(s, _)| s)
            .collect()
    }

    pub fn planned_in_slot(&self, slot: usize) -> usize {
        self.planned.iter().filter(|row| row[slot]).count()
    }
}

/// Ideal evenly spaced break positions: `round(i × R / (quota + 1))` for i = 1..=quota.
/// The last position always sits within one step of the end of the shift.
pub fn ideal_positions(total_slots: usize, quota: usize) -> Vec<usize> {
    if quota == 0 {
        return Vec::new();
    }
    let parts = quota + 1;
    (1..=quota)
        .map(|i| ((2 * i * total_slots + parts) / (2 * parts)).min(total_slots.saturating_sub(1)))
        .collect()
}

/// Minimum worked run before a break, capped by what the worker's targets allow.
pub fn effective_min_run(config: &RotationConfig, total_slots: usize, target_breaks: usize) -> usize {
    let feasible = total_slots.saturating_sub(target_breaks) / (target_breaks + 1);
    (config.min_work_before_break as usize).min(feasible.max(1))
}

struct Placement<'a> {
    chosen: &'a [usize],
    min_run: usize,
    earliest: usize,
}

impl Placement<'_> {
    fn admits(&self, slot: usize) -> bool {
        if slot < self.earliest || self.chosen.contains(&slot) {
            return false;
        }
        let prev = self.chosen.iter().copied().filter(|&c| c < slot).max();
        let next = self.chosen.iter().copied().filter(|&c| c > slot).min();

        // Leading run: a break at slot 0 is only reachable through a pin.
        let run_before = match prev {
            Some(p) => slot - p - 1,
            None => slot,
        };
        if run_before < self.min_run {
            return false;
        }
        if let Some(n) = next {
            if n - slot - 1 < self.min_run {
                return false;
            }
        }
        true
    }
}

/// Seed break positions: pins first, then evenly spaced quotas.
pub fn plan_breaks(
    roster: &Roster,
    params: &ScheduleParameters,
    states: &WorkerStates,
    preferences: &BreakPreferences,
    config: &RotationConfig,
) -> BreakSkeleton {
    let verbosity = config.verbosity;
    let total_slots = params.total_slots;
    let worker_count = roster.worker_count();
    let capacity = params.concurrent_breaks;

    let mut planned = vec![vec![false; total_slots]; worker_count];
    let mut usage = vec![0usize; total_slots];
    let mut locked = LockedCells::default();
    let mut under_filled = Vec::new();

    if total_slots == 0 {
        return BreakSkeleton {
            planned,
            locked,
            under_filled,
        };
    }

    // (1) Pins. Punished workers were already filtered out of `pinned_first`.
    let pins = preferences
        .pinned_first()
        .map(|id| (id, 0))
        .chain(preferences.pinned_last().map(|id| (id, total_slots - 1)));
    for (worker_id, slot) in pins {
        let Some(w) = roster.worker_index(worker_id) else {
            log_checks!(verbosity, "  Pin for unknown worker {} ignored", worker_id);
            continue;
        };
        if planned[w][slot] {
            continue;
        }
        planned[w][slot] = true;
        usage[slot] += 1;
        locked.insert((slot, w));
        log_changes!(verbosity, "Pinned break for {} at slot {}", worker_id, slot);
    }

    // (2) Remaining quota, most breaks first.
    let mut order: Vec<usize> = (0..worker_count).collect();
    order.sort_by(|&a, &b| {
        states
            .get(b)
            .target_breaks
            .cmp(&states.get(a).target_breaks)
            .then(a.cmp(&b))
    });

    for w in order {
        let state = states.get(w);
        let mut chosen: Vec<usize> = (0..total_slots).filter(|&s| planned[w][s]).collect();
        let quota = state.target_breaks.saturating_sub(chosen.len());
        if quota == 0 {
            continue;
        }

        let min_run = effective_min_run(config, total_slots, state.target_breaks);
        let earliest = if state.is_under_punishment() {
            (state.punishment.target as usize).max(min_run)
        } else {
            min_run
        };

        let mut placed = 0;
        for ideal in ideal_positions(total_slots, quota) {
            let mut by_distance: Vec<usize> = (0..total_slots).collect();
            by_distance.sort_by_key(|&s| (s.abs_diff(ideal), s));

            let pick = by_distance.into_iter().find(|&s| {
                usage[s] < capacity
                    && Placement {
                        chosen: &chosen,
                        min_run,
                        earliest,
                    }
                    .admits(s)
            });

            if let Some(slot) = pick {
                planned[w][slot] = true;
                usage[slot] += 1;
                chosen.push(slot);
                placed += 1;
                log_debug!(
                    verbosity,
                    "  Skeleton break for {} at slot {} (ideal {})",
                    state.worker_id,
                    slot,
                    ideal
                );
            }
        }

        if placed < quota {
            log_changes!(
                verbosity,
                "Skeleton under-filled for {}: placed {} of {} breaks",
                state.worker_id,
                placed,
                quota
            );
            under_filled.push((w, placed, quota));
        }
    }

    BreakSkeleton {
        planned,
        locked,
        under_filled,
    }
}
