//! Slot-by-slot rotation resolution.
//!
//! Each slot is chained from the previous one: planned breaks are confirmed or
//! dropped, the candidate pool is trimmed to the station count by break
//! priority, and the remaining workers are matched to stations.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::RotationConfig;
use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::{log_changes, log_checks, log_debug, log_error};

use super::priority::{cmp_f64, rank_for_break};
use super::skeleton::BreakSkeleton;
use super::state::{WorkerRuntimeState, WorkerStates};

/// Counters from one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Extra breaks added because more workers were free than stations.
    pub forced_breaks: usize,
    /// Planned breaks dropped (break in previous slot, or punishment pending).
    pub dropped_breaks: usize,
    /// Planned breaks pulled back to work to staff the slot.
    pub pulled_back: usize,
    /// (slot, worker) cells left without an admissible station.
    pub unfilled: Vec<(usize, usize)>,
}

/// Score a station for a worker. Higher is better.
pub fn station_score(state: &WorkerRuntimeState, station: StationIdx, config: &RotationConfig) -> f64 {
    let mut score = 0.0;
    if let Some(pos) = state.history_position(station) {
        let window = state.history.len().max(1) as f64;
        score -= config.recent_station_penalty * (window - pos as f64) / window;
    }
    if !state.stations_worked.contains(&station) {
        score += config.new_station_bonus;
    }
    if !state.segment_stations.contains(&station) {
        score += config.new_station_bonus / 2.0;
    }
    score
}

/// Admissible stations for `w` in `slot`, best first. Excludes the station
/// worked in the previous slot.
fn ranked_stations(
    grid: &AssignmentGrid,
    states: &WorkerStates,
    slot: usize,
    w: usize,
    config: &RotationConfig,
) -> Vec<StationIdx> {
    let previous = if slot > 0 {
        grid.cell(slot - 1, w).station()
    } else {
        None
    };
    let state = states.get(w);
    let mut scored: Vec<(StationIdx, f64)> = grid
        .roster()
        .eligible_stations(w)
        .iter()
        .copied()
        .filter(|st| Some(*st) != previous)
        .map(|st| (st, station_score(state, st, config)))
        .collect();
    scored.sort_by(|a, b| cmp_f64(b.1, a.1).then(a.0.cmp(&b.0)));
    scored.into_iter().map(|(st, _)| st).collect()
}

/// Augmenting-path search (Kuhn): give `w` a station, displacing earlier
/// holders onto their other options when needed.
fn augment(
    w: usize,
    options: &[Vec<StationIdx>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &st in &options[w] {
        let idx = st as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        let free = match owner[idx] {
            None => true,
            Some(holder) => augment(holder, options, owner, visited),
        };
        if free {
            owner[idx] = Some(w);
            return true;
        }
    }
    false
}

/// Match workers to stations, earlier workers getting their preferred picks.
/// Returns station per worker position in `order`.
pub(crate) fn match_stations(
    order: &[usize],
    options: &[Vec<StationIdx>],
    station_count: usize,
) -> Vec<Option<StationIdx>> {
    let mut owner: Vec<Option<usize>> = vec![None; station_count];
    for &w in order {
        let mut visited = vec![false; station_count];
        augment(w, options, &mut owner, &mut visited);
    }
    let mut assigned = vec![None; options.len()];
    for (st, holder) in owner.iter().enumerate() {
        if let Some(w) = holder {
            assigned[*w] = Some(st as StationIdx);
        }
    }
    assigned
}

/// Break tier when trimming an oversized pool: 0 = free to break,
/// 1 = would make consecutive breaks, 2 = still under punishment.
fn break_tier(grid: &AssignmentGrid, states: &WorkerStates, slot: usize, w: usize) -> u8 {
    if states.get(w).is_under_punishment() {
        2
    } else if slot > 0 && grid.cell(slot - 1, w).is_break() {
        1
    } else {
        0
    }
}

/// Fill every slot of `grid`, updating `states` as it goes.
pub fn resolve_slots(
    grid: &mut AssignmentGrid,
    skeleton: &BreakSkeleton,
    states: &mut WorkerStates,
    config: &RotationConfig,
    rng: &mut StdRng,
) -> ResolveReport {
    let verbosity = config.verbosity;
    let worker_count = grid.worker_count();
    let station_count = grid.roster().station_count();
    let mut report = ResolveReport::default();

    for slot in 0..grid.slot_count() {
        let mut on_break = vec![false; worker_count];

        for (w, off) in on_break.iter_mut().enumerate() {
            if !skeleton.is_planned(w, slot) {
                continue;
            }
            if skeleton.locked.contains(&(slot, w)) {
                *off = true;
                continue;
            }
            let after_break = slot > 0 && grid.cell(slot - 1, w).is_break();
            if after_break || states.get(w).is_under_punishment() {
                report.dropped_breaks += 1;
                log_checks!(
                    verbosity,
                    "  Slot {}: dropping planned break for {}",
                    slot,
                    states.get(w).worker_id
                );
                continue;
            }
            *off = true;
        }

        let mut candidates: Vec<usize> = (0..worker_count).filter(|&w| !on_break[w]).collect();

        if candidates.len() > station_count {
            let excess = candidates.len() - station_count;
            let ranked = rank_for_break(&candidates, |w| states.get(w), config, rng);
            let mut tiered: Vec<(u8, usize, f64)> = ranked
                .into_iter()
                .map(|(w, score)| (break_tier(grid, states, slot, w), w, score))
                .collect();
            tiered.sort_by(|a, b| a.0.cmp(&b.0).then(cmp_f64(b.2, a.2)));

            for &(tier, w, score) in tiered.iter().take(excess) {
                on_break[w] = true;
                report.forced_breaks += 1;
                log_debug!(
                    verbosity,
                    "  Slot {}: forced break for {} (score {:.2}, tier {})",
                    slot,
                    states.get(w).worker_id,
                    score,
                    tier
                );
            }
            candidates.retain(|&w| !on_break[w]);
        } else if candidates.len() < station_count {
            let pullable: Vec<usize> = (0..worker_count)
                .filter(|&w| on_break[w] && !skeleton.locked.contains(&(slot, w)))
                .collect();
            let ranked = rank_for_break(&pullable, |w| states.get(w), config, rng);
            // Lowest priority for a break comes back first.
            for &(w, _) in ranked.iter().rev() {
                if candidates.len() >= station_count {
                    break;
                }
                on_break[w] = false;
                candidates.push(w);
                report.pulled_back += 1;
                log_checks!(
                    verbosity,
                    "  Slot {}: pulled {} back from break to staff a station",
                    slot,
                    states.get(w).worker_id
                );
            }
        }

        // Break returners pick first; equally ranked workers are shuffled.
        let (mut returners, mut others): (Vec<usize>, Vec<usize>) = candidates
            .iter()
            .copied()
            .partition(|&w| states.get(w).just_returned_from_break);
        returners.shuffle(rng);
        others.shuffle(rng);
        let order: Vec<usize> = returners.into_iter().chain(others).collect();

        let mut options: Vec<Vec<StationIdx>> = vec![Vec::new(); worker_count];
        for &w in &order {
            options[w] = ranked_stations(grid, states, slot, w, config);
        }
        let assigned = match_stations(&order, &options, station_count);

        for w in 0..worker_count {
            let cell = if on_break[w] {
                Cell::Break
            } else {
                match assigned[w] {
                    Some(st) => Cell::Station(st),
                    None => {
                        log_error!(
                            "Slot {}: no admissible station for {} (eligibility/capacity mismatch)",
                            slot,
                            states.get(w).worker_id
                        );
                        report.unfilled.push((slot, w));
                        Cell::Unfilled
                    }
                }
            };
            grid.set(slot, w, cell);
        }
        states.record_slot(grid, slot);
    }

    log_changes!(
        verbosity,
        "Resolved {} slots: {} forced breaks, {} dropped, {} pulled back, {} unfilled",
        grid.slot_count(),
        report.forced_breaks,
        report.dropped_breaks,
        report.pulled_back,
        report.unfilled.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Roster;
    use crate::models::{BreakPreferences, ShiftType, Worker};
    use crate::params::ScheduleParameters;
    use crate::rotation::skeleton::plan_breaks;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn uniform_roster(workers: usize, stations: usize) -> Arc<Roster> {
        let names: Vec<String> = (0..stations).map(|i| format!("T{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        Arc::new(Roster::new(
            (0..workers)
                .map(|i| Worker::with_stations(&format!("d{}", i), "", &refs))
                .collect(),
        ))
    }

    #[test]
    fn test_matching_finds_perfect_assignment() {
        // Greedy in order would give w0 station 0 and strand w1.
        let options = vec![vec![0, 1], vec![0]];
        let assigned = match_stations(&[0, 1], &options, 2);
        assert_eq!(assigned, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_station_score_prefers_unworked() {
        let config = RotationConfig::default();
        let mut state = WorkerRuntimeState::new("a", 16, 8, None, 4);
        state.record_work(0, 0);
        state.record_work(1, 1);
        assert!(station_score(&state, 2, &config) > station_score(&state, 0, &config));
        // Older history entries are penalized less.
        assert!(station_score(&state, 0, &config) > station_score(&state, 1, &config));
    }

    #[test]
    fn test_resolved_grid_is_fully_staffed() {
        let roster = uniform_roster(10, 7);
        let params = ScheduleParameters::calculate(24, 7, 10);
        let prefs = BreakPreferences::default();
        let config = RotationConfig::seeded(42);
        let mut grid = AssignmentGrid::new(ShiftType::Day, Arc::clone(&roster));
        let mut states = WorkerStates::new(&grid, &params, &prefs, &config);
        let skeleton = plan_breaks(&roster, &params, &states, &prefs, &config);
        let mut rng = StdRng::seed_from_u64(42);

        let report = resolve_slots(&mut grid, &skeleton, &mut states, &config, &mut rng);

        assert!(report.unfilled.is_empty());
        for slot in 0..24 {
            let working = grid.row(slot).iter().filter(|c| c.station().is_some()).count();
            assert_eq!(working, 7);
            assert!(grid.vacant_stations(slot).is_empty());
        }
        for w in 0..10 {
            for slot in 1..24 {
                let (a, b) = (grid.cell(slot - 1, w), grid.cell(slot, w));
                assert!(!(a.is_break() && b.is_break()));
                if let (Some(x), Some(y)) = (a.station(), b.station()) {
                    assert_ne!(x, y);
                }
            }
            assert_eq!(grid.rotations(w) + grid.breaks(w), 24);
        }
    }

    #[test]
    fn test_no_admissible_station_marks_unfilled() {
        // Two workers, one station: nobody may repeat it, so slot 1 leaves one idle.
        let roster = Arc::new(Roster::new(vec![
            Worker::with_stations("a", "A", &["BJ1"]),
            Worker::with_stations("b", "B", &["BJ1"]),
            Worker::with_stations("c", "C", &["BJ2"]),
        ]));
        let params = ScheduleParameters::calculate(24, 2, 3);
        let prefs = BreakPreferences::default();
        let config = RotationConfig::seeded(3);
        let mut grid = AssignmentGrid::new(ShiftType::Day, Arc::clone(&roster));
        let mut states = WorkerStates::new(&grid, &params, &prefs, &config);
        let skeleton = plan_breaks(&roster, &params, &states, &prefs, &config);
        let mut rng = StdRng::seed_from_u64(3);

        let report = resolve_slots(&mut grid, &skeleton, &mut states, &config, &mut rng);

        // "c" can only ever work BJ2 and may not repeat it in adjacent slots.
        assert!(report.unfilled.iter().any(|&(_, w)| w == 2) || grid.breaks(2) > 0);
        for slot in 1..24 {
            let (a, b) = (grid.cell(slot - 1, 2), grid.cell(slot, 2));
            if let (Some(x), Some(y)) = (a.station(), b.station()) {
                assert_ne!(x, y);
            }
        }
    }
}
