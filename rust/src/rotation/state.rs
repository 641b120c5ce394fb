//! Per-worker runtime counters threaded through every generation phase.

use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::VecDeque;

use crate::config::RotationConfig;
use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::models::BreakPreferences;
use crate::params::ScheduleParameters;

/// Punishment bookkeeping: no break until `target` rotations are worked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PunishmentState {
    pub active: bool,
    pub target: u32,
    pub worked: u32,
    pub completed: bool,
}

/// Mutable state for one worker during a generation run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRuntimeState {
    pub worker_id: String,
    pub rotations: usize,
    pub breaks: usize,
    pub stations_worked: FxHashSet<StationIdx>,
    /// Stations worked since the last break.
    pub segment_stations: FxHashSet<StationIdx>,
    /// Most recent first, bounded by `history_len`.
    pub history: VecDeque<StationIdx>,
    pub slots_since_last_break: usize,
    pub target_rotations: usize,
    pub target_breaks: usize,
    pub break_slots: Vec<usize>,
    pub punishment: PunishmentState,
    pub is_first_segment: bool,
    pub just_returned_from_break: bool,
    pub last_station: Option<StationIdx>,
    #[serde(skip)]
    history_len: usize,
}

impl WorkerRuntimeState {
    pub fn new(
        worker_id: &str,
        target_rotations: usize,
        target_breaks: usize,
        punishment_target: Option<u32>,
        history_len: usize,
    ) -> Self {
        let punishment = match punishment_target {
            Some(target) => PunishmentState {
                active: true,
                target,
                worked: 0,
                completed: false,
            },
            None => PunishmentState::default(),
        };
        Self {
            worker_id: worker_id.to_string(),
            rotations: 0,
            breaks: 0,
            stations_worked: FxHashSet::default(),
            segment_stations: FxHashSet::default(),
            history: VecDeque::with_capacity(history_len),
            slots_since_last_break: 0,
            target_rotations,
            target_breaks,
            break_slots: Vec::new(),
            punishment,
            is_first_segment: true,
            just_returned_from_break: false,
            last_station: None,
            history_len: history_len.max(1),
        }
    }

    #[inline]
    pub fn is_under_punishment(&self) -> bool {
        self.punishment.active && !self.punishment.completed
    }

    /// Positive when the worker still owes breaks, negative when over target.
    #[inline]
    pub fn break_deficit(&self) -> i64 {
        self.target_breaks as i64 - self.breaks as i64
    }

    /// Position of `station` in the recent history (0 = last worked).
    pub fn history_position(&self, station: StationIdx) -> Option<usize> {
        self.history.iter().position(|s| *s == station)
    }

    pub fn record_break(&mut self, slot: usize) {
        self.breaks += 1;
        self.break_slots.push(slot);
        if !self.segment_stations.is_empty() {
            self.is_first_segment = false;
        }
        self.segment_stations.clear();
        self.slots_since_last_break = 0;
        self.just_returned_from_break = true;
        self.last_station = None;
    }

    pub fn record_work(&mut self, _slot: usize, station: StationIdx) {
        self.rotations += 1;
        self.stations_worked.insert(station);
        self.segment_stations.insert(station);
        self.history.push_front(station);
        self.history.truncate(self.history_len);
        self.slots_since_last_break += 1;
        self.just_returned_from_break = false;
        self.last_station = Some(station);

        if self.is_under_punishment() {
            self.punishment.worked += 1;
            if self.punishment.worked >= self.punishment.target {
                self.punishment.active = false;
                self.punishment.completed = true;
                // Next break-priority computation should send them off straight away.
                self.slots_since_last_break = self.target_rotations;
            }
        }
    }

    /// An unfillable slot counts as neither work nor break.
    pub fn record_idle(&mut self, _slot: usize) {
        self.just_returned_from_break = false;
        self.last_station = None;
    }
}

/// Arena of runtime states indexed like the roster.
#[derive(Clone, Debug, Default)]
pub struct WorkerStates {
    states: Vec<WorkerRuntimeState>,
}

impl WorkerStates {
    pub fn new(
        grid: &AssignmentGrid,
        params: &ScheduleParameters,
        preferences: &BreakPreferences,
        config: &RotationConfig,
    ) -> Self {
        let states = grid
            .roster()
            .workers()
            .iter()
            .enumerate()
            .map(|(w, worker)| {
                WorkerRuntimeState::new(
                    &worker.id,
                    params.target_rotations(w),
                    params.target_breaks(w),
                    preferences.punishment_for(&worker.id),
                    config.history_len as usize,
                )
            })
            .collect();
        Self { states }
    }

    /// Rebuild authoritative counters by replaying the grid slot by slot.
    pub fn from_grid(
        grid: &AssignmentGrid,
        params: &ScheduleParameters,
        preferences: &BreakPreferences,
        config: &RotationConfig,
    ) -> Self {
        let mut states = Self::new(grid, params, preferences, config);
        for slot in 0..grid.slot_count() {
            states.record_slot(grid, slot);
        }
        states
    }

    /// Apply one slot of the grid to every worker's state.
    pub fn record_slot(&mut self, grid: &AssignmentGrid, slot: usize) {
        for (w, state) in self.states.iter_mut().enumerate() {
            match grid.cell(slot, w) {
                Cell::Station(st) => state.record_work(slot, st),
                Cell::Break => state.record_break(slot),
                Cell::Unfilled => state.record_idle(slot),
            }
        }
    }

    #[inline]
    pub fn get(&self, w: usize) -> &WorkerRuntimeState {
        &self.states[w]
    }

    #[inline]
    pub fn get_mut(&mut self, w: usize) -> &mut WorkerRuntimeState {
        &mut self.states[w]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerRuntimeState> {
        self.states.iter()
    }

    pub fn into_vec(self) -> Vec<WorkerRuntimeState> {
        self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_clears_segment_and_first_flag() {
        let mut state = WorkerRuntimeState::new("a", 16, 8, None, 3);
        state.record_work(0, 1);
        state.record_work(1, 2);
        assert!(state.is_first_segment);
        assert_eq!(state.segment_stations.len(), 2);

        state.record_break(2);
        assert!(!state.is_first_segment);
        assert!(state.segment_stations.is_empty());
        assert!(state.just_returned_from_break);
        assert_eq!(state.slots_since_last_break, 0);
        assert_eq!(state.break_slots, vec![2]);
    }

    #[test]
    fn test_leading_break_keeps_first_segment() {
        let mut state = WorkerRuntimeState::new("a", 16, 8, None, 3);
        state.record_break(0);
        assert!(state.is_first_segment);
        state.record_work(1, 0);
        assert!(!state.just_returned_from_break);
    }

    #[test]
    fn test_history_bounded_most_recent_first() {
        let mut state = WorkerRuntimeState::new("a", 16, 8, None, 2);
        state.record_work(0, 1);
        state.record_work(1, 2);
        state.record_work(2, 3);
        assert_eq!(state.history, VecDeque::from(vec![3, 2]));
        assert_eq!(state.history_position(2), Some(1));
        assert_eq!(state.history_position(1), None);
        assert_eq!(state.stations_worked.len(), 3);
    }

    #[test]
    fn test_punishment_release_boosts_since_break() {
        let mut state = WorkerRuntimeState::new("b", 17, 7, Some(4), 4);
        for slot in 0..3 {
            state.record_work(slot, slot as StationIdx);
            assert!(state.is_under_punishment());
        }
        state.record_work(3, 3);
        assert!(!state.is_under_punishment());
        assert!(state.punishment.completed);
        assert_eq!(state.punishment.worked, 4);
        assert_eq!(state.slots_since_last_break, 17);
    }
}
