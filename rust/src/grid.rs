//! The assignment grid: slot × worker → station or break.
//!
//! Rows are reference-counted so a snapshot of the grid is a vector of
//! pointer copies; writing a cell only clones the row it touches.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::models::{ShiftType, Worker};
use crate::slots::{generate_time_slots, TimeSlot};

/// Rendered value of a break cell.
pub const BREAK_LABEL: &str = "BREAK";
/// Rendered value of a cell the resolver could not fill.
pub const UNFILLED_LABEL: &str = "UNFILLED";

/// Station ids are interned to `u32` so cells stay `Copy`.
pub type StationIdx = u32;

/// What a worker does in one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cell {
    Station(StationIdx),
    Break,
    /// No admissible station was found, or the worker is idle.
    Unfilled,
}

impl Cell {
    #[inline]
    pub fn is_break(self) -> bool {
        matches!(self, Cell::Break)
    }

    #[inline]
    pub fn station(self) -> Option<StationIdx> {
        match self {
            Cell::Station(st) => Some(st),
            _ => None,
        }
    }
}

/// Workers in play plus the interned station universe and eligibility matrix.
///
/// Station ids follow first-seen order across the workers' station lists.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    workers: Vec<Worker>,
    index: FxHashMap<String, usize>,
    station_ids: FxHashMap<String, StationIdx>,
    station_names: Vec<String>,
    /// Eligible stations per worker, in the worker's preference order.
    eligible: Vec<Vec<StationIdx>>,
}

impl Roster {
    /// Build a roster; the station universe is the union of all workers' stations.
    pub fn new(workers: Vec<Worker>) -> Self {
        let mut roster = Self {
            eligible: Vec::with_capacity(workers.len()),
            ..Self::default()
        };
        for (i, worker) in workers.iter().enumerate() {
            let ids: Vec<StationIdx> = worker
                .eligible_stations
                .iter()
                .map(|s| roster.add_station(s))
                .collect();
            roster.eligible.push(ids);
            roster.index.insert(worker.id.clone(), i);
        }
        roster.workers = workers;
        roster
    }

    /// Copy of this roster with additional stations that nobody is eligible for.
    pub fn with_extra_stations<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut roster = self.clone();
        for name in names {
            roster.add_station(name);
        }
        roster
    }

    fn add_station(&mut self, name: &str) -> StationIdx {
        if let Some(&id) = self.station_ids.get(name) {
            return id;
        }
        let id = self.station_names.len() as StationIdx;
        self.station_names.push(name.to_string());
        self.station_ids.insert(name.to_string(), id);
        id
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker(&self, w: usize) -> &Worker {
        &self.workers[w]
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn station_count(&self) -> usize {
        self.station_names.len()
    }

    pub fn worker_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn station_index(&self, name: &str) -> Option<StationIdx> {
        self.station_ids.get(name).copied()
    }

    pub fn station_name(&self, station: StationIdx) -> &str {
        self.station_names
            .get(station as usize)
            .map_or(UNFILLED_LABEL, |s| s.as_str())
    }

    pub fn eligible_stations(&self, w: usize) -> &[StationIdx] {
        self.eligible.get(w).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_eligible(&self, w: usize, station: StationIdx) -> bool {
        self.eligible_stations(w).contains(&station)
    }
}

/// Mapping from slot to per-worker cell.
#[derive(Debug, Clone)]
pub struct AssignmentGrid {
    shift_type: ShiftType,
    slots: Vec<TimeSlot>,
    roster: Arc<Roster>,
    rows: Vec<Arc<Vec<Cell>>>,
}

impl AssignmentGrid {
    /// A grid where every cell is `Unfilled`.
    pub fn new(shift_type: ShiftType, roster: Arc<Roster>) -> Self {
        let slots = generate_time_slots(shift_type);
        let row = Arc::new(vec![Cell::Unfilled; roster.worker_count()]);
        let rows = (0..slots.len()).map(|_| Arc::clone(&row)).collect();
        Self {
            shift_type,
            slots,
            roster,
            rows,
        }
    }

    /// A grid with no workers, returned when there is nothing to schedule.
    pub fn empty(shift_type: ShiftType) -> Self {
        Self::new(shift_type, Arc::new(Roster::default()))
    }

    pub fn shift_type(&self) -> ShiftType {
        self.shift_type
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_arc(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }

    pub fn worker_count(&self) -> usize {
        self.roster.worker_count()
    }

    pub fn is_empty(&self) -> bool {
        self.worker_count() == 0 || self.roster.station_count() == 0
    }

    #[inline]
    pub fn cell(&self, slot: usize, w: usize) -> Cell {
        self.rows[slot][w]
    }

    /// Cell lookup that tolerates out-of-range slots (used for neighbour checks).
    #[inline]
    pub fn cell_at(&self, slot: isize, w: usize) -> Option<Cell> {
        if slot < 0 {
            return None;
        }
        self.rows.get(slot as usize).map(|row| row[w])
    }

    #[inline]
    pub fn set(&mut self, slot: usize, w: usize, cell: Cell) {
        Arc::make_mut(&mut self.rows[slot])[w] = cell;
    }

    pub fn row(&self, slot: usize) -> &[Cell] {
        &self.rows[slot]
    }

    /// Worker holding `station` in `slot`, if any.
    pub fn station_holder(&self, slot: usize, station: StationIdx) -> Option<usize> {
        self.rows[slot]
            .iter()
            .position(|c| *c == Cell::Station(station))
    }

    pub fn is_station_free(&self, slot: usize, station: StationIdx) -> bool {
        self.station_holder(slot, station).is_none()
    }

    /// Stations nobody is working in `slot`.
    pub fn vacant_stations(&self, slot: usize) -> Vec<StationIdx> {
        (0..self.roster.station_count() as StationIdx)
            .filter(|st| self.is_station_free(slot, *st))
            .collect()
    }

    pub fn rotations(&self, w: usize) -> usize {
        self.rows.iter().filter(|r| r[w].station().is_some()).count()
    }

    pub fn breaks(&self, w: usize) -> usize {
        self.rows.iter().filter(|r| r[w].is_break()).count()
    }

    pub fn break_slots(&self, w: usize) -> Vec<usize> {
        (0..self.slot_count())
            .filter(|&s| self.cell(s, w).is_break())
            .collect()
    }

    pub fn worker_cells(&self, w: usize) -> Vec<Cell> {
        self.rows.iter().map(|r| r[w]).collect()
    }

    /// Render a cell the way the persisted schedule stores it.
    pub fn render(&self, cell: Cell) -> &str {
        match cell {
            Cell::Station(st) => self.roster.station_name(st),
            Cell::Break => BREAK_LABEL,
            Cell::Unfilled => UNFILLED_LABEL,
        }
    }

    /// Number of cells the resolver could not fill.
    pub fn unfilled_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|c| **c == Cell::Unfilled).count())
            .sum()
    }

    /// True when both grids hold identical cells.
    pub fn same_cells(&self, other: &AssignmentGrid) -> bool {
        self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(other.rows.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }
}
