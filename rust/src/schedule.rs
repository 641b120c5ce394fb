//! The persisted schedule document and versioned in-memory schedule.
//!
//! On disk a schedule is one JSON object: slot labels in shift order, each
//! mapping worker id to a station name or `BREAK`, followed by sidecar keys
//! that start with an underscore.

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::error::RotationError;
use crate::grid::{AssignmentGrid, Cell, Roster, BREAK_LABEL, UNFILLED_LABEL};
use crate::models::{AbsenceRecord, BreakPreferences, ManualAdjustment, ShiftType, Worker};
use crate::slots::generate_time_slots;

pub const PREFERENCES_KEY: &str = "_preferences";
pub const ADJUSTMENTS_KEY: &str = "_manualAdjustments";
pub const ABSENCES_KEY: &str = "_absences";
pub const WARNINGS_KEY: &str = "_warnings";

/// One slot of the document: worker id → rendered cell, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotAssignments {
    pub label: String,
    pub cells: Vec<(String, String)>,
}

impl SlotAssignments {
    pub fn get(&self, worker_id: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(id, _)| id == worker_id)
            .map(|(_, value)| value.as_str())
    }
}

/// The persisted schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleData {
    pub slots: Vec<SlotAssignments>,
    pub preferences: BreakPreferences,
    pub manual_adjustments: Vec<ManualAdjustment>,
    pub absences: Vec<AbsenceRecord>,
    /// Residual violations the schedule was saved with.
    pub warnings: Vec<String>,
}

impl ScheduleData {
    /// Render a grid into a document. Manual adjustments start empty.
    pub fn from_grid(
        grid: &AssignmentGrid,
        preferences: &BreakPreferences,
        absences: &[AbsenceRecord],
        warnings: Vec<String>,
    ) -> Self {
        let workers = grid.roster().workers();
        let slots = grid
            .slots()
            .iter()
            .map(|slot| SlotAssignments {
                label: slot.label.clone(),
                cells: workers
                    .iter()
                    .enumerate()
                    .map(|(w, worker)| {
                        (
                            worker.id.clone(),
                            grid.render(grid.cell(slot.index, w)).to_string(),
                        )
                    })
                    .collect(),
            })
            .collect();

        Self {
            slots,
            preferences: preferences.clone(),
            manual_adjustments: Vec::new(),
            absences: absences.to_vec(),
            warnings,
        }
    }

    pub fn slot(&self, label: &str) -> Option<&SlotAssignments> {
        self.slots.iter().find(|s| s.label == label)
    }

    /// Work out the shift type from the slot labels.
    pub fn shift_type(&self) -> Result<ShiftType, RotationError> {
        let labels: Vec<&str> = self.slots.iter().map(|s| s.label.as_str()).collect();
        for shift_type in [ShiftType::Day, ShiftType::Night] {
            let expected = generate_time_slots(shift_type);
            if expected.len() == labels.len()
                && expected.iter().zip(labels.iter()).all(|(e, l)| e.label == *l)
            {
                return Ok(shift_type);
            }
        }
        Err(RotationError::MalformedSchedule(format!(
            "slot labels {:?} match neither shift",
            labels.first()
        )))
    }

    pub fn to_json(&self) -> Result<String, RotationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, RotationError> {
        Ok(serde_json::from_str(json)?)
    }
}

struct CellsRef<'a>(&'a [(String, String)]);

impl Serialize for CellsRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (worker, value) in self.0 {
            map.serialize_entry(worker, value)?;
        }
        map.end()
    }
}

impl Serialize for ScheduleData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sidecars = 2
            + usize::from(!self.absences.is_empty())
            + usize::from(!self.warnings.is_empty());
        let mut map = serializer.serialize_map(Some(self.slots.len() + sidecars))?;
        for slot in &self.slots {
            map.serialize_entry(&slot.label, &CellsRef(&slot.cells))?;
        }
        map.serialize_entry(PREFERENCES_KEY, &self.preferences)?;
        map.serialize_entry(ADJUSTMENTS_KEY, &self.manual_adjustments)?;
        if !self.absences.is_empty() {
            map.serialize_entry(ABSENCES_KEY, &self.absences)?;
        }
        if !self.warnings.is_empty() {
            map.serialize_entry(WARNINGS_KEY, &self.warnings)?;
        }
        map.end()
    }
}

struct OrderedCells(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedCells {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CellsVisitor;

        impl<'de> Visitor<'de> for CellsVisitor {
            type Value = OrderedCells;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping worker id to station")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OrderedCells, A::Error> {
                let mut cells = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, String>()? {
                    cells.push(entry);
                }
                Ok(OrderedCells(cells))
            }
        }

        deserializer.deserialize_map(CellsVisitor)
    }
}

struct ScheduleVisitor;

impl<'de> Visitor<'de> for ScheduleVisitor {
    type Value = ScheduleData;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a schedule object keyed by slot label")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ScheduleData, A::Error> {
        let mut data = ScheduleData::default();
        while let Some(key) = access.next_key::<String>()? {
            match key.as_str() {
                PREFERENCES_KEY => {
                    data.preferences = access
                        .next_value::<Option<BreakPreferences>>()?
                        .unwrap_or_default();
                }
                ADJUSTMENTS_KEY => {
                    data.manual_adjustments = access
                        .next_value::<Option<Vec<ManualAdjustment>>>()?
                        .unwrap_or_default();
                }
                ABSENCES_KEY => {
                    data.absences = access
                        .next_value::<Option<Vec<AbsenceRecord>>>()?
                        .unwrap_or_default();
                }
                WARNINGS_KEY => {
                    data.warnings = access.next_value::<Option<Vec<String>>>()?.unwrap_or_default();
                }
                other if other.starts_with('_') => {
                    access.next_value::<IgnoredAny>()?;
                }
                _ => {
                    if data.slots.iter().any(|s| s.label == key) {
                        return Err(de::Error::custom(format!("duplicate slot {}", key)));
                    }
                    let cells = access.next_value::<OrderedCells>()?;
                    data.slots.push(SlotAssignments {
                        label: key,
                        cells: cells.0,
                    });
                }
            }
        }
        Ok(data)
    }
}

impl<'de> Deserialize<'de> for ScheduleData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ScheduleVisitor)
    }
}

impl AssignmentGrid {
    /// Rebuild a grid from a persisted document.
    ///
    /// Station names the workers do not list are interned with nobody
    /// eligible, so old documents still load after eligibility changes.
    pub fn from_schedule_data(data: &ScheduleData, workers: Vec<Worker>) -> Result<Self, RotationError> {
        let shift_type = data.shift_type()?;
        let base = Roster::new(workers);

        let unknown: Vec<&str> = data
            .slots
            .iter()
            .flat_map(|s| s.cells.iter().map(|(_, value)| value.as_str()))
            .filter(|v| *v != BREAK_LABEL && *v != UNFILLED_LABEL && base.station_index(v).is_none())
            .collect();
        let roster = if unknown.is_empty() {
            base
        } else {
            base.with_extra_stations(unknown)
        };

        let mut grid = AssignmentGrid::new(shift_type, Arc::new(roster));
        for (slot, assignments) in data.slots.iter().enumerate() {
            for (worker_id, value) in &assignments.cells {
                let w = grid
                    .roster()
                    .worker_index(worker_id)
                    .ok_or_else(|| RotationError::UnknownWorker(worker_id.clone()))?;
                let cell = match value.as_str() {
                    BREAK_LABEL => Cell::Break,
                    UNFILLED_LABEL => Cell::Unfilled,
                    name => Cell::Station(
                        grid.roster()
                            .station_index(name)
                            .ok_or_else(|| RotationError::UnknownStation(name.to_string()))?,
                    ),
                };
                grid.set(slot, w, cell);
            }
        }
        Ok(grid)
    }
}

/// Proof of which schedule version an edit was computed against.
#[derive(Debug, Clone)]
pub struct ScheduleLease {
    version: u64,
    grid: Arc<AssignmentGrid>,
}

impl ScheduleLease {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The grid as it was when leased.
    pub fn grid(&self) -> &Arc<AssignmentGrid> {
        &self.grid
    }
}

/// A schedule guarded by optimistic concurrency: writers lease a version and
/// their commit is rejected if anyone committed in between.
#[derive(Debug, Clone)]
pub struct VersionedSchedule {
    version: u64,
    data: Arc<AssignmentGrid>,
    preferences: BreakPreferences,
    absences: Vec<AbsenceRecord>,
    adjustments: Vec<ManualAdjustment>,
}

impl VersionedSchedule {
    pub fn new(grid: AssignmentGrid, preferences: BreakPreferences) -> Self {
        Self {
            version: 0,
            data: Arc::new(grid),
            preferences,
            absences: Vec::new(),
            adjustments: Vec::new(),
        }
    }

    /// Load a persisted document, keeping its sidecars.
    pub fn from_document(data: &ScheduleData, workers: Vec<Worker>) -> Result<Self, RotationError> {
        let grid = AssignmentGrid::from_schedule_data(data, workers)?;
        Ok(Self {
            version: 0,
            data: Arc::new(grid),
            preferences: data.preferences.clone(),
            absences: data.absences.clone(),
            adjustments: data.manual_adjustments.clone(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn grid(&self) -> Arc<AssignmentGrid> {
        Arc::clone(&self.data)
    }

    pub fn preferences(&self) -> &BreakPreferences {
        &self.preferences
    }

    pub fn adjustments(&self) -> &[ManualAdjustment] {
        &self.adjustments
    }

    pub fn lease(&self) -> ScheduleLease {
        ScheduleLease {
            version: self.version,
            grid: Arc::clone(&self.data),
        }
    }

    /// Replace the grid if `lease` is still current. Returns the new version.
    pub fn commit(&mut self, lease: ScheduleLease, grid: Arc<AssignmentGrid>) -> Result<u64, RotationError> {
        if lease.version != self.version {
            return Err(RotationError::StaleVersion {
                leased: lease.version,
                current: self.version,
            });
        }
        self.data = grid;
        self.version += 1;
        Ok(self.version)
    }

    /// Commit a fully regenerated grid. Manual adjustments do not survive.
    pub fn replace(
        &mut self,
        lease: ScheduleLease,
        grid: AssignmentGrid,
        preferences: BreakPreferences,
        absences: Vec<AbsenceRecord>,
    ) -> Result<u64, RotationError> {
        let version = self.commit(lease, Arc::new(grid))?;
        self.preferences = preferences;
        self.absences = absences;
        self.adjustments.clear();
        Ok(version)
    }

    pub fn record_adjustment(&mut self, adjustment: ManualAdjustment) {
        self.adjustments.push(adjustment);
    }

    pub fn to_document(&self, warnings: Vec<String>) -> ScheduleData {
        let mut data = ScheduleData::from_grid(&self.data, &self.preferences, &self.absences, warnings);
        data.manual_adjustments = self.adjustments.clone();
        data
    }
}
