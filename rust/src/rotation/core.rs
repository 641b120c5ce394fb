//! Generation orchestration: eligibility, skeleton, resolution, repair, absences.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use crate::adjust::absence::{handle_absences, AbsenceOutcome};
use crate::config::RotationConfig;
use crate::eligibility::{resolve_pool, EligibilitySource};
use crate::grid::AssignmentGrid;
use crate::models::{AbsenceRecord, BreakPreferences, ShiftType, Worker};
use crate::params::ScheduleParameters;
use crate::schedule::ScheduleData;
use crate::{log_changes, log_checks};

use super::repair::{repair, RepairReport, RuleContext};
use super::resolver::{resolve_slots, ResolveReport};
use super::skeleton::plan_breaks;
use super::state::{WorkerRuntimeState, WorkerStates};
use super::validate::{validate, ValidationScope, Violation};

/// Inputs for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub workers: Vec<Worker>,
    pub shift_type: ShiftType,
    pub preferences: BreakPreferences,
    pub absences: Vec<AbsenceRecord>,
}

impl GenerationRequest {
    pub fn new(workers: Vec<Worker>, shift_type: ShiftType) -> Self {
        Self {
            workers,
            shift_type,
            preferences: BreakPreferences::default(),
            absences: Vec::new(),
        }
    }

    pub fn with_preferences(mut self, preferences: BreakPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_absences(mut self, absences: Vec<AbsenceRecord>) -> Self {
        self.absences = absences;
        self
    }
}

/// Everything a generation run produced, including its audit trail.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub grid: AssignmentGrid,
    pub params: ScheduleParameters,
    /// Final counters per worker, replayed from the finished grid.
    pub states: Vec<WorkerRuntimeState>,
    pub resolve: ResolveReport,
    pub repair: RepairReport,
    /// Workers dropped for having no eligible station.
    pub excluded: Vec<String>,
    /// (worker, placed, quota) for skeleton quotas that did not fit.
    pub under_filled: Vec<(usize, usize, usize)>,
    pub absences: Vec<AbsenceOutcome>,
    /// Blocking violations in the final grid, after absences were applied.
    pub violations: Vec<Violation>,
    /// Advisory findings (uneven break spacing); not persisted as warnings.
    pub advisories: Vec<Violation>,
    pub preferences: BreakPreferences,
    pub absence_records: Vec<AbsenceRecord>,
}

impl GenerationOutcome {
    fn empty(request: &GenerationRequest, excluded: Vec<String>) -> Self {
        let grid = AssignmentGrid::empty(request.shift_type);
        let params = ScheduleParameters::calculate(grid.slot_count(), 0, 0);
        Self {
            grid,
            params,
            states: Vec::new(),
            resolve: ResolveReport::default(),
            repair: RepairReport {
                converged: true,
                ..RepairReport::default()
            },
            excluded,
            under_filled: Vec::new(),
            absences: Vec::new(),
            violations: Vec::new(),
            advisories: Vec::new(),
            preferences: request.preferences.clone(),
            absence_records: request.absences.clone(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable problems the schedule is saved with.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .violations
            .iter()
            .map(|v| v.describe(&self.grid))
            .collect();
        for outcome in &self.absences {
            if let Some(err) = &outcome.error {
                warnings.push(format!("Absence not applied: {}", err));
            }
            for &(slot, station) in &outcome.unfilled {
                warnings.push(format!(
                    "{} uncovered at {}",
                    self.grid.roster().station_name(station),
                    self.grid.slots()[slot].label
                ));
            }
        }
        warnings
    }

    /// The persisted document. Manual adjustments always start empty.
    pub fn to_schedule_data(&self) -> ScheduleData {
        ScheduleData::from_grid(
            &self.grid,
            &self.preferences,
            &self.absence_records,
            self.warnings(),
        )
    }
}

/// Runs generation with a configuration and a seeded random source.
pub struct RotationEngine {
    config: RotationConfig,
    rng: StdRng,
}

impl RotationEngine {
    pub fn new(config: RotationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Build a full schedule for `request`.
    ///
    /// Never fails: an empty pool yields an empty grid, unresolvable cells
    /// stay `Unfilled`, and leftover violations are reported on the outcome.
    pub fn generate(
        &mut self,
        request: &GenerationRequest,
        source: &mut dyn EligibilitySource,
    ) -> GenerationOutcome {
        let config = &self.config;
        let verbosity = config.verbosity;
        let preferences = &request.preferences;

        let pool = resolve_pool(&request.workers, source, verbosity);
        let excluded = pool.excluded.clone();
        if pool.is_empty() {
            log_changes!(verbosity, "No eligible workers or stations; empty schedule");
            return GenerationOutcome::empty(request, excluded);
        }

        let roster = Arc::new(pool.into_roster());
        let mut grid = AssignmentGrid::new(request.shift_type, Arc::clone(&roster));
        let params =
            ScheduleParameters::calculate(grid.slot_count(), roster.station_count(), roster.worker_count());
        log_changes!(
            verbosity,
            "Generating {} shift: {} workers, {} stations, {} concurrent breaks",
            request.shift_type.as_str(),
            params.worker_count,
            params.station_count,
            params.concurrent_breaks
        );

        let mut states = WorkerStates::new(&grid, &params, preferences, config);
        let skeleton = plan_breaks(&roster, &params, &states, preferences, config);
        let resolve = resolve_slots(&mut grid, &skeleton, &mut states, config, &mut self.rng);

        let mut scope = ValidationScope::for_workers(roster.worker_count());
        scope.locked = skeleton.locked.clone();
        for (w, worker) in roster.workers().iter().enumerate() {
            scope.punishment[w] = preferences.punishment_for(&worker.id);
        }

        let repair_report = {
            let ctx = RuleContext::new(&params, config, &scope);
            repair(&mut grid, &ctx)
        };
        log_changes!(verbosity, "Repair: {}", repair_report);

        // Absences run last so their tails stay on break whatever repair did.
        let (absent_grid, absences) = handle_absences(&grid, &request.absences, verbosity);
        grid = absent_grid;
        for outcome in &absences {
            if let Some(w) = outcome.worker {
                let from = scope.absent_from[w].map_or(outcome.from_slot, |f| f.min(outcome.from_slot));
                scope.absent_from[w] = Some(from);
            }
        }

        let (advisories, violations): (Vec<Violation>, Vec<Violation>) =
            validate(&grid, &params, config, &scope)
                .into_iter()
                .partition(Violation::is_advisory);
        for violation in &violations {
            log_checks!(verbosity, "  Final: {}", violation.describe(&grid));
        }

        let states = WorkerStates::from_grid(&grid, &params, preferences, config).into_vec();

        GenerationOutcome {
            grid,
            params,
            states,
            resolve,
            repair: repair_report,
            excluded,
            under_filled: skeleton.under_filled.clone(),
            absences,
            violations,
            advisories,
            preferences: preferences.clone(),
            absence_records: request.absences.clone(),
        }
    }

    /// Generate again for a schedule that already exists.
    ///
    /// Preferences and absences missing from `request` are taken from the
    /// previous document. Manual adjustments are dropped.
    pub fn regenerate(
        &mut self,
        previous: &ScheduleData,
        request: &GenerationRequest,
        source: &mut dyn EligibilitySource,
    ) -> GenerationOutcome {
        let mut request = request.clone();
        if request.preferences.is_empty() {
            request.preferences = previous.preferences.clone();
        }
        if request.absences.is_empty() {
            request.absences = previous.absences.clone();
        }
        log_changes!(
            self.config.verbosity,
            "Regenerating; discarding {} manual adjustment(s)",
            previous.manual_adjustments.len()
        );
        self.generate(&request, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::StaticEligibility;
    use crate::grid::Cell;
    use crate::models::{AdjustmentKind, FirstBreakPreference, ManualAdjustment, Punishment, ReasonCode};
    use chrono::{TimeZone, Utc};

    fn make_workers(count: usize, stations: usize) -> Vec<Worker> {
        let names: Vec<String> = (0..stations).map(|i| format!("T{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        (0..count)
            .map(|i| Worker::with_stations(&format!("d{}", i), &format!("Dealer {}", i), &refs))
            .collect()
    }

    fn pin_first(worker_id: &str, reason_code: ReasonCode, punishment: Option<Punishment>) -> BreakPreferences {
        BreakPreferences {
            first_break: vec![FirstBreakPreference {
                worker_id: worker_id.to_string(),
                reason_code,
                punishment,
            }],
            last_break: Vec::new(),
        }
    }

    fn assert_hard_rules(grid: &AssignmentGrid) {
        for slot in 0..grid.slot_count() {
            let mut held: Vec<u32> = grid.row(slot).iter().filter_map(|c| c.station()).collect();
            let working = held.len();
            held.sort_unstable();
            held.dedup();
            assert_eq!(held.len(), working, "double booking at slot {}", slot);
        }
        for w in 0..grid.worker_count() {
            for slot in 1..grid.slot_count() {
                let (a, b) = (grid.cell(slot - 1, w), grid.cell(slot, w));
                assert!(!(a.is_break() && b.is_break()), "worker {} slot {}", w, slot);
                if let (Some(x), Some(y)) = (a.station(), b.station()) {
                    assert_ne!(x, y, "worker {} repeats at slot {}", w, slot);
                }
            }
        }
    }

    /// Hard rules for the slots before anyone leaves.
    fn assert_hard_rules_before(grid: &AssignmentGrid, until: usize) {
        for w in 0..grid.worker_count() {
            for slot in 1..until {
                let (a, b) = (grid.cell(slot - 1, w), grid.cell(slot, w));
                assert!(!(a.is_break() && b.is_break()), "worker {} slot {}", w, slot);
                if let (Some(x), Some(y)) = (a.station(), b.station()) {
                    assert_ne!(x, y, "worker {} repeats at slot {}", w, slot);
                }
            }
        }
    }

    #[test]
    fn test_generate_ten_workers_seven_stations() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(42));
        let request = GenerationRequest::new(make_workers(10, 7), ShiftType::Day);
        let outcome = engine.generate(&request, &mut StaticEligibility::new());

        assert_eq!(outcome.grid.worker_count(), 10);
        assert!(outcome.resolve.unfilled.is_empty());
        assert_eq!(outcome.grid.unfilled_count(), 0);
        for w in 0..10 {
            assert_eq!(outcome.grid.rotations(w) + outcome.grid.breaks(w), 24);
            assert_eq!(outcome.states[w].rotations, outcome.grid.rotations(w));
        }
        for slot in 0..24 {
            assert!(outcome.grid.vacant_stations(slot).is_empty());
        }
        assert_hard_rules(&outcome.grid);

        assert!(outcome.repair.converged, "repair: {}", outcome.repair);
        assert!(!outcome.repair.aggressive_used);
        assert!(outcome.is_valid(), "{:?}", outcome.warnings());
        let tolerance = engine.config().balance_tolerance as usize;
        for w in 0..10 {
            let actual = outcome.grid.rotations(w);
            let target = outcome.params.target_rotations(w);
            assert!(
                actual.abs_diff(target) <= tolerance,
                "d{} works {} of {}",
                w,
                actual,
                target
            );
        }
        let total: usize = (0..10).map(|w| outcome.grid.rotations(w)).sum();
        assert_eq!(total, 168);
    }

    #[test]
    fn test_ten_by_seven_converges_across_seeds() {
        let request = GenerationRequest::new(make_workers(10, 7), ShiftType::Day);
        for seed in [1, 2, 3] {
            let mut engine = RotationEngine::new(RotationConfig::seeded(seed));
            let outcome = engine.generate(&request, &mut StaticEligibility::new());
            assert!(outcome.repair.converged, "seed {}: {}", seed, outcome.repair);
            assert!(outcome.repair.residual.is_empty());
            assert!(outcome.to_schedule_data().warnings.is_empty());
        }
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let request = GenerationRequest::new(make_workers(8, 5), ShiftType::Night);
        let first = RotationEngine::new(RotationConfig::seeded(9)).generate(&request, &mut StaticEligibility::new());
        let second = RotationEngine::new(RotationConfig::seeded(9)).generate(&request, &mut StaticEligibility::new());
        assert!(first.grid.same_cells(&second.grid));
    }

    #[test]
    fn test_pinned_first_break() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(7));
        let request = GenerationRequest::new(make_workers(10, 7), ShiftType::Day)
            .with_preferences(pin_first("d0", ReasonCode::DealerRequest, None));
        let outcome = engine.generate(&request, &mut StaticEligibility::new());

        assert_eq!(outcome.grid.cell(0, 0), Cell::Break);
        assert!(outcome.grid.cell(1, 0).station().is_some());
        assert_hard_rules(&outcome.grid);
    }

    #[test]
    fn test_punished_worker_works_before_first_break() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(3));
        let punishment = Punishment {
            active: true,
            tables_to_work: 4,
        };
        let request = GenerationRequest::new(make_workers(10, 7), ShiftType::Day)
            .with_preferences(pin_first("d1", ReasonCode::LateForTable, Some(punishment)));
        let outcome = engine.generate(&request, &mut StaticEligibility::new());

        let grid = &outcome.grid;
        assert!(grid.cell(0, 1).station().is_some());
        if let Some(&first) = grid.break_slots(1).first() {
            let worked = (0..first).filter(|&s| grid.cell(s, 1).station().is_some()).count();
            assert!(worked >= 4, "first break at {} after {} rotations", first, worked);
        }
        assert!(outcome.states[1].punishment.completed);
        assert!(!outcome
            .violations
            .iter()
            .any(|v| matches!(v, Violation::BreakDuringPunishment { .. })));
    }

    #[test]
    fn test_absence_applied_after_repair() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(11));
        let absence = AbsenceRecord {
            worker_id: "d2".to_string(),
            from_slot_label: "14:00".to_string(),
            reason_code: "sick".to_string(),
        };
        let request =
            GenerationRequest::new(make_workers(10, 7), ShiftType::Day).with_absences(vec![absence.clone()]);
        let outcome = engine.generate(&request, &mut StaticEligibility::new());

        assert_eq!(outcome.absences.len(), 1);
        assert!(outcome.absences[0].is_applied());
        assert_eq!(outcome.absences[0].from_slot, 12);
        for slot in 12..24 {
            assert_eq!(outcome.grid.cell(slot, 2), Cell::Break);
        }
        // The tail is exempt from the consecutive-break rule.
        assert!(!outcome
            .violations
            .iter()
            .any(|v| matches!(v, Violation::ConsecutiveBreak { worker: 2, .. })));

        let data = outcome.to_schedule_data();
        assert_eq!(data.absences, vec![absence]);
        assert_eq!(data.slot("14:00").and_then(|s| s.get("d2")), Some("BREAK"));
    }

    #[test]
    fn test_staggered_absences_share_cover() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(13));
        let leaves = |worker_id: &str, label: &str| AbsenceRecord {
            worker_id: worker_id.to_string(),
            from_slot_label: label.to_string(),
            reason_code: "sick".to_string(),
        };
        let request = GenerationRequest::new(make_workers(9, 7), ShiftType::Day)
            .with_absences(vec![leaves("d0", "14:00"), leaves("d1", "19:30")]);
        let outcome = engine.generate(&request, &mut StaticEligibility::new());
        let grid = &outcome.grid;

        assert!(outcome.absences.iter().all(|a| a.is_applied()));
        assert_eq!(outcome.absences[1].from_slot, 23);
        for slot in 12..24 {
            assert_eq!(grid.cell(slot, 0), Cell::Break);
        }
        assert_eq!(grid.cell(23, 1), Cell::Break);
        assert_hard_rules_before(grid, 12);

        // d1 is still on shift until 19:30: a station left open before then
        // must not have had d1 resting next to it.
        for &(slot, station) in &outcome.absences[0].unfilled {
            if slot + 1 >= 23 || !grid.cell(slot, 1).is_break() {
                continue;
            }
            let repeats = grid.cell_at(slot as isize - 1, 1) == Some(Cell::Station(station))
                || grid.cell_at(slot as isize + 1, 1) == Some(Cell::Station(station));
            assert!(repeats, "d1 rested while {} was open at slot {}", station, slot);
        }
        assert!(!outcome
            .violations
            .iter()
            .any(|v| matches!(v, Violation::ConsecutiveBreak { worker: 0 | 1, .. })));
    }

    #[test]
    fn test_empty_pool_gives_empty_grid() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(1));
        let workers = vec![
            Worker::with_stations("a", "A", &[]),
            Worker::with_stations("b", "B", &[]),
        ];
        let outcome = engine.generate(&GenerationRequest::new(workers, ShiftType::Day), &mut StaticEligibility::new());

        assert!(outcome.grid.is_empty());
        assert_eq!(outcome.excluded, vec!["a".to_string(), "b".to_string()]);
        assert!(outcome.is_valid());
        let data = outcome.to_schedule_data();
        assert_eq!(data.slots.len(), 24);
        assert!(data.slots[0].cells.is_empty());
    }

    #[test]
    fn test_regenerate_reuses_preferences_and_drops_adjustments() {
        let mut engine = RotationEngine::new(RotationConfig::seeded(5));
        let prefs = pin_first("d3", ReasonCode::ScheduleNeeds, None);
        let original = engine.generate(
            &GenerationRequest::new(make_workers(9, 6), ShiftType::Day).with_preferences(prefs.clone()),
            &mut StaticEligibility::new(),
        );
        let mut previous = original.to_schedule_data();
        previous.manual_adjustments.push(ManualAdjustment {
            worker_id: "d0".to_string(),
            kind: AdjustmentKind::ExtraBreak,
            reason: "tired".to_string(),
            slot_label: "09:00".to_string(),
            counterpart_id: Some("d1".to_string()),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        });

        let request = GenerationRequest::new(make_workers(9, 6), ShiftType::Day);
        let outcome = engine.regenerate(&previous, &request, &mut StaticEligibility::new());

        assert_eq!(outcome.preferences, prefs);
        assert_eq!(outcome.grid.cell(0, 3), Cell::Break);
        let data = outcome.to_schedule_data();
        assert!(data.manual_adjustments.is_empty());
        assert_eq!(data.preferences, prefs);
    }
}
