//! Station-repeat rule: nobody holds the same station in two adjacent slots.

use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::rotation::validate::Violation;

use super::moves::{try_apply, workers_on_station};
use super::{RepairRule, RuleContext};

/// Moves a worker off a station they also held in the previous slot.
pub struct RepeatedStationRule;

/// How often `w` works `station` within `radius` slots of `slot`.
fn nearby_uses(grid: &AssignmentGrid, w: usize, slot: usize, station: StationIdx, radius: usize) -> usize {
    let lo = slot.saturating_sub(radius);
    let hi = (slot + radius).min(grid.slot_count() - 1);
    (lo..=hi)
        .filter(|&s| s != slot && grid.cell(s, w) == Cell::Station(station))
        .count()
}

impl RepeatedStationRule {
    fn reassign(grid: &mut AssignmentGrid, ctx: &RuleContext, w: usize, slot: usize, station: StationIdx) -> bool {
        let radius = ctx.config.history_len as usize;
        let mut alternatives: Vec<StationIdx> = grid
            .roster()
            .eligible_stations(w)
            .iter()
            .copied()
            .filter(|&st| st != station)
            .collect();
        alternatives.sort_by_key(|&st| (nearby_uses(grid, w, slot, st, radius), st));

        for &alt in &alternatives {
            if grid.is_station_free(slot, alt) && try_apply(grid, ctx, &[(slot, w, Cell::Station(alt))]) {
                return true;
            }
        }

        // Exchange stations with a colleague working the same slot.
        for (u, theirs) in workers_on_station(grid, slot) {
            if u == w || !alternatives.contains(&theirs) {
                continue;
            }
            let changes = [(slot, w, Cell::Station(theirs)), (slot, u, Cell::Station(station))];
            if try_apply(grid, ctx, &changes) {
                return true;
            }
        }
        false
    }
}

impl RepairRule for RepeatedStationRule {
    fn name(&self) -> &'static str {
        "repeated_station"
    }

    fn handles(&self, violation: &Violation) -> bool {
        matches!(violation, Violation::RepeatedStation { .. })
    }

    fn fix(&self, grid: &mut AssignmentGrid, ctx: &RuleContext, violation: &Violation) -> bool {
        let Violation::RepeatedStation { worker: w, slot, station } = *violation else {
            return false;
        };
        if slot == 0
            || grid.cell(slot - 1, w) != Cell::Station(station)
            || grid.cell(slot, w) != Cell::Station(station)
        {
            return false;
        }
        Self::reassign(grid, ctx, w, slot, station) || Self::reassign(grid, ctx, w, slot - 1, station)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RotationConfig;
    use crate::params::ScheduleParameters;
    use crate::rotation::testutil::grid_from;
    use crate::rotation::validate::ValidationScope;

    #[test]
    fn test_moves_to_free_station() {
        let mut grid = grid_from(
            &["T0", "T1", "T2"],
            &["001010101010101010101010", "212121212121212121212121"],
        );
        let params = ScheduleParameters::calculate(24, 3, 2);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(2);
        let ctx = RuleContext::new(&params, &config, &scope);

        let rule = RepeatedStationRule;
        let found = rule.detect(&grid, &ctx);
        assert_eq!(
            found,
            vec![Violation::RepeatedStation {
                worker: 0,
                slot: 1,
                station: 0
            }]
        );
        assert!(rule.fix(&mut grid, &ctx, &found[0]));
        assert_eq!(grid.cell(1, 0), Cell::Station(2));
        assert!(rule.detect(&grid, &ctx).is_empty());
    }

    #[test]
    fn test_exchanges_with_colleague_when_nothing_free() {
        let mut grid = grid_from(
            &["T0", "T1", "T2", "T3"],
            &[
                "001012301230123012301230",
                "120123012301230123012301",
                "232301230123012301230123",
                "313230123012301230123012",
            ],
        );
        let params = ScheduleParameters::calculate(24, 4, 4);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(4);
        let ctx = RuleContext::new(&params, &config, &scope);

        let violation = Violation::RepeatedStation {
            worker: 0,
            slot: 1,
            station: 0,
        };
        // d1's T2 would leave d1 on T0 twice in a row; d2's T3 works.
        assert!(RepeatedStationRule.fix(&mut grid, &ctx, &violation));
        assert_eq!(grid.cell(1, 0), Cell::Station(3));
        assert_eq!(grid.cell(1, 1), Cell::Station(2));
        assert_eq!(grid.cell(1, 2), Cell::Station(0));
    }
}
