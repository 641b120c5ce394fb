//! Break-shape rules: no back-to-back breaks, enough variety before each break.

use crate::grid::{AssignmentGrid, StationIdx};
use crate::rotation::validate::{segment_before, station_shortfall, Violation};

use super::moves::{break_keeps_variety, break_takers, cover_break_with_work, trade_break};
use super::{RepairRule, RuleContext};

/// Turns the later (or else the earlier) of two adjacent breaks into work.
pub struct ConsecutiveBreakRule;

impl RepairRule for ConsecutiveBreakRule {
    fn name(&self) -> &'static str {
        "consecutive_break"
    }

    fn handles(&self, violation: &Violation) -> bool {
        matches!(violation, Violation::ConsecutiveBreak { .. })
    }

    fn fix(&self, grid: &mut AssignmentGrid, ctx: &RuleContext, violation: &Violation) -> bool {
        let Violation::ConsecutiveBreak { worker: w, slot } = *violation else {
            return false;
        };
        if slot == 0 || !grid.cell(slot - 1, w).is_break() || !grid.cell(slot, w).is_break() {
            return false;
        }

        let stations: Vec<StationIdx> = grid.roster().eligible_stations(w).to_vec();
        for target in [slot, slot - 1] {
            let partners = break_takers(grid, ctx, target, w);
            let covered = cover_break_with_work(grid, ctx, target, w, &stations, &partners, |g, p| {
                p.map_or(true, |v| break_keeps_variety(g, ctx, v, target))
            });
            if covered {
                return true;
            }
        }
        false
    }
}

/// Repairs breaks taken before enough distinct stations were worked.
///
/// First tries to turn the break into work on a station new to the segment;
/// failing that, trades the break for a later slot so the segment grows.
pub struct MinStationsRule;

impl MinStationsRule {
    fn work_through(grid: &mut AssignmentGrid, ctx: &RuleContext, w: usize, slot: usize) -> bool {
        let (_, segment) = segment_before(grid, w, slot);
        let fresh: Vec<StationIdx> = grid
            .roster()
            .eligible_stations(w)
            .iter()
            .copied()
            .filter(|st| !segment.contains(st))
            .collect();
        if fresh.is_empty() {
            return false;
        }
        let partners = break_takers(grid, ctx, slot, w);
        cover_break_with_work(grid, ctx, slot, w, &fresh, &partners, |g, p| {
            p.map_or(true, |v| break_keeps_variety(g, ctx, v, slot))
        })
    }

    fn push_later(grid: &mut AssignmentGrid, ctx: &RuleContext, w: usize, slot: usize) -> bool {
        let mut to = slot + 1;
        while to < grid.slot_count() && grid.cell(to, w).station().is_some() {
            let moved = trade_break(grid, ctx, w, slot, to, |g, v| {
                break_keeps_variety(g, ctx, w, to) && break_keeps_variety(g, ctx, v, slot)
            });
            if moved {
                return true;
            }
            to += 1;
        }
        false
    }
}

impl RepairRule for MinStationsRule {
    fn name(&self) -> &'static str {
        "min_distinct_stations"
    }

    fn handles(&self, violation: &Violation) -> bool {
        matches!(violation, Violation::TooFewStations { .. })
    }

    fn fix(&self, grid: &mut AssignmentGrid, ctx: &RuleContext, violation: &Violation) -> bool {
        let Violation::TooFewStations { worker: w, slot, .. } = *violation else {
            return false;
        };
        if !grid.cell(slot, w).is_break()
            || station_shortfall(grid, ctx.params, ctx.config, w, slot).is_none()
        {
            return false;
        }
        Self::work_through(grid, ctx, w, slot) || Self::push_later(grid, ctx, w, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RotationConfig;
    use crate::grid::Cell;
    use crate::params::ScheduleParameters;
    use crate::rotation::testutil::grid_from;
    use crate::rotation::validate::ValidationScope;

    #[test]
    fn test_later_break_becomes_work() {
        let mut grid = grid_from(
            &["T0", "T1", "T2"],
            &[
                "01201BB12012012012012012",
                "120120120120120120120120",
                "201201201201201201201201",
            ],
        );
        let params = ScheduleParameters::calculate(24, 3, 3);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(3);
        let ctx = RuleContext::new(&params, &config, &scope);

        let rule = ConsecutiveBreakRule;
        let found = rule.detect(&grid, &ctx);
        assert_eq!(found, vec![Violation::ConsecutiveBreak { worker: 0, slot: 6 }]);

        assert!(rule.fix(&mut grid, &ctx, &found[0]));
        assert_eq!(grid.cell(5, 0), Cell::Break);
        assert_eq!(grid.cell(6, 0), Cell::Station(0));
        assert!(rule.detect(&grid, &ctx).is_empty());
    }

    #[test]
    fn test_locked_break_pair_left_alone() {
        let mut grid = grid_from(
            &["T0", "T1", "T2"],
            &[
                "01201BB12012012012012012",
                "120120120120120120120120",
                "201201201201201201201201",
            ],
        );
        let params = ScheduleParameters::calculate(24, 3, 3);
        let config = RotationConfig::default();
        let mut scope = ValidationScope::for_workers(3);
        scope.locked.insert((5, 0));
        scope.locked.insert((6, 0));
        let ctx = RuleContext::new(&params, &config, &scope);

        let violation = Violation::ConsecutiveBreak { worker: 0, slot: 6 };
        assert!(!ConsecutiveBreakRule.fix(&mut grid, &ctx, &violation));
        assert_eq!(grid.cell(6, 0), Cell::Break);
    }

    #[test]
    fn test_short_segment_break_takes_fresh_station() {
        let mut grid = grid_from(
            &["T0", "T1", "T2", "T3"],
            &["010101B10101010101010101", "232323232323232323232323"],
        );
        let params = ScheduleParameters::calculate(24, 4, 2);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(2);
        let ctx = RuleContext::new(&params, &config, &scope);

        let rule = MinStationsRule;
        let found = rule.detect(&grid, &ctx);
        assert_eq!(
            found,
            vec![Violation::TooFewStations {
                worker: 0,
                slot: 6,
                distinct: 2,
                required: 3
            }]
        );

        assert!(rule.fix(&mut grid, &ctx, &found[0]));
        assert_eq!(grid.cell(6, 0), Cell::Station(3));
        assert!(rule.detect(&grid, &ctx).is_empty());
    }
}
