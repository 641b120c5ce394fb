//! Break spacing: nudges breaks toward their evenly spaced ideal slots.

use crate::grid::AssignmentGrid;
use crate::rotation::skeleton::ideal_positions;
use crate::rotation::validate::{break_deviation, Violation};

use super::moves::{break_keeps_variety, trade_break};
use super::{RepairRule, RuleContext};

/// Relocates one badly placed break toward its evenly spaced ideal.
///
/// A move trades the break with a colleague resting at the target slot.
/// It is accepted only when the worker's own deviation shrinks and the
/// pair's combined deviation shrinks too, so repeated moves cannot cycle.
pub struct BreakSpreadRule;

impl RepairRule for BreakSpreadRule {
    fn name(&self) -> &'static str {
        "break_spread"
    }

    fn handles(&self, violation: &Violation) -> bool {
        matches!(violation, Violation::UnevenBreaks { .. })
    }

    fn fix(&self, grid: &mut AssignmentGrid, ctx: &RuleContext, violation: &Violation) -> bool {
        let Violation::UnevenBreaks { worker: w, .. } = *violation else {
            return false;
        };
        let scope = ctx.scope;
        let current = break_deviation(grid, scope, w);
        if current <= ctx.config.spread_tolerance as usize {
            return false;
        }

        let before: Vec<usize> = (0..grid.worker_count())
            .map(|v| break_deviation(grid, scope, v))
            .collect();
        let breaks = grid.break_slots(w);
        let ideals = ideal_positions(grid.slot_count(), breaks.len());

        let mut worst: Vec<(usize, usize)> = breaks
            .iter()
            .copied()
            .zip(ideals.iter().copied())
            .filter(|&(b, _)| !scope.is_locked(b, w))
            .collect();
        worst.sort_by_key(|&(b, ideal)| (std::cmp::Reverse(b.abs_diff(ideal)), b));

        for (from, ideal) in worst {
            let distance = from.abs_diff(ideal);
            if distance == 0 {
                break;
            }
            let mut targets: Vec<usize> = (0..grid.slot_count())
                .filter(|&s| s.abs_diff(ideal) < distance && grid.cell(s, w).station().is_some())
                .collect();
            targets.sort_by_key(|&s| (s.abs_diff(ideal), s));

            for to in targets {
                let moved = trade_break(grid, ctx, w, from, to, |g, v| {
                    let mine = break_deviation(g, scope, w);
                    let theirs = break_deviation(g, scope, v);
                    mine < current
                        && mine + theirs < current + before[v]
                        && break_keeps_variety(g, ctx, w, to)
                        && break_keeps_variety(g, ctx, v, from)
                });
                if moved {
                    return true;
                }
            }
        }
        false
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

    fn spread_grid() -> AssignmentGrid {
        // d0 rests at 3 and 16, d1 at 8 and 20; ideals for two breaks are 8 and 16.
        grid_from(
            &["T0", "T1", "T2", "T3"],
            &[
                "012B012301230123B1230123",
                "23012301B30123012301B301",
                "123012301230123012301230",
            ],
        )
    }

    #[test]
    fn test_break_moves_toward_ideal() {
        let mut grid = spread_grid();
        let params = ScheduleParameters::calculate(24, 4, 3);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(3);
        let ctx = RuleContext::new(&params, &config, &scope);

        let violation = Violation::UnevenBreaks {
            worker: 0,
            deviation: 5,
        };
        assert!(BreakSpreadRule.fix(&mut grid, &ctx, &violation));
        assert_eq!(grid.break_slots(0), vec![8, 16]);
        assert_eq!(grid.break_slots(1), vec![3, 20]);
        assert_eq!(grid.cell(3, 0), Cell::Station(1));
        assert_eq!(grid.cell(8, 1), Cell::Station(0));
    }

    #[test]
    fn test_locked_break_stays() {
        let mut grid = spread_grid();
        let params = ScheduleParameters::calculate(24, 4, 3);
        let config = RotationConfig::default();
        let mut scope = ValidationScope::for_workers(3);
        scope.locked.insert((3, 0));
        let ctx = RuleContext::new(&params, &config, &scope);

        let violation = Violation::UnevenBreaks {
            worker: 0,
            deviation: 5,
        };
        assert!(!BreakSpreadRule.fix(&mut grid, &ctx, &violation));
        assert_eq!(grid.break_slots(0), vec![3, 16]);
    }
}
