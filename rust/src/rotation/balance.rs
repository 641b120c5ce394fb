//! Rotation/break balancing.
//!
//! The gentle rule moves one unit of work per imbalanced worker per repair
//! pass. The aggressive pass runs once after the iteration cap and pairs
//! the largest deficits with the largest excesses directly.

use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::log_changes;

use super::repair::moves::{break_keeps_variety, cover_break_with_work, try_apply, try_apply_with};
use super::repair::{RepairRule, RuleContext};
use super::validate::Violation;

/// Signed rotation gap: positive = worker is owed rotations.
fn rotation_gap(grid: &AssignmentGrid, ctx: &RuleContext, w: usize) -> i64 {
    ctx.params.target_rotations(w) as i64 - grid.rotations(w) as i64
}

/// Slots ordered nearest to the middle of the shift first.
fn center_out(slots: Vec<usize>, slot_count: usize) -> Vec<usize> {
    let center = slot_count / 2;
    let mut slots = slots;
    slots.sort_by_key(|&s| (s.abs_diff(center), s));
    slots
}

/// Workers matching `keep` ordered by how far off target they are.
fn by_gap<F>(grid: &AssignmentGrid, ctx: &RuleContext, candidates: &[usize], keep: F) -> Vec<usize>
where
    F: Fn(i64) -> bool,
{
    let mut ranked: Vec<(usize, i64)> = candidates
        .iter()
        .map(|&v| (v, rotation_gap(grid, ctx, v)))
        .filter(|&(v, gap)| keep(gap) && !ctx.scope.has_absence(v))
        .collect();
    ranked.sort_by(|a, b| b.1.abs().cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(v, _)| v).collect()
}

/// Brings one worker's rotation count one step toward target.
pub struct RotationBalanceRule;

impl RotationBalanceRule {
    /// Turn one of `w`'s breaks into work, on a vacant station or by taking
    /// over from a colleague who is over target.
    fn add_rotation(grid: &mut AssignmentGrid, ctx: &RuleContext, w: usize) -> bool {
        let stations: Vec<StationIdx> = grid.roster().eligible_stations(w).to_vec();
        for slot in center_out(grid.break_slots(w), grid.slot_count()) {
            let working: Vec<usize> = (0..grid.worker_count())
                .filter(|&v| v != w && grid.cell(slot, v).station().is_some())
                .collect();
            let partners = by_gap(grid, ctx, &working, |gap| gap < 0);
            let covered = cover_break_with_work(grid, ctx, slot, w, &stations, &partners, |g, p| {
                p.map_or(true, |v| break_keeps_variety(g, ctx, v, slot))
            });
            if covered {
                return true;
            }
        }
        false
    }

    /// Hand one of `w`'s work slots to a colleague on break who is under
    /// target. Slots next to an existing break are skipped.
    fn drop_rotation(grid: &mut AssignmentGrid, ctx: &RuleContext, w: usize) -> bool {
        let work: Vec<usize> = (0..grid.slot_count())
            .filter(|&s| grid.cell(s, w).station().is_some())
            .filter(|&s| {
                grid.cell_at(s as isize - 1, w) != Some(Cell::Break)
                    && grid.cell_at(s as isize + 1, w) != Some(Cell::Break)
            })
            .collect();

        for slot in center_out(work, grid.slot_count()) {
            let Some(station) = grid.cell(slot, w).station() else {
                continue;
            };
            let resting: Vec<usize> = (0..grid.worker_count())
                .filter(|&v| v != w && grid.cell(slot, v).is_break())
                .collect();
            for v in by_gap(grid, ctx, &resting, |gap| gap > 0) {
                let changes = [(slot, w, Cell::Break), (slot, v, Cell::Station(station))];
                if try_apply_with(grid, ctx, &changes, |g| break_keeps_variety(g, ctx, w, slot)) {
                    return true;
                }
            }
        }
        false
    }
}

impl RepairRule for RotationBalanceRule {
    fn name(&self) -> &'static str {
        "rotation_balance"
    }

    fn handles(&self, violation: &Violation) -> bool {
        matches!(violation, Violation::RotationImbalance { .. })
    }

    fn fix(&self, grid: &mut AssignmentGrid, ctx: &RuleContext, violation: &Violation) -> bool {
        let Violation::RotationImbalance { worker: w, .. } = *violation else {
            return false;
        };
        let gap = rotation_gap(grid, ctx, w);
        if gap.unsigned_abs() <= ctx.config.balance_tolerance as u64 {
            return false;
        }
        if gap > 0 {
            Self::add_rotation(grid, ctx, w)
        } else {
            Self::drop_rotation(grid, ctx, w)
        }
    }
}

/// Pair the largest deficit with the largest excess and swap the excess
/// worker's station slot with the deficit worker's break slot, one swap per
/// pair per round, until no pair can move. Returns the number of swaps.
pub fn aggressive_balance(grid: &mut AssignmentGrid, ctx: &RuleContext) -> usize {
    let verbosity = ctx.config.verbosity;
    let threshold = ctx.config.aggressive_balance_threshold.max(1) as i64;
    let everyone: Vec<usize> = (0..grid.worker_count()).collect();
    let mut swaps = 0;

    for _round in 0..grid.slot_count() * grid.worker_count().max(1) {
        let deficits = by_gap(grid, ctx, &everyone, |gap| gap >= threshold);
        let excesses = by_gap(grid, ctx, &everyone, |gap| -gap >= threshold);
        if deficits.is_empty() || excesses.is_empty() {
            break;
        }

        let mut moved = 0;
        for (&d, &e) in deficits.iter().zip(excesses.iter()) {
            for slot in 0..grid.slot_count() {
                let Some(station) = grid.cell(slot, e).station() else {
                    continue;
                };
                if !grid.cell(slot, d).is_break() {
                    continue;
                }
                let changes = [(slot, d, Cell::Station(station)), (slot, e, Cell::Break)];
                if try_apply(grid, ctx, &changes) {
                    log_changes!(
                        verbosity,
                        "  Aggressive swap at slot {}: {} works {}, {} rests",
                        slot,
                        grid.roster().worker(d).id,
                        grid.roster().station_name(station),
                        grid.roster().worker(e).id
                    );
                    moved += 1;
                    break;
                }
            }
        }
        if moved == 0 {
            break;
        }
        swaps += moved;
    }
    swaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RotationConfig;
    use crate::params::ScheduleParameters;
    use crate::rotation::testutil::grid_from;
    use crate::rotation::validate::ValidationScope;

    #[test]
    fn test_deficit_break_becomes_work_on_vacant_station() {
        let mut grid = grid_from(
            &["T0", "T1", "T2", "T3"],
            &["01230B230123012301230123", "230123012301230123012301"],
        );
        let params = ScheduleParameters::calculate(24, 4, 2);
        let config = RotationConfig {
            balance_tolerance: 0,
            ..RotationConfig::default()
        };
        let scope = ValidationScope::for_workers(2);
        let ctx = RuleContext::new(&params, &config, &scope);

        let rule = RotationBalanceRule;
        let found = rule.detect(&grid, &ctx);
        assert_eq!(
            found,
            vec![Violation::RotationImbalance {
                worker: 0,
                actual: 23,
                target: 24
            }]
        );
        assert!(rule.fix(&mut grid, &ctx, &found[0]));
        // T0 sits next to d0's own T0 in slot 4; T1 is the first that fits.
        assert_eq!(grid.cell(5, 0), Cell::Station(1));
        assert_eq!(grid.rotations(0), 24);
    }

    #[test]
    fn test_one_off_target_within_default_tolerance() {
        let grid = grid_from(
            &["T0", "T1", "T2", "T3"],
            &["01230B230123012301230123", "230123012301230123012301"],
        );
        let params = ScheduleParameters::calculate(24, 4, 2);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(2);
        let ctx = RuleContext::new(&params, &config, &scope);

        assert!(RotationBalanceRule.detect(&grid, &ctx).is_empty());
    }

    #[test]
    fn test_aggressive_pairs_deficit_with_excess() {
        let mut grid = grid_from(
            &["T0", "T1", "T2"],
            &["B0B1B0B1B0B1B0B1B0B1B0B1", "212021202120212021202120"],
        );
        // Targets of 18 each: d0 is six short, d1 six over.
        let params = ScheduleParameters::calculate(24, 3, 4);
        let config = RotationConfig::default();
        let scope = ValidationScope::for_workers(2);
        let ctx = RuleContext::new(&params, &config, &scope);

        let swaps = aggressive_balance(&mut grid, &ctx);
        assert_eq!(swaps, 6);
        assert_eq!(grid.rotations(0), 18);
        assert_eq!(grid.rotations(1), 18);
        for slot in [0, 2, 4, 6, 8, 10] {
            assert_eq!(grid.cell(slot, 0), Cell::Station(2));
            assert_eq!(grid.cell(slot, 1), Cell::Break);
        }
        let hard: Vec<Violation> = ctx
            .validate(&grid)
            .into_iter()
            .filter(|v| v.is_hard())
            .collect();
        assert!(hard.is_empty());
    }
}
