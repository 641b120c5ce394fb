//! Grid edits shared by the repair rules.
//!
//! Every edit goes through `try_apply`, which writes the cells, checks that
//! none of them introduces a hard violation, and rolls back otherwise.

use crate::grid::{AssignmentGrid, Cell, StationIdx};
use crate::rotation::validate::{punishment_release, station_shortfall};

use super::RuleContext;

/// One cell write: (slot, worker, new cell).
pub type Change = (usize, usize, Cell);

/// Whether the cell at (slot, w) is acceptable given its neighbours.
pub fn cell_ok(grid: &AssignmentGrid, ctx: &RuleContext, slot: usize, w: usize) -> bool {
    let before = grid.cell_at(slot as isize - 1, w);
    let after = grid.cell_at(slot as isize + 1, w);

    match grid.cell(slot, w) {
        Cell::Station(st) => {
            if !grid.roster().is_eligible(w, st) {
                return false;
            }
            if before == Some(Cell::Station(st)) || after == Some(Cell::Station(st)) {
                return false;
            }
            grid.row(slot)
                .iter()
                .filter(|c| **c == Cell::Station(st))
                .count()
                == 1
        }
        Cell::Break => {
            if before == Some(Cell::Break) || after == Some(Cell::Break) {
                return false;
            }
            match ctx.scope.punishment.get(w) {
                Some(Some(target)) => slot >= punishment_release(grid, w, *target),
                _ => true,
            }
        }
        Cell::Unfilled => true,
    }
}

/// Apply `changes` if every touched cell is mutable and stays valid and
/// `accept` agrees; otherwise restore the grid exactly.
pub fn try_apply_with<F>(
    grid: &mut AssignmentGrid,
    ctx: &RuleContext,
    changes: &[Change],
    accept: F,
) -> bool
where
    F: Fn(&AssignmentGrid) -> bool,
{
    if changes
        .iter()
        .any(|&(slot, w, _)| !ctx.scope.is_mutable(slot, w))
    {
        return false;
    }

    let previous: Vec<Change> = changes
        .iter()
        .map(|&(slot, w, _)| (slot, w, grid.cell(slot, w)))
        .collect();
    for &(slot, w, cell) in changes {
        grid.set(slot, w, cell);
    }

    let valid = changes
        .iter()
        .all(|&(slot, w, _)| cell_ok(grid, ctx, slot, w))
        && accept(&*grid);

    if !valid {
        for &(slot, w, cell) in previous.iter().rev() {
            grid.set(slot, w, cell);
        }
    }
    valid
}

pub fn try_apply(grid: &mut AssignmentGrid, ctx: &RuleContext, changes: &[Change]) -> bool {
    try_apply_with(grid, ctx, changes, |_| true)
}

/// Workers holding a station in `slot`, with that station.
pub fn workers_on_station(grid: &AssignmentGrid, slot: usize) -> Vec<(usize, StationIdx)> {
    grid.row(slot)
        .iter()
        .enumerate()
        .filter_map(|(w, c)| c.station().map(|st| (w, st)))
        .collect()
}

/// Workers on break in `slot`.
pub fn workers_on_break(grid: &AssignmentGrid, slot: usize) -> Vec<usize> {
    grid.row(slot)
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_break())
        .map(|(w, _)| w)
        .collect()
}

/// Workers on a station in `slot` other than `exclude`, those owing the
/// most breaks first.
pub fn break_takers(
    grid: &AssignmentGrid,
    ctx: &RuleContext,
    slot: usize,
    exclude: usize,
) -> Vec<usize> {
    let mut takers: Vec<(usize, i64)> = workers_on_station(grid, slot)
        .into_iter()
        .filter(|&(v, _)| v != exclude)
        .map(|(v, _)| {
            let owed = ctx.params.target_breaks(v) as i64 - grid.breaks(v) as i64;
            (v, owed)
        })
        .collect();
    takers.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    takers.into_iter().map(|(v, _)| v).collect()
}

/// True unless a break at (slot, w) now falls short of the distinct-station rule.
pub fn break_keeps_variety(grid: &AssignmentGrid, ctx: &RuleContext, w: usize, slot: usize) -> bool {
    ctx.scope.is_locked(slot, w)
        || station_shortfall(grid, ctx.params, ctx.config, w, slot).is_none()
}

/// Put `w` to work in `slot`: first on a vacant station, then by taking
/// over another worker's station and sending them on break.
/// `partners` orders who may be sent on break; `accept` vets the result and
/// is told which partner, if any, took the break.
pub fn cover_break_with_work<F>(
    grid: &mut AssignmentGrid,
    ctx: &RuleContext,
    slot: usize,
    w: usize,
    stations: &[StationIdx],
    partners: &[usize],
    accept: F,
) -> bool
where
    F: Fn(&AssignmentGrid, Option<usize>) -> bool,
{
    for &st in stations {
        if grid.is_station_free(slot, st)
            && try_apply_with(grid, ctx, &[(slot, w, Cell::Station(st))], |g| accept(g, None))
        {
            return true;
        }
    }
    for &v in partners {
        if v == w {
            continue;
        }
        let Some(st) = grid.cell(slot, v).station() else {
            continue;
        };
        if !stations.contains(&st) {
            continue;
        }
        let changes = [(slot, w, Cell::Station(st)), (slot, v, Cell::Break)];
        if try_apply_with(grid, ctx, &changes, |g| accept(g, Some(v))) {
            return true;
        }
    }
    false
}

/// Move `w`'s break from `from` to `to` by trading with a partner who is on
/// break at `to` and working at `from`. Both workers keep their counts.
pub fn trade_break<F>(
    grid: &mut AssignmentGrid,
    ctx: &RuleContext,
    w: usize,
    from: usize,
    to: usize,
    accept: F,
) -> bool
where
    F: Fn(&AssignmentGrid, usize) -> bool,
{
    let Some(w_station) = grid.cell(to, w).station() else {
        return false;
    };
    if !grid.cell(from, w).is_break() {
        return false;
    }
    for v in workers_on_break(grid, to) {
        if v == w {
            continue;
        }
        let Some(v_station) = grid.cell(from, v).station() else {
            continue;
        };
        let changes = [
            (from, w, Cell::Station(v_station)),
            (from, v, Cell::Break),
            (to, v, Cell::Station(w_station)),
            (to, w, Cell::Break),
        ];
        if try_apply_with(grid, ctx, &changes, |g| accept(g, v)) {
            return true;
        }
    }
    false
}
