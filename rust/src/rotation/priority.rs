//! Break-priority scoring: who should be sent on break next.

use rand::Rng;
use std::cmp::Ordering;

use crate::config::RotationConfig;

use super::state::WorkerRuntimeState;

/// Compare f64 values for sorting, treating NaN as equal.
pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Deterministic part of the score.
///
/// Formula: `since_break × W1 + max(0, deficit) × W2 − (deficit < 0 ? excess_penalty : 0)`
pub fn base_break_priority(state: &WorkerRuntimeState, config: &RotationConfig) -> f64 {
    let deficit = state.break_deficit();
    let mut score = state.slots_since_last_break as f64 * config.priority_since_break_weight;
    score += deficit.max(0) as f64 * config.priority_deficit_weight;
    if deficit < 0 {
        score -= config.priority_excess_penalty;
    }
    score
}

/// Full score including jitter. Higher = should go on break sooner.
pub fn break_priority<R: Rng + ?Sized>(
    state: &WorkerRuntimeState,
    config: &RotationConfig,
    rng: &mut R,
) -> f64 {
    let jitter = if config.priority_jitter > 0.0 {
        rng.gen::<f64>() * config.priority_jitter
    } else {
        0.0
    };
    base_break_priority(state, config) + jitter
}

/// Score and sort candidates, highest priority first.
pub fn rank_for_break<'a, R, F>(
    candidates: &[usize],
    state_of: F,
    config: &RotationConfig,
    rng: &mut R,
) -> Vec<(usize, f64)>
where
    R: Rng + ?Sized,
    F: Fn(usize) -> &'a WorkerRuntimeState,
{
    let mut ranked: Vec<(usize, f64)> = candidates
        .iter()
        .map(|&w| (w, break_priority(state_of(w), config, rng)))
        .collect();
    ranked.sort_by(|a, b| cmp_f64(b.1, a.1).then(a.0.cmp(&b.0)));
    ranked
}
