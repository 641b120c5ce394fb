//! Configuration types for the rotation engine.

use pyo3::prelude::*;

/// Tuning knobs for generation and repair.
#[pyclass]
#[derive(Clone, Debug)]
pub struct RotationConfig {
    /// Cap on validation/repair iterations before aggressive balancing
    #[pyo3(get, set)]
    pub max_repair_iterations: u32,
    /// Minimum worked slots the skeleton leaves before each break
    #[pyo3(get, set)]
    pub min_work_before_break: u32,
    /// Distinct stations required before the first break of the shift
    #[pyo3(get, set)]
    pub first_segment_min_stations: u32,
    /// Distinct stations required before every later break
    #[pyo3(get, set)]
    pub later_segment_min_stations: u32,
    /// Breaks starting before this slot index use the early-window threshold
    #[pyo3(get, set)]
    pub early_window_slots: u32,
    /// Distinct stations required before a break inside the early window
    #[pyo3(get, set)]
    pub early_window_min_stations: u32,
    /// Length of the rolling most-recent-first station history
    #[pyo3(get, set)]
    pub history_len: u32,
    /// Break priority weight per slot worked since the last break (W1)
    #[pyo3(get, set)]
    pub priority_since_break_weight: f64,
    /// Break priority weight per missing break (W2)
    #[pyo3(get, set)]
    pub priority_deficit_weight: f64,
    /// Break priority penalty once a worker already has more breaks than targeted
    #[pyo3(get, set)]
    pub priority_excess_penalty: f64,
    /// Upper bound of the random jitter added to break priority
    #[pyo3(get, set)]
    pub priority_jitter: f64,
    /// Penalty for the most recent station in history (decays with age)
    #[pyo3(get, set)]
    pub recent_station_penalty: f64,
    /// Bonus for a station not yet worked this shift
    #[pyo3(get, set)]
    pub new_station_bonus: f64,
    /// Allowed |rotations - target| before the balancing rule acts
    #[pyo3(get, set)]
    pub balance_tolerance: u32,
    /// Deviation at or above which the aggressive pass pairs workers
    #[pyo3(get, set)]
    pub aggressive_balance_threshold: u32,
    /// Slots a break may sit away from its evenly spaced ideal
    #[pyo3(get, set)]
    pub spread_tolerance: u32,
    /// Seed for the tie-breaking RNG (None = nondeterministic)
    #[pyo3(get, set)]
    pub seed: Option<u64>,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_repair_iterations: 10,
            min_work_before_break: 3,
            first_segment_min_stations: 3,
            later_segment_min_stations: 2,
            early_window_slots: 4,
            early_window_min_stations: 2,
            history_len: 4,
            priority_since_break_weight: 10.0,
            priority_deficit_weight: 25.0,
            priority_excess_penalty: 40.0,
            priority_jitter: 1.0,
            recent_station_penalty: 8.0,
            new_station_bonus: 5.0,
            balance_tolerance: 1,
            aggressive_balance_threshold: 1,
            spread_tolerance: 3,
            seed: None,
            verbosity: 0,
        }
    }
}

impl RotationConfig {
    /// Default configuration with a fixed seed, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

#[pymethods]
impl RotationConfig {
    #[new]
    #[pyo3(signature = (
        max_repair_iterations=None,
        min_work_before_break=None,
        first_segment_min_stations=None,
        later_segment_min_stations=None,
        early_window_slots=None,
        early_window_min_stations=None,
        history_len=None,
        spread_tolerance=None,
        seed=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        max_repair_iterations: Option<u32>,
        min_work_before_break: Option<u32>,
        first_segment_min_stations: Option<u32>,
        later_segment_min_stations: Option<u32>,
        early_window_slots: Option<u32>,
        early_window_min_stations: Option<u32>,
        history_len: Option<u32>,
        spread_tolerance: Option<u32>,
        seed: Option<u64>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            max_repair_iterations: max_repair_iterations
                .unwrap_or(defaults.max_repair_iterations),
            min_work_before_break: min_work_before_break
                .unwrap_or(defaults.min_work_before_break),
            first_segment_min_stations: first_segment_min_stations
                .unwrap_or(defaults.first_segment_min_stations),
            later_segment_min_stations: later_segment_min_stations
                .unwrap_or(defaults.later_segment_min_stations),
            early_window_slots: early_window_slots.unwrap_or(defaults.early_window_slots),
            early_window_min_stations: early_window_min_stations
                .unwrap_or(defaults.early_window_min_stations),
            history_len: history_len.unwrap_or(defaults.history_len),
            spread_tolerance: spread_tolerance.unwrap_or(defaults.spread_tolerance),
            seed,
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            ..defaults
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "RotationConfig(max_repair_iterations={}, min_work_before_break={}, seed={:?})",
            self.max_repair_iterations, self.min_work_before_break, self.seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RotationConfig::default();
        assert_eq!(config.max_repair_iterations, 10);
        assert_eq!(config.min_work_before_break, 3);
        assert!(config.seed.is_none());
        assert!((config.priority_since_break_weight - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_keeps_other_defaults() {
        let config = RotationConfig::seeded(7);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.spread_tolerance, 3);
        assert_eq!(config.balance_tolerance, 1);
    }
}
