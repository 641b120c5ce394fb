//! Eligibility resolution: which stations each worker may be put on.
//!
//! The lookup itself belongs to the surrounding application (permissions
//! live in its database); the engine only sees the `EligibilitySource` seam.

use rustc_hash::FxHashMap;

use crate::error::RotationError;
use crate::grid::Roster;
use crate::models::Worker;
use crate::{log_changes, log_error};

/// External lookup of a worker's allowed stations.
pub trait EligibilitySource {
    fn allowed_stations(&mut self, worker: &Worker) -> Result<Vec<String>, RotationError>;
}

/// Uses the stations already attached to each worker, optionally overridden per worker.
#[derive(Debug, Clone, Default)]
pub struct StaticEligibility {
    overrides: FxHashMap<String, Vec<String>>,
}

impl StaticEligibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, worker_id: &str, stations: &[&str]) -> Self {
        self.overrides.insert(
            worker_id.to_string(),
            stations.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl EligibilitySource for StaticEligibility {
    fn allowed_stations(&mut self, worker: &Worker) -> Result<Vec<String>, RotationError> {
        Ok(self
            .overrides
            .get(&worker.id)
            .cloned()
            .unwrap_or_else(|| worker.eligible_stations.clone()))
    }
}

/// Memoizes another source so each worker is looked up at most once.
pub struct CachedEligibility<S> {
    inner: S,
    cache: FxHashMap<String, Vec<String>>,
    lookups: usize,
}

impl<S: EligibilitySource> CachedEligibility<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: FxHashMap::default(),
            lookups: 0,
        }
    }

    /// Number of lookups forwarded to the inner source.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn invalidate(&mut self, worker_id: &str) {
        self.cache.remove(worker_id);
    }
}

impl<S: EligibilitySource> EligibilitySource for CachedEligibility<S> {
    fn allowed_stations(&mut self, worker: &Worker) -> Result<Vec<String>, RotationError> {
        if let Some(hit) = self.cache.get(&worker.id) {
            return Ok(hit.clone());
        }
        self.lookups += 1;
        let stations = self.inner.allowed_stations(worker)?;
        self.cache.insert(worker.id.clone(), stations.clone());
        Ok(stations)
    }
}

/// Workers annotated with resolved stations, minus those with none.
#[derive(Debug, Clone, Default)]
pub struct EligiblePool {
    pub workers: Vec<Worker>,
    /// Workers dropped because they resolved to no stations.
    pub excluded: Vec<String>,
}

impl EligiblePool {
    /// True when there is nothing to schedule (no workers or no stations).
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty() || self.workers.iter().all(|w| w.eligible_stations.is_empty())
    }

    pub fn into_roster(self) -> Roster {
        Roster::new(self.workers)
    }
}

/// Resolve every worker's stations, preserving input order.
///
/// A lookup failure is treated as "no eligible workers": the pool comes back empty.
pub fn resolve_pool(
    workers: &[Worker],
    source: &mut dyn EligibilitySource,
    verbosity: u8,
) -> EligiblePool {
    let mut pool = EligiblePool::default();

    for worker in workers {
        let stations = match source.allowed_stations(worker) {
            Ok(stations) => stations,
            Err(e) => {
                log_error!("Eligibility lookup failed, scheduling nobody: {}", e);
                return EligiblePool::default();
            }
        };

        let refs: Vec<&str> = stations.iter().map(|s| s.as_str()).collect();
        let resolved = Worker::with_stations(&worker.id, &worker.display_name, &refs);

        if resolved.eligible_stations.is_empty() {
            log_changes!(
                verbosity,
                "Excluding {} ({}): no eligible stations",
                worker.id,
                worker.display_name
            );
            pool.excluded.push(worker.id.clone());
            continue;
        }
        pool.workers.push(resolved);
    }

    pool
}
