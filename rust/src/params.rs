//! Shift-wide targets derived from roster size and station count.

/// Read-only parameters for one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleParameters {
    /// R: slots in the shift
    pub total_slots: usize,
    /// T: distinct stations in play
    pub station_count: usize,
    /// D: eligible workers
    pub worker_count: usize,
    /// Station-slots that can actually be staffed: R × min(T, D)
    pub total_work_slots: usize,
    /// floor(total_work_slots / D)
    pub base_rotations: usize,
    /// First `remainder` workers (input order) get one extra rotation
    pub remainder: usize,
    /// Workers off-station in a fully staffed slot
    pub concurrent_breaks: usize,
    target_rotations: Vec<usize>,
}

impl ScheduleParameters {
    pub fn calculate(total_slots: usize, station_count: usize, worker_count: usize) -> Self {
        let staffed = station_count.min(worker_count);
        let total_work_slots = total_slots * staffed;
        let (base_rotations, remainder) = if worker_count == 0 {
            (0, 0)
        } else {
            (
                total_work_slots / worker_count,
                total_work_slots % worker_count,
            )
        };

        let target_rotations = (0..worker_count)
            .map(|i| {
                let extra = usize::from(i < remainder);
                (base_rotations + extra).min(total_slots)
            })
            .collect();

        Self {
            total_slots,
            station_count,
            worker_count,
            total_work_slots,
            base_rotations,
            remainder,
            concurrent_breaks: worker_count.saturating_sub(station_count),
            target_rotations,
        }
    }

    #[inline]
    pub fn target_rotations(&self, w: usize) -> usize {
        self.target_rotations.get(w).copied().unwrap_or(0)
    }

    #[inline]
    pub fn target_breaks(&self, w: usize) -> usize {
        self.total_slots - self.target_rotations(w)
    }

    /// Average worked run between breaks implied by a worker's targets.
    pub fn average_segment_len(&self, w: usize) -> usize {
        self.target_rotations(w) / (self.target_breaks(w) + 1)
    }
}
