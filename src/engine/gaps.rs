use crate::model::{DateInterval, Experiment, ScheduleState};

// ── Gap-Finding Algorithm ─────────────────────────────────────────

/// Narrows which experiments count as obstacles during a gap search.
/// Both dimensions must match when set; experiments that fail the filter
/// are transparent (non-blocking).
#[derive(Debug, Clone, Default)]
pub struct ObstacleFilter {
    pub surface: Option<String>,
    pub metric: Option<String>,
}

impl ObstacleFilter {
    /// Everything blocks.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, experiment: &Experiment) -> bool {
        self.surface
            .as_ref()
            .is_none_or(|s| experiment.surfaces.contains(s))
            && self
                .metric
                .as_ref()
                .is_none_or(|m| experiment.metrics.contains(m))
    }
}

/// Enumerate conflict-free slots of `duration_days` inclusive days inside
/// `window`, in a single forward sweep. Deterministic; a fresh call re-scans
/// from scratch.
///
/// Every returned interval is fully contained in the window, overlaps no
/// obstacle passing `filter`, and results are strictly increasing by start
/// and mutually non-overlapping. No slot is not an error: the result is
/// simply empty.
///
/// When a candidate collides, the cursor advances past the **latest** end
/// among all overlapping obstacles. Advancing past only the first-found
/// obstacle could emit a slot that still collides with a second one whose
/// end reaches further.
pub fn find_gaps(
    schedule: &ScheduleState,
    duration_days: i64,
    window: &DateInterval,
    filter: &ObstacleFilter,
    max_results: usize,
) -> Vec<DateInterval> {
    debug_assert!(duration_days >= 1, "duration must be at least one day");
    debug_assert!(max_results >= 1, "must request at least one result");

    let mut gaps = Vec::new();
    let mut cursor = window.start;

    while cursor <= window.end {
        let Some(candidate) = DateInterval::from_start_duration(cursor, duration_days) else {
            break; // calendar overflow
        };
        if candidate.end > window.end {
            break; // no room left for a full-length slot
        }

        let blocker_end = schedule
            .overlapping(&candidate)
            .filter(|e| filter.matches(e))
            .map(|e| e.interval.end)
            .max();

        match blocker_end {
            // Occupied: jump past every obstacle this candidate touches.
            Some(end) => match end.succ_opt() {
                Some(next) => cursor = next,
                None => break,
            },
            None => {
                gaps.push(candidate);
                if gaps.len() >= max_results {
                    break;
                }
                match candidate.end.succ_opt() {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
    }

    gaps
}
