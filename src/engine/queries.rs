use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits;
use crate::model::{DateInterval, Experiment, ExperimentStatus};

use super::gaps::{self, ObstacleFilter};
use super::validate::{today, validate_search_window};
use super::{Scheduler, SchedulerError};

/// The window gap searches default to: today through the next 90 days.
pub fn default_search_window() -> DateInterval {
    let start = today();
    let end = start
        .checked_add_days(chrono::Days::new(limits::DEFAULT_SEARCH_HORIZON_DAYS))
        .unwrap_or(start);
    DateInterval::new(start, end)
}

impl Scheduler {
    pub async fn get(&self, id: Ulid) -> Option<Experiment> {
        self.state().read().await.get(id).cloned()
    }

    /// All experiments, ordered by start date.
    pub async fn list(&self) -> Vec<Experiment> {
        self.state().read().await.experiments.clone()
    }

    /// Experiments whose interval overlaps the window, per the closed
    /// overlap predicate. Ordered by start date.
    pub async fn get_by_date_range(
        &self,
        window: &DateInterval,
    ) -> Result<Vec<Experiment>, SchedulerError> {
        validate_search_window(window)?;
        Ok(self
            .state()
            .read()
            .await
            .overlapping(window)
            .cloned()
            .collect())
    }

    pub async fn get_by_surface(&self, surface: &str) -> Vec<Experiment> {
        self.state()
            .read()
            .await
            .experiments
            .iter()
            .filter(|e| e.surfaces.iter().any(|s| s == surface))
            .cloned()
            .collect()
    }

    pub async fn get_by_metric(&self, metric: &str) -> Vec<Experiment> {
        self.state()
            .read()
            .await
            .experiments
            .iter()
            .filter(|e| e.metrics.iter().any(|m| m == metric))
            .cloned()
            .collect()
    }

    /// Find conflict-free slots of `duration_days` inside `window`.
    /// `max_results` defaults to a handful of suggestions; empty output
    /// means no slot fits.
    pub async fn find_gaps(
        &self,
        duration_days: i64,
        window: &DateInterval,
        filter: &ObstacleFilter,
        max_results: Option<usize>,
    ) -> Result<Vec<DateInterval>, SchedulerError> {
        if duration_days < 1 {
            return Err(SchedulerError::Validation(
                "duration must be at least one day".into(),
            ));
        }
        if duration_days > limits::MAX_DURATION_DAYS {
            return Err(SchedulerError::LimitExceeded("experiment runs too long"));
        }
        validate_search_window(window)?;
        let max_results = match max_results {
            None => limits::DEFAULT_GAP_RESULTS,
            Some(0) => {
                return Err(SchedulerError::Validation(
                    "must request at least one result".into(),
                ))
            }
            Some(n) if n > limits::MAX_GAP_RESULTS => {
                return Err(SchedulerError::LimitExceeded("too many gap results requested"))
            }
            Some(n) => n,
        };

        metrics::counter!(crate::observability::GAP_SEARCHES_TOTAL).increment(1);
        let state = self.state().read().await;
        Ok(gaps::find_gaps(
            &state,
            duration_days,
            window,
            filter,
            max_results,
        ))
    }

    /// Status flips due as of `today`: planned experiments whose interval
    /// has begun become running; anything whose interval has passed becomes
    /// completed. Read-only; the sweeper commits the changes.
    pub async fn collect_status_transitions(
        &self,
        today: NaiveDate,
    ) -> Vec<(Ulid, ExperimentStatus)> {
        let state = self.state().read().await;
        let mut due = Vec::new();
        for e in &state.experiments {
            let target = match e.status {
                ExperimentStatus::Planned | ExperimentStatus::Running
                    if e.interval.end < today =>
                {
                    ExperimentStatus::Completed
                }
                ExperimentStatus::Planned if e.interval.contains_day(today) => {
                    ExperimentStatus::Running
                }
                _ => continue,
            };
            due.push((e.id, target));
        }
        due
    }
}
