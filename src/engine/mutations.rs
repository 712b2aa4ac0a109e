use std::time::Instant;

use tokio::time::timeout;
use ulid::Ulid;

use crate::calendar::CalendarOutcome;
use crate::limits::MAX_EXPERIMENTS;
use crate::model::{DateInterval, Event, Experiment, ExperimentDraft, ExperimentStatus};
use crate::oracle::ConflictReport;

use super::validate::{overlapping_others, validate_draft, validate_interval};
use super::{Scheduler, SchedulerError};

/// Outcome of a committed mutation.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub experiment: Experiment,
    /// The oracle's verdict, when one was needed. None means the dates were
    /// free and the oracle was never consulted.
    pub verdict: Option<ConflictReport>,
    /// What happened to the external calendar mirror.
    pub calendar: CalendarOutcome,
}

fn record_calendar(status: &'static str) {
    metrics::counter!(crate::observability::CALENDAR_SYNCS_TOTAL, "status" => status)
        .increment(1);
}

impl Scheduler {
    /// Consult the oracle, bounded by the configured timeout. Failure or
    /// expiry degrades to the conservative fallback verdict — scheduling
    /// never blocks indefinitely and never sees a transport error.
    async fn consult_oracle(
        &self,
        candidate: &Experiment,
        existing: &[Experiment],
    ) -> ConflictReport {
        let started = Instant::now();
        let (report, verdict) =
            match timeout(self.oracle_timeout, self.oracle.evaluate(candidate, existing)).await {
                Ok(Ok(report)) => {
                    let verdict = if report.has_conflict { "conflict" } else { "clear" };
                    (report, verdict)
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "conflict oracle failed, using degraded verdict");
                    (ConflictReport::degraded(&e.to_string()), "degraded")
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = self.oracle_timeout.as_secs(),
                        "conflict oracle timed out, using degraded verdict"
                    );
                    let detail = format!("timed out after {}s", self.oracle_timeout.as_secs());
                    (ConflictReport::degraded(&detail), "degraded")
                }
            };
        metrics::histogram!(crate::observability::ORACLE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(crate::observability::ORACLE_CALLS_TOTAL, "verdict" => verdict)
            .increment(1);
        report
    }

    /// Schedule a new experiment.
    ///
    /// Overlapping experiments are collected first; only if there are any is
    /// the oracle consulted, and only a conflict verdict blocks the commit.
    /// The calendar event is created after the schedule commit — a calendar
    /// failure is reported as a partial success, never rolled back.
    pub async fn plan(&self, draft: ExperimentDraft) -> Result<Scheduled, SchedulerError> {
        validate_draft(&draft, &self.registry)?;

        let mut guard = self.state().write().await;
        if guard.experiments.len() >= MAX_EXPERIMENTS {
            return Err(SchedulerError::LimitExceeded("too many experiments"));
        }

        let mut experiment = Experiment::from_draft(draft);
        let existing = overlapping_others(&guard, &experiment.interval, None);
        let verdict = if existing.is_empty() {
            None
        } else {
            Some(self.consult_oracle(&experiment, &existing).await)
        };
        if let Some(report) = &verdict
            && report.has_conflict
        {
            return Err(SchedulerError::ConflictRejected(report.clone()));
        }

        let event = Event::ExperimentPlanned {
            experiment: experiment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let calendar = match &self.calendar {
            None => CalendarOutcome::Skipped,
            Some(cal) => match cal.create_event(&experiment).await {
                Ok(event_id) => {
                    let link = Event::CalendarLinked {
                        id: experiment.id,
                        event_id: event_id.clone(),
                    };
                    self.persist_and_apply(&mut guard, &link).await?;
                    experiment.calendar_event_id = Some(event_id.clone());
                    record_calendar("synced");
                    CalendarOutcome::Synced { event_id }
                }
                Err(e) => {
                    tracing::warn!(experiment = %experiment.id, error = %e,
                        "experiment planned but calendar event creation failed");
                    record_calendar("failed");
                    CalendarOutcome::Failed {
                        detail: e.to_string(),
                    }
                }
            },
        };

        Ok(Scheduled {
            experiment,
            verdict,
            calendar,
        })
    }

    /// Move an existing experiment to a new interval.
    ///
    /// The check runs against a trial copy; the stored record is untouched
    /// until the verdict allows the move, so a rejection leaves the schedule
    /// exactly as it was. An empty overlap set commits without consulting
    /// the oracle at all.
    pub async fn reschedule(
        &self,
        id: Ulid,
        new_interval: DateInterval,
    ) -> Result<Scheduled, SchedulerError> {
        validate_interval(&new_interval)?;

        let mut guard = self.state().write().await;
        let mut moved = guard.get(id).ok_or(SchedulerError::NotFound(id))?.clone();
        moved.interval = new_interval;

        let existing = overlapping_others(&guard, &new_interval, Some(id));
        let verdict = if existing.is_empty() {
            None
        } else {
            Some(self.consult_oracle(&moved, &existing).await)
        };
        if let Some(report) = &verdict
            && report.has_conflict
        {
            return Err(SchedulerError::ConflictRejected(report.clone()));
        }

        let event = Event::ExperimentRescheduled {
            id,
            interval: new_interval,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let calendar = self.mirror_update(&moved).await;

        Ok(Scheduled {
            experiment: moved,
            verdict,
            calendar,
        })
    }

    /// Replace an experiment's user-supplied fields. Status, results,
    /// creation time, and the calendar link are preserved. If the interval
    /// changed, the move is validated like a reschedule; otherwise the
    /// oracle is not consulted.
    pub async fn update_details(
        &self,
        id: Ulid,
        draft: ExperimentDraft,
    ) -> Result<Scheduled, SchedulerError> {
        validate_draft(&draft, &self.registry)?;

        let mut guard = self.state().write().await;
        let current = guard.get(id).ok_or(SchedulerError::NotFound(id))?.clone();

        let updated = Experiment {
            id: current.id,
            name: draft.name,
            description: draft.description,
            hypothesis: draft.hypothesis,
            surfaces: draft.surfaces,
            screens: draft.screens,
            metrics: draft.metrics,
            interval: draft.interval,
            status: current.status,
            results: current.results.clone(),
            created_at: current.created_at,
            calendar_event_id: current.calendar_event_id.clone(),
        };

        let verdict = if updated.interval == current.interval {
            None
        } else {
            let existing = overlapping_others(&guard, &updated.interval, Some(id));
            if existing.is_empty() {
                None
            } else {
                Some(self.consult_oracle(&updated, &existing).await)
            }
        };
        if let Some(report) = &verdict
            && report.has_conflict
        {
            return Err(SchedulerError::ConflictRejected(report.clone()));
        }

        let event = Event::ExperimentUpdated {
            experiment: updated.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let calendar = if updated.interval != current.interval || updated.name != current.name {
            self.mirror_update(&updated).await
        } else {
            CalendarOutcome::Skipped
        };

        Ok(Scheduled {
            experiment: updated,
            verdict,
            calendar,
        })
    }

    /// Set an experiment's lifecycle status. `results` is recorded when
    /// present (typically on completion). Returns the updated record.
    pub async fn set_status(
        &self,
        id: Ulid,
        status: ExperimentStatus,
        results: Option<String>,
    ) -> Result<Experiment, SchedulerError> {
        let mut guard = self.state().write().await;
        if !guard.contains(id) {
            return Err(SchedulerError::NotFound(id));
        }

        let event = Event::StatusChanged {
            id,
            status,
            results,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.get(id).ok_or(SchedulerError::NotFound(id))?.clone())
    }

    /// Remove an experiment from the schedule, deleting its calendar event
    /// if one was linked.
    pub async fn cancel(&self, id: Ulid) -> Result<Scheduled, SchedulerError> {
        let mut guard = self.state().write().await;
        let removed = guard.get(id).ok_or(SchedulerError::NotFound(id))?.clone();

        let event = Event::ExperimentDeleted { id };
        self.persist_and_apply(&mut guard, &event).await?;

        let calendar = match (&self.calendar, &removed.calendar_event_id) {
            (Some(cal), Some(event_id)) => match cal.delete_event(event_id).await {
                Ok(()) => {
                    record_calendar("synced");
                    CalendarOutcome::Synced {
                        event_id: event_id.clone(),
                    }
                }
                Err(e) => {
                    tracing::warn!(experiment = %id, error = %e,
                        "experiment cancelled but calendar event deletion failed");
                    record_calendar("failed");
                    CalendarOutcome::Failed {
                        detail: e.to_string(),
                    }
                }
            },
            _ => CalendarOutcome::Skipped,
        };

        Ok(Scheduled {
            experiment: removed,
            verdict: None,
            calendar,
        })
    }

    /// Push an experiment's current name/interval to its calendar event.
    /// Skipped when no calendar is wired or the experiment has no event.
    async fn mirror_update(&self, experiment: &Experiment) -> CalendarOutcome {
        match (&self.calendar, &experiment.calendar_event_id) {
            (Some(cal), Some(event_id)) => {
                match cal.update_event(event_id, experiment).await {
                    Ok(()) => {
                        record_calendar("synced");
                        CalendarOutcome::Synced {
                            event_id: event_id.clone(),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(experiment = %experiment.id, error = %e,
                            "schedule committed but calendar update failed");
                        record_calendar("failed");
                        CalendarOutcome::Failed {
                            detail: e.to_string(),
                        }
                    }
                }
            }
            _ => CalendarOutcome::Skipped,
        }
    }
}
