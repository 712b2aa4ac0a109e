use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::limits;
use crate::model::{DateInterval, Experiment, ExperimentDraft, ScheduleState};
use crate::registry::Registry;

use super::SchedulerError;

pub(crate) fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

pub(crate) fn validate_interval(interval: &DateInterval) -> Result<(), SchedulerError> {
    if interval.start > interval.end {
        return Err(SchedulerError::Validation(format!(
            "start date {} is after end date {}",
            interval.start, interval.end
        )));
    }
    if interval.start.year() < limits::MIN_VALID_YEAR
        || interval.end.year() > limits::MAX_VALID_YEAR
    {
        return Err(SchedulerError::LimitExceeded("date out of valid range"));
    }
    if interval.duration_days() > limits::MAX_DURATION_DAYS {
        return Err(SchedulerError::LimitExceeded("experiment runs too long"));
    }
    Ok(())
}

pub(crate) fn validate_search_window(window: &DateInterval) -> Result<(), SchedulerError> {
    if window.start > window.end {
        return Err(SchedulerError::Validation(format!(
            "search start {} is after search end {}",
            window.start, window.end
        )));
    }
    if window.start.year() < limits::MIN_VALID_YEAR
        || window.end.year() > limits::MAX_VALID_YEAR
    {
        return Err(SchedulerError::LimitExceeded("date out of valid range"));
    }
    if window.duration_days() > limits::MAX_QUERY_WINDOW_DAYS {
        return Err(SchedulerError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Validate the user-supplied fields of a draft against limits and the
/// registry. Tag errors mirror the registry's id lists so the caller can
/// see what would have been accepted.
pub(crate) fn validate_draft(
    draft: &ExperimentDraft,
    registry: &Registry,
) -> Result<(), SchedulerError> {
    if draft.name.trim().is_empty() {
        return Err(SchedulerError::Validation(
            "experiment name must not be empty".into(),
        ));
    }
    if draft.name.len() > limits::MAX_NAME_LEN {
        return Err(SchedulerError::LimitExceeded("name too long"));
    }
    if draft.description.len() > limits::MAX_TEXT_LEN
        || draft.hypothesis.len() > limits::MAX_TEXT_LEN
    {
        return Err(SchedulerError::LimitExceeded("text field too long"));
    }

    if draft.surfaces.is_empty() {
        return Err(SchedulerError::Validation(
            "at least one surface is required".into(),
        ));
    }
    for tags in [&draft.surfaces, &draft.screens, &draft.metrics] {
        if tags.len() > limits::MAX_TAGS_PER_KIND {
            return Err(SchedulerError::LimitExceeded("too many tags"));
        }
        if tags.iter().any(|t| t.len() > limits::MAX_TAG_LEN) {
            return Err(SchedulerError::LimitExceeded("tag too long"));
        }
    }

    for surface in &draft.surfaces {
        if registry.surface(surface).is_none() {
            return Err(SchedulerError::Validation(format!(
                "Unknown surface: {surface}. Available: {}",
                registry.available_surfaces()
            )));
        }
    }
    for screen in &draft.screens {
        if registry.screen(screen).is_none() {
            return Err(SchedulerError::Validation(format!("Unknown screen: {screen}")));
        }
    }
    for metric in &draft.metrics {
        if registry.metric(metric).is_none() {
            return Err(SchedulerError::Validation(format!(
                "Unknown metric: {metric}. Available: {}",
                registry.available_metrics()
            )));
        }
    }

    validate_interval(&draft.interval)
}

/// Experiments overlapping `interval`, excluding `exclude` (the experiment
/// being moved, when rescheduling). Cloned so the list can outlive lock
/// juggling and be handed to the oracle.
pub(crate) fn overlapping_others(
    state: &ScheduleState,
    interval: &DateInterval,
    exclude: Option<Ulid>,
) -> Vec<Experiment> {
    state
        .overlapping(interval)
        .filter(|e| Some(e.id) != exclude)
        .cloned()
        .collect()
}
