//! Calendar mirroring port. The schedule itself is authoritative; calendar
//! events are a best-effort mirror created after a mutation commits. A failed
//! calendar call is reported to the caller as a partial success, never rolled
//! back into the schedule.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{DateInterval, Experiment};

#[derive(Debug)]
pub enum CalendarError {
    /// The calendar backend could not be reached or refused the call.
    Backend(String),
    /// No event with that id exists on the backend.
    UnknownEvent(String),
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::Backend(detail) => write!(f, "calendar backend error: {detail}"),
            CalendarError::UnknownEvent(id) => write!(f, "no calendar event with id {id}"),
        }
    }
}

impl std::error::Error for CalendarError {}

/// External calendar the schedule is mirrored into.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Create an all-day event spanning the experiment's interval.
    /// Returns the backend's event id.
    async fn create_event(&self, experiment: &Experiment) -> Result<String, CalendarError>;

    /// Move/retitle an existing event to match the experiment.
    async fn update_event(
        &self,
        event_id: &str,
        experiment: &Experiment,
    ) -> Result<(), CalendarError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}

/// What happened to the calendar mirror during a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarOutcome {
    /// No calendar wired in, or the experiment has no event to update.
    Skipped,
    Synced {
        event_id: String,
    },
    /// The schedule change committed but the mirror call failed.
    Failed {
        detail: String,
    },
}

/// In-process calendar backed by a map. Stands in for a real backend in
/// tests and offline runs.
#[derive(Default)]
pub struct MemoryCalendar {
    events: DashMap<String, (String, DateInterval)>,
    seq: AtomicU64,
}

impl MemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&self, event_id: &str) -> Option<(String, DateInterval)> {
        self.events.get(event_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl CalendarSync for MemoryCalendar {
    async fn create_event(&self, experiment: &Experiment) -> Result<String, CalendarError> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let event_id = format!("evt-{n}");
        self.events
            .insert(event_id.clone(), (experiment.name.clone(), experiment.interval));
        Ok(event_id)
    }

    async fn update_event(
        &self,
        event_id: &str,
        experiment: &Experiment,
    ) -> Result<(), CalendarError> {
        match self.events.get_mut(event_id) {
            Some(mut entry) => {
                *entry = (experiment.name.clone(), experiment.interval);
                Ok(())
            }
            None => Err(CalendarError::UnknownEvent(event_id.to_string())),
        }
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        match self.events.remove(event_id) {
            Some(_) => Ok(()),
            None => Err(CalendarError::UnknownEvent(event_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExperimentDraft;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn exp(name: &str, start: NaiveDate, end: NaiveDate) -> Experiment {
        Experiment::from_draft(ExperimentDraft {
            name: name.into(),
            description: String::new(),
            hypothesis: String::new(),
            surfaces: vec!["homepage".into()],
            screens: vec![],
            metrics: vec![],
            interval: DateInterval::new(start, end),
        })
    }

    #[tokio::test]
    async fn create_then_lookup() {
        let cal = MemoryCalendar::new();
        let e = exp("hero_copy", d(2026, 2, 1), d(2026, 2, 14));

        let id = cal.create_event(&e).await.unwrap();
        let (summary, interval) = cal.event(&id).unwrap();
        assert_eq!(summary, "hero_copy");
        assert_eq!(interval, e.interval);
        assert_eq!(cal.len(), 1);
    }

    #[tokio::test]
    async fn event_ids_are_distinct() {
        let cal = MemoryCalendar::new();
        let e = exp("a", d(2026, 2, 1), d(2026, 2, 2));
        let id1 = cal.create_event(&e).await.unwrap();
        let id2 = cal.create_event(&e).await.unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn update_moves_event() {
        let cal = MemoryCalendar::new();
        let mut e = exp("nav_test", d(2026, 2, 1), d(2026, 2, 7));
        let id = cal.create_event(&e).await.unwrap();

        e.interval = DateInterval::new(d(2026, 3, 1), d(2026, 3, 7));
        cal.update_event(&id, &e).await.unwrap();

        let (_, interval) = cal.event(&id).unwrap();
        assert_eq!(interval.start, d(2026, 3, 1));
    }

    #[tokio::test]
    async fn update_unknown_event_errors() {
        let cal = MemoryCalendar::new();
        let e = exp("x", d(2026, 2, 1), d(2026, 2, 2));
        let err = cal.update_event("evt-404", &e).await.unwrap_err();
        assert!(matches!(err, CalendarError::UnknownEvent(_)));
    }

    #[tokio::test]
    async fn delete_removes_event() {
        let cal = MemoryCalendar::new();
        let e = exp("x", d(2026, 2, 1), d(2026, 2, 2));
        let id = cal.create_event(&e).await.unwrap();

        cal.delete_event(&id).await.unwrap();
        assert!(cal.is_empty());
        assert!(cal.delete_event(&id).await.is_err());
    }
}
