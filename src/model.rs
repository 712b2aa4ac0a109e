use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Closed date interval `[start, end]` at day resolution — `end` is the
/// last active day, so a run of N days starting at `start` has
/// `end = start + (N - 1)` days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "interval start must not be after end");
        Self { start, end }
    }

    /// Build an interval covering `duration_days` inclusive days from `start`.
    /// Returns None when the end date would overflow the calendar.
    pub fn from_start_duration(start: NaiveDate, duration_days: i64) -> Option<Self> {
        debug_assert!(duration_days >= 1, "duration must be at least one day");
        let end = start.checked_add_days(Days::new(duration_days as u64 - 1))?;
        Some(Self { start, end })
    }

    /// Inclusive day count.
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The single overlap predicate: inclusive on both ends, so two
    /// intervals sharing only a boundary day still overlap.
    pub fn overlaps(&self, other: &DateInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_interval(&self, other: &DateInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Planned,
    Running,
    Completed,
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentStatus::Planned => write!(f, "planned"),
            ExperimentStatus::Running => write!(f, "running"),
            ExperimentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A scheduled product experiment occupying a date interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub hypothesis: String,
    /// Product surfaces this experiment touches (at least one).
    pub surfaces: Vec<String>,
    /// Specific screens within those surfaces (may be empty).
    pub screens: Vec<String>,
    /// Metrics it measures (may be empty).
    pub metrics: Vec<String>,
    pub interval: DateInterval,
    pub status: ExperimentStatus,
    pub results: Option<String>,
    pub created_at: DateTime<Utc>,
    /// External calendar event, once the side effect succeeded.
    pub calendar_event_id: Option<String>,
}

/// User-supplied fields for a new experiment. The scheduler assigns the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hypothesis: String,
    pub surfaces: Vec<String>,
    #[serde(default)]
    pub screens: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    pub interval: DateInterval,
}

impl Experiment {
    pub fn from_draft(draft: ExperimentDraft) -> Self {
        Self {
            id: Ulid::new(),
            name: draft.name,
            description: draft.description,
            hypothesis: draft.hypothesis,
            surfaces: draft.surfaces,
            screens: draft.screens,
            metrics: draft.metrics,
            interval: draft.interval,
            status: ExperimentStatus::Planned,
            results: None,
            created_at: Utc::now(),
            calendar_event_id: None,
        }
    }
}

/// The full schedule held in memory.
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    /// All experiments, sorted by `interval.start`.
    pub experiments: Vec<Experiment>,
}

impl ScheduleState {
    pub fn new() -> Self {
        Self {
            experiments: Vec::new(),
        }
    }

    /// Insert keeping sort order by interval.start.
    pub fn insert(&mut self, experiment: Experiment) {
        let pos = self
            .experiments
            .binary_search_by_key(&experiment.interval.start, |e| e.interval.start)
            .unwrap_or_else(|e| e);
        self.experiments.insert(pos, experiment);
    }

    /// Remove by id.
    pub fn remove(&mut self, id: Ulid) -> Option<Experiment> {
        if let Some(pos) = self.experiments.iter().position(|e| e.id == id) {
            Some(self.experiments.remove(pos))
        } else {
            None
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.get(id).is_some()
    }

    /// Update status in place (sort order is unaffected). `results` only
    /// overwrites when present, so an automatic status flip never erases a
    /// recorded outcome. Returns false if the id is unknown.
    pub fn set_status(
        &mut self,
        id: Ulid,
        status: ExperimentStatus,
        results: Option<String>,
    ) -> bool {
        match self.experiments.iter_mut().find(|e| e.id == id) {
            Some(e) => {
                e.status = status;
                if results.is_some() {
                    e.results = results;
                }
                true
            }
            None => false,
        }
    }

    /// Attach a calendar event id. Returns false if the id is unknown.
    pub fn set_calendar_event(&mut self, id: Ulid, event_id: String) -> bool {
        match self.experiments.iter_mut().find(|e| e.id == id) {
            Some(e) => {
                e.calendar_event_id = Some(event_id);
                true
            }
            None => false,
        }
    }

    /// Experiments whose interval overlaps the query, per the single closed
    /// overlap predicate. Binary search skips everything starting after
    /// `query.end`.
    pub fn overlapping(&self, query: &DateInterval) -> impl Iterator<Item = &Experiment> {
        // Everything at index >= right_bound starts after query.end → can't overlap.
        let right_bound = self
            .experiments
            .partition_point(|e| e.interval.start <= query.end);
        self.experiments[..right_bound]
            .iter()
            .filter(move |e| e.interval.end >= query.start)
    }
}

/// The event types — the journal record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ExperimentPlanned {
        experiment: Experiment,
    },
    ExperimentRescheduled {
        id: Ulid,
        interval: DateInterval,
    },
    ExperimentUpdated {
        experiment: Experiment,
    },
    StatusChanged {
        id: Ulid,
        status: ExperimentStatus,
        /// Outcome summary, recorded when an experiment completes.
        results: Option<String>,
    },
    CalendarLinked {
        id: Ulid,
        event_id: String,
    },
    ExperimentDeleted {
        id: Ulid,
    },
}

impl Event {
    /// The experiment the event concerns.
    pub fn experiment_id(&self) -> Ulid {
        match self {
            Event::ExperimentPlanned { experiment } | Event::ExperimentUpdated { experiment } => {
                experiment.id
            }
            Event::ExperimentRescheduled { id, .. }
            | Event::StatusChanged { id, .. }
            | Event::CalendarLinked { id, .. }
            | Event::ExperimentDeleted { id } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn exp(start: NaiveDate, end: NaiveDate) -> Experiment {
        Experiment::from_draft(ExperimentDraft {
            name: "t".into(),
            description: String::new(),
            hypothesis: String::new(),
            surfaces: vec!["homepage".into()],
            screens: vec![],
            metrics: vec![],
            interval: DateInterval::new(start, end),
        })
    }

    #[test]
    fn interval_basics() {
        let i = DateInterval::new(d(2026, 2, 1), d(2026, 2, 5));
        assert_eq!(i.duration_days(), 5);
        assert!(i.contains_day(d(2026, 2, 1)));
        assert!(i.contains_day(d(2026, 2, 5))); // closed on both ends
        assert!(!i.contains_day(d(2026, 2, 6)));
    }

    #[test]
    fn interval_from_duration_end_is_last_active_day() {
        // 4 inclusive days from 02-01 end on 02-04, not 02-05
        let i = DateInterval::from_start_duration(d(2026, 2, 1), 4).unwrap();
        assert_eq!(i.end, d(2026, 2, 4));
        assert_eq!(i.duration_days(), 4);
    }

    #[test]
    fn interval_single_day() {
        let i = DateInterval::from_start_duration(d(2026, 2, 1), 1).unwrap();
        assert_eq!(i.start, i.end);
        assert_eq!(i.duration_days(), 1);
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = DateInterval::new(d(2026, 2, 1), d(2026, 2, 5));
        let b = DateInterval::new(d(2026, 2, 4), d(2026, 2, 10));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn overlap_self() {
        let a = DateInterval::new(d(2026, 2, 1), d(2026, 2, 5));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn overlap_shared_boundary_day_counts() {
        // b starts on the day a ends — closed semantics, still an overlap
        let a = DateInterval::new(d(2026, 2, 1), d(2026, 2, 5));
        let b = DateInterval::new(d(2026, 2, 5), d(2026, 2, 8));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn overlap_adjacent_days_do_not() {
        let a = DateInterval::new(d(2026, 2, 1), d(2026, 2, 5));
        let b = DateInterval::new(d(2026, 2, 6), d(2026, 2, 8));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn contains_interval() {
        let outer = DateInterval::new(d(2026, 1, 1), d(2026, 12, 31));
        let inner = DateInterval::new(d(2026, 6, 1), d(2026, 6, 30));
        let partial = DateInterval::new(d(2025, 12, 1), d(2026, 1, 15));
        assert!(outer.contains_interval(&inner));
        assert!(outer.contains_interval(&outer)); // self-containment
        assert!(!outer.contains_interval(&partial));
    }

    #[test]
    fn schedule_insert_keeps_start_order() {
        let mut s = ScheduleState::new();
        s.insert(exp(d(2026, 3, 1), d(2026, 3, 5)));
        s.insert(exp(d(2026, 1, 1), d(2026, 1, 5)));
        s.insert(exp(d(2026, 2, 1), d(2026, 2, 5)));
        assert_eq!(s.experiments[0].interval.start, d(2026, 1, 1));
        assert_eq!(s.experiments[1].interval.start, d(2026, 2, 1));
        assert_eq!(s.experiments[2].interval.start, d(2026, 3, 1));
    }

    #[test]
    fn schedule_remove() {
        let mut s = ScheduleState::new();
        let e = exp(d(2026, 2, 1), d(2026, 2, 5));
        let id = e.id;
        s.insert(e);
        assert!(s.contains(id));
        let removed = s.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(s.experiments.is_empty());
    }

    #[test]
    fn schedule_remove_nonexistent_returns_none() {
        let mut s = ScheduleState::new();
        s.insert(exp(d(2026, 2, 1), d(2026, 2, 5)));
        assert!(s.remove(Ulid::new()).is_none());
        assert_eq!(s.experiments.len(), 1); // original still there
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut s = ScheduleState::new();
        s.insert(exp(d(2026, 1, 1), d(2026, 1, 10))); // past
        s.insert(exp(d(2026, 2, 3), d(2026, 2, 12))); // overlaps
        s.insert(exp(d(2026, 4, 1), d(2026, 4, 10))); // future

        let query = DateInterval::new(d(2026, 2, 10), d(2026, 2, 20));
        let hits: Vec<_> = s.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].interval.start, d(2026, 2, 3));
    }

    #[test]
    fn overlapping_boundary_day_included() {
        // Experiment ending exactly on query.start is an overlap (closed ends)
        let mut s = ScheduleState::new();
        s.insert(exp(d(2026, 2, 1), d(2026, 2, 10)));
        let query = DateInterval::new(d(2026, 2, 10), d(2026, 2, 20));
        let hits: Vec<_> = s.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_day_after_excluded() {
        let mut s = ScheduleState::new();
        s.insert(exp(d(2026, 2, 1), d(2026, 2, 9)));
        let query = DateInterval::new(d(2026, 2, 10), d(2026, 2, 20));
        assert!(s.overlapping(&query).next().is_none());
    }

    #[test]
    fn overlapping_spanning_experiment_found() {
        // One long experiment enclosing the whole query window
        let mut s = ScheduleState::new();
        s.insert(exp(d(2026, 1, 1), d(2026, 12, 31)));
        let query = DateInterval::new(d(2026, 6, 1), d(2026, 6, 5));
        let hits: Vec<_> = s.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_empty_schedule() {
        let s = ScheduleState::new();
        let query = DateInterval::new(d(2026, 2, 1), d(2026, 2, 28));
        assert!(s.overlapping(&query).next().is_none());
    }

    #[test]
    fn status_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&ExperimentStatus::Planned).unwrap(),
            "\"planned\""
        );
        let s: ExperimentStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(s, ExperimentStatus::Completed);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ExperimentPlanned {
            experiment: exp(d(2026, 2, 1), d(2026, 2, 5)),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn event_experiment_id() {
        let e = exp(d(2026, 2, 1), d(2026, 2, 5));
        let id = e.id;
        assert_eq!(
            Event::ExperimentPlanned { experiment: e }.experiment_id(),
            id
        );
        assert_eq!(Event::ExperimentDeleted { id }.experiment_id(), id);
    }
}
