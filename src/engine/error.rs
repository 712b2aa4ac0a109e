use ulid::Ulid;

use crate::oracle::ConflictReport;

#[derive(Debug)]
pub enum SchedulerError {
    /// Input failed validation before touching the schedule.
    Validation(String),
    NotFound(Ulid),
    /// The oracle judged the move harmful; the report says why.
    ConflictRejected(ConflictReport),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Validation(msg) => write!(f, "{msg}"),
            SchedulerError::NotFound(id) => write!(f, "not found: {id}"),
            SchedulerError::ConflictRejected(report) => {
                write!(
                    f,
                    "conflict detected: {} Recommendation: {}",
                    report.reason, report.recommendation
                )
            }
            SchedulerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            SchedulerError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}
