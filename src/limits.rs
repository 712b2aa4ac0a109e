//! Hard limits on inputs and state. Exceeding one is `SchedulerError::LimitExceeded`.

/// Max experiments held in one schedule.
pub const MAX_EXPERIMENTS: usize = 10_000;

/// Max length of an experiment name.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of description / hypothesis / results text.
pub const MAX_TEXT_LEN: usize = 4_096;

/// Max tags per kind (surfaces, screens, metrics).
pub const MAX_TAGS_PER_KIND: usize = 32;

/// Max length of a single tag.
pub const MAX_TAG_LEN: usize = 64;

/// Max run length of a single experiment, in days.
pub const MAX_DURATION_DAYS: i64 = 365;

/// Max width of a gap-search or date-range query window, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3_650;

/// Gap suggestions returned when the caller doesn't ask for a count.
pub const DEFAULT_GAP_RESULTS: usize = 5;

/// Hard cap on gap suggestions per search.
pub const MAX_GAP_RESULTS: usize = 100;

/// Default search horizon when the caller gives no end date, in days.
pub const DEFAULT_SEARCH_HORIZON_DAYS: u64 = 90;

/// Earliest / latest year a date may fall in.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2100;

/// How long a conflict-oracle call may run before the degraded verdict kicks in.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 20;

/// Journal appends between compactions.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;
