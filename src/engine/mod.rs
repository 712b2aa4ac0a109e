mod error;
mod gaps;
mod mutations;
mod queries;
mod validate;

pub use error::SchedulerError;
pub use gaps::{find_gaps, ObstacleFilter};
pub use mutations::Scheduled;
pub use queries::default_search_window;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::calendar::CalendarSync;
use crate::journal::Journal;
use crate::limits;
use crate::model::{Event, ScheduleState};
use crate::notify::ChangeHub;
use crate::oracle::ConflictOracle;
use crate::registry::Registry;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task owning the journal. Appends are group-committed: the
/// first one blocks, everything already queued behind it joins the batch,
/// and one fsync covers them all before any waiter hears back.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = Vec::new();
        match cmd {
            JournalCommand::Append { event, response } => batch.push((event, response)),
            other => {
                handle_non_append(&mut journal, other);
                continue;
            }
        }

        // Fold in every append already queued behind the first. A non-append
        // command stops the gathering and waits until the batch is durable.
        let mut deferred = None;
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                JournalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        flush_and_respond(&mut journal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut journal, cmd);
        }
    }
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

fn flush_and_respond(journal: &mut Journal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(journal: &mut Journal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut failed = None;
    for (event, _) in batch {
        if let Err(e) = journal.append_buffered(event) {
            failed = Some(e);
            break;
        }
    }
    // Flush even after an append error, so the next batch never inherits
    // stale buffered bytes from this one.
    let flushed = journal.flush_sync();
    match failed {
        Some(e) => Err(e),
        None => flushed,
    }
}

fn respond_batch(batch: &mut Vec<PendingAppend>, outcome: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        // io::Error is not Clone; rebuild it per waiter.
        let _ = tx.send(
            outcome
                .as_ref()
                .map(|_| ())
                .map_err(|e| io::Error::new(e.kind(), e.to_string())),
        );
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// Apply a committed event to the in-memory schedule (no locking — caller
/// holds the lock).
fn apply_to_state(state: &mut ScheduleState, event: &Event) {
    match event {
        Event::ExperimentPlanned { experiment } => {
            state.insert(experiment.clone());
        }
        Event::ExperimentRescheduled { id, interval } => {
            // Re-insert: the new start may change the sort position.
            if let Some(mut experiment) = state.remove(*id) {
                experiment.interval = *interval;
                state.insert(experiment);
            }
        }
        Event::ExperimentUpdated { experiment } => {
            state.remove(experiment.id);
            state.insert(experiment.clone());
        }
        Event::StatusChanged {
            id,
            status,
            results,
        } => {
            state.set_status(*id, *status, results.clone());
        }
        Event::CalendarLinked { id, event_id } => {
            state.set_calendar_event(*id, event_id.clone());
        }
        Event::ExperimentDeleted { id } => {
            state.remove(*id);
        }
    }
}

/// The experiment scheduler: one schedule behind one lock, with every
/// committed mutation journaled before it is applied.
///
/// Mutations take the write lock for their whole read-decide-commit
/// sequence, so two concurrent reschedules can never interleave their
/// overlap checks with each other's commits.
pub struct Scheduler {
    state: Arc<RwLock<ScheduleState>>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<ChangeHub>,
    pub registry: Registry,
    pub(super) oracle: Arc<dyn ConflictOracle>,
    pub(super) calendar: Option<Arc<dyn CalendarSync>>,
    pub(super) oracle_timeout: Duration,
}

impl Scheduler {
    /// Replay the journal at `journal_path` and start the group-commit
    /// writer task.
    pub fn new(
        journal_path: PathBuf,
        registry: Registry,
        oracle: Arc<dyn ConflictOracle>,
        calendar: Option<Arc<dyn CalendarSync>>,
        notify: Arc<ChangeHub>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let mut state = ScheduleState::new();
        for event in &events {
            apply_to_state(&mut state, event);
        }
        metrics::gauge!(crate::observability::EXPERIMENTS_ACTIVE)
            .set(state.experiments.len() as f64);

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            journal_tx,
            notify,
            registry,
            oracle,
            calendar,
            oracle_timeout: Duration::from_secs(limits::DEFAULT_ORACLE_TIMEOUT_SECS),
        })
    }

    /// Cap on how long a single oracle consultation may run before the
    /// scheduler degrades to the conservative fallback verdict.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub(super) fn state(&self) -> &Arc<RwLock<ScheduleState>> {
        &self.state
    }

    /// Write event to the journal via the background group-commit writer.
    async fn journal_append(&self, event: &Event) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| SchedulerError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| SchedulerError::JournalError(e.to_string()))
    }

    /// Journal-append + apply + notify in one call. Nothing becomes visible
    /// in the schedule unless it is durable first.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut ScheduleState,
        event: &Event,
    ) -> Result<(), SchedulerError> {
        self.journal_append(event).await?;
        apply_to_state(state, event);
        metrics::gauge!(crate::observability::EXPERIMENTS_ACTIVE)
            .set(state.experiments.len() as f64);
        self.notify.send(event);
        Ok(())
    }

    /// Rewrite the journal as one `ExperimentPlanned` per live experiment.
    /// Holds the write lock across the snapshot and the swap so no append
    /// can slip between them and be lost.
    pub async fn compact(&self) -> Result<(), SchedulerError> {
        let state = self.state.write().await;
        let events: Vec<Event> = state
            .experiments
            .iter()
            .map(|e| Event::ExperimentPlanned {
                experiment: e.clone(),
            })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| SchedulerError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| SchedulerError::JournalError(e.to_string()))
    }

    /// Appends since the last compaction, from the journal writer.
    pub async fn appends_since_compact(&self) -> Result<u64, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| SchedulerError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::JournalError("journal writer dropped response".into()))
    }
}
