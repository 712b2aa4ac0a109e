use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use ulid::Ulid;

use expsched::calendar::{CalendarOutcome, CalendarSync, MemoryCalendar};
use expsched::engine::{default_search_window, ObstacleFilter, Scheduled, Scheduler, SchedulerError};
use expsched::model::{DateInterval, Experiment, ExperimentDraft, ExperimentStatus};
use expsched::notify::ChangeHub;
use expsched::oracle::PatternOracle;
use expsched::registry::{self, Registry};
use expsched::{observability, sweeper};

const HELP: &str = "\
commands:
  catalog                                    product surfaces and metrics
  list                                       all experiments, soonest first
  show <id>                                  full detail for one experiment
  range <start> <end>                        experiments overlapping a date window
  surface <surface>                          experiments touching a surface
  metric <metric>                            experiments measuring a metric
  gaps <days> [<start> <end>] [surface=S] [metric=M] [max=N]
                                             open slots for a <days>-day experiment
  plan <draft json>                          schedule a new experiment
  move <id> <start> <end>                    reschedule an experiment
  update <id> <draft json>                   replace an experiment's details
  status <id> <planned|running|completed> [results]
  drop <id>                                  cancel an experiment
  compact                                    fold the journal to current state
  quit

dates are YYYY-MM-DD; a draft looks like
  {\"name\":\"bigger cta\",\"surfaces\":[\"homepage\"],\"interval\":{\"start\":\"2026-09-01\",\"end\":\"2026-09-14\"}}";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("EXPSCHED_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    observability::init(metrics_port);

    let data_dir = std::env::var("EXPSCHED_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("EXPSCHED_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(expsched::limits::DEFAULT_COMPACT_THRESHOLD);
    let oracle_timeout_secs: u64 = std::env::var("EXPSCHED_ORACLE_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(expsched::limits::DEFAULT_ORACLE_TIMEOUT_SECS);

    let registry = match std::env::var("EXPSCHED_REGISTRY") {
        Ok(path) => Registry::from_json_file(std::path::Path::new(&path))?,
        Err(_) => registry::ecommerce(),
    };

    let calendar: Option<Arc<dyn CalendarSync>> = match std::env::var("EXPSCHED_CALENDAR").as_deref()
    {
        Ok("memory") => Some(Arc::new(MemoryCalendar::new())),
        Ok(other) => {
            tracing::warn!("unknown EXPSCHED_CALENDAR value {other:?}, calendar sync disabled");
            None
        }
        Err(_) => None,
    };

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let journal_path = PathBuf::from(&data_dir).join("experiments.journal");

    let notify = Arc::new(ChangeHub::new());
    let scheduler = Arc::new(
        Scheduler::new(
            journal_path,
            registry,
            Arc::new(PatternOracle),
            calendar.clone(),
            notify,
        )?
        .with_oracle_timeout(std::time::Duration::from_secs(oracle_timeout_secs)),
    );

    tokio::spawn(sweeper::run_sweeper(scheduler.clone()));
    tokio::spawn(sweeper::run_compactor(scheduler.clone(), compact_threshold));

    info!("expsched ready");
    info!("  data_dir: {data_dir}");
    info!("  experiments loaded: {}", scheduler.list().await.len());
    info!("  calendar sync: {}", if calendar.is_some() { "memory" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop the console on SIGTERM/ctrl-c, in-flight
    // journal appends finish before the writer task drops
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("SIGTERM handler registration failed");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    println!("expsched console — `help` lists commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" || line == "exit" {
                    break;
                }

                let op = line.split_whitespace().next().unwrap_or("").to_string();
                let started = Instant::now();
                let outcome = dispatch(&scheduler, line).await;
                let status = if outcome.is_ok() { "ok" } else { "error" };
                metrics::counter!(observability::OPS_TOTAL, "op" => op.clone(), "status" => status)
                    .increment(1);
                metrics::histogram!(observability::OP_DURATION_SECONDS, "op" => op)
                    .record(started.elapsed().as_secs_f64());

                match outcome {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("error: {e}"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("expsched stopped");
    Ok(())
}

async fn dispatch(scheduler: &Scheduler, line: &str) -> Result<String, SchedulerError> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "help" => Ok(HELP.to_string()),
        "catalog" => Ok(format!(
            "{}\n{}",
            scheduler.registry.describe_surfaces(),
            scheduler.registry.describe_metrics()
        )),
        "list" => {
            let experiments = scheduler.list().await;
            if experiments.is_empty() {
                return Ok("no experiments scheduled".into());
            }
            Ok(render_lines(&experiments))
        }
        "show" => {
            let id = parse_id(rest)?;
            match scheduler.get(id).await {
                Some(e) => Ok(detail(&e)),
                None => Err(SchedulerError::NotFound(id)),
            }
        }
        "range" => {
            let mut args = rest.split_whitespace();
            let start = parse_date(args.next().unwrap_or(""))?;
            let end = parse_date(args.next().unwrap_or(""))?;
            let hits = scheduler
                .get_by_date_range(&DateInterval { start, end })
                .await?;
            if hits.is_empty() {
                return Ok(format!("nothing scheduled between {start} and {end}"));
            }
            Ok(render_lines(&hits))
        }
        "surface" => {
            let hits = scheduler.get_by_surface(rest).await;
            if hits.is_empty() {
                return Ok(format!("no experiments on surface {rest:?}"));
            }
            Ok(render_lines(&hits))
        }
        "metric" => {
            let hits = scheduler.get_by_metric(rest).await;
            if hits.is_empty() {
                return Ok(format!("no experiments measuring {rest:?}"));
            }
            Ok(render_lines(&hits))
        }
        "gaps" => {
            let mut duration: Option<i64> = None;
            let mut start: Option<NaiveDate> = None;
            let mut end: Option<NaiveDate> = None;
            let mut filter = ObstacleFilter::all();
            let mut max: Option<usize> = None;
            for tok in rest.split_whitespace() {
                if let Some(v) = tok.strip_prefix("surface=") {
                    filter.surface = Some(v.to_string());
                } else if let Some(v) = tok.strip_prefix("metric=") {
                    filter.metric = Some(v.to_string());
                } else if let Some(v) = tok.strip_prefix("max=") {
                    max = Some(v.parse().map_err(|_| {
                        SchedulerError::Validation(format!("bad max {v:?}"))
                    })?);
                } else if duration.is_none() {
                    duration = Some(tok.parse().map_err(|_| {
                        SchedulerError::Validation(format!("bad duration {tok:?}"))
                    })?);
                } else if start.is_none() {
                    start = Some(parse_date(tok)?);
                } else if end.is_none() {
                    end = Some(parse_date(tok)?);
                } else {
                    return Err(SchedulerError::Validation(format!(
                        "unexpected argument {tok:?}"
                    )));
                }
            }
            let duration = duration.ok_or_else(|| {
                SchedulerError::Validation(
                    "usage: gaps <days> [<start> <end>] [surface=S] [metric=M] [max=N]".into(),
                )
            })?;
            let window = match (start, end) {
                (Some(start), Some(end)) => DateInterval { start, end },
                (None, None) => default_search_window(),
                _ => {
                    return Err(SchedulerError::Validation(
                        "give both start and end, or neither".into(),
                    ))
                }
            };
            let slots = scheduler.find_gaps(duration, &window, &filter, max).await?;
            if slots.is_empty() {
                return Ok(format!(
                    "no {duration}-day slot free between {} and {}",
                    window.start, window.end
                ));
            }
            Ok(slots
                .iter()
                .map(|g| format!("{} .. {}", g.start, g.end))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "plan" => {
            let draft = parse_draft(rest)?;
            let scheduled = scheduler.plan(draft).await?;
            Ok(describe_scheduled(&scheduled, "planned"))
        }
        "move" => {
            let mut args = rest.split_whitespace();
            let id = parse_id(args.next().unwrap_or(""))?;
            let start = parse_date(args.next().unwrap_or(""))?;
            let end = parse_date(args.next().unwrap_or(""))?;
            let scheduled = scheduler.reschedule(id, DateInterval { start, end }).await?;
            Ok(describe_scheduled(&scheduled, "rescheduled"))
        }
        "update" => {
            let (id_str, json) = rest.split_once(char::is_whitespace).ok_or_else(|| {
                SchedulerError::Validation("usage: update <id> <draft json>".into())
            })?;
            let id = parse_id(id_str)?;
            let draft = parse_draft(json.trim())?;
            let scheduled = scheduler.update_details(id, draft).await?;
            Ok(describe_scheduled(&scheduled, "updated"))
        }
        "status" => {
            let mut args = rest.splitn(3, char::is_whitespace);
            let id = parse_id(args.next().unwrap_or(""))?;
            let status = match args.next() {
                Some("planned") => ExperimentStatus::Planned,
                Some("running") => ExperimentStatus::Running,
                Some("completed") => ExperimentStatus::Completed,
                other => {
                    return Err(SchedulerError::Validation(format!(
                        "bad status {:?}, expected planned|running|completed",
                        other.unwrap_or("")
                    )))
                }
            };
            let results = args
                .next()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let experiment = scheduler.set_status(id, status, results).await?;
            Ok(format!("status updated\n{}", summary_line(&experiment)))
        }
        "drop" => {
            let id = parse_id(rest)?;
            let scheduled = scheduler.cancel(id).await?;
            Ok(describe_scheduled(&scheduled, "cancelled"))
        }
        "compact" => {
            scheduler.compact().await?;
            Ok("journal compacted".into())
        }
        _ => Err(SchedulerError::Validation(format!(
            "unknown command {cmd:?}, try `help`"
        ))),
    }
}

fn parse_id(s: &str) -> Result<Ulid, SchedulerError> {
    Ulid::from_string(s)
        .map_err(|_| SchedulerError::Validation(format!("bad experiment id {s:?}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, SchedulerError> {
    s.parse()
        .map_err(|_| SchedulerError::Validation(format!("bad date {s:?}, expected YYYY-MM-DD")))
}

fn parse_draft(json: &str) -> Result<ExperimentDraft, SchedulerError> {
    serde_json::from_str(json)
        .map_err(|e| SchedulerError::Validation(format!("bad draft json: {e}")))
}

fn summary_line(e: &Experiment) -> String {
    format!(
        "{}  {} .. {}  [{}]  {}  ({})",
        e.id,
        e.interval.start,
        e.interval.end,
        e.status,
        e.name,
        e.surfaces.join(",")
    )
}

fn render_lines(experiments: &[Experiment]) -> String {
    experiments
        .iter()
        .map(summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn detail(e: &Experiment) -> String {
    let mut out = format!(
        "{}\n  name: {}\n  dates: {} .. {} ({} days)\n  status: {}\n  surfaces: {}\n  screens: {}\n  metrics: {}",
        e.id,
        e.name,
        e.interval.start,
        e.interval.end,
        e.interval.duration_days(),
        e.status,
        e.surfaces.join(", "),
        e.screens.join(", "),
        e.metrics.join(", "),
    );
    if !e.description.is_empty() {
        out.push_str(&format!("\n  description: {}", e.description));
    }
    if !e.hypothesis.is_empty() {
        out.push_str(&format!("\n  hypothesis: {}", e.hypothesis));
    }
    if let Some(results) = &e.results {
        out.push_str(&format!("\n  results: {results}"));
    }
    if let Some(event_id) = &e.calendar_event_id {
        out.push_str(&format!("\n  calendar event: {event_id}"));
    }
    out
}

fn describe_scheduled(s: &Scheduled, action: &str) -> String {
    let mut out = format!("{action}\n{}", summary_line(&s.experiment));
    if let Some(verdict) = &s.verdict {
        out.push_str(&format!(
            "\n  oracle: {} (confidence {:.2})",
            verdict.reason, verdict.confidence
        ));
        out.push_str(&format!("\n  recommendation: {}", verdict.recommendation));
    }
    match &s.calendar {
        CalendarOutcome::Synced { event_id } => {
            out.push_str(&format!("\n  calendar event {event_id} synced"));
        }
        CalendarOutcome::Failed { detail } => {
            out.push_str(&format!(
                "\n  calendar sync failed: {detail} (schedule change is committed, sync manually)"
            ));
        }
        CalendarOutcome::Skipped => {}
    }
    out
}
