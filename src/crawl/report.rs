// src/crawl/report.rs
// =============================================================================
// What a crawl writes to stdout, and where it writes it.
//
// Three kinds of line come out of a crawl:
//
//   ==<rank>,<url>==                                  a round starts
//   <id>,<parent_id>,<depth>,<type>,<bytes>,<secs>,<url>   a task finished
//   #<rank>,<secs>,<tasks>,<bytes>                    a round finished
//
// The task line is what `pagecrawl replay` reads back in; the URL sits last
// because it is the only column that may contain a comma.
//
// With --json every line is one JSON object tagged by "event" instead.
//
// Sinks are shared by every worker. Each line is written in one call under
// the stdout lock, so lines from different workers never interleave.
// =============================================================================

use serde::Serialize;
use std::fmt;
use std::io::Write;
use tracing::warn;

use super::task::CrawlTask;
use crate::fetch::Fetched;

/// One finished task; becomes one progress line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub parent_id: String,
    pub depth: u32,
    pub content_type: String,
    pub bytes: usize,
    /// Seconds spent fetching
    pub elapsed: f64,
    pub url: String,
}

impl TaskReport {
    pub fn new(task: &CrawlTask, fetched: &Fetched) -> Self {
        Self {
            id: task.id.clone(),
            parent_id: task.parent_id.clone(),
            depth: task.depth,
            content_type: fetched.content_type.clone(),
            bytes: fetched.body.len(),
            elapsed: fetched.elapsed.as_secs_f64(),
            url: task.url.clone(),
        }
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{:.2},{}",
            self.id, self.parent_id, self.depth, self.content_type, self.bytes, self.elapsed, self.url
        )
    }
}

/// The totals of one finished round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSummary {
    pub rank: String,
    pub url: String,
    /// Seconds from seeding to drain
    pub elapsed: f64,
    pub tasks: usize,
    pub bytes: u64,
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{},{:.2},{},{}", self.rank, self.elapsed, self.tasks, self.bytes)
    }
}

// Receives crawl output as it happens
pub trait ReportSink: Send + Sync {
    fn round_started(&self, rank: &str, url: &str);
    fn task_finished(&self, report: &TaskReport);
    fn round_finished(&self, summary: &RoundSummary);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonLine<'a> {
    RoundStart { rank: &'a str, url: &'a str },
    Task(&'a TaskReport),
    RoundEnd(&'a RoundSummary),
}

/// Writes report lines to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink {
    format: ReportFormat,
}

impl StdoutSink {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    fn emit(&self, csv: impl FnOnce() -> String, json: JsonLine<'_>) {
        let line = match self.format {
            ReportFormat::Csv => csv(),
            ReportFormat::Json => match serde_json::to_string(&json) {
                Ok(line) => line,
                Err(e) => {
                    warn!("could not encode report line: {e}");
                    return;
                }
            },
        };

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            warn!("could not write report line: {e}");
        }
    }
}

impl ReportSink for StdoutSink {
    fn round_started(&self, rank: &str, url: &str) {
        self.emit(
            || format!("=={rank},{url}=="),
            JsonLine::RoundStart { rank, url },
        );
    }

    fn task_finished(&self, report: &TaskReport) {
        self.emit(|| report.to_string(), JsonLine::Task(report));
    }

    fn round_finished(&self, summary: &RoundSummary) {
        self.emit(|| summary.to_string(), JsonLine::RoundEnd(summary));
    }
}

// Keeps every event in order, for tests to inspect
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    events: std::sync::Mutex<Vec<ReportEvent>>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReportEvent {
    RoundStarted { rank: String, url: String },
    Task(TaskReport),
    RoundFinished(RoundSummary),
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn tasks(&self) -> Vec<TaskReport> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Task(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ReportSink for MemorySink {
    fn round_started(&self, rank: &str, url: &str) {
        self.events.lock().unwrap().push(ReportEvent::RoundStarted {
            rank: rank.to_string(),
            url: url.to_string(),
        });
    }

    fn task_finished(&self, report: &TaskReport) {
        self.events.lock().unwrap().push(ReportEvent::Task(report.clone()));
    }

    fn round_finished(&self, summary: &RoundSummary) {
        self.events.lock().unwrap().push(ReportEvent::RoundFinished(summary.clone()));
    }
}
