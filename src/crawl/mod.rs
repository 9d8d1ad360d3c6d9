// src/crawl/mod.rs
// =============================================================================
// This module handles breadth-first page crawling.
//
// Features:
// - One round per seed: fetch the page, then everything it pulls in via
//   img/script/link/embed, then everything those pull in, and so on
// - A fixed pool of workers shared by every round
// - Each URL fetched at most once per round
// - A progress line per fetched resource and a summary line per round
//
// Submodules, leaves first:
// - task:   the unit of work and its id scheme
// - queue:  FIFO with a join barrier
// - round:  per-seed seen-set + queue
// - report: output lines and where they go
// - pool:   the workers
// - driver: seed lines in, rounds out
// =============================================================================

mod driver;
mod pool;
mod queue;
mod report;
mod round;
mod task;

#[cfg(test)]
mod testing;

pub use driver::run;
pub use pool::WorkerPool;
pub use queue::WorkQueue;
pub use report::{ReportFormat, ReportSink, StdoutSink};
