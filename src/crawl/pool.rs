// src/crawl/pool.rs
// =============================================================================
// A fixed set of workers that drain one round at a time.
//
// The workers are spawned once and reused for every round. The driver
// publishes the current round on a watch channel; each worker picks it up,
// pops tasks until the round is closed, then waits for the next one.
//
// One worker cycle:
//
//   pop -> fetch -> (html? extract : skip) -> offer children -> report
//
// The task is marked done by a guard, so a failed fetch, an early return or
// a panic all still release it and the round's join cannot hang on it.
// Panics are caught at the cycle boundary; the worker logs and keeps going.
//
// Workers are never awaited on exit. When the pool is dropped the watch
// sender goes with it and idle workers return on their own; busy ones die
// with the runtime.
// =============================================================================

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::report::{ReportSink, RoundSummary, TaskReport};
use super::round::Round;
use super::task::CrawlTask;
use crate::fetch::{self, Fetcher};

pub struct WorkerPool {
    rounds: watch::Sender<Option<Arc<Round>>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    // Spawns `size` workers on the current tokio runtime (at least one)
    pub fn start<F: Fetcher>(size: usize, fetcher: Arc<F>, sink: Arc<dyn ReportSink>) -> Self {
        let (rounds, receiver) = watch::channel(None);

        let workers = (0..size.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    fetcher: fetcher.clone(),
                    sink: sink.clone(),
                    rounds: receiver.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self { rounds, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    // Hands `round` to the workers and waits for it to drain
    //
    // Every progress line of the round has been written by the time this
    // returns, since workers report before they mark a task done.
    pub async fn run_round(&self, round: Arc<Round>) -> RoundSummary {
        self.rounds.send_replace(Some(round.clone()));
        debug!(
            rank = round.rank(),
            workers = self.size(),
            outstanding = round.queue().outstanding(),
            "round published"
        );
        round.queue().join().await;
        round.queue().close();
        round.summary()
    }

    // Lets idle workers exit and waits for them. Only call this between
    // rounds; a worker stuck in a fetch holds shutdown up.
    pub async fn shutdown(self) {
        let WorkerPool { rounds, workers } = self;
        if let Some(round) = rounds.send_replace(None) {
            round.queue().close();
        }
        drop(rounds);

        for worker in workers {
            if let Err(e) = worker.await {
                warn!("crawl worker ended abnormally: {e}");
            }
        }
    }
}

struct Worker<F> {
    id: usize,
    fetcher: Arc<F>,
    sink: Arc<dyn ReportSink>,
    rounds: watch::Receiver<Option<Arc<Round>>>,
}

impl<F: Fetcher> Worker<F> {
    async fn run(mut self) {
        loop {
            // Take whatever round is current; None means we are between rounds
            let current = self.rounds.borrow_and_update().clone();
            if let Some(round) = current {
                self.drain(&round).await;
            }

            // Park until the driver publishes the next round.
            // Err means the sender is gone: the pool was shut down.
            if self.rounds.changed().await.is_err() {
                debug!(worker = self.id, "pool dropped, worker exiting");
                return;
            }
        }
    }

    async fn drain(&self, round: &Round) {
        // pop() returns None once the round is closed and empty
        while let Some(task) = round.queue().pop().await {
            // Dropped at the end of this iteration, whatever happens below
            let _done = round.queue().done_guard();

            // A panic in one task must not take the worker down with it
            let cycle = AssertUnwindSafe(self.process(round, &task))
                .catch_unwind()
                .await;
            if let Err(panic) = cycle {
                error!(
                    worker = self.id,
                    task = %task.id,
                    url = %task.url,
                    "worker cycle panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    async fn process(&self, round: &Round, task: &CrawlTask) {
        // Step 1: Fetch. A failure drops this task only.
        let fetched = match self.fetcher.fetch(&task.url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(worker = self.id, task = %task.id, reason = e.reason(), "dropping task: {e}");
                return;
            }
        };

        // Step 2: Only HTML pages can pull in more assets
        if fetched.is_html() {
            // Links resolve against where we ended up, after redirects
            let extraction = fetch::extract(&fetched.url, &fetched.body);
            if !extraction.parse_errors.is_empty() {
                debug!(
                    task = %task.id,
                    errors = extraction.parse_errors.len(),
                    first = %extraction.parse_errors[0],
                    "markup problems while extracting links"
                );
            }

            // Step 3: Offer every child. The index counts repeats too, so
            // ids stay stable whatever the seen-set already holds.
            for (index, url) in extraction.urls.into_iter().enumerate() {
                let child = task.child(index, url);
                if !round.offer(child) {
                    debug!(task = %task.id, index, "already seen, skipping");
                }
            }
        }

        // Step 4: Report before the done guard fires, so the round's join
        // never returns ahead of this task's line
        let report = TaskReport::new(task, &fetched);
        round.record(&report);
        self.sink.task_finished(&report);
    }
}

// panic!("literal") carries a &str, panic!("{x}") a String
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
