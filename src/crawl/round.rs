// src/crawl/round.rs
// =============================================================================
// Everything one seed's crawl shares between workers.
//
// A Round owns its seen-set and its work queue, so two rounds never see each
// other's URLs and tests can run rounds side by side. It also keeps the
// running totals that end up on the round's summary line.
// =============================================================================

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::queue::WorkQueue;
use super::report::{RoundSummary, TaskReport};
use super::task::CrawlTask;

#[derive(Debug)]
pub struct Round {
    rank: String,
    seed_url: String,
    seen: Mutex<HashSet<String>>,
    queue: WorkQueue<CrawlTask>,
    started: Instant,
    tasks_reported: AtomicUsize,
    bytes_reported: AtomicU64,
}

impl Round {
    // Creates the round and queues its root task
    pub fn new(rank: impl Into<String>, seed_url: impl Into<String>) -> Self {
        let seed_url = seed_url.into();
        let round = Self {
            rank: rank.into(),
            seed_url: seed_url.clone(),
            seen: Mutex::new(HashSet::new()),
            queue: WorkQueue::new(),
            started: Instant::now(),
            tasks_reported: AtomicUsize::new(0),
            bytes_reported: AtomicU64::new(0),
        };
        // The seed is the first URL seen, so nothing can queue it twice
        round.offer(CrawlTask::root(seed_url));
        round
    }

    // Queues `task` unless its URL was already offered this round.
    //
    // Returns: true if the task was queued, false if it was a repeat
    //
    // The membership check, the insert and the push all happen under the
    // seen lock. Two workers racing on the same URL cannot both win.
    // URLs are compared as literal strings.
    pub fn offer(&self, task: CrawlTask) -> bool {
        // Poisoning is ignored: the set is valid after any insert
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        // insert() returns false if the URL was already there
        if !seen.insert(task.url.clone()) {
            return false;
        }

        // Push while still holding `seen`
        self.queue.push(task);
        true
    }

    pub fn queue(&self) -> &WorkQueue<CrawlTask> {
        &self.queue
    }

    pub fn rank(&self) -> &str {
        &self.rank
    }

    pub fn seed_url(&self) -> &str {
        &self.seed_url
    }

    // Adds one finished task to the round's totals
    pub fn record(&self, report: &TaskReport) {
        self.tasks_reported.fetch_add(1, Ordering::Relaxed);
        self.bytes_reported
            .fetch_add(report.bytes as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            rank: self.rank.clone(),
            url: self.seed_url.clone(),
            elapsed: self.started.elapsed().as_secs_f64(),
            tasks: self.tasks_reported.load(Ordering::Relaxed),
            bytes: self.bytes_reported.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_new_round_queues_root() {
        let round = Round::new("1", "http://a.com/");
        assert_eq!(round.queue().outstanding(), 1);

        let root = round.queue().pop().await.unwrap();
        assert_eq!(root, CrawlTask::root("http://a.com/"));
    }

    #[test]
    fn test_offer_rejects_repeats() {
        let round = Round::new("1", "http://a.com/");
        let root = CrawlTask::root("http://a.com/");

        assert!(round.offer(root.child(0, "http://a.com/a.png")));
        assert!(!round.offer(root.child(1, "http://a.com/a.png")));
        // The seed itself counts as seen
        assert!(!round.offer(root.child(2, "http://a.com/")));
        // No normalization: a trailing slash makes a different key
        assert!(round.offer(root.child(3, "http://a.com/a.png/")));

        assert_eq!(round.queue().outstanding(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_offers_have_one_winner() {
        let round = Arc::new(Round::new("1", "http://a.com/"));
        let root = CrawlTask::root("http://a.com/");

        let offers = (0..32).map(|i| {
            let round = round.clone();
            let task = root.child(i, "http://a.com/shared.js");
            tokio::spawn(async move { round.offer(task) })
        });
        let results = futures::future::join_all(offers).await;

        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
        assert_eq!(round.queue().outstanding(), 2);
    }

    #[test]
    fn test_summary_totals() {
        let round = Round::new("7", "http://a.com/");
        let root = CrawlTask::root("http://a.com/");
        for bytes in [100, 250] {
            round.record(&TaskReport {
                id: root.id.clone(),
                parent_id: root.parent_id.clone(),
                depth: 0,
                content_type: "text/html".into(),
                bytes,
                elapsed: 0.5,
                url: root.url.clone(),
            });
        }

        let summary = round.summary();
        assert_eq!(summary.rank, "7");
        assert_eq!(summary.url, "http://a.com/");
        assert_eq!(summary.tasks, 2);
        assert_eq!(summary.bytes, 350);
    }
}
