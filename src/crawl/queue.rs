// src/crawl/queue.rs
// =============================================================================
// A FIFO work queue that knows when all of its work is finished.
//
// Every push adds one unit of outstanding work; every mark_done takes one
// away. join() waits for the count to reach zero, which is stronger than
// "the queue is empty": a task that a worker popped but has not finished
// still counts, and that worker may push more tasks before it finishes.
//
// close() ends the queue for its consumers. Blocked pops wake up and get
// None once the remaining items are gone.
//
// The state lives behind a std Mutex that is never held across an await;
// waiting is done on tokio Notify handles.
// =============================================================================

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    // Signalled when an item arrives or the queue closes
    available: Notify,
    // Signalled when outstanding work drops to zero
    drained: Notify,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    outstanding: usize,
    closed: bool,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                outstanding: 0,
                closed: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        {
            let mut state = self.lock();
            state.items.push_back(item);
            state.outstanding += 1;
        }
        self.available.notify_one();
    }

    // Waits for the next item. Returns None once the queue is closed and
    // nothing is left in it.
    pub async fn pop(&self) -> Option<T> {
        loop {
            // Register interest before looking, so a push or close that lands
            // between the check and the await still wakes us
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Signals that one popped item has been fully handled.
    pub fn mark_done(&self) {
        let drained = {
            let mut state = self.lock();
            debug_assert!(state.outstanding > 0, "mark_done called more times than push");
            state.outstanding = state.outstanding.saturating_sub(1);
            state.outstanding == 0
        };
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Returns a guard that calls `mark_done` when dropped, on every path out
    /// of the scope that holds it, unwinding included.
    pub fn done_guard(&self) -> DoneGuard<'_, T> {
        DoneGuard { queue: self }
    }

    // Waits until every pushed item has been matched by a mark_done
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.lock().outstanding == 0 {
                return;
            }

            notified.await;
        }
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // The critical sections never panic, so a poisoned lock still holds
        // consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the item is marked done as soon as the guard is dropped"]
pub struct DoneGuard<'a, T> {
    queue: &'a WorkQueue<T>,
}

impl<T> Drop for DoneGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.mark_done();
    }
}
