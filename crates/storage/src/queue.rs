//! Shared work queue.
//!
//! All work items are put before the workers start. Workers take items
//! without blocking; each item is handed out at most once. The producer
//! waits on [`WorkQueue::join`] until every item has been marked complete.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use ingest_common::WorkItem;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Cloneable handle to one queue.
#[derive(Clone, Default)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<QueueState>,
    all_complete: Notify,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    /// Items put but not yet marked complete.
    outstanding: usize,
    completed: usize,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, item: WorkItem) {
        let mut state = self.lock();
        state.outstanding += 1;
        debug!(item = %item, "Enqueued work item");
        state.items.push_back(item);
    }

    /// Take the next item, or `None` right away when the queue is empty.
    pub fn try_get(&self) -> Option<WorkItem> {
        self.lock().items.pop_front()
    }

    /// Record that one dequeued item is finished, successfully or not.
    pub fn mark_complete(&self) {
        let mut state = self.lock();
        if state.outstanding == 0 {
            warn!("mark_complete called with no outstanding items");
            return;
        }
        state.outstanding -= 1;
        state.completed += 1;
        if state.outstanding == 0 {
            self.inner.all_complete.notify_waiters();
        }
    }

    /// Wait until every item put so far has been marked complete.
    pub async fn join(&self) {
        loop {
            let notified = self.inner.all_complete.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    /// Items still waiting to be taken.
    pub fn pending(&self) -> usize {
        self.lock().items.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
