//! FIFO queue of upload ids awaiting the worker.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

/// FIFO of upload ids. Bounded only indirectly by the tracker's admission
/// limit; every queued id corresponds to a Pending tracker record.
pub(crate) struct TaskQueue {
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an upload id and wake the worker.
    pub fn push(&self, upload_id: String) {
        self.queue.lock().unwrap().push_back(upload_id);
        self.notify.notify_one();
    }

    /// Dequeue the oldest upload id, if any.
    pub fn pop(&self) -> Option<String> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Drop all queued ids, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let dropped: usize = queue.len();
        queue.clear();
        dropped
    }

    /// Wait until a push occurs or the timeout elapses. A push that raced
    /// ahead of this call is not lost: `Notify` stores the permit.
    pub async fn wait_for_task(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}
