// crates/babel-consensus/src/batch.rs
//
// Debounced batch buffer for content awaiting recomputation.
//
// Every enqueue pushes the flush deadline out by the quiescence window, but
// the deadline never moves past `max_delay` after the oldest buffered item,
// and a full buffer is due immediately. A steady trickle of enqueues
// therefore cannot postpone a flush indefinitely.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Flush policy for the batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Flush once no item has been enqueued for this long.
    pub quiescence: Duration,
    /// Flush no later than this long after the oldest buffered item.
    pub max_delay: Duration,
    /// Flush as soon as this many distinct items are buffered.
    pub max_items: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_items: 256,
        }
    }
}

#[derive(Default)]
struct BatchState {
    /// Content ids in first-enqueue order.
    ids: Vec<String>,
    queued: HashSet<String>,
    first_at: Option<Instant>,
    last_at: Option<Instant>,
}

impl BatchState {
    fn deadline(&self, config: &BatchConfig) -> Option<Instant> {
        let (first, last) = (self.first_at?, self.last_at?);
        if self.ids.len() >= config.max_items {
            return Some(last);
        }
        Some((last + config.quiescence).min(first + config.max_delay))
    }

    fn drain(&mut self) -> Vec<String> {
        self.queued.clear();
        self.first_at = None;
        self.last_at = None;
        std::mem::take(&mut self.ids)
    }
}

/// Buffer of content ids shared by the request path and the flush loop.
pub struct BatchQueue {
    config: BatchConfig,
    state: Mutex<BatchState>,
    notify: Notify,
}

impl BatchQueue {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BatchState::default()),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Buffer a content id and reset the quiescence timer.
    ///
    /// An id already in the buffer is not duplicated. Returns the number of
    /// buffered items.
    pub async fn enqueue(&self, content_id: &str) -> usize {
        let now = Instant::now();
        let len = {
            let mut state = self.state.lock().await;
            if state.queued.insert(content_id.to_string()) {
                state.ids.push(content_id.to_string());
            }
            state.first_at.get_or_insert(now);
            state.last_at = Some(now);
            state.ids.len()
        };
        self.notify.notify_one();
        len
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.ids.is_empty()
    }

    /// When the current buffer becomes due, or `None` if it is empty.
    pub async fn deadline(&self) -> Option<Instant> {
        self.state.lock().await.deadline(&self.config)
    }

    /// Drain the buffer if its deadline has passed.
    pub async fn take_due(&self) -> Option<Vec<String>> {
        let mut state = self.state.lock().await;
        match state.deadline(&self.config) {
            Some(deadline) if deadline <= Instant::now() => Some(state.drain()),
            _ => None,
        }
    }

    /// Drain the buffer unconditionally.
    pub async fn take_all(&self) -> Vec<String> {
        self.state.lock().await.drain()
    }

    /// Wait until the buffer is due, then drain it.
    pub async fn next_batch(&self) -> Vec<String> {
        loop {
            let notified = self.notify.notified();
            match self.deadline().await {
                None => notified.await,
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            if let Some(batch) = self.take_due().await {
                                if !batch.is_empty() {
                                    return batch;
                                }
                            }
                        }
                        _ = notified => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> BatchQueue {
        BatchQueue::new(BatchConfig {
            quiescence: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_items: 3,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescence_resets_on_enqueue() {
        let q = queue();
        q.enqueue("a").await;
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(q.take_due().await.is_none());

        q.enqueue("b").await;
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(q.take_due().await.is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(q.take_due().await, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(q.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_delay_bounds_trickle() {
        let q = queue();
        // One enqueue every 4 seconds never lets the quiescence window close.
        for i in 0..8 {
            q.enqueue(if i % 2 == 0 { "a" } else { "b" }).await;
            tokio::time::advance(Duration::from_secs(4)).await;
        }
        let batch = q.take_due().await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_is_due_immediately() {
        let q = queue();
        q.enqueue("a").await;
        q.enqueue("b").await;
        assert!(q.take_due().await.is_none());
        q.enqueue("c").await;
        assert_eq!(q.take_due().await.map(|b| b.len()), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_collapse() {
        let q = queue();
        assert_eq!(q.enqueue("a").await, 1);
        assert_eq!(q.enqueue("a").await, 1);
        assert_eq!(q.take_all().await, vec!["a".to_string()]);
        assert!(q.deadline().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_batch_waits_for_quiescence() {
        let q = std::sync::Arc::new(queue());
        let waiter = tokio::spawn({
            let q = q.clone();
            async move { q.next_batch().await }
        });
        tokio::task::yield_now().await;

        q.enqueue("a").await;
        let started = Instant::now();
        let batch = waiter.await.unwrap();
        assert_eq!(batch, vec!["a".to_string()]);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
