use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::WorkQueue;

/// Work queue with delayed adds.
///
/// Delayed items are held by a background task until their ready time and
/// then handed to [`WorkQueue::add`]. An item waiting more than once keeps the
/// earliest ready time. Shutting the queue down stops the task and discards
/// everything still waiting.
pub struct DelayingQueue<T> {
    queue: Arc<WorkQueue<T>>,
    waiting_tx: mpsc::UnboundedSender<WaitFor<T>>,
    cancel: CancellationToken,
}

struct WaitFor<T> {
    item: T,
    ready_at: Instant,
}

/// Heap entry; `seq` keeps ordering total and FIFO among equal ready times.
struct Entry<T> {
    ready_at: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed: BinaryHeap is a max-heap, the earliest ready time must be on top.
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> DelayingQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Creates the queue and spawns its waiting loop on the current runtime.
    pub fn new(name: &str) -> Self {
        let queue = Arc::new(WorkQueue::new());
        let (waiting_tx, waiting_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(waiting_loop(
            name.to_string(),
            queue.clone(),
            waiting_rx,
            cancel.clone(),
        ));

        Self {
            queue,
            waiting_tx,
            cancel,
        }
    }

    pub fn work_queue(&self) -> &WorkQueue<T> {
        &self.queue
    }

    pub fn add(
        &self,
        item: T,
    ) -> bool {
        self.queue.add(item)
    }

    /// Adds `item` once `delay` has elapsed.
    pub fn add_after(
        &self,
        item: T,
        delay: Duration,
    ) {
        if self.queue.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.queue.add(item);
            return;
        }
        let wait = WaitFor {
            item,
            ready_at: Instant::now() + delay,
        };
        // The loop only exits after cancellation, when adds are moot anyway.
        let _ = self.waiting_tx.send(wait);
    }

    pub async fn get(&self) -> Option<T> {
        self.queue.get().await
    }

    pub fn done(
        &self,
        item: &T,
    ) {
        self.queue.done(item);
    }

    pub fn shut_down(&self) {
        self.cancel.cancel();
        self.queue.shut_down();
    }
}

impl<T> Drop for DelayingQueue<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn waiting_loop<T>(
    name: String,
    queue: Arc<WorkQueue<T>>,
    mut waiting_rx: mpsc::UnboundedReceiver<WaitFor<T>>,
    cancel: CancellationToken,
) where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    let mut heap: BinaryHeap<Entry<T>> = BinaryHeap::new();
    // Ready time currently in force for each waiting item; heap entries that
    // disagree with it are stale and skipped.
    let mut waiting: HashMap<T, Instant> = HashMap::new();
    let mut seq: u64 = 0;

    loop {
        let now = Instant::now();
        while heap.peek().is_some_and(|top| top.ready_at <= now) {
            let Some(entry) = heap.pop() else { break };
            if waiting.get(&entry.item) == Some(&entry.ready_at) {
                waiting.remove(&entry.item);
                queue.add(entry.item);
            }
        }

        let next_ready = heap.peek().map(|top| top.ready_at);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(queue = %name, discarded = waiting.len(), "delaying queue stopped");
                return;
            }
            _ = sleep_until(next_ready.unwrap_or(now)), if next_ready.is_some() => {}
            msg = waiting_rx.recv() => {
                let Some(wait) = msg else {
                    return;
                };
                if wait.ready_at <= Instant::now() {
                    queue.add(wait.item);
                    continue;
                }
                let earlier = waiting
                    .get(&wait.item)
                    .map_or(true, |existing| wait.ready_at < *existing);
                if earlier {
                    waiting.insert(wait.item.clone(), wait.ready_at);
                    seq = seq.wrapping_add(1);
                    heap.push(Entry {
                        ready_at: wait.ready_at,
                        seq,
                        item: wait.item,
                    });
                }
            }
        }
    }
}
