use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

/// Deduplicating FIFO of items awaiting processing.
///
/// - An item is pending at most once (`dirty`), no matter how often it is added.
/// - An item handed out by [`WorkQueue::get`] stays in flight (`processing`)
///   until [`WorkQueue::done`]; adding it meanwhile only marks it dirty, and
///   `done` puts it back in the FIFO. A key is therefore never processed by two
///   workers at once, and a notification arriving mid-processing always leads
///   to exactly one more pass.
/// - After [`WorkQueue::shut_down`] adds are ignored, already pending items
///   still drain through `get`, then `get` returns `None`.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

impl<T> Default for WorkQueue<T>
where
    T: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T>
where
    T: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Marks `item` as needing processing.
    ///
    /// Returns `true` when the call produced a new pending marker, `false` when
    /// it was coalesced into an existing one or rejected by shutdown.
    pub fn add(
        &self,
        item: T,
    ) -> bool {
        {
            let mut state = self.state.lock();
            if state.shutting_down || state.dirty.contains(&item) {
                return false;
            }
            state.dirty.insert(item.clone());
            if state.processing.contains(&item) {
                trace!("item in flight, deferring until done");
                return true;
            }
            state.queue.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Waits for the next item, marking it in flight.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an add between check and await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `item` as no longer in flight, re-queueing it if it was added
    /// while being processed.
    pub fn done(
        &self,
        item: &T,
    ) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(item);
            if state.dirty.contains(item) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stops accepting new items and wakes every waiting `get`.
    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Items waiting to be handed out
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items currently being processed
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().processing.len()
    }

    /// Whether `item` is waiting (in the FIFO, or dirty while in flight)
    pub fn is_pending(
        &self,
        item: &T,
    ) -> bool {
        self.state.lock().dirty.contains(item)
    }

    pub fn is_in_flight(
        &self,
        item: &T,
    ) -> bool {
        self.state.lock().processing.contains(item)
    }
}
