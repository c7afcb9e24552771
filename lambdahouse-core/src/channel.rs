//! Two-queue rendezvous between the invocation thread and the engine worker.
//!
//! Each direction is a bounded, closable FIFO. Closing is idempotent and
//! wakes every blocked caller: pushes fail immediately, pops drain what is
//! left and then fail.

use crate::{Query, QueryResult};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

struct QueueState<T> {
    items: VecDeque<T>,
    finished: bool,
}

/// A blocking bounded FIFO that can be finished from any thread.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                finished: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while the queue is full. Hands the item back if the queue is finished.
    pub fn push(&self, item: T) -> std::result::Result<(), T> {
        let mut state = self.lock();
        while !state.finished && state.items.len() >= self.capacity {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.finished {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks while the queue is empty. Returns `None` once finished and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.finished {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `true` if this call finished the queue.
    pub fn finish(&self) -> bool {
        let mut state = self.lock();
        let was_finished = std::mem::replace(&mut state.finished, true);
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        !was_finished
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The request and response queues shared by the dispatcher and the worker.
pub struct Rendezvous {
    requests: BoundedQueue<Query>,
    responses: BoundedQueue<QueryResult>,
    // Held for a whole push/pop pair so responses pair up with their requests.
    round_trip: Mutex<()>,
}

impl Rendezvous {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            requests: BoundedQueue::new(capacity),
            responses: BoundedQueue::new(capacity),
            round_trip: Mutex::new(()),
        })
    }

    pub fn dispatcher(self: &Arc<Self>) -> DispatcherSide {
        DispatcherSide {
            channel: Arc::clone(self),
        }
    }

    pub fn worker(self: &Arc<Self>) -> WorkerSide {
        WorkerSide {
            channel: Arc::clone(self),
        }
    }

    /// Finishes both queues. Safe to call repeatedly from either side.
    pub fn close(&self) {
        let requests = self.requests.finish();
        let responses = self.responses.finish();
        if requests || responses {
            tracing::debug!("rendezvous channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_finished() && self.responses.is_finished()
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }
}

/// Invocation-facing end: one request in, one response out.
#[derive(Clone)]
pub struct DispatcherSide {
    channel: Arc<Rendezvous>,
}

impl DispatcherSide {
    /// Submits a query and waits for its result. `None` means the worker is gone.
    pub fn execute(&self, query: Query) -> Option<QueryResult> {
        let _turn = self
            .channel
            .round_trip
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.channel.requests.push(query).is_err() {
            return None;
        }
        self.channel.responses.pop()
    }

    pub fn close(&self) {
        self.channel.close();
    }

    pub fn channel(&self) -> &Arc<Rendezvous> {
        &self.channel
    }
}

/// Engine-facing end: pops requests, pushes responses.
#[derive(Clone)]
pub struct WorkerSide {
    channel: Arc<Rendezvous>,
}

impl WorkerSide {
    pub fn next_query(&self) -> Option<Query> {
        self.channel.requests.pop()
    }

    pub fn respond(&self, result: QueryResult) -> bool {
        self.channel.responses.push(result).is_ok()
    }

    pub fn close(&self) {
        self.channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn preserves_fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.push(i).unwrap();
        }
        let drained: Vec<i32> = (0..4).map(|_| queue.pop().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn push_after_finish_returns_the_item() {
        let queue = BoundedQueue::new(2);
        assert!(queue.finish());
        assert!(!queue.finish());
        assert_eq!(queue.push("late"), Err("late"));
    }

    #[test]
    fn pop_drains_then_fails_after_finish() {
        let queue = BoundedQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.finish();
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn finish_wakes_a_blocked_pop() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(1));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.finish();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn finish_wakes_a_blocked_push() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1).unwrap();
        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };
        thread::sleep(Duration::from_millis(20));
        queue.finish();
        assert_eq!(pusher.join().unwrap(), Err(2));
    }

    #[test]
    fn full_queue_blocks_until_popped() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1).unwrap();
        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(pusher.join().unwrap(), Ok(()));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn request_and_response_stay_in_lockstep() {
        let channel = Rendezvous::new(DEFAULT_QUEUE_CAPACITY);
        let worker = channel.worker();
        let echo = thread::spawn(move || {
            while let Some(query) = worker.next_query() {
                if !worker.respond(QueryResult::success("TSV", query.query_text)) {
                    break;
                }
            }
        });

        let dispatcher = channel.dispatcher();
        for text in ["SELECT 1", "SELECT 2", "SELECT 3"] {
            let result = dispatcher.execute(Query::new(text)).unwrap();
            assert_eq!(result, QueryResult::success("TSV", text));
            assert_eq!(channel.pending_requests(), 0);
            assert_eq!(channel.pending_responses(), 0);
        }

        dispatcher.close();
        echo.join().unwrap();
        assert!(channel.is_closed());
    }

    #[test]
    fn worker_close_disconnects_the_dispatcher() {
        let channel = Rendezvous::new(2);
        channel.worker().close();
        assert_eq!(channel.dispatcher().execute(Query::new("SELECT 1")), None);
    }
}
