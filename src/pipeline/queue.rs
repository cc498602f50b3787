//! A bounded, LIFO work queue built on `std::sync::{Mutex, Condvar}` — no
//! dependency in the pack offers a bounded *LIFO* queue (`crossbeam-queue`'s
//! `ArrayQueue` is FIFO), so this is hand-rolled, matching the "bounded
//! worker pool plus a single stager task" design note.
//!
//! LIFO pop order prioritises the most recently staged work, which matters
//! when a user rapidly rewrites the same file: the newest payload for that
//! key should reach the remote before older, now-superseded ones.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedLifoQueue<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedLifoQueue<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedLifoQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Blocks while the queue is at capacity (a documented suspension
    /// point). Returns `false` if the queue was closed before room opened
    /// up — the item is dropped in that case.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");
        while state.items.len() >= self.capacity && !state.closed {
            state = self.not_full.wait(state).expect("queue lock poisoned");
        }
        if state.closed {
            return false;
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an item is available or the queue is closed and
    /// drained. Pops the most recently pushed item (LIFO).
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        while state.items.is_empty() && !state.closed {
            state = self.not_empty.wait(state).expect("queue lock poisoned");
        }
        let item = state.items.pop_back();
        self.not_full.notify_one();
        item
    }

    /// Wakes every blocked pusher/popper; pending items remain poppable
    /// until drained, but no further pushes are accepted.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").items.len()
    }
}
