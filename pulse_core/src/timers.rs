//! Cancelable wall-clock timers.
//!
//! A deterministic timer wheel: nothing fires by itself. The owner calls
//! [`TimerQueue::pop_due`] with the current wall-clock time and handles each
//! due payload. Cancelling is by handle and is idempotent.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Deadline-ordered set of pending timers carrying payloads of type `T`.
#[derive(Debug)]
pub struct TimerQueue<T> {
    /// (deadline, handle) -> payload; handle breaks ties in scheduling order
    pending: BTreeMap<(Duration, TimerHandle), T>,

    /// handle -> deadline, for cancellation
    deadlines: HashMap<TimerHandle, Duration>,

    next_handle: u64,
}

impl<T> TimerQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Schedules `payload` to become due at `deadline`.
    pub fn schedule(&mut self, deadline: Duration, payload: T) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.pending.insert((deadline, handle), payload);
        self.deadlines.insert(handle, deadline);
        handle
    }

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle) {
            Some(deadline) => self.pending.remove(&(deadline, handle)).is_some(),
            None => false,
        }
    }

    /// Cancels every pending timer. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.deadlines.clear();
        count
    }

    /// Removes and returns the earliest timer whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerHandle, Duration, T)> {
        let (&(deadline, handle), _) = self.pending.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&handle);
        self.pending
            .remove(&(deadline, handle))
            .map(|payload| (handle, deadline, payload))
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether a handle is still pending.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle)
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
