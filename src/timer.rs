//! Cancellable one-shot timers on a virtual clock.
//!
//! The engine never sleeps.  It arms timers here and the owner of the clock
//! (the tokio loop in [`crate::client`], or a test) moves time forward with
//! [`TimerQueue::pop_due`].  Time is a [`Duration`] since an arbitrary origin.
//!
//! A timer fired from `pop_due` moves the clock to its own deadline before
//! it is returned, so timers armed by its handler are measured from the
//! moment it fired, not from wherever the caller's clock has got to.

use std::collections::BTreeMap;
use std::time::Duration;

/// Identifies one armed timer.  Stale handles are harmless to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle {
    deadline: Duration,
    seq: u64,
}

impl TimerHandle {
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

#[derive(Debug)]
pub struct TimerQueue<K> {
    now: Duration,
    next_seq: u64,
    armed: BTreeMap<TimerHandle, K>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            armed: BTreeMap::new(),
        }
    }

    /// A queue whose clock starts at `now` instead of zero, for state
    /// created partway through a run.
    pub fn starting_at(now: Duration) -> Self {
        Self {
            now,
            ..Self::new()
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward without firing anything.  Never moves it back.
    pub fn sync_clock(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Arm a timer that fires `after` from now.
    pub fn spawn_after(&mut self, after: Duration, kind: K) -> TimerHandle {
        let handle = TimerHandle {
            deadline: self.now + after,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.armed.insert(handle, kind);
        handle
    }

    /// Disarm a timer.  Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.armed.remove(&handle).is_some()
    }

    /// Disarm every timer whose kind matches `pred`; returns how many.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.armed.len();
        self.armed.retain(|_, k| !pred(k));
        before - self.armed.len()
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.armed.contains_key(&handle)
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.armed.keys().next().map(|h| h.deadline)
    }

    /// Pop the earliest timer with `deadline <= until`.
    ///
    /// Timers with equal deadlines fire in arming order.  When nothing is
    /// due the clock advances to `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerHandle, K)> {
        match self.armed.first_key_value() {
            Some((h, _)) if h.deadline <= until => {
                let (h, k) = self.armed.pop_first()?;
                self.now = self.now.max(h.deadline);
                Some((h, k))
            }
            _ => {
                self.now = self.now.max(until);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
