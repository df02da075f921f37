//! Timer Queue
//!
//! Deadline-sorted timers owned by a display connection. Deadlines are
//! `Instant`s, so the queue never has to guess about wall-clock jumps.
//!
//! Firing is split in two so the caller can drop the connection lock while a
//! callback runs: [`TimerQueue::pop_due`] hands out the callback of the first
//! expired timer, and [`TimerQueue::finish`] gives it back, re-arming periodic
//! timers and retiring one-shots.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

/// Handle to a queued timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    /// Linked into the sorted queue
    Queued,
    /// Callback handed out by `pop_due`, not yet returned
    Firing,
}

struct TimerEntry<T> {
    due: Instant,
    period: Option<Duration>,
    state: TimerState,
    callback: Option<T>,
}

/// Sorted timer list
pub struct TimerQueue<T> {
    entries: HashMap<TimerId, TimerEntry<T>>,
    /// Queued timers, earliest first; equal deadlines keep insertion order
    order: Vec<TimerId>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
        }
    }

    /// Queue a timer. `period` of `None` makes it one-shot.
    pub fn insert(&mut self, due: Instant, period: Option<Duration>, callback: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            TimerEntry {
                due,
                period,
                state: TimerState::Queued,
                callback: Some(callback),
            },
        );
        self.link(id, due);
        trace!("Timer {:?} queued", id);
        id
    }

    /// Reschedule an existing timer. Works from inside its own callback.
    pub fn change(&mut self, id: TimerId, due: Instant, period: Option<Duration>) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.due = due;
        entry.period = period;
        entry.state = TimerState::Queued;
        self.unlink(id);
        self.link(id, due);
        true
    }

    /// Remove a timer for good. Returns false if it was already gone.
    pub fn stop(&mut self, id: TimerId) -> bool {
        self.unlink(id);
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn due(&self, id: TimerId) -> Option<Instant> {
        self.entries.get(&id).map(|e| e.due)
    }

    /// Number of timers linked into the queue
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Time until the earliest deadline; zero when it already passed,
    /// `None` when no timer is queued.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        let first = self.order.first()?;
        let entry = self.entries.get(first)?;
        Some(entry.due.saturating_duration_since(now))
    }

    /// Detach the earliest timer if it is due at `now`, handing out its callback.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, T)> {
        let id = *self.order.first()?;
        let entry = self.entries.get_mut(&id)?;
        if entry.due > now {
            return None;
        }
        let callback = entry.callback.take()?;
        entry.state = TimerState::Firing;
        self.order.remove(0);
        Some((id, callback))
    }

    /// Return a callback taken by `pop_due`.
    ///
    /// A timer that was stopped meanwhile drops its callback; one that was
    /// rescheduled from inside the callback keeps its new deadline. Otherwise
    /// periodic timers re-arm strictly after `now` and one-shots retire.
    pub fn finish(&mut self, id: TimerId, callback: T, now: Instant) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.callback = Some(callback);
        if entry.state == TimerState::Queued {
            return;
        }
        match entry.period {
            Some(period) => {
                let next = next_deadline(entry.due, period, now);
                entry.due = next;
                entry.state = TimerState::Queued;
                self.link(id, next);
            }
            None => {
                self.entries.remove(&id);
                trace!("One-shot timer {:?} retired", id);
            }
        }
    }

    fn link(&mut self, id: TimerId, due: Instant) {
        let entries = &self.entries;
        let pos = self
            .order
            .iter()
            .position(|other| entries.get(other).is_some_and(|e| e.due > due))
            .unwrap_or(self.order.len());
        self.order.insert(pos, id);
    }

    fn unlink(&mut self, id: TimerId) {
        self.order.retain(|other| *other != id);
    }
}

/// First `due + k * period` (k >= 1) strictly after `now`, computed in one
/// step so a long stall never turns into a burst of catch-up firings.
pub fn next_deadline(due: Instant, period: Duration, now: Instant) -> Instant {
    let next = due + period;
    if next > now || period.is_zero() {
        return next;
    }
    let behind = now.duration_since(next).as_nanos();
    let step = period.as_nanos();
    let skips = behind / step + 1;
    next + Duration::from_nanos((skips * step).min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_due_in_deadline_order() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        let late = queue.insert(t0 + Duration::from_millis(50), None, "late");
        let early = queue.insert(t0 + Duration::from_millis(10), None, "early");
        let tie = queue.insert(t0 + Duration::from_millis(10), None, "tie");

        let now = t0 + Duration::from_millis(60);
        let order: Vec<_> = std::iter::from_fn(|| {
            let (id, cb) = queue.pop_due(now)?;
            queue.finish(id, cb, now);
            Some(id)
        })
        .collect();
        assert_eq!(order, vec![early, tie, late]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        queue.insert(t0 + Duration::from_millis(100), None, ());
        assert!(queue.pop_due(t0).is_none());
        assert_eq!(queue.next_timeout(t0), Some(Duration::from_millis(100)));
        assert_eq!(
            queue.next_timeout(t0 + Duration::from_millis(150)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_periodic_rearm_skips_past_due_repeats() {
        let t0 = Instant::now();
        let period = Duration::from_millis(100);
        let mut queue = TimerQueue::new();
        let id = queue.insert(t0, Some(period), ());

        let now = t0 + Duration::from_millis(250);
        let (fired, cb) = queue.pop_due(now).expect("timer due");
        assert_eq!(fired, id);
        queue.finish(id, cb, now);

        let due = queue.due(id).expect("still queued");
        assert!(due > now);
        assert_eq!(due, t0 + Duration::from_millis(300));
        assert!(queue.pop_due(now).is_none());
    }

    #[test]
    fn test_one_shot_retires_after_firing() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.insert(t0, None, ());
        let (_, cb) = queue.pop_due(t0).expect("due");
        queue.finish(id, cb, t0);
        assert!(!queue.contains(id));
    }

    #[test]
    fn test_stop_during_callback_drops_timer() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.insert(t0, Some(Duration::from_millis(10)), ());
        let (_, cb) = queue.pop_due(t0).expect("due");
        assert!(queue.stop(id));
        queue.finish(id, cb, t0);
        assert!(!queue.contains(id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_change_during_callback_keeps_new_deadline() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        let id = queue.insert(t0, Some(Duration::from_millis(10)), ());
        let (_, cb) = queue.pop_due(t0).expect("due");
        let new_due = t0 + Duration::from_secs(5);
        assert!(queue.change(id, new_due, None));
        queue.finish(id, cb, t0);
        assert_eq!(queue.due(id), Some(new_due));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_next_deadline_exact_multiple_moves_forward() {
        let t0 = Instant::now();
        let period = Duration::from_millis(100);
        let now = t0 + Duration::from_millis(200);
        assert_eq!(next_deadline(t0, period, now), t0 + Duration::from_millis(300));
    }
}
