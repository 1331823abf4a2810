//! Cooperative timer queue for `setTimeout`/`setInterval`.
//!
//! Timers never fire on their own: the dispatcher's drain loop asks for due
//! entries between microtask passes, so callbacks always run on a fresh turn
//! (a zero delay means "next pass", never "now").

use boa_engine::JsObject;
use std::time::{Duration, Instant};

struct TimerEntry {
    id: u64,
    callback: JsObject,
    due: Instant,
    repeat: Option<Duration>,
}

/// Pending timers for one runtime.
#[derive(Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    /// Register a timer; `repeat` makes it an interval.
    pub fn set(&mut self, callback: JsObject, delay: Duration, repeat: bool) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(TimerEntry {
            id,
            callback,
            due: Instant::now() + delay,
            repeat: repeat.then_some(delay),
        });
        id
    }

    /// Cancel a timer; unknown ids are ignored (web semantics).
    pub fn clear(&mut self, id: u64) {
        self.entries.retain(|entry| entry.id != id);
    }

    /// Remove and return callbacks due at `now`, earliest first.
    /// Intervals are rescheduled before being returned.
    pub fn take_due(&mut self, now: Instant) -> Vec<JsObject> {
        let mut due: Vec<(Instant, u64, JsObject)> = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].due <= now {
                let entry = &mut self.entries[index];
                due.push((entry.due, entry.id, entry.callback.clone()));
                if let Some(period) = entry.repeat {
                    entry.due = now + period.max(Duration::from_millis(1));
                    index += 1;
                } else {
                    self.entries.swap_remove(index);
                }
            } else {
                index += 1;
            }
        }
        due.sort_by_key(|(instant, id, _)| (*instant, *id));
        due.into_iter().map(|(_, _, callback)| callback).collect()
    }

    /// The earliest pending due instant, if any timer is registered.
    pub fn next_due(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.due).min()
    }

    /// Whether any timer is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending timer (end of invocation).
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }
}
