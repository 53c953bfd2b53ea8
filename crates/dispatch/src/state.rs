use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct Tracked {
    retries_remaining: u32,
    last_retry: DateTime<Utc>,
}

/// In-memory view of unfinished callbacks (§4.7). A callback id is in
/// `callbacks` iff it is unacknowledged and has retries left; the
/// store is the durable copy, this is what the driver loop consults on
/// every tick without taking the store lock.
#[derive(Default)]
pub(crate) struct DispatcherState {
    callbacks: HashMap<String, Tracked>,
    retry_queue: VecDeque<String>,
}

impl DispatcherState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A freshly-created callback jumps to the front of the queue
    /// (§4.7 `new_callback`).
    pub(crate) fn push_new(&mut self, id: String, retries_remaining: u32, last_retry: DateTime<Utc>) {
        self.callbacks.insert(id.clone(), Tracked { retries_remaining, last_retry });
        self.retry_queue.push_front(id);
    }

    /// A callback recovered from the store on startup goes to the
    /// tail, in `last_retry`-ascending order (§4.7 Recovery).
    pub(crate) fn push_recovered(&mut self, id: String, retries_remaining: u32, last_retry: DateTime<Utc>) {
        self.callbacks.insert(id.clone(), Tracked { retries_remaining, last_retry });
        self.retry_queue.push_back(id);
    }

    /// Re-queues an id at the head after a worker-pool-full backoff
    /// (§4.7 send phase), without touching its tracked state.
    pub(crate) fn push_front(&mut self, id: String) {
        self.retry_queue.push_front(id);
    }

    pub(crate) fn ack(&mut self, id: &str) -> bool {
        self.callbacks.remove(id).is_some()
    }

    pub(crate) fn is_tracked(&self, id: &str) -> bool {
        self.callbacks.contains_key(id)
    }

    /// Pops the next id due for a send attempt, discarding any stale
    /// head entries whose callback was already acknowledged. Returns
    /// `None` without mutating the queue if it is empty or the head
    /// has not reached `retry_period` since its last attempt yet.
    pub(crate) fn pop_ready(
        &mut self,
        retry_period: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Option<String> {
        loop {
            let id = self.retry_queue.front()?.clone();
            let Some(tracked) = self.callbacks.get(&id) else {
                self.retry_queue.pop_front();
                continue;
            };
            if tracked.last_retry > now - retry_period {
                return None;
            }
            self.retry_queue.pop_front();
            return Some(id);
        }
    }

    /// Records a completed send attempt. Returns `None` if the
    /// callback was acknowledged while in flight (a no-op). Otherwise
    /// returns the remaining retry budget after decrementing it; the
    /// caller re-queues to the tail unless the budget is exhausted.
    pub(crate) fn complete(&mut self, id: &str, now: DateTime<Utc>) -> Option<u32> {
        let tracked = self.callbacks.get_mut(id)?;
        tracked.retries_remaining = tracked.retries_remaining.saturating_sub(1);
        tracked.last_retry = now;
        let remaining = tracked.retries_remaining;

        if remaining == 0 {
            self.callbacks.remove(id);
        } else {
            self.retry_queue.push_back(id.to_owned());
        }
        Some(remaining)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_callback_jumps_the_queue() {
        let mut state = DispatcherState::new();
        let now = Utc::now();
        state.push_recovered("old".into(), 3, now - chrono::Duration::minutes(5));
        state.push_new("fresh".into(), 3, now - chrono::Duration::days(1));

        assert_eq!(state.pop_ready(chrono::Duration::seconds(120), now), Some("fresh".into()));
    }

    #[test]
    fn acknowledged_head_is_discarded_silently() {
        let mut state = DispatcherState::new();
        let now = Utc::now();
        state.push_new("a".into(), 3, now - chrono::Duration::days(1));
        state.push_new("b".into(), 3, now - chrono::Duration::days(1));
        assert!(state.ack("b"));

        // "b" was pushed after "a" so it's at the front; it must be
        // skipped, not returned, once acknowledged.
        assert_eq!(state.pop_ready(chrono::Duration::seconds(120), now), Some("a".into()));
    }

    #[test]
    fn exhausted_retries_drop_the_callback() {
        let mut state = DispatcherState::new();
        let now = Utc::now();
        state.push_new("a".into(), 1, now - chrono::Duration::days(1));
        assert_eq!(state.complete("a", now), Some(0));
        assert_eq!(state.len(), 0);
        assert_eq!(state.pop_ready(chrono::Duration::seconds(0), now), None);
    }
}
