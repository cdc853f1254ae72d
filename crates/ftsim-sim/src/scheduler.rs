//! Deterministic discrete-event scheduler.
//!
//! Events are ordered by virtual time, then by insertion sequence, so two
//! events scheduled for the same instant fire in the order they were added.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use ftsim_types::SimTime;
use serde::Serialize;

/// Why [`Scheduler::run_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    Stopped,
    Drained,
    TimeLimit,
}

struct Scheduled<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest time first, then lowest sequence.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Scheduler<E> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Scheduled<E>>,
    stopped: bool,
    processed: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
            stopped: false,
            processed: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `event` at an absolute time. Times in the past fire now.
    pub fn schedule_at(&mut self, at: SimTime, event: E) {
        let at = at.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { at, seq, event });
    }

    pub fn schedule_after(&mut self, delay: Duration, event: E) {
        self.schedule_at(self.now + delay, event);
    }

    /// Ask the run loop to return before the next event.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Events handed out so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Pop the next event if it is due no later than `limit`, advancing the
    /// clock to its time.
    pub fn next_event(&mut self, limit: SimTime) -> Option<E> {
        if self.stopped || self.queue.peek()?.at > limit {
            return None;
        }
        let next = self.queue.pop()?;
        self.now = next.at;
        self.processed += 1;
        Some(next.event)
    }

    /// Hand events to `handle` until stopped, drained, or past `limit`.
    ///
    /// On a time-limit exit the clock is left at `limit`.
    pub fn run_until(&mut self, limit: SimTime, mut handle: impl FnMut(&mut Self, E)) -> RunEnd {
        loop {
            if self.stopped {
                return RunEnd::Stopped;
            }
            match self.queue.peek() {
                None => return RunEnd::Drained,
                Some(next) if next.at > limit => {
                    self.now = self.now.max(limit);
                    return RunEnd::TimeLimit;
                }
                Some(_) => {}
            }
            if let Some(event) = self.next_event(limit) {
                handle(self, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_time_then_insertion() {
        let mut sched = Scheduler::new();
        sched.schedule_at(SimTime::from_secs(2), "c");
        sched.schedule_at(SimTime::from_secs(1), "a");
        sched.schedule_at(SimTime::from_secs(1), "b");

        let mut seen = Vec::new();
        let end = sched.run_until(SimTime::from_secs(10), |_, e| seen.push(e));

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(end, RunEnd::Drained);
        assert_eq!(sched.now(), SimTime::from_secs(2));
        assert_eq!(sched.processed(), 3);
    }

    #[test]
    fn handlers_can_schedule_and_stop() {
        let mut sched = Scheduler::new();
        sched.schedule_at(SimTime::from_secs(1), 0u32);

        let mut seen = Vec::new();
        let end = sched.run_until(SimTime::from_secs(100), |s, n| {
            seen.push((s.now(), n));
            if n == 2 {
                s.stop();
            } else {
                s.schedule_after(Duration::from_millis(500), n + 1);
            }
        });

        assert_eq!(end, RunEnd::Stopped);
        assert_eq!(
            seen,
            vec![
                (SimTime::from_millis(1000), 0),
                (SimTime::from_millis(1500), 1),
                (SimTime::from_millis(2000), 2),
            ]
        );
        // Stopped runs hand out nothing more.
        sched.schedule_after(Duration::ZERO, 9);
        assert_eq!(sched.next_event(SimTime::from_secs(100)), None);
    }

    #[test]
    fn time_limit_leaves_later_events_queued() {
        let mut sched = Scheduler::new();
        sched.schedule_at(SimTime::from_secs(1), 1);
        sched.schedule_at(SimTime::from_secs(5), 5);

        let mut seen = Vec::new();
        let end = sched.run_until(SimTime::from_secs(3), |_, e| seen.push(e));

        assert_eq!(end, RunEnd::TimeLimit);
        assert_eq!(seen, vec![1]);
        assert_eq!(sched.now(), SimTime::from_secs(3));
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn past_times_fire_now() {
        let mut sched = Scheduler::new();
        sched.schedule_at(SimTime::from_secs(2), 'x');
        assert_eq!(sched.next_event(SimTime::from_secs(2)), Some('x'));

        sched.schedule_at(SimTime::from_secs(1), 'y');
        assert_eq!(sched.next_event(SimTime::from_secs(2)), Some('y'));
        assert_eq!(sched.now(), SimTime::from_secs(2));
    }
}
