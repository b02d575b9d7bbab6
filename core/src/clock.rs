//! Simulation clock. Owns virtual time and the event timeline.
//!
//! RULES:
//!   - Virtual time never decreases.
//!   - The entry with the smallest (time, priority, sequence) is resumed next.
//!   - Sequence numbers are assigned at scheduling time, so entries with equal
//!     time and priority resume in the order they were scheduled.

use crate::{
    error::{SimError, SimResult},
    types::{Priority, ProcessId, SimTime},
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Ordering key of a pending resumption.
#[derive(Debug, Clone, Copy)]
pub struct TimelineKey {
    pub time:     SimTime,
    pub priority: Priority,
    pub seq:      u64,
}

impl Ord for TimelineKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.priority.cmp(&other.priority))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for TimelineKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimelineKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimelineKey {}

/// Pending resumptions ordered by [`TimelineKey`].
#[derive(Debug, Default)]
pub struct EventTimeline {
    entries:  BTreeMap<TimelineKey, ProcessId>,
    next_seq: u64,
}

impl EventTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, time: SimTime, priority: Priority, process: ProcessId) -> TimelineKey {
        let key = TimelineKey { time, priority, seq: self.next_seq };
        self.next_seq += 1;
        self.entries.insert(key, process);
        key
    }

    pub fn remove(&mut self, key: &TimelineKey) -> Option<ProcessId> {
        self.entries.remove(key)
    }

    pub fn pop_next(&mut self) -> Option<(TimelineKey, ProcessId)> {
        self.entries.pop_first()
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.entries.keys().next().map(|key| key.time)
    }

    /// Number of pending entries that resume `process`.
    pub fn entries_for(&self, process: ProcessId) -> usize {
        self.entries.values().filter(|p| **p == process).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SimClock {
    now:      SimTime,
    timeline: EventTimeline,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    /// Insert a resumption entry. Fails on NaN or on a time in the past.
    pub fn schedule_at(
        &mut self,
        time: SimTime,
        priority: Priority,
        process: ProcessId,
    ) -> SimResult<TimelineKey> {
        if time.is_nan() || time < self.now {
            return Err(SimError::TimeReversal { now: self.now, at: time });
        }
        Ok(self.timeline.insert(time, priority, process))
    }

    pub fn unschedule(&mut self, key: &TimelineKey) -> Option<ProcessId> {
        self.timeline.remove(key)
    }

    /// Pop the earliest entry strictly before `until` and advance `now` to it.
    pub fn pop_before(&mut self, until: SimTime) -> Option<(TimelineKey, ProcessId)> {
        match self.timeline.peek_time() {
            Some(time) if time < until => {
                let (key, process) = self.timeline.pop_next()?;
                self.now = key.time;
                Some((key, process))
            }
            _ => None,
        }
    }

    /// Move the clock forward without resuming anything.
    /// Panics if asked to move backwards; callers must check.
    pub fn advance_to(&mut self, time: SimTime) {
        assert!(time >= self.now, "advance_to({time}) called with clock at {}", self.now);
        self.now = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_time_and_priority_resume_in_insertion_order() {
        let mut timeline = EventTimeline::new();
        timeline.insert(5.0, Priority::Normal, ProcessId(2));
        timeline.insert(5.0, Priority::Normal, ProcessId(0));
        timeline.insert(5.0, Priority::Critical, ProcessId(1));
        timeline.insert(1.0, Priority::Normal, ProcessId(3));

        let order: Vec<usize> = std::iter::from_fn(|| timeline.pop_next())
            .map(|(_, p)| p.0)
            .collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn scheduling_into_the_past_is_rejected() {
        let mut clock = SimClock::new();
        clock.advance_to(10.0);
        assert!(clock.schedule_at(9.0, Priority::Normal, ProcessId(0)).is_err());
        assert!(clock.schedule_at(f64::NAN, Priority::Normal, ProcessId(0)).is_err());
        assert!(clock.schedule_at(10.0, Priority::Normal, ProcessId(0)).is_ok());
    }
}
