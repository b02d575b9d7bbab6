//! Bounded priority queue of waiting work items (the sample autoloader).
//!
//! Ordering key: (priority, enqueue time, enqueue sequence).

use crate::{
    stats::TimeAverage,
    types::{Priority, SimTime},
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct QueueKey {
    priority:   Priority,
    enter_time: SimTime,
    seq:        u64,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.enter_time.total_cmp(&other.enter_time))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry<T> {
    pub item:       T,
    pub priority:   Priority,
    pub enter_time: SimTime,
}

/// Returned by [`PriorityQueue::push`] when the queue is at capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

#[derive(Debug)]
pub struct PriorityQueue<T> {
    name:     String,
    capacity: usize,
    entries:  BTreeMap<QueueKey, QueueEntry<T>>,
    next_seq: u64,
    length:   TimeAverage,
}

impl<T> PriorityQueue<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            entries: BTreeMap::new(),
            next_seq: 0,
            length: TimeAverage::new(0.0, 0.0),
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn capacity(&self) -> usize { self.capacity }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn is_full(&self) -> bool { self.entries.len() >= self.capacity }

    pub fn push(&mut self, now: SimTime, item: T, priority: Priority) -> Result<(), QueueFull<T>> {
        if self.is_full() {
            return Err(QueueFull(item));
        }
        let key = QueueKey { priority, enter_time: now, seq: self.next_seq };
        self.next_seq += 1;
        self.entries.insert(key, QueueEntry { item, priority, enter_time: now });
        self.length.update(now, self.entries.len() as f64);
        Ok(())
    }

    /// Remove the most urgent, then oldest, entry.
    pub fn pop(&mut self, now: SimTime) -> Option<QueueEntry<T>> {
        let (_, entry) = self.entries.pop_first()?;
        self.length.update(now, self.entries.len() as f64);
        Some(entry)
    }

    pub fn peek(&self) -> Option<&QueueEntry<T>> {
        self.entries.values().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry<T>> {
        self.entries.values()
    }

    /// Time-weighted mean length since t=0.
    pub fn mean_length(&self, now: SimTime) -> f64 {
        self.length.mean(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn important_items_overtake_older_normal_items() {
        let mut q = PriorityQueue::new("autoloader", 3);
        q.push(0.0, "a", Priority::Normal).unwrap();
        q.push(1.0, "b", Priority::Normal).unwrap();
        q.push(2.0, "rerun", Priority::Important).unwrap();
        assert_eq!(q.push(3.0, "d", Priority::Normal), Err(QueueFull("d")));

        let order: Vec<&str> = std::iter::from_fn(|| q.pop(4.0)).map(|e| e.item).collect();
        assert_eq!(order, vec!["rerun", "a", "b"]);
    }
}
