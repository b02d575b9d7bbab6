//! Depletable quantity stores (reagent bottles, the waste container).
//!
//! RULES:
//!   - 0 <= level <= capacity at all times.
//!   - `Fail` changes either apply at once or leave the level untouched.
//!   - `Schedule` changes wait in per-direction FIFO lists (ordered by
//!     priority first) and are applied as soon as the head fits.
//!   - Every successful change is reported to the level observer.

use crate::{
    error::{SimError, SimResult},
    resource::Grant,
    types::{Priority, ProcessId, SimTime, QUANTITY_EPSILON},
};
use serde::{Deserialize, Serialize};

/// What happens when a level change cannot be applied right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Resolve unsuccessfully at once.
    Fail,
    /// Wait until the change becomes possible, then apply it.
    Schedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Put,
    Take,
}

/// Telemetry callback: (time, store name, new level).
pub type LevelObserver = Box<dyn FnMut(SimTime, &str, f64)>;

#[derive(Debug, Clone, Copy)]
struct StoreWaiter {
    process:  ProcessId,
    quantity: f64,
    priority: Priority,
}

pub struct DepletableResource {
    name:         String,
    capacity:     f64,
    level:        f64,
    put_waiters:  Vec<StoreWaiter>,
    take_waiters: Vec<StoreWaiter>,
    observer:     Option<LevelObserver>,
}

impl std::fmt::Debug for DepletableResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepletableResource")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("level", &self.level)
            .field("put_waiters", &self.put_waiters.len())
            .field("take_waiters", &self.take_waiters.len())
            .finish()
    }
}

impl DepletableResource {
    pub fn new(name: impl Into<String>, capacity: f64, initial_level: f64) -> SimResult<Self> {
        let name = name.into();
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "store '{name}' needs a positive capacity, got {capacity}"
            )));
        }
        if !initial_level.is_finite() || initial_level < 0.0 || initial_level > capacity {
            return Err(SimError::InvalidConfig(format!(
                "store '{name}' initial level {initial_level} outside [0, {capacity}]"
            )));
        }
        Ok(Self {
            name,
            capacity,
            level: initial_level,
            put_waiters: Vec::new(),
            take_waiters: Vec::new(),
            observer: None,
        })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn capacity(&self) -> f64 { self.capacity }
    pub fn level(&self) -> f64 { self.level }

    /// Level as a percentage of capacity.
    pub fn fill_pct(&self) -> f64 {
        self.level / self.capacity * 100.0
    }

    pub fn shortfall(&self) -> f64 {
        self.capacity - self.level
    }

    pub fn waiting(&self) -> usize {
        self.put_waiters.len() + self.take_waiters.len()
    }

    pub fn subscribe(&mut self, observer: LevelObserver) {
        self.observer = Some(observer);
    }

    pub fn can_put(&self, quantity: f64) -> bool {
        self.level + quantity <= self.capacity + QUANTITY_EPSILON
    }

    pub fn can_take(&self, quantity: f64) -> bool {
        quantity <= self.level + QUANTITY_EPSILON
    }

    /// Increase the level if it fits. Returns false and leaves the level
    /// unchanged otherwise.
    pub fn put(&mut self, now: SimTime, quantity: f64) -> bool {
        if !self.can_put(quantity) {
            return false;
        }
        self.level = (self.level + quantity).min(self.capacity);
        self.notify(now);
        true
    }

    /// Decrease the level if enough is stored.
    pub fn take(&mut self, now: SimTime, quantity: f64) -> bool {
        if !self.can_take(quantity) {
            return false;
        }
        self.level = (self.level - quantity).max(0.0);
        self.notify(now);
        true
    }

    fn notify(&mut self, now: SimTime) {
        if let Some(observer) = self.observer.as_mut() {
            observer(now, &self.name, self.level);
        }
    }

    pub fn check_quantity(&self, quantity: f64, policy: AdmissionPolicy) -> SimResult<()> {
        // A scheduled change larger than the capacity could never be applied.
        let too_large = policy == AdmissionPolicy::Schedule && quantity > self.capacity + QUANTITY_EPSILON;
        if !quantity.is_finite() || quantity < 0.0 || too_large {
            return Err(SimError::InvalidQuantity {
                name: self.name.clone(),
                quantity,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Apply a change on arrival. A `Schedule` change also has to respect
    /// the waiters already queued in the same direction.
    pub fn try_apply(
        &mut self,
        now: SimTime,
        change: LevelChange,
        quantity: f64,
        policy: AdmissionPolicy,
    ) -> bool {
        let queued = match change {
            LevelChange::Put  => !self.put_waiters.is_empty(),
            LevelChange::Take => !self.take_waiters.is_empty(),
        };
        if policy == AdmissionPolicy::Schedule && queued {
            return false;
        }
        match change {
            LevelChange::Put  => self.put(now, quantity),
            LevelChange::Take => self.take(now, quantity),
        }
    }

    pub fn enqueue(&mut self, change: LevelChange, process: ProcessId, quantity: f64, priority: Priority) {
        let waiters = match change {
            LevelChange::Put  => &mut self.put_waiters,
            LevelChange::Take => &mut self.take_waiters,
        };
        let at = waiters.iter().position(|w| w.priority > priority).unwrap_or(waiters.len());
        waiters.insert(at, StoreWaiter { process, quantity, priority });
    }

    /// Apply queued changes whose head now fits, alternating directions
    /// until neither list can make progress.
    pub fn settle(&mut self, now: SimTime) -> Vec<Grant> {
        let mut granted = Vec::new();
        loop {
            let mut progressed = false;
            if let Some(head) = self.put_waiters.first().copied() {
                if self.put(now, head.quantity) {
                    self.put_waiters.remove(0);
                    granted.push(Grant { process: head.process, priority: head.priority });
                    progressed = true;
                }
            }
            if let Some(head) = self.take_waiters.first().copied() {
                if self.take(now, head.quantity) {
                    self.take_waiters.remove(0);
                    granted.push(Grant { process: head.process, priority: head.priority });
                    progressed = true;
                }
            }
            if !progressed {
                return granted;
            }
        }
    }

    pub fn withdraw(&mut self, process: ProcessId) -> bool {
        let before = self.waiting();
        self.put_waiters.retain(|w| w.process != process);
        self.take_waiters.retain(|w| w.process != process);
        self.waiting() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fail_policy_put_over_capacity_leaves_level_unchanged() {
        let mut waste = DepletableResource::new("waste", 20_000.0, 19_800.0).unwrap();
        assert!(!waste.try_apply(0.0, LevelChange::Put, 500.0, AdmissionPolicy::Fail));
        assert_eq!(waste.level(), 19_800.0);
        assert!(waste.try_apply(0.0, LevelChange::Put, 200.0, AdmissionPolicy::Fail));
        assert_eq!(waste.level(), 20_000.0);
    }

    #[test]
    fn observer_sees_every_successful_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut lyse = DepletableResource::new("lyse", 10.0, 10.0).unwrap();
        lyse.subscribe(Box::new(move |t: SimTime, _: &str, level: f64| sink.borrow_mut().push((t, level))));

        assert!(lyse.take(1.0, 4.0));
        assert!(!lyse.take(2.0, 7.0));
        assert!(lyse.put(3.0, 4.0));
        assert_eq!(*seen.borrow(), vec![(1.0, 6.0), (3.0, 10.0)]);
    }

    #[test]
    fn settle_applies_waiting_take_after_refill() {
        let mut diluent = DepletableResource::new("diluent", 10.0, 0.0).unwrap();
        diluent.enqueue(LevelChange::Take, ProcessId(7), 5.0, Priority::Normal);
        assert!(diluent.settle(0.0).is_empty());
        assert!(diluent.put(1.0, 6.0));
        let granted = diluent.settle(1.0);
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].process, ProcessId(7));
        assert!((diluent.level() - 1.0).abs() < 1e-12);
    }
}
