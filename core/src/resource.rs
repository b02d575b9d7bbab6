//! Exclusive / shared capacity with a priority-ordered wait list.
//!
//! RULES:
//!   - claimed <= capacity at all times.
//!   - The wait list is sorted by (priority, arrival sequence).
//!   - A request is granted on arrival only if it fits and the wait list is
//!     empty or the request is strictly more urgent than its head.
//!   - Priority moves a request up the wait list; it never evicts a holder.

use crate::{
    error::{SimError, SimResult},
    stats::TimeAverage,
    types::{Priority, ProcessId, SimTime, QUANTITY_EPSILON},
};
use std::collections::BTreeMap;

/// A waiting request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequest {
    pub process:  ProcessId,
    pub quantity: f64,
    pub priority: Priority,
    seq:          u64,
}

/// A waiter that has just been granted its claim and must be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub process:  ProcessId,
    pub priority: Priority,
}

#[derive(Debug)]
pub struct Resource {
    name:      String,
    capacity:  f64,
    claimed:   f64,
    holders:   BTreeMap<ProcessId, f64>,
    waiters:   Vec<ResourceRequest>,
    next_seq:  u64,
    occupancy: TimeAverage,
}

impl Resource {
    pub fn new(name: impl Into<String>, capacity: f64) -> SimResult<Self> {
        let name = name.into();
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "resource '{name}' needs a positive capacity, got {capacity}"
            )));
        }
        Ok(Self {
            name,
            capacity,
            claimed: 0.0,
            holders: BTreeMap::new(),
            waiters: Vec::new(),
            next_seq: 0,
            occupancy: TimeAverage::new(0.0, 0.0),
        })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn capacity(&self) -> f64 { self.capacity }
    pub fn claimed(&self) -> f64 { self.claimed }
    pub fn available(&self) -> f64 { self.capacity - self.claimed }

    pub fn waiters(&self) -> &[ResourceRequest] {
        &self.waiters
    }

    pub fn held_by(&self, process: ProcessId) -> f64 {
        self.holders.get(&process).copied().unwrap_or(0.0)
    }

    /// No claims and nobody waiting.
    pub fn is_idle(&self) -> bool {
        self.claimed <= QUANTITY_EPSILON && self.waiters.is_empty()
    }

    /// Time-weighted fraction of capacity claimed since t=0.
    pub fn utilization(&self, now: SimTime) -> f64 {
        self.occupancy.mean(now) / self.capacity
    }

    fn fits(&self, quantity: f64) -> bool {
        self.claimed + quantity <= self.capacity + QUANTITY_EPSILON
    }

    fn check_quantity(&self, quantity: f64) -> SimResult<()> {
        if !quantity.is_finite() || quantity <= 0.0 || quantity > self.capacity + QUANTITY_EPSILON {
            return Err(SimError::InvalidQuantity {
                name: self.name.clone(),
                quantity,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn claim(&mut self, now: SimTime, process: ProcessId, quantity: f64) {
        self.claimed = (self.claimed + quantity).min(self.capacity);
        *self.holders.entry(process).or_insert(0.0) += quantity;
        self.occupancy.update(now, self.claimed);
    }

    /// Claim immediately if allowed. Returns false if the caller must wait.
    pub fn try_claim(
        &mut self,
        now: SimTime,
        process: ProcessId,
        quantity: f64,
        priority: Priority,
    ) -> SimResult<bool> {
        self.check_quantity(quantity)?;
        let ahead_of_head = self.waiters.first().map_or(true, |head| priority < head.priority);
        if self.fits(quantity) && ahead_of_head {
            self.claim(now, process, quantity);
            return Ok(true);
        }
        Ok(false)
    }

    /// Park a request behind every waiter of equal or higher urgency.
    pub fn enqueue(&mut self, process: ProcessId, quantity: f64, priority: Priority) {
        let request = ResourceRequest { process, quantity, priority, seq: self.next_seq };
        self.next_seq += 1;
        let at = self
            .waiters
            .iter()
            .position(|w| w.priority > priority)
            .unwrap_or(self.waiters.len());
        self.waiters.insert(at, request);
    }

    /// Give back `quantity` units held by `process` and grant whoever fits.
    pub fn release(
        &mut self,
        now: SimTime,
        process: ProcessId,
        quantity: f64,
    ) -> SimResult<Vec<Grant>> {
        let held = self.held_by(process);
        if !quantity.is_finite() || quantity <= 0.0 || quantity > held + QUANTITY_EPSILON {
            return Err(SimError::OverRelease {
                resource: self.name.clone(),
                requested: quantity,
                held,
            });
        }
        let remaining = held - quantity;
        if remaining <= QUANTITY_EPSILON {
            self.holders.remove(&process);
        } else {
            self.holders.insert(process, remaining);
        }
        self.claimed = (self.claimed - quantity).max(0.0);
        self.occupancy.update(now, self.claimed);
        Ok(self.grant_waiting(now))
    }

    /// Grant waiters from the head while capacity allows.
    pub fn grant_waiting(&mut self, now: SimTime) -> Vec<Grant> {
        let mut granted = Vec::new();
        while let Some(head) = self.waiters.first().copied() {
            if !self.fits(head.quantity) {
                break;
            }
            self.waiters.remove(0);
            self.claim(now, head.process, head.quantity);
            granted.push(Grant { process: head.process, priority: head.priority });
        }
        granted
    }

    /// Drop a parked request. Returns true if the process was waiting here.
    pub fn withdraw(&mut self, process: ProcessId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.process != process);
        self.waiters.len() != before
    }
}
