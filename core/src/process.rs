//! Process trait and suspension contract.
//!
//! RULE: Every simulated actor implements Process.
//! A process body runs until it reaches a suspension point and hands that
//! point back to the engine as a [`Step`]. The engine either resolves the step
//! on the spot (an uncontended request, a `Fail`-policy store change) and
//! calls `resume` again in the same slice, or parks the process until the
//! step resolves. Bodies are state machines: one stage per suspension point.

use crate::{
    depletable::AdmissionPolicy,
    engine::ProcessContext,
    error::SimResult,
    types::{Priority, ResourceId, SimTime, StoreId},
};
use serde::{Deserialize, Serialize};

/// The contract every simulated actor must fulfill.
pub trait Process<M> {
    /// Stable name used in logs and errors.
    fn name(&self) -> &str;

    /// Run until the next suspension point.
    ///
    /// `cx.failed()` reports whether the previous request/put/take resolved
    /// unsuccessfully; bodies must check it after each of those steps.
    fn resume(&mut self, cx: &mut ProcessContext<'_, M>) -> SimResult<Step>;
}

/// A suspension point returned by a process body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Suspend until `now + duration`.
    Hold { duration: SimTime, priority: Priority },
    /// Suspend until `quantity` units of `resource` are claimed for this process.
    Request { resource: ResourceId, quantity: f64, priority: Priority },
    /// Raise the level of a depletable resource.
    Put { store: StoreId, quantity: f64, policy: AdmissionPolicy, priority: Priority },
    /// Lower the level of a depletable resource.
    Take { store: StoreId, quantity: f64, policy: AdmissionPolicy, priority: Priority },
    /// Suspend until someone activates this process.
    Passivate,
    /// The body is finished.
    Terminate,
}

impl Step {
    pub fn hold(duration: SimTime) -> Self {
        Self::Hold { duration, priority: Priority::Normal }
    }

    /// Yield to every other process due at the current instant.
    pub fn yield_now() -> Self {
        Self::hold(0.0)
    }

    pub fn request(resource: ResourceId) -> Self {
        Self::Request { resource, quantity: 1.0, priority: Priority::Normal }
    }

    pub fn request_with(resource: ResourceId, quantity: f64, priority: Priority) -> Self {
        Self::Request { resource, quantity, priority }
    }

    pub fn put(store: StoreId, quantity: f64, policy: AdmissionPolicy) -> Self {
        Self::Put { store, quantity, policy, priority: Priority::Normal }
    }

    pub fn take(store: StoreId, quantity: f64, policy: AdmissionPolicy) -> Self {
        Self::Take { store, quantity, policy, priority: Priority::Normal }
    }
}

/// Lifecycle of a process as tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Registered, never scheduled.
    Created,
    /// Has a pending timeline entry from an activation or a grant.
    Scheduled,
    /// Currently executing its slice.
    Running,
    /// Has a pending timeline entry from a `Hold`.
    Holding,
    /// Parked in a resource or store wait list.
    Requesting,
    /// Suspended with no timeline entry.
    Passive,
    Terminated,
    Cancelled,
}

impl ProcessState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled)
    }
}
