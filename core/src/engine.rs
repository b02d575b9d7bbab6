//! The process engine. Drives virtual time for one simulation run.
//!
//! EXECUTION MODEL:
//!   1. Pop the earliest (time, priority, sequence) entry from the timeline.
//!   2. Advance the clock to its time.
//!   3. Resume the process until it returns a suspension point that cannot
//!      be resolved on the spot, or terminates.
//!
//! RULES:
//!   - Single thread of control. A slice runs to its next suspension before
//!     any other process runs, so shared state needs no locking.
//!   - A process has at most one pending timeline entry at any time.
//!   - Activating a finished process is a no-op. Activating a process parked
//!     in a wait list interrupts it: the wait resolves with `failed = true`.
//!   - Cancelling never releases grants; the caller owns that.
//!   - Scheduler misuse returns an error and aborts the run.

use crate::{
    clock::{SimClock, TimelineKey},
    depletable::{AdmissionPolicy, DepletableResource, LevelChange},
    error::{SimError, SimResult},
    process::{Process, ProcessState, Step},
    resource::{Grant, Resource},
    types::{Priority, ProcessId, ResourceId, SimTime, StoreId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitTarget {
    Resource(ResourceId),
    Store(StoreId),
}

struct ProcessRecord<M> {
    name:       String,
    state:      ProcessState,
    failed:     bool,
    pending:    Option<TimelineKey>,
    waiting_on: Option<WaitTarget>,
    body:       Option<Box<dyn Process<M>>>,
}

/// How the engine resolved a step.
enum Resolution {
    /// Resolved on the spot; resume the body in the same slice.
    Continue,
    /// The process is parked.
    Suspended,
    Terminated,
}

/// The result of a bounded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// The run reached the requested time.
    Complete,
    /// The timeline emptied before the requested time.
    Exhausted,
}

/// Everything the engine owns except the domain model.
pub struct Kernel<M> {
    clock:     SimClock,
    processes: Vec<ProcessRecord<M>>,
    resources: Vec<Resource>,
    stores:    Vec<DepletableResource>,
}

impl<M> Kernel<M> {
    fn new() -> Self {
        Self {
            clock:     SimClock::new(),
            processes: Vec::new(),
            resources: Vec::new(),
            stores:    Vec::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn add_resource(&mut self, resource: Resource) -> ResourceId {
        self.resources.push(resource);
        ResourceId(self.resources.len() - 1)
    }

    pub fn add_store(&mut self, store: DepletableResource) -> StoreId {
        self.stores.push(store);
        StoreId(self.stores.len() - 1)
    }

    pub fn resource(&self, id: ResourceId) -> SimResult<&Resource> {
        self.resources.get(id.0).ok_or(SimError::UnknownResource(id))
    }

    pub fn store(&self, id: StoreId) -> SimResult<&DepletableResource> {
        self.stores.get(id.0).ok_or(SimError::UnknownStore(id))
    }

    fn store_mut(&mut self, id: StoreId) -> SimResult<&mut DepletableResource> {
        self.stores.get_mut(id.0).ok_or(SimError::UnknownStore(id))
    }

    fn record(&self, process: ProcessId) -> SimResult<&ProcessRecord<M>> {
        self.processes.get(process.0).ok_or(SimError::UnknownProcess(process))
    }

    fn record_mut(&mut self, process: ProcessId) -> SimResult<&mut ProcessRecord<M>> {
        self.processes.get_mut(process.0).ok_or(SimError::UnknownProcess(process))
    }

    pub fn process_state(&self, process: ProcessId) -> SimResult<ProcessState> {
        Ok(self.record(process)?.state)
    }

    pub fn process_name(&self, process: ProcessId) -> SimResult<&str> {
        Ok(&self.record(process)?.name)
    }

    /// Register a process without scheduling it. It stays `Created` until
    /// someone activates it.
    pub fn spawn_passive(&mut self, body: Box<dyn Process<M>>) -> ProcessId {
        let id = ProcessId(self.processes.len());
        log::trace!("t={:.1} engine: spawn {:?} '{}'", self.now(), id, body.name());
        self.processes.push(ProcessRecord {
            name:       body.name().to_string(),
            state:      ProcessState::Created,
            failed:     false,
            pending:    None,
            waiting_on: None,
            body:       Some(body),
        });
        id
    }

    /// Register a process and schedule its first slice at the current time.
    pub fn spawn(&mut self, body: Box<dyn Process<M>>) -> SimResult<ProcessId> {
        let id = self.spawn_passive(body);
        self.activate(id)?;
        Ok(id)
    }

    pub fn activate(&mut self, process: ProcessId) -> SimResult<()> {
        let now = self.now();
        self.activate_at(process, now, Priority::Normal)
    }

    /// (Re)schedule `process` at `at`. Replaces any pending entry.
    pub fn activate_at(&mut self, process: ProcessId, at: SimTime, priority: Priority) -> SimResult<()> {
        let record = self.record(process)?;
        match record.state {
            ProcessState::Terminated | ProcessState::Cancelled => {
                log::trace!("t={:.1} engine: activate on finished '{}' ignored", self.now(), record.name);
                return Ok(());
            }
            ProcessState::Running => {
                return Err(SimError::ProcessRunning {
                    name: record.name.clone(),
                    operation: "activate",
                });
            }
            ProcessState::Requesting => {
                self.withdraw(process)?;
                self.record_mut(process)?.failed = true;
            }
            ProcessState::Created
            | ProcessState::Scheduled
            | ProcessState::Holding
            | ProcessState::Passive => {
                self.record_mut(process)?.failed = false;
            }
        }
        self.schedule(process, at, priority, ProcessState::Scheduled)
    }

    /// Activate only if the process is idle (`Created` or `Passive`).
    /// Returns whether it was activated. Used for signalling actors that
    /// must not be interrupted mid-work.
    pub fn wake(&mut self, process: ProcessId) -> SimResult<bool> {
        match self.record(process)?.state {
            ProcessState::Created | ProcessState::Passive => {
                self.activate(process)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Remove `process` from the timeline and every wait list.
    pub fn cancel(&mut self, process: ProcessId) -> SimResult<()> {
        let record = self.record(process)?;
        match record.state {
            ProcessState::Terminated | ProcessState::Cancelled => return Ok(()),
            ProcessState::Running => {
                return Err(SimError::ProcessRunning {
                    name: record.name.clone(),
                    operation: "cancel",
                });
            }
            _ => {}
        }
        self.withdraw(process)?;
        let pending = self.record_mut(process)?.pending.take();
        if let Some(key) = pending {
            self.clock.unschedule(&key);
        }
        let now = self.now();
        let record = self.record_mut(process)?;
        record.state = ProcessState::Cancelled;
        record.body = None;
        log::debug!("t={now:.1} engine: cancelled '{}'", record.name);
        Ok(())
    }

    /// Give back units of a resource held by `holder` and resume whoever
    /// they unblock.
    pub fn release(&mut self, holder: ProcessId, resource: ResourceId, quantity: f64) -> SimResult<()> {
        let now = self.now();
        let granted = self
            .resources
            .get_mut(resource.0)
            .ok_or(SimError::UnknownResource(resource))?
            .release(now, holder, quantity)?;
        self.resume_granted(granted)
    }

    /// Number of timeline entries that would resume `process`.
    pub fn pending_entries(&self, process: ProcessId) -> usize {
        self.clock.timeline().entries_for(process)
    }

    pub fn timeline_len(&self) -> usize {
        self.clock.timeline().len()
    }

    fn schedule(
        &mut self,
        process: ProcessId,
        at: SimTime,
        priority: Priority,
        state: ProcessState,
    ) -> SimResult<()> {
        let key = self.clock.schedule_at(at, priority, process)?;
        let replaced = {
            let record = self.record_mut(process)?;
            record.state = state;
            record.pending.replace(key)
        };
        if let Some(old) = replaced {
            self.clock.unschedule(&old);
        }
        Ok(())
    }

    fn resume_granted(&mut self, granted: Vec<Grant>) -> SimResult<()> {
        let now = self.now();
        for grant in granted {
            {
                let record = self.record_mut(grant.process)?;
                record.failed = false;
                record.waiting_on = None;
            }
            self.schedule(grant.process, now, grant.priority, ProcessState::Scheduled)?;
        }
        Ok(())
    }

    /// Pull a parked process out of its wait list. Whatever its departure
    /// unblocks is granted.
    fn withdraw(&mut self, process: ProcessId) -> SimResult<()> {
        let now = self.now();
        let target = self.record_mut(process)?.waiting_on.take();
        let granted = match target {
            Some(WaitTarget::Resource(id)) => {
                let resource = self.resources.get_mut(id.0).ok_or(SimError::UnknownResource(id))?;
                resource.withdraw(process);
                resource.grant_waiting(now)
            }
            Some(WaitTarget::Store(id)) => {
                let store = self.store_mut(id)?;
                store.withdraw(process);
                store.settle(now)
            }
            None => Vec::new(),
        };
        self.resume_granted(granted)
    }

    fn park(&mut self, process: ProcessId, target: WaitTarget) -> SimResult<()> {
        let record = self.record_mut(process)?;
        record.state = ProcessState::Requesting;
        record.waiting_on = Some(target);
        Ok(())
    }

    /// Resolve a step returned by `process`.
    fn apply(&mut self, process: ProcessId, step: Step) -> SimResult<Resolution> {
        let now = self.now();
        match step {
            Step::Hold { duration, priority } => {
                if !duration.is_finite() || duration < 0.0 {
                    return Err(SimError::InvalidDuration {
                        name: self.record(process)?.name.clone(),
                        duration,
                    });
                }
                self.record_mut(process)?.failed = false;
                self.schedule(process, now + duration, priority, ProcessState::Holding)?;
                Ok(Resolution::Suspended)
            }
            Step::Request { resource, quantity, priority } => {
                let res = self
                    .resources
                    .get_mut(resource.0)
                    .ok_or(SimError::UnknownResource(resource))?;
                if res.try_claim(now, process, quantity, priority)? {
                    self.record_mut(process)?.failed = false;
                    return Ok(Resolution::Continue);
                }
                res.enqueue(process, quantity, priority);
                self.park(process, WaitTarget::Resource(resource))?;
                Ok(Resolution::Suspended)
            }
            Step::Put { store, quantity, policy, priority } => {
                self.change_level(process, store, LevelChange::Put, quantity, policy, priority)
            }
            Step::Take { store, quantity, policy, priority } => {
                self.change_level(process, store, LevelChange::Take, quantity, policy, priority)
            }
            Step::Passivate => {
                self.record_mut(process)?.state = ProcessState::Passive;
                Ok(Resolution::Suspended)
            }
            Step::Terminate => {
                let record = self.record_mut(process)?;
                record.state = ProcessState::Terminated;
                log::trace!("t={now:.1} engine: '{}' terminated", record.name);
                Ok(Resolution::Terminated)
            }
        }
    }

    fn change_level(
        &mut self,
        process: ProcessId,
        id: StoreId,
        change: LevelChange,
        quantity: f64,
        policy: AdmissionPolicy,
        priority: Priority,
    ) -> SimResult<Resolution> {
        let now = self.now();
        let store = self.store_mut(id)?;
        store.check_quantity(quantity, policy)?;
        if store.try_apply(now, change, quantity, policy) {
            let granted = store.settle(now);
            self.record_mut(process)?.failed = false;
            self.resume_granted(granted)?;
            return Ok(Resolution::Continue);
        }
        match policy {
            AdmissionPolicy::Fail => {
                self.record_mut(process)?.failed = true;
                Ok(Resolution::Continue)
            }
            AdmissionPolicy::Schedule => {
                store.enqueue(change, process, quantity, priority);
                self.park(process, WaitTarget::Store(id))?;
                Ok(Resolution::Suspended)
            }
        }
    }
}

/// What a process body sees while it runs.
pub struct ProcessContext<'a, M> {
    kernel:    &'a mut Kernel<M>,
    /// The domain model shared by every process of this run.
    pub model: &'a mut M,
    me:        ProcessId,
}

impl<M> ProcessContext<'_, M> {
    pub fn now(&self) -> SimTime {
        self.kernel.now()
    }

    pub fn me(&self) -> ProcessId {
        self.me
    }

    /// True iff the most recent request/put/take resolved unsuccessfully.
    pub fn failed(&self) -> bool {
        self.kernel.processes.get(self.me.0).map_or(false, |r| r.failed)
    }

    pub fn resource(&self, id: ResourceId) -> SimResult<&Resource> {
        self.kernel.resource(id)
    }

    pub fn store(&self, id: StoreId) -> SimResult<&DepletableResource> {
        self.kernel.store(id)
    }

    /// Release units this process holds.
    pub fn release(&mut self, resource: ResourceId, quantity: f64) -> SimResult<()> {
        let me = self.me;
        self.kernel.release(me, resource, quantity)
    }

    pub fn spawn(&mut self, body: Box<dyn Process<M>>) -> SimResult<ProcessId> {
        self.kernel.spawn(body)
    }

    pub fn spawn_passive(&mut self, body: Box<dyn Process<M>>) -> ProcessId {
        self.kernel.spawn_passive(body)
    }

    pub fn activate(&mut self, process: ProcessId) -> SimResult<()> {
        self.kernel.activate(process)
    }

    pub fn activate_at(&mut self, process: ProcessId, at: SimTime, priority: Priority) -> SimResult<()> {
        self.kernel.activate_at(process, at, priority)
    }

    pub fn wake(&mut self, process: ProcessId) -> SimResult<bool> {
        self.kernel.wake(process)
    }

    pub fn cancel(&mut self, process: ProcessId) -> SimResult<()> {
        self.kernel.cancel(process)
    }
}

/// A simulation run: the kernel plus the domain model `M`.
pub struct SimEngine<M> {
    kernel: Kernel<M>,
    model:  M,
}

impl<M> SimEngine<M> {
    /// Build an engine around a model assembled against a fresh kernel.
    /// The closure registers resources, stores and processes and returns
    /// the model that holds their handles.
    pub fn assemble<F>(build: F) -> SimResult<Self>
    where
        F: FnOnce(&mut Kernel<M>) -> SimResult<M>,
    {
        let mut kernel = Kernel::new();
        let model = build(&mut kernel)?;
        Ok(Self { kernel, model })
    }

    pub fn now(&self) -> SimTime {
        self.kernel.now()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn kernel(&self) -> &Kernel<M> {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel<M> {
        &mut self.kernel
    }

    /// Split borrow for drivers that touch the model and the kernel together.
    pub fn parts_mut(&mut self) -> (&mut Kernel<M>, &mut M) {
        (&mut self.kernel, &mut self.model)
    }

    pub fn spawn(&mut self, body: Box<dyn Process<M>>) -> SimResult<ProcessId> {
        self.kernel.spawn(body)
    }

    pub fn spawn_at(&mut self, body: Box<dyn Process<M>>, at: SimTime) -> SimResult<ProcessId> {
        let id = self.kernel.spawn_passive(body);
        self.kernel.activate_at(id, at, Priority::Normal)?;
        Ok(id)
    }

    pub fn activate(&mut self, process: ProcessId) -> SimResult<()> {
        self.kernel.activate(process)
    }

    pub fn cancel(&mut self, process: ProcessId) -> SimResult<()> {
        self.kernel.cancel(process)
    }

    /// Process every entry scheduled strictly before `until`, then move the
    /// clock to `until`.
    pub fn run_until(&mut self, until: SimTime) -> SimResult<RunResult> {
        while let Some((_, process)) = self.kernel.clock.pop_before(until) {
            self.kernel.record_mut(process)?.pending = None;
            self.resume(process)?;
        }
        let result = if self.kernel.clock.timeline().is_empty() {
            RunResult::Exhausted
        } else {
            RunResult::Complete
        };
        if until.is_finite() && until > self.kernel.now() {
            self.kernel.clock.advance_to(until);
        }
        Ok(result)
    }

    pub fn run_for(&mut self, duration: SimTime) -> SimResult<RunResult> {
        let until = self.now() + duration;
        self.run_until(until)
    }

    /// Run one slice. Returns false if nothing was scheduled.
    pub fn step(&mut self) -> SimResult<bool> {
        match self.kernel.clock.pop_before(SimTime::INFINITY) {
            Some((_, process)) => {
                self.kernel.record_mut(process)?.pending = None;
                self.resume(process)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn resume(&mut self, process: ProcessId) -> SimResult<()> {
        let Some(mut body) = self.kernel.record_mut(process)?.body.take() else {
            return Ok(());
        };
        self.kernel.record_mut(process)?.state = ProcessState::Running;
        loop {
            let step = {
                let mut cx = ProcessContext {
                    kernel: &mut self.kernel,
                    model:  &mut self.model,
                    me:     process,
                };
                body.resume(&mut cx)?
            };
            match self.kernel.apply(process, step)? {
                Resolution::Continue => continue,
                Resolution::Suspended => break,
                Resolution::Terminated => return Ok(()),
            }
        }
        self.kernel.record_mut(process)?.body = Some(body);
        Ok(())
    }
}
