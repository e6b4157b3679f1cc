//! The simulation host
//!
//! [`Simulation`] owns the event list, every queue and every job. Queues and
//! jobs refer to each other by id, and every operation goes through the host,
//! so scheduled actions get `&mut Simulation` and never need shared mutable
//! references into the model.
//!
//! A queue operation is one atomic transition: validate, bring the queue up to
//! the operation time, change state while collecting events, then
//! [`fire`](Simulation::fire) them as one notification. Firing a sub-queue
//! hands its notification to the enclosing composite, which processes it
//! before the outer operation returns.

use des_core::{
    queue_span, EventId, EventList, ListenerId, SimContext, SimEntity, SimTime, SimulationConfig,
};
use std::collections::HashMap;
use tracing::{debug, info, trace};

use crate::discipline::{AutoRevocationPolicy, SchedulingDiscipline};
use crate::error::{ConfigurationError, QueueError};
use crate::job::{Job, JobId, JobRef};
use crate::notification::{QueueEvent, QueueListener, QueueNotification};
use crate::primitive::PrimitiveState;
use crate::queue::{QueueCore, QueueEntry, QueueId, QueueKind, QueueStatus, ServerAccessCredits};

/// Event list, queues and jobs of one simulation.
pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) events: EventList<Simulation>,
    pub(crate) queues: Vec<QueueEntry>,
    pub(crate) jobs: HashMap<JobId, Job>,
    next_job_id: u64,
    seeds_issued: u64,
}

impl SimContext for Simulation {
    fn event_list(&mut self) -> &mut EventList<Self> {
        &mut self.events
    }

    fn event_list_ref(&self) -> &EventList<Self> {
        &self.events
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        info!(seed = config.seed, start_time = %config.start_time, "Creating simulation");
        Self {
            config,
            events: EventList::new(config.start_time),
            queues: Vec::new(),
            jobs: HashMap::new(),
            next_job_id: 0,
            seeds_issued: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current time of the event list.
    pub fn time(&self) -> SimTime {
        self.events.time()
    }

    pub fn events(&self) -> &EventList<Simulation> {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventList<Simulation> {
        &mut self.events
    }

    /// A fresh seed derived from the configured root seed, for a random policy
    /// of the given domain. Successive calls return different seeds.
    pub fn next_seed(&mut self, domain: u64) -> u64 {
        let seed = self.config.derive_seed(domain, self.seeds_issued);
        self.seeds_issued += 1;
        seed
    }

    // ----- jobs ---------------------------------------------------------

    pub fn add_job(&mut self, job: Job) -> JobId {
        self.next_job_id += 1;
        let id = JobId(self.next_job_id);
        trace!(job = %id, name = %job.name(), "Job added");
        self.jobs.insert(id, job);
        id
    }

    pub fn job(&self, id: JobId) -> Result<&Job, QueueError> {
        self.jobs.get(&id).ok_or(QueueError::JobNotFound(id))
    }

    pub fn job_mut(&mut self, id: JobId) -> Result<&mut Job, QueueError> {
        self.jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))
    }

    /// Removes a job that is not in any queue.
    pub fn remove_job(&mut self, id: JobId) -> Result<Job, QueueError> {
        if let Some(queue) = self.job(id)?.queue() {
            return Err(QueueError::JobBusy { job: id, queue });
        }
        self.jobs.remove(&id).ok_or(QueueError::JobNotFound(id))
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn job_ref(&self, id: JobId) -> JobRef {
        JobRef {
            id,
            name: self
                .jobs
                .get(&id)
                .map(|job| job.name().to_string())
                .unwrap_or_default(),
        }
    }

    // ----- queues -------------------------------------------------------

    /// Adds a primitive queue, rejecting invalid discipline parameters.
    pub fn add_queue<D>(
        &mut self,
        name: impl Into<String>,
        discipline: D,
    ) -> Result<QueueId, ConfigurationError>
    where
        D: SchedulingDiscipline + 'static,
    {
        self.add_queue_with_policy(name, discipline, AutoRevocationPolicy::Disabled)
    }

    pub fn add_queue_with_policy<D>(
        &mut self,
        name: impl Into<String>,
        discipline: D,
        auto_revocation: AutoRevocationPolicy,
    ) -> Result<QueueId, ConfigurationError>
    where
        D: SchedulingDiscipline + 'static,
    {
        discipline.validate()?;
        let state = PrimitiveState::new(Box::new(discipline), auto_revocation);
        let armed = state.is_start_armed(0);
        let id = self.insert_queue(name.into(), QueueKind::Primitive(state));
        self.queues[id.0].core.start_armed = armed;
        Ok(id)
    }

    pub(crate) fn insert_queue(&mut self, name: String, kind: QueueKind) -> QueueId {
        let id = QueueId(self.queues.len());
        debug!(queue = %id, name = %name, "Queue added");
        self.queues.push(QueueEntry {
            core: QueueCore::new(name, self.events.time()),
            kind,
        });
        id
    }

    pub fn queue(&self, id: QueueId) -> Result<&QueueCore, QueueError> {
        self.queues
            .get(id.0)
            .map(|entry| &entry.core)
            .ok_or(QueueError::QueueNotFound(id))
    }

    pub fn queue_ids(&self) -> impl Iterator<Item = QueueId> {
        (0..self.queues.len()).map(QueueId)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Discipline or composite kind of a queue, e.g. `FCFS` or `Tandem`.
    pub fn describe(&self, id: QueueId) -> Result<String, QueueError> {
        let entry = self.queues.get(id.0).ok_or(QueueError::QueueNotFound(id))?;
        Ok(match &entry.kind {
            QueueKind::Primitive(state) => state.discipline().name(),
            QueueKind::Composite(composite) => composite.kind.to_string(),
        })
    }

    pub fn add_listener(
        &mut self,
        queue: QueueId,
        listener: Box<dyn QueueListener>,
    ) -> Result<ListenerId, QueueError> {
        let entry = self
            .queues
            .get_mut(queue.0)
            .ok_or(QueueError::QueueNotFound(queue))?;
        Ok(entry.core.listeners.register(listener))
    }

    pub fn remove_listener(
        &mut self,
        queue: QueueId,
        listener: ListenerId,
    ) -> Result<bool, QueueError> {
        let entry = self
            .queues
            .get_mut(queue.0)
            .ok_or(QueueError::QueueNotFound(queue))?;
        Ok(entry.core.listeners.remove(listener).is_some())
    }

    pub(crate) fn core(&self, q: QueueId) -> &QueueCore {
        &self.queues[q.0].core
    }

    pub(crate) fn core_mut(&mut self, q: QueueId) -> &mut QueueCore {
        &mut self.queues[q.0].core
    }

    pub(crate) fn is_composite(&self, q: QueueId) -> bool {
        matches!(self.queues[q.0].kind, QueueKind::Composite(_))
    }

    fn check_queue(&self, q: QueueId) -> Result<(), QueueError> {
        self.queue(q).map(|_| ())
    }

    fn check_top_level(&self, q: QueueId) -> Result<(), QueueError> {
        match self.queue(q)?.parent() {
            Some(parent) => Err(QueueError::NotTopLevel { queue: q, parent }),
            None => Ok(()),
        }
    }

    /// Operation times may not precede the event list nor the queue's last update.
    fn check_time(&self, q: QueueId, time: SimTime) -> Result<(), QueueError> {
        let last_update = self.core(q).last_update.max(self.events.time());
        if time < last_update {
            return Err(QueueError::TimeInPast {
                queue: q,
                time,
                last_update,
            });
        }
        Ok(())
    }

    // ----- operations ---------------------------------------------------

    /// Offers `job` to a top-level queue at `time`.
    pub fn arrive(&mut self, queue: QueueId, job: JobId, time: SimTime) -> Result<(), QueueError> {
        self.check_top_level(queue)?;
        self.arrive_at(queue, job, time)
    }

    pub(crate) fn arrive_at(
        &mut self,
        queue: QueueId,
        job: JobId,
        time: SimTime,
    ) -> Result<(), QueueError> {
        self.check_time(queue, time)?;
        let _span = queue_span(self.core(queue).name(), queue.0).entered();
        if let Some(current) = self.job(job)?.queue() {
            return Err(QueueError::JobAlreadyInQueue {
                job,
                queue: current,
            });
        }
        if self.is_composite(queue) {
            self.composite_arrive(queue, job, time)
        } else {
            self.primitive_arrive(queue, job, time)
        }
    }

    /// Attempts to take `job` out of a top-level queue at `time`.
    ///
    /// A waiting job is always revoked. A job in service is revoked only when
    /// `interrupt_service` is set. Returns whether the job left.
    pub fn revoke(
        &mut self,
        queue: QueueId,
        job: JobId,
        time: SimTime,
        interrupt_service: bool,
    ) -> Result<bool, QueueError> {
        self.check_top_level(queue)?;
        self.revoke_at(queue, job, time, interrupt_service)
    }

    pub(crate) fn revoke_at(
        &mut self,
        queue: QueueId,
        job: JobId,
        time: SimTime,
        interrupt_service: bool,
    ) -> Result<bool, QueueError> {
        self.check_time(queue, time)?;
        let _span = queue_span(self.core(queue).name(), queue.0).entered();
        if self.job(job)?.queue() != Some(queue) {
            return Err(QueueError::JobNotInQueue { job, queue });
        }
        if self.is_composite(queue) {
            self.composite_revoke(queue, job, time, interrupt_service)
        } else {
            self.primitive_revoke(queue, job, time, interrupt_service)
        }
    }

    /// Starts or ends a queue-access vacation, during which arrivals are dropped.
    /// Setting the current value does nothing.
    pub fn set_queue_access_vacation(
        &mut self,
        queue: QueueId,
        time: SimTime,
        vacation: bool,
    ) -> Result<(), QueueError> {
        self.check_queue(queue)?;
        self.check_time(queue, time)?;
        if self.core(queue).vacation == vacation {
            return Ok(());
        }
        self.update_queue(queue, time)?;
        let core = self.core_mut(queue);
        core.vacation = vacation;
        core.push(QueueEvent::QueueAccessVacation { started: vacation });
        debug!(queue = %queue, time = %time, vacation, "Queue-access vacation changed");
        self.fire(queue)
    }

    /// Sets the number of jobs the queue may still start.
    /// Setting the current value does nothing.
    pub fn set_server_access_credits(
        &mut self,
        queue: QueueId,
        time: SimTime,
        credits: ServerAccessCredits,
    ) -> Result<(), QueueError> {
        self.check_queue(queue)?;
        self.check_time(queue, time)?;
        if self.core(queue).credits == credits {
            return Ok(());
        }
        debug!(queue = %queue, time = %time, credits = %credits, "Server-access credits set");
        if self.is_composite(queue) {
            self.composite_set_credits(queue, time, credits)
        } else {
            self.primitive_set_credits(queue, time, credits)
        }
    }

    /// Brings the queue up to `time` without any other change. A composite
    /// brings its sub-queues along.
    pub fn update(&mut self, queue: QueueId, time: SimTime) -> Result<(), QueueError> {
        self.check_queue(queue)?;
        self.check_time(queue, time)?;
        self.update_at(queue, time)
    }

    fn update_at(&mut self, queue: QueueId, time: SimTime) -> Result<(), QueueError> {
        self.update_queue(queue, time)?;
        self.fire(queue)?;
        if self.is_composite(queue) {
            for sub in self.sub_queues(queue)?.to_vec() {
                self.update_at(sub, time)?;
            }
        }
        Ok(())
    }

    /// Resets a top-level queue to its initial state at the current time,
    /// removing every job it holds.
    pub fn reset_queue(&mut self, queue: QueueId) -> Result<(), QueueError> {
        self.check_top_level(queue)?;
        self.reset_queue_at(queue)
    }

    pub(crate) fn reset_queue_at(&mut self, queue: QueueId) -> Result<(), QueueError> {
        self.check_queue(queue)?;
        let _span = queue_span(self.core(queue).name(), queue.0).entered();
        if self.is_composite(queue) {
            self.composite_reset(queue)
        } else {
            self.primitive_reset(queue)
        }
    }

    /// Discards every pending event, moves the clock to `time` and resets every
    /// top-level queue. Composites reset their own sub-queues.
    pub fn reset(&mut self, time: SimTime) -> Result<(), QueueError> {
        info!(time = %time, queues = self.queues.len(), "Resetting simulation");
        self.events.reset(time);
        for index in 0..self.queues.len() {
            let queue = QueueId(index);
            if self.core(queue).parent.is_none() {
                self.reset_queue_at(queue)?;
            }
        }
        Ok(())
    }

    /// Resets to the configured start time.
    pub fn reset_to_start(&mut self) -> Result<(), QueueError> {
        self.reset(self.config.start_time)
    }

    // ----- scheduling helpers -------------------------------------------

    pub fn schedule_arrival(
        &mut self,
        time: SimTime,
        queue: QueueId,
        job: JobId,
    ) -> Result<EventId, QueueError> {
        self.check_top_level(queue)?;
        self.job(job)?;
        Ok(self
            .events
            .schedule_named(time, "arrival", move |sim: &mut Simulation| {
                sim.arrive(queue, job, time)?;
                Ok(())
            })?)
    }

    pub fn schedule_revocation(
        &mut self,
        time: SimTime,
        queue: QueueId,
        job: JobId,
        interrupt_service: bool,
    ) -> Result<EventId, QueueError> {
        self.check_top_level(queue)?;
        self.job(job)?;
        Ok(self
            .events
            .schedule_named(time, "revocation", move |sim: &mut Simulation| {
                // Gone already (departed, dropped or revoked): nothing to do.
                if sim.job(job)?.queue() == Some(queue) {
                    sim.revoke(queue, job, time, interrupt_service)?;
                }
                Ok(())
            })?)
    }

    pub fn schedule_queue_access_vacation(
        &mut self,
        time: SimTime,
        queue: QueueId,
        vacation: bool,
    ) -> Result<EventId, QueueError> {
        self.check_queue(queue)?;
        Ok(self
            .events
            .schedule_named(time, "queue-access-vacation", move |sim: &mut Simulation| {
                sim.set_queue_access_vacation(queue, time, vacation)?;
                Ok(())
            })?)
    }

    pub fn schedule_server_access_credits(
        &mut self,
        time: SimTime,
        queue: QueueId,
        credits: ServerAccessCredits,
    ) -> Result<EventId, QueueError> {
        self.check_queue(queue)?;
        Ok(self
            .events
            .schedule_named(time, "server-access-credits", move |sim: &mut Simulation| {
                sim.set_server_access_credits(queue, time, credits)?;
                Ok(())
            })?)
    }

    // ----- queries ------------------------------------------------------

    pub fn status(&self, queue: QueueId) -> Result<QueueStatus, QueueError> {
        self.check_queue(queue)?;
        Ok(self.status_of(queue))
    }

    pub(crate) fn status_of(&self, queue: QueueId) -> QueueStatus {
        let core = self.core(queue);
        QueueStatus {
            id: queue,
            number_of_jobs: core.number_of_jobs(),
            jobs_waiting: core.waiting.len(),
            jobs_executing: core.executing.len(),
            start_armed: core.start_armed,
            queue_access_vacation: core.vacation,
            server_access_credits: core.credits,
        }
    }

    pub fn number_of_jobs(&self, queue: QueueId) -> Result<usize, QueueError> {
        Ok(self.queue(queue)?.number_of_jobs())
    }

    pub fn jobs_waiting(&self, queue: QueueId) -> Result<usize, QueueError> {
        Ok(self.queue(queue)?.waiting.len())
    }

    pub fn jobs_executing(&self, queue: QueueId) -> Result<usize, QueueError> {
        Ok(self.queue(queue)?.executing.len())
    }

    pub fn is_start_armed(&self, queue: QueueId) -> Result<bool, QueueError> {
        Ok(self.queue(queue)?.start_armed)
    }

    /// Whether a job arriving now would leave the waiting area without waiting.
    pub fn is_no_wait_armed(&self, queue: QueueId) -> Result<bool, QueueError> {
        self.check_queue(queue)?;
        Ok(self.no_wait_armed(queue))
    }

    pub(crate) fn no_wait_armed(&self, queue: QueueId) -> bool {
        let entry = &self.queues[queue.0];
        match &entry.kind {
            QueueKind::Primitive(state) => state.is_no_wait_armed(&entry.core),
            QueueKind::Composite(_) => self.composite_no_wait_armed(queue),
        }
    }

    pub fn server_access_credits(&self, queue: QueueId) -> Result<ServerAccessCredits, QueueError> {
        Ok(self.queue(queue)?.credits)
    }

    pub fn is_queue_access_vacation(&self, queue: QueueId) -> Result<bool, QueueError> {
        Ok(self.queue(queue)?.vacation)
    }

    pub fn last_update_time(&self, queue: QueueId) -> Result<SimTime, QueueError> {
        Ok(self.queue(queue)?.last_update_time())
    }

    // ----- plumbing -----------------------------------------------------

    /// Brings `q` up to `time`, accumulating service and announcing the update.
    pub(crate) fn update_queue(&mut self, q: QueueId, time: SimTime) -> Result<(), QueueError> {
        let last_update = self.core(q).last_update;
        if time < last_update {
            return Err(QueueError::TimeInPast {
                queue: q,
                time,
                last_update,
            });
        }
        if time > last_update {
            self.advance_service(q, time - last_update);
            let core = self.core_mut(q);
            core.last_update = time;
            core.push(QueueEvent::Update);
        }
        Ok(())
    }

    /// Re-evaluates the start-armed state, announcing a change.
    pub(crate) fn refresh_start_armed(&mut self, q: QueueId) {
        let armed = match &self.queues[q.0].kind {
            QueueKind::Primitive(state) => state.is_start_armed(self.core(q).executing.len()),
            QueueKind::Composite(_) => self.composite_start_armed(q),
        };
        let core = self.core_mut(q);
        if core.start_armed != armed {
            core.start_armed = armed;
            core.push(QueueEvent::StartArmed(armed));
        }
    }

    /// Takes `job` out of `q` and announces its exit with `event`.
    pub(crate) fn exit_job(&mut self, q: QueueId, job: JobId, event: fn(JobRef) -> QueueEvent) {
        let time = self.core(q).last_update;
        let job_ref = self.job_ref(job);
        self.core_mut(q).remove_job(job);
        if let Some(departure) = self.jobs.get_mut(&job).and_then(|j| j.detach(time)) {
            self.events.cancel(departure);
        }
        self.core_mut(q).push(event(job_ref));
    }

    /// Delivers the events collected since the last call as one notification:
    /// first to the queue's own listeners, then to the enclosing composite.
    pub(crate) fn fire(&mut self, q: QueueId) -> Result<(), QueueError> {
        let core = self.core_mut(q);
        if core.pending.is_empty() {
            return Ok(());
        }
        let notification = QueueNotification {
            time: core.last_update,
            queue: q,
            events: std::mem::take(&mut core.pending),
        };
        trace!(
            queue = %q,
            time = %notification.time,
            events = ?notification.events.iter().map(QueueEvent::kind).collect::<Vec<_>>(),
            "Firing notification"
        );

        let Simulation { queues, events, .. } = self;
        for listener in queues[q.0].core.listeners.iter_mut() {
            listener.notify(&notification, events);
        }

        if let Some(parent) = self.core(q).parent {
            self.deliver_to_parent(parent, notification)?;
        }
        Ok(())
    }
}
