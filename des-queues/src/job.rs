//! Jobs and their per-visit bookkeeping

use des_core::{EventId, SimEntity, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::queue::QueueId;

/// Handle to a job owned by a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", self.0)
    }
}

/// The job a notification is about, as seen by listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub id: JobId,
    pub name: String,
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.id.0)
    }
}

/// A unit of work that visits queues.
///
/// A job is in at most one queue at a time. The service time it requests may
/// differ per queue; queues without an explicit entry use the default.
#[derive(Debug, Clone)]
pub struct Job {
    name: String,
    default_service_time: f64,
    service_times: HashMap<QueueId, f64>,
    queue: Option<QueueId>,
    delegate_for: Option<JobId>,
    last_update: SimTime,
    pub(crate) visit: Option<Visit>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_service_time: 0.0,
            service_times: HashMap::new(),
            queue: None,
            delegate_for: None,
            last_update: SimTime::zero(),
            visit: None,
        }
    }

    /// Sets the service time requested at every queue without an explicit entry.
    pub fn with_service_time(mut self, service_time: f64) -> Self {
        self.default_service_time = service_time;
        self
    }

    /// Sets the service time requested at one particular queue.
    pub fn with_service_time_at(mut self, queue: QueueId, service_time: f64) -> Self {
        self.service_times.insert(queue, service_time);
        self
    }

    pub fn set_service_time_at(&mut self, queue: QueueId, service_time: f64) {
        self.service_times.insert(queue, service_time);
    }

    /// Copy of this job's service requirements under a new identity.
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_service_time: self.default_service_time,
            service_times: self.service_times.clone(),
            ..Self::new("")
        }
    }

    pub fn default_service_time(&self) -> f64 {
        self.default_service_time
    }

    /// Service time this job requests at `queue`.
    pub fn service_time(&self, queue: QueueId) -> f64 {
        self.service_times
            .get(&queue)
            .copied()
            .unwrap_or(self.default_service_time)
    }

    /// The queue currently holding this job.
    pub fn queue(&self) -> Option<QueueId> {
        self.queue
    }

    /// The real job this job stands in for, if it was created by a composite queue.
    pub fn delegate_for(&self) -> Option<JobId> {
        self.delegate_for
    }

    pub fn arrival_time(&self) -> Option<SimTime> {
        self.visit.as_ref().map(|v| v.arrival_time)
    }

    pub fn start_time(&self) -> Option<SimTime> {
        self.visit.as_ref().and_then(|v| v.start_time)
    }

    pub fn is_started(&self) -> bool {
        self.start_time().is_some()
    }

    /// Service received during the current visit, as of the last update of its queue.
    pub fn service_received(&self) -> f64 {
        self.visit.as_ref().map_or(0.0, |v| v.service_received)
    }

    /// Service still owed during the current visit.
    pub fn remaining_service(&self) -> Option<f64> {
        self.visit
            .as_ref()
            .map(|v| (v.service_required - v.service_received).max(0.0))
    }

    pub(crate) fn attach(&mut self, visit: Visit) {
        self.queue = Some(visit.queue);
        self.last_update = visit.arrival_time;
        self.visit = Some(visit);
    }

    /// Leaves the current queue, returning the pending departure event if any.
    pub(crate) fn detach(&mut self, time: SimTime) -> Option<EventId> {
        self.queue = None;
        self.last_update = time;
        self.visit.take().and_then(|v| v.departure_event)
    }

    /// Undoes an [`attach`](Job::attach) that never became visible.
    pub(crate) fn abandon_visit(&mut self, last_update: SimTime) {
        self.queue = None;
        self.last_update = last_update;
        self.visit = None;
    }

    pub(crate) fn mark_delegate_for(&mut self, real: JobId) {
        self.delegate_for = Some(real);
    }

    pub(crate) fn visit_mut(&mut self) -> Option<&mut Visit> {
        self.visit.as_mut()
    }
}

impl SimEntity for Job {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_update_time(&self) -> SimTime {
        self.last_update
    }
}

/// State of one job inside one queue.
#[derive(Debug, Clone)]
pub(crate) struct Visit {
    pub queue: QueueId,
    pub arrival_time: SimTime,
    /// Arrival order within the queue.
    pub arrival_seq: u64,
    pub start_time: Option<SimTime>,
    pub service_required: f64,
    pub service_received: f64,
    pub departure_event: Option<EventId>,
}

impl Visit {
    pub fn new(queue: QueueId, arrival_time: SimTime, arrival_seq: u64, service_required: f64) -> Self {
        Self {
            queue,
            arrival_time,
            arrival_seq,
            start_time: None,
            service_required,
            service_received: 0.0,
            departure_event: None,
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.service_required - self.service_received).max(0.0)
    }
}
