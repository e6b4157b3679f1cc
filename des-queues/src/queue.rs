//! State shared by every queue, primitive or composite

use des_core::{ListenerRegistry, SimEntity, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::composite::CompositeState;
use crate::job::JobId;
use crate::notification::{QueueEvent, QueueListener};
use crate::primitive::PrimitiveState;

/// Handle to a queue owned by a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub usize);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue({})", self.0)
    }
}

/// Number of jobs a queue may still start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerAccessCredits {
    Finite(u64),
    #[default]
    Infinite,
}

impl ServerAccessCredits {
    pub fn is_available(&self) -> bool {
        match self {
            ServerAccessCredits::Finite(n) => *n > 0,
            ServerAccessCredits::Infinite => true,
        }
    }

    /// Takes one credit. Returns `true` if that was the last one.
    pub(crate) fn consume(&mut self) -> bool {
        match self {
            ServerAccessCredits::Finite(n) if *n > 0 => {
                *n -= 1;
                *n == 0
            }
            _ => false,
        }
    }
}

impl From<u64> for ServerAccessCredits {
    fn from(n: u64) -> Self {
        ServerAccessCredits::Finite(n)
    }
}

impl fmt::Display for ServerAccessCredits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAccessCredits::Finite(n) => write!(f, "{n}"),
            ServerAccessCredits::Infinite => f.write_str("∞"),
        }
    }
}

/// Point-in-time view of a queue, handed to routing policies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub id: QueueId,
    pub number_of_jobs: usize,
    pub jobs_waiting: usize,
    pub jobs_executing: usize,
    pub start_armed: bool,
    pub queue_access_vacation: bool,
    pub server_access_credits: ServerAccessCredits,
}

/// Bookkeeping common to primitive and composite queues.
///
/// Every job in the queue is in exactly one of `waiting` or `executing`, both
/// kept in arrival order.
pub struct QueueCore {
    name: String,
    pub(crate) parent: Option<QueueId>,
    pub(crate) credits: ServerAccessCredits,
    pub(crate) vacation: bool,
    pub(crate) last_update: SimTime,
    pub(crate) start_armed: bool,
    pub(crate) waiting: Vec<JobId>,
    pub(crate) executing: Vec<JobId>,
    pub(crate) arrivals: u64,
    pub(crate) listeners: ListenerRegistry<dyn QueueListener>,
    pub(crate) pending: Vec<QueueEvent>,
}

impl QueueCore {
    pub(crate) fn new(name: String, time: SimTime) -> Self {
        Self {
            name,
            parent: None,
            credits: ServerAccessCredits::Infinite,
            vacation: false,
            last_update: time,
            start_armed: false,
            waiting: Vec::new(),
            executing: Vec::new(),
            arrivals: 0,
            listeners: ListenerRegistry::new(),
            pending: Vec::new(),
        }
    }

    /// The composite queue this queue belongs to.
    pub fn parent(&self) -> Option<QueueId> {
        self.parent
    }

    pub fn server_access_credits(&self) -> ServerAccessCredits {
        self.credits
    }

    pub fn is_queue_access_vacation(&self) -> bool {
        self.vacation
    }

    pub fn is_start_armed(&self) -> bool {
        self.start_armed
    }

    pub fn jobs_waiting(&self) -> &[JobId] {
        &self.waiting
    }

    pub fn jobs_executing(&self) -> &[JobId] {
        &self.executing
    }

    pub fn number_of_jobs(&self) -> usize {
        self.waiting.len() + self.executing.len()
    }

    pub fn contains(&self, job: JobId) -> bool {
        self.waiting.contains(&job) || self.executing.contains(&job)
    }

    pub(crate) fn push(&mut self, event: QueueEvent) {
        self.pending.push(event);
    }

    pub(crate) fn remove_job(&mut self, job: JobId) -> bool {
        if let Some(index) = self.waiting.iter().position(|j| *j == job) {
            self.waiting.remove(index);
            return true;
        }
        if let Some(index) = self.executing.iter().position(|j| *j == job) {
            self.executing.remove(index);
            return true;
        }
        false
    }

    pub(crate) fn next_arrival_seq(&mut self) -> u64 {
        let seq = self.arrivals;
        self.arrivals += 1;
        seq
    }

    /// Returns the queue to its initial state at `time`. Listeners and the
    /// parent link survive.
    pub(crate) fn reset(&mut self, time: SimTime) {
        self.credits = ServerAccessCredits::Infinite;
        self.vacation = false;
        self.last_update = time;
        self.waiting.clear();
        self.executing.clear();
        self.arrivals = 0;
        self.pending.clear();
    }
}

impl SimEntity for QueueCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_update_time(&self) -> SimTime {
        self.last_update
    }
}

impl fmt::Debug for QueueCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCore")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("credits", &self.credits)
            .field("vacation", &self.vacation)
            .field("last_update", &self.last_update)
            .field("waiting", &self.waiting)
            .field("executing", &self.executing)
            .finish()
    }
}

pub(crate) enum QueueKind {
    Primitive(PrimitiveState),
    Composite(Box<CompositeState>),
}

pub(crate) struct QueueEntry {
    pub core: QueueCore,
    pub kind: QueueKind,
}
