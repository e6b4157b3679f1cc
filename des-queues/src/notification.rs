//! Queue notifications and listeners
//!
//! Every state transition of a queue produces one [`QueueNotification`]: the
//! ordered batch of everything that happened during that transition, all at
//! the same time. Listeners see whole batches, never a transition in progress.

use des_core::{EventList, SimTime};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

use crate::job::JobRef;
use crate::queue::QueueId;
use crate::simulation::Simulation;

/// One thing that happened at a queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueueEvent {
    Reset,
    /// The queue was brought up to a later time.
    Update,
    Arrival(JobRef),
    Start(JobRef),
    Drop(JobRef),
    Revocation(JobRef),
    AutoRevocation(JobRef),
    Departure(JobRef),
    QueueAccessVacation { started: bool },
    ServerAccessCredits { available: bool },
    StartArmed(bool),
}

impl QueueEvent {
    pub fn job(&self) -> Option<&JobRef> {
        match self {
            QueueEvent::Arrival(job)
            | QueueEvent::Start(job)
            | QueueEvent::Drop(job)
            | QueueEvent::Revocation(job)
            | QueueEvent::AutoRevocation(job)
            | QueueEvent::Departure(job) => Some(job),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::Reset => "RESET",
            QueueEvent::Update => "UPDATE",
            QueueEvent::Arrival(_) => "ARRIVAL",
            QueueEvent::Start(_) => "START",
            QueueEvent::Drop(_) => "DROP",
            QueueEvent::Revocation(_) => "REVOCATION",
            QueueEvent::AutoRevocation(_) => "AUTO_REVOCATION",
            QueueEvent::Departure(_) => "DEPARTURE",
            QueueEvent::QueueAccessVacation { started: true } => "QAV_START",
            QueueEvent::QueueAccessVacation { started: false } => "QAV_END",
            QueueEvent::ServerAccessCredits { available: true } => "REGAINED_SAC",
            QueueEvent::ServerAccessCredits { available: false } => "OUT_OF_SAC",
            QueueEvent::StartArmed(true) => "STA_TRUE",
            QueueEvent::StartArmed(false) => "STA_FALSE",
        }
    }

    /// Whether the job leaves the queue with this event.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            QueueEvent::Drop(_)
                | QueueEvent::Revocation(_)
                | QueueEvent::AutoRevocation(_)
                | QueueEvent::Departure(_)
        )
    }
}

/// The atomic outcome of one queue transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueNotification {
    pub time: SimTime,
    pub queue: QueueId,
    pub events: Vec<QueueEvent>,
}

/// Observer of queue notifications.
///
/// Override [`notify`](QueueListener::notify) to see whole batches, or any of
/// the per-event callbacks, which the default `notify` calls in batch order.
/// Listeners may schedule events but cannot call back into queues while a
/// notification is being delivered.
pub trait QueueListener {
    fn notify(&mut self, notification: &QueueNotification, _events: &mut EventList<Simulation>) {
        let time = notification.time;
        let queue = notification.queue;
        for event in &notification.events {
            match event {
                QueueEvent::Reset => self.on_reset(time, queue),
                QueueEvent::Update => self.on_update(time, queue),
                QueueEvent::Arrival(job) => self.on_arrival(time, job, queue),
                QueueEvent::Start(job) => self.on_start(time, job, queue),
                QueueEvent::Drop(job) => self.on_drop(time, job, queue),
                QueueEvent::Revocation(job) => self.on_revocation(time, job, queue),
                QueueEvent::AutoRevocation(job) => self.on_auto_revocation(time, job, queue),
                QueueEvent::Departure(job) => self.on_departure(time, job, queue),
                QueueEvent::QueueAccessVacation { started } => {
                    self.on_queue_access_vacation(time, queue, *started)
                }
                QueueEvent::ServerAccessCredits { available } => {
                    self.on_server_access_credits(time, queue, *available)
                }
                QueueEvent::StartArmed(armed) => self.on_start_armed(time, queue, *armed),
            }
        }
    }

    fn on_reset(&mut self, _time: SimTime, _queue: QueueId) {}

    fn on_update(&mut self, _time: SimTime, _queue: QueueId) {}

    fn on_arrival(&mut self, _time: SimTime, _job: &JobRef, _queue: QueueId) {}

    fn on_start(&mut self, _time: SimTime, _job: &JobRef, _queue: QueueId) {}

    fn on_drop(&mut self, _time: SimTime, _job: &JobRef, _queue: QueueId) {}

    fn on_revocation(&mut self, _time: SimTime, _job: &JobRef, _queue: QueueId) {}

    fn on_auto_revocation(&mut self, _time: SimTime, _job: &JobRef, _queue: QueueId) {}

    fn on_departure(&mut self, _time: SimTime, _job: &JobRef, _queue: QueueId) {}

    fn on_queue_access_vacation(&mut self, _time: SimTime, _queue: QueueId, _started: bool) {}

    fn on_server_access_credits(&mut self, _time: SimTime, _queue: QueueId, _available: bool) {}

    fn on_start_armed(&mut self, _time: SimTime, _queue: QueueId, _armed: bool) {}
}

/// Flattened notification, one per event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub time: f64,
    pub queue: QueueId,
    /// Index of the batch this record came from, counted per recorder.
    pub batch: u64,
    pub kind: &'static str,
    pub job: Option<String>,
}

/// Shared handle to what a [`NotificationRecorder`] has seen.
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    records: Rc<RefCell<Vec<NotificationRecord>>>,
}

impl NotificationLog {
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }

    /// `(time, kind, job)` triples, the part of a record that does not depend
    /// on which queue emitted it.
    pub fn entries(&self) -> Vec<(f64, &'static str, Option<String>)> {
        self.records
            .borrow()
            .iter()
            .map(|r| (r.time, r.kind, r.job.clone()))
            .collect()
    }

    /// Records of the given kind.
    pub fn of_kind(&self, kind: &str) -> Vec<NotificationRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.records.borrow())
    }
}

/// Listener that records every notification it receives.
#[derive(Debug, Default)]
pub struct NotificationRecorder {
    log: NotificationLog,
    skip_updates: bool,
    batches: u64,
}

impl NotificationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that ignores `UPDATE` events.
    pub fn without_updates() -> Self {
        Self {
            skip_updates: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> NotificationLog {
        self.log.clone()
    }
}

impl QueueListener for NotificationRecorder {
    fn notify(&mut self, notification: &QueueNotification, _events: &mut EventList<Simulation>) {
        let batch = self.batches;
        self.batches += 1;
        let mut records = self.log.records.borrow_mut();
        for event in &notification.events {
            if self.skip_updates && matches!(event, QueueEvent::Update) {
                continue;
            }
            records.push(NotificationRecord {
                time: notification.time.as_f64(),
                queue: notification.queue,
                batch,
                kind: event.kind(),
                job: event.job().map(|job| job.name.clone()),
            });
        }
    }
}
