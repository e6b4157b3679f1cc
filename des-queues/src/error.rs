//! Error types for queues, jobs and composite construction

use des_core::{EventError, SimError, SimTime};
use thiserror::Error;

use crate::job::JobId;
use crate::queue::QueueId;

/// Contract violations raised by queue operations.
///
/// A failed call leaves the simulation unchanged. Inputs are validated before
/// any state is touched, and a composite whose selector fails takes back the
/// arrival or start in progress. When new credits let several jobs start and a
/// later one fails, the jobs started before it keep their place.
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
    #[error("Queue not found: {0}")]
    QueueNotFound(QueueId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("{job} is already in {queue}")]
    JobAlreadyInQueue { job: JobId, queue: QueueId },

    #[error("{job} is not in {queue}")]
    JobNotInQueue { job: JobId, queue: QueueId },

    #[error("{job} cannot be removed while it is in {queue}")]
    JobBusy { job: JobId, queue: QueueId },

    #[error("{queue} is a sub-queue of {parent}; address the composite instead")]
    NotTopLevel { queue: QueueId, parent: QueueId },

    #[error("{0} is not a composite queue")]
    NotComposite(QueueId),

    #[error("{0} is not a primitive queue")]
    NotPrimitive(QueueId),

    #[error("Time {time} at {queue} is before its last update at {last_update}")]
    TimeInPast {
        queue: QueueId,
        time: SimTime,
        last_update: SimTime,
    },

    #[error("Invalid requested service time {service_time} for {job} at {queue}")]
    InvalidServiceTime {
        job: JobId,
        queue: QueueId,
        service_time: f64,
    },

    #[error("Selector of {queue} chose sub-queue {index}, but there are only {count}")]
    InvalidSelection {
        queue: QueueId,
        index: usize,
        count: usize,
    },

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

/// Problems detected while building a queue, before any job is involved.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Composite '{0}' needs at least one sub-queue")]
    NoSubQueues(String),

    #[error("Composite '{0}' has no queue selector")]
    MissingSelector(String),

    #[error("Sub-queue {0} does not exist")]
    UnknownSubQueue(QueueId),

    #[error("Sub-queue {0} is listed more than once")]
    DuplicateSubQueue(QueueId),

    #[error("Sub-queue {queue} already belongs to composite {parent}")]
    AlreadyEmbedded { queue: QueueId, parent: QueueId },

    #[error("Expected {expected} sub-queues, got {actual}")]
    SubQueueCount { expected: usize, actual: usize },
}

impl ConfigurationError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<QueueError> for SimError {
    fn from(err: QueueError) -> Self {
        SimError::model(err)
    }
}

impl From<ConfigurationError> for SimError {
    fn from(err: ConfigurationError) -> Self {
        SimError::Configuration(err.to_string())
    }
}
