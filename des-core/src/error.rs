//! Error types for the simulation kernel

use crate::time::SimTime;
use crate::types::EventId;
use thiserror::Error;

/// Top-level error type for simulation operations
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// A model built on the kernel (a queue, a job, ...) rejected an operation.
    #[error("Model error: {0}")]
    Model(Box<dyn std::error::Error + 'static>),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SimError {
    /// Wrap a model-level error raised from inside an event action.
    pub fn model<E: std::error::Error + 'static>(err: E) -> Self {
        SimError::Model(Box::new(err))
    }

    /// Try to recover the model error of type `E`.
    pub fn downcast_model<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            SimError::Model(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Errors related to event scheduling and handling
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("Invalid event time: {0}")]
    InvalidTime(String),

    #[error("Event scheduling failed: cannot schedule event at {time} before current time {now}")]
    ScheduleInPast { time: SimTime, now: SimTime },

    #[error("Event scheduling failed: event time {0} is not finite")]
    NonFiniteTime(SimTime),

    #[error("Cannot run until {bound}: current time is already {now}")]
    BoundInPast { bound: SimTime, now: SimTime },

    #[error("Event not found: {0}")]
    NotFound(EventId),
}
