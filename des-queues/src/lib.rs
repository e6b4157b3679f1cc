//! Queueing-network models on top of `des-core`.
//!
//! This crate provides the queue state machine and everything built on it:
//! jobs, primitive queueing disciplines, notifications and listeners, and
//! composite queues assembled from other queues.
//!
//! # Architecture Overview
//!
//! - [`Simulation`]: owns the event list, every queue and every job. Queues and
//!   jobs are addressed by [`QueueId`] and [`JobId`].
//! - [`Discipline`]: the standard primitive disciplines (FCFS, LCFS, SJF, PS,
//!   IS, ...). Custom disciplines implement [`SchedulingDiscipline`].
//! - [`QueueListener`]: receives one [`QueueNotification`] per atomic state
//!   change of a queue. [`NotificationRecorder`] keeps them for inspection.
//! - [`composite`]: tandem, parallel, Jackson, feedback, encapsulator and
//!   drop-collector queues, and the [`CompositeBuilder`] behind them.
//!
//! # Basic Usage
//!
//! ```rust
//! use des_core::{SimContextExt, SimTime};
//! use des_queues::{Discipline, Job, NotificationRecorder, Simulation};
//!
//! let mut sim = Simulation::default();
//! let queue = sim.add_queue("server", Discipline::fcfs()).unwrap();
//! let recorder = NotificationRecorder::without_updates();
//! let log = recorder.log();
//! sim.add_listener(queue, Box::new(recorder)).unwrap();
//!
//! for (i, arrival) in [0.0, 1.0].into_iter().enumerate() {
//!     let job = sim.add_job(Job::new(format!("job-{i}")).with_service_time(2.0));
//!     sim.schedule_arrival(SimTime::new(arrival), queue, job).unwrap();
//! }
//! sim.run().unwrap();
//!
//! let departures: Vec<f64> = log.of_kind("DEPARTURE").iter().map(|r| r.time).collect();
//! assert_eq!(departures, vec![2.0, 4.0]);
//! ```

pub mod composite;
pub mod discipline;
pub mod error;
pub mod job;
pub mod notification;
mod primitive;
pub mod queue;
pub mod simulation;

pub use composite::delegate::{
    DefaultDelegateJobFactory, DelegateJobFactory, EncapsulatorDelegateJobFactory,
};
pub use composite::feedback::{
    FeedbackController, FeedbackSelector, NumVisitsFeedback, ProbabilisticFeedback,
};
pub use composite::selector::{
    JacksonSelector, JoinShortestQueueSelector, PatternSelector, QueueSelector, RandomSelector,
    RoutingContext, SingleQueueSelector, TandemSelector,
};
pub use composite::{CompositeBuilder, CompositeKind, RoutingMode, StartModel};
pub use discipline::{
    Admission, AdmissionPolicy, AutoRevocationPolicy, Discipline, PreemptionStrategy,
    PreemptiveOrder, SchedulingDiscipline, ServiceModel, StartOrder,
};
pub use error::{ConfigurationError, QueueError};
pub use job::{Job, JobId, JobRef};
pub use notification::{
    NotificationLog, NotificationRecord, NotificationRecorder, QueueEvent, QueueListener,
    QueueNotification,
};
pub use queue::{QueueCore, QueueId, QueueStatus, ServerAccessCredits};
pub use simulation::Simulation;
