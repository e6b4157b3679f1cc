//! # qnet - Queueing Network Simulation
//!
//! qnet is a deterministic, replayable, discrete-event simulator for queueing
//! networks. It bundles the simulation kernel and the queue models.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! qnet = "0.1"
//! ```
//!
//! ```rust
//! use qnet::prelude::*;
//!
//! let mut sim = Simulation::new(SimulationConfig::with_seed(7));
//! let first = sim.add_queue("first", Discipline::fcfs()).unwrap();
//! let second = sim.add_queue("second", Discipline::ProcessorSharing).unwrap();
//! let tandem = sim.add_tandem("line", [first, second]).unwrap();
//!
//! let job = sim.add_job(Job::new("job").with_service_time(1.0));
//! sim.schedule_arrival(SimTime::new(0.5), tandem, job).unwrap();
//! sim.run().unwrap();
//! assert_eq!(sim.time(), SimTime::new(2.5));
//! ```

// Re-export the member crates
pub use des_core as core;

pub use des_queues as queues;

// Convenience re-exports of commonly used items
pub mod prelude {
    //! Commonly used types and traits

    pub use des_core::{
        EventList, Execute, Executor, SimContext, SimContextExt, SimError, SimTime,
        SimulationConfig,
    };

    pub use des_queues::{
        CompositeBuilder, ConfigurationError, Discipline, Job, JobId, NotificationRecorder,
        QueueError, QueueEvent, QueueId, QueueListener, QueueNotification, QueueSelector,
        ServerAccessCredits, Simulation,
    };
}
