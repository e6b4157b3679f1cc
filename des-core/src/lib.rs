//! Core discrete event simulation kernel.
//!
//! This crate provides the deterministic building blocks every model runs on:
//! simulation time, the event list and its run drivers, the traits shared by
//! resettable simulation entities, and logging setup.
//!
//! # Architecture Overview
//!
//! - [`EventList`]: ordered pending events plus the current time. Events run in
//!   increasing time order and, at equal times, in insertion order.
//! - [`SimContext`]: implemented by the object that owns an event list. Event
//!   actions receive `&mut` access to that object, so a model never needs shared
//!   mutable references between its parts.
//! - [`Executor`]: runs a context until it is empty, until a time, or for a
//!   number of steps.
//!
//! # Basic Usage
//!
//! ```rust
//! use des_core::{EventList, Execute, Executor, SimContext, SimContextExt, SimTime};
//!
//! #[derive(Default)]
//! struct Counter {
//!     events: EventList<Counter>,
//!     ticks: u32,
//! }
//!
//! impl SimContext for Counter {
//!     fn event_list(&mut self) -> &mut EventList<Self> { &mut self.events }
//!     fn event_list_ref(&self) -> &EventList<Self> { &self.events }
//! }
//!
//! let mut counter = Counter::default();
//! counter.events.schedule(SimTime::new(1.0), |c: &mut Counter| { c.ticks += 1; Ok(()) }).unwrap();
//! Executor::unbound().execute(&mut counter).unwrap();
//! assert_eq!(counter.ticks, 1);
//! assert_eq!(counter.now(), SimTime::new(1.0));
//! ```

pub mod entity;
pub mod error;
pub mod event_list;
pub mod execute;
pub mod ids;
pub mod logging;
pub mod time;
pub mod types;

use serde::{Deserialize, Serialize};

pub use entity::{ListenerId, ListenerRegistry, Resettable, SimEntity, Updatable};
pub use error::{EventError, SimError};
pub use event_list::{
    Action, DefaultEventFactory, Event, EventFactory, EventList, SimContext, SimContextExt,
};
pub use execute::{Execute, Executor, ExecutorWithSideEffect};
pub use ids::derive_seed;
pub use logging::{
    event_span, init_detailed_simulation_logging, init_simulation_logging,
    init_simulation_logging_with_level, queue_span, simulation_span,
};
pub use time::SimTime;
pub use types::EventId;

/// Configuration shared by everything in one simulation instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Root seed from which every random policy derives its own seed.
    pub seed: u64,
    /// Clock value of the event list after creation and after a plain reset.
    pub start_time: SimTime,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            start_time: SimTime::zero(),
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Seed for the `counter`-th entity of the given domain.
    pub fn derive_seed(&self, domain: u64, counter: u64) -> u64 {
        ids::derive_seed(self.seed, domain, counter)
    }
}
