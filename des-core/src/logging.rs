//! Structured logging for discrete event simulation debugging
//!
//! The kernel and the queue models log through `tracing`. Nothing is printed
//! until a subscriber is installed, either by the host application or with one
//! of the initialisers below.
//!
//! # Controlling the output
//!
//! ```rust,no_run
//! use des_core::init_simulation_logging_with_level;
//! init_simulation_logging_with_level("debug");
//! ```
//!
//! `RUST_LOG` takes precedence over the level passed in:
//!
//! ```bash
//! RUST_LOG=des_core::event_list=trace,des_queues=debug cargo test
//! ```
//!
//! # Log level guidelines
//! - **TRACE**: every scheduled, cancelled and executed event
//! - **DEBUG**: queue state transitions (arrival, start, departure, ...)
//! - **INFO**: simulation runs and resets
//! - **WARN**: notifications that could not be matched to a job
//! - **ERROR**: event actions that fail and abort a run

use crate::{EventId, SimTime};
use tracing::{info, Span};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for the simulation at INFO level
pub fn init_simulation_logging() {
    init_simulation_logging_with_level("info")
}

/// Initialize logging with a specific level
///
/// # Arguments
/// * `level` - Log level: "trace", "debug", "info", "warn", or "error"
///
/// Calling this more than once is harmless; later calls keep the first subscriber.
pub fn init_simulation_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{level},des_core::event_list=info").into()
    });

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!("Simulation logging initialized at level: {}", level);
    }
}

/// Initialize logging with every event and queue transition visible
pub fn init_detailed_simulation_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trace,des_core=trace,des_queues=trace".into());

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!("Detailed simulation logging initialized");
    }
}

/// Create a span for tracking a whole simulation run
pub fn simulation_span(name: &str) -> Span {
    tracing::info_span!("simulation", name = name)
}

/// Create a span for tracking a state transition of one queue
pub fn queue_span(queue_name: &str, queue_index: usize) -> Span {
    tracing::debug_span!("queue", name = queue_name, index = queue_index)
}

/// Create a span for tracking event processing
pub fn event_span(event_id: EventId, event_type: &str, time: SimTime) -> Span {
    tracing::trace_span!("event",
        id = %event_id,
        event_type = event_type,
        time = %time
    )
}
