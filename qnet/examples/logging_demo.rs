//! Logging from a small queueing network.
//!
//! Usage:
//! - Default (info level): cargo run --example logging_demo
//! - Queue transitions: RUST_LOG=des_queues=debug cargo run --example logging_demo
//! - Everything: RUST_LOG=trace cargo run --example logging_demo

use qnet::core::{init_simulation_logging_with_level, simulation_span};
use qnet::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
    -mean * (1.0 - rng.gen::<f64>()).ln()
}

fn main() -> Result<(), SimError> {
    init_simulation_logging_with_level("info");
    let _run = simulation_span("logging_demo").entered();

    let mut sim = Simulation::new(SimulationConfig::with_seed(2024));
    let front = sim.add_queue("front-desk", Discipline::fcfs())?;
    let left = sim.add_queue("counter-a", Discipline::ProcessorSharing)?;
    let right = sim.add_queue("counter-b", Discipline::ProcessorSharing)?;
    let counters = sim.add_jsq("counters", [left, right])?;
    let office = sim.add_tandem("office", [front, counters])?;

    let recorder = NotificationRecorder::without_updates();
    let log = recorder.log();
    sim.add_listener(office, Box::new(recorder))?;

    let mut rng = StdRng::seed_from_u64(sim.config().seed);
    let mut at = 0.0;
    for i in 0..20 {
        at += exponential(&mut rng, 1.0);
        let service = exponential(&mut rng, 0.8);
        let job = sim.add_job(Job::new(format!("visitor-{i}")).with_service_time(service));
        sim.schedule_arrival(SimTime::new(at), office, job)?;
    }

    info!("Starting simulation execution");
    Executor::unbound().execute(&mut sim)?;

    let departures = log.of_kind("DEPARTURE");
    info!(
        departures = departures.len(),
        final_time = %sim.time(),
        "Simulation completed"
    );
    println!("\n=== Simulation Summary ===");
    println!("{} visitors left the office", departures.len());
    println!("Final simulation time: {}", sim.time());
    Ok(())
}
