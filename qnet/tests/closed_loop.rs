//! A closed network driven by a listener: every job that leaves the server
//! thinks for a while and comes back.

use std::cell::RefCell;
use std::rc::Rc;

use qnet::prelude::*;
use qnet::queues::JobRef;

struct ThinkTime {
    queue: QueueId,
    think: f64,
    departures: Rc<RefCell<Vec<(f64, JobId)>>>,
}

impl QueueListener for ThinkTime {
    fn notify(&mut self, notification: &QueueNotification, events: &mut EventList<Simulation>) {
        for event in &notification.events {
            if let QueueEvent::Departure(JobRef { id, .. }) = event {
                self.departures
                    .borrow_mut()
                    .push((notification.time.as_f64(), *id));
                let (queue, job) = (self.queue, *id);
                let back = notification.time + self.think;
                events
                    .schedule(back, move |sim: &mut Simulation| {
                        sim.arrive(queue, job, back)?;
                        Ok(())
                    })
                    .unwrap();
            }
        }
    }
}

fn closed_loop(population: usize) -> (Simulation, QueueId, Rc<RefCell<Vec<(f64, JobId)>>>) {
    let mut sim = Simulation::default();
    let server = sim.add_queue("server", Discipline::fcfs()).unwrap();
    let departures = Rc::new(RefCell::new(Vec::new()));
    sim.add_listener(
        server,
        Box::new(ThinkTime {
            queue: server,
            think: 3.0,
            departures: departures.clone(),
        }),
    )
    .unwrap();
    for i in 0..population {
        let job = sim.add_job(Job::new(format!("user-{i}")).with_service_time(1.0));
        sim.arrive(server, job, SimTime::zero()).unwrap();
    }
    (sim, server, departures)
}

#[test]
fn listeners_can_keep_a_closed_network_going() {
    let (mut sim, server, departures) = closed_loop(2);
    Executor::timed(SimTime::new(10.0)).execute(&mut sim).unwrap();

    // user-0 cycles every 4 time units, user-1 one unit behind it.
    let times: Vec<f64> = departures.borrow().iter().map(|(time, _)| *time).collect();
    assert_eq!(times, vec![1.0, 2.0, 5.0, 6.0, 9.0, 10.0]);
    assert_eq!(sim.time(), SimTime::new(10.0));
    assert_eq!(sim.number_of_jobs(server).unwrap(), 0);
    assert!(!sim.events().is_empty());
}

#[test]
fn population_is_conserved_on_every_step() {
    let (mut sim, server, departures) = closed_loop(5);
    Executor::steps(200)
        .side_effect(|sim: &Simulation| {
            let core = sim.queue(server).unwrap();
            // One pending departure per job in service, one pending return per thinking job.
            let thinking = sim.events().len() - core.jobs_executing().len();
            assert_eq!(core.number_of_jobs() + thinking, 5);
        })
        .execute(&mut sim)
        .unwrap();
    assert!(departures.borrow().len() > 50);
}
