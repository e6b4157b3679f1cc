//! Properties every model must keep: determinism, conservation of jobs,
//! idempotent setters, replay after reset and fail-fast contracts.

use des_core::{EventError, SimContextExt, SimError, SimTime, SimulationConfig};
use des_queues::{
    Discipline, Job, JobId, NotificationLog, NotificationRecorder, QueueError, QueueId,
    ServerAccessCredits, Simulation,
};

fn t(secs: f64) -> SimTime {
    SimTime::new(secs)
}

fn record(sim: &mut Simulation, queue: QueueId) -> NotificationLog {
    let recorder = NotificationRecorder::new();
    let log = recorder.log();
    sim.add_listener(queue, Box::new(recorder)).unwrap();
    log
}

/// A small network with every kind of randomness in it: a random-order
/// queue, a random parallel split and a Jackson network behind it.
struct Network {
    sim: Simulation,
    entry: QueueId,
    logs: Vec<NotificationLog>,
    jobs: Vec<JobId>,
}

impl Network {
    fn new(seed: u64) -> Self {
        let mut sim = Simulation::new(SimulationConfig::with_seed(seed));
        let left = sim.add_queue("left", Discipline::Random { seed: seed ^ 0x5a5a }).unwrap();
        let right = sim.add_queue("right", Discipline::ProcessorSharing).unwrap();
        let split = sim.add_random_parallel("split", [left, right]).unwrap();
        let a = sim.add_queue("a", Discipline::fcfs_c(2)).unwrap();
        let b = sim.add_queue("b", Discipline::Srtf).unwrap();
        let jackson = sim
            .add_jackson("jackson", [a, b], vec![0.5, 0.5], vec![vec![0.1, 0.4], vec![0.3, 0.2]])
            .unwrap();
        let entry = sim.add_tandem("entry", [split, jackson]).unwrap();

        let logs = [entry, split, jackson, left, right, a, b]
            .into_iter()
            .map(|q| record(&mut sim, q))
            .collect();
        let jobs = (0..30)
            .map(|i| {
                let service = 0.3 + (i * 7 % 5) as f64 * 0.4;
                sim.add_job(Job::new(format!("job-{i}")).with_service_time(service))
            })
            .collect();
        Self {
            sim,
            entry,
            logs,
            jobs,
        }
    }

    fn schedule_load(&mut self) {
        let start = self.sim.time().as_f64();
        for (i, job) in self.jobs.iter().enumerate() {
            let at = t(start + i as f64 * 0.45);
            self.sim.schedule_arrival(at, self.entry, *job).unwrap();
        }
        self.sim
            .schedule_queue_access_vacation(t(start + 4.0), self.entry, true)
            .unwrap();
        self.sim
            .schedule_queue_access_vacation(t(start + 5.0), self.entry, false)
            .unwrap();
        self.sim
            .schedule_revocation(t(start + 6.1), self.entry, self.jobs[12], true)
            .unwrap();
    }

    fn traces(&self) -> Vec<Vec<(f64, &'static str, Option<String>)>> {
        self.logs.iter().map(NotificationLog::entries).collect()
    }

    fn json(&self) -> Vec<String> {
        self.logs.iter().map(|log| log.to_json().unwrap()).collect()
    }
}

#[test]
fn identical_runs_produce_identical_logs() {
    let mut first = Network::new(99);
    first.schedule_load();
    first.sim.run().unwrap();
    let mut second = Network::new(99);
    second.schedule_load();
    second.sim.run().unwrap();

    assert_eq!(first.json(), second.json());
    assert!(first.logs[0].len() > 60);
}

#[test]
fn reset_then_replay_reproduces_the_run() {
    let mut network = Network::new(5);
    network.schedule_load();
    network.sim.run().unwrap();
    let original = network.traces();

    network.sim.reset_to_start().unwrap();
    for log in &network.logs {
        assert_eq!(log.records().last().map(|r| r.kind), Some("RESET"));
        log.clear();
    }
    assert_eq!(network.sim.job_count(), network.jobs.len());
    network.schedule_load();
    network.sim.run().unwrap();

    assert_eq!(network.traces(), original);
}

#[test]
fn reset_in_the_middle_of_a_run_leaves_nothing_behind() {
    let mut network = Network::new(8);
    network.schedule_load();
    network.sim.run_until(t(7.0), true, true).unwrap();
    assert!(network.sim.number_of_jobs(network.entry).unwrap() > 0);

    network.sim.reset(t(7.0)).unwrap();
    assert!(network.sim.events().is_empty());
    assert_eq!(network.sim.job_count(), network.jobs.len());
    for queue in network.sim.queue_ids().collect::<Vec<_>>() {
        assert_eq!(network.sim.number_of_jobs(queue).unwrap(), 0);
        assert_eq!(network.sim.last_update_time(queue).unwrap(), t(7.0));
    }
    for job in &network.jobs {
        assert_eq!(network.sim.job(*job).unwrap().queue(), None);
    }
}

fn check_conservation(sim: &Simulation) {
    let mut seen = std::collections::HashSet::new();
    for queue in sim.queue_ids() {
        let core = sim.queue(queue).unwrap();
        assert_eq!(
            core.number_of_jobs(),
            core.jobs_waiting().len() + core.jobs_executing().len()
        );
        for job in core.jobs_waiting().iter().chain(core.jobs_executing()) {
            assert!(seen.insert(*job), "{job} is in two queues");
            assert_eq!(sim.job(*job).unwrap().queue(), Some(queue));
        }
    }
}

#[test]
fn every_job_is_in_at_most_one_queue_at_all_times() {
    let mut network = Network::new(3);
    network.schedule_load();
    check_conservation(&network.sim);
    while network.sim.run_single_step().unwrap() {
        check_conservation(&network.sim);
    }
    for queue in network.sim.queue_ids() {
        assert_eq!(network.sim.number_of_jobs(queue).unwrap(), 0);
    }
}

#[test]
fn setting_the_current_value_is_a_no_op() {
    let mut sim = Simulation::default();
    let queue = sim.add_queue("q", Discipline::fcfs()).unwrap();
    let inner = sim.add_queue("inner", Discipline::fcfs()).unwrap();
    let tandem = sim.add_tandem("t", [inner]).unwrap();

    for q in [queue, tandem] {
        let log = record(&mut sim, q);
        sim.set_queue_access_vacation(q, t(0.0), false).unwrap();
        sim.set_server_access_credits(q, t(0.0), ServerAccessCredits::Infinite)
            .unwrap();
        assert!(log.is_empty());

        sim.set_queue_access_vacation(q, t(1.0), true).unwrap();
        sim.set_queue_access_vacation(q, t(1.0), true).unwrap();
        sim.set_server_access_credits(q, t(1.0), ServerAccessCredits::Finite(0))
            .unwrap();
        sim.set_server_access_credits(q, t(1.0), ServerAccessCredits::Finite(0))
            .unwrap();
        let kinds: Vec<_> = log.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec!["UPDATE", "QAV_START", "OUT_OF_SAC"]);
        assert!(sim.is_queue_access_vacation(q).unwrap());
    }
}

#[test]
fn arrivals_during_a_vacation_are_dropped_without_arriving() {
    let mut sim = Simulation::default();
    let queue = sim.add_queue("q", Discipline::fcfs()).unwrap();
    let recorder = NotificationRecorder::without_updates();
    let log = recorder.log();
    sim.add_listener(queue, Box::new(recorder)).unwrap();
    sim.set_queue_access_vacation(queue, t(0.0), true).unwrap();
    let job = sim.add_job(Job::new("j"));
    sim.arrive(queue, job, t(1.0)).unwrap();

    let kinds: Vec<_> = log.records().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec!["QAV_START", "DROP"]);
    assert!(!sim.is_no_wait_armed(queue).unwrap());
    assert_eq!(sim.job(job).unwrap().queue(), None);
}

#[test]
fn no_wait_armed_tracks_credits_and_servers() {
    let mut sim = Simulation::default();
    let queue = sim.add_queue("q", Discipline::fcfs()).unwrap();
    let zero = sim.add_queue("zero", Discipline::Zero).unwrap();
    assert!(sim.is_no_wait_armed(queue).unwrap());
    assert!(sim.is_no_wait_armed(zero).unwrap());

    let job = sim.add_job(Job::new("j").with_service_time(1.0));
    sim.arrive(queue, job, t(0.0)).unwrap();
    assert!(!sim.is_no_wait_armed(queue).unwrap());
    assert!(!sim.is_start_armed(queue).unwrap());

    let inner = sim.add_queue("inner", Discipline::fcfs()).unwrap();
    let wrapped = sim.add_encapsulator("wrapped", inner).unwrap();
    assert!(sim.is_no_wait_armed(wrapped).unwrap());
    sim.set_server_access_credits(wrapped, t(0.0), ServerAccessCredits::Finite(0))
        .unwrap();
    assert!(!sim.is_no_wait_armed(wrapped).unwrap());
    assert_eq!(
        sim.server_access_credits(inner).unwrap(),
        ServerAccessCredits::Finite(0)
    );
}

#[test]
fn contract_violations_fail_fast() {
    let mut sim = Simulation::default();
    let queue = sim.add_queue("q", Discipline::fcfs()).unwrap();
    let job = sim.add_job(Job::new("j").with_service_time(1.0));
    sim.update(queue, t(2.0)).unwrap();

    assert!(matches!(
        sim.arrive(queue, job, t(1.0)),
        Err(QueueError::TimeInPast { .. })
    ));
    assert_eq!(
        sim.revoke(queue, job, t(2.0), true),
        Err(QueueError::JobNotInQueue { job, queue })
    );
    sim.arrive(queue, job, t(2.0)).unwrap();
    assert_eq!(
        sim.arrive(queue, job, t(2.0)),
        Err(QueueError::JobAlreadyInQueue { job, queue })
    );

    sim.run().unwrap();
    assert!(matches!(
        sim.schedule_arrival(t(1.0), queue, job),
        Err(QueueError::Event(EventError::ScheduleInPast { .. }))
    ));
    let negative = sim.add_job(Job::new("negative").with_service_time(-1.0));
    assert!(matches!(
        sim.arrive(queue, negative, t(3.0)),
        Err(QueueError::InvalidServiceTime { .. })
    ));
    assert_eq!(sim.number_of_jobs(queue).unwrap(), 0);
}

#[test]
fn queue_errors_abort_the_run_and_can_be_recovered() {
    let mut sim = Simulation::default();
    let a = sim.add_queue("a", Discipline::Sink).unwrap();
    let b = sim.add_queue("b", Discipline::Sink).unwrap();
    let job = sim.add_job(Job::new("j"));
    sim.schedule_arrival(t(1.0), a, job).unwrap();
    sim.schedule_arrival(t(2.0), b, job).unwrap();

    let err: SimError = sim.run().unwrap_err();
    assert_eq!(
        err.downcast_model::<QueueError>(),
        Some(&QueueError::JobAlreadyInQueue { job, queue: a })
    );
    assert_eq!(sim.time(), t(2.0));
    assert!(sim.revoke(a, job, t(2.0), false).unwrap());
    sim.arrive(b, job, t(2.0)).unwrap();
    assert_eq!(sim.number_of_jobs(b).unwrap(), 1);
}

#[test]
fn notification_log_exports_as_json() {
    let mut sim = Simulation::default();
    let queue = sim.add_queue("q", Discipline::fcfs()).unwrap();
    let log = record(&mut sim, queue);
    let job = sim.add_job(Job::new("exported").with_service_time(1.5));
    sim.schedule_arrival(t(0.5), queue, job).unwrap();
    sim.run().unwrap();

    let value: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
    let records = value.as_array().unwrap();
    let kinds: Vec<_> = records.iter().map(|r| r["kind"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        vec!["UPDATE", "ARRIVAL", "START", "STA_FALSE", "UPDATE", "DEPARTURE", "STA_TRUE"]
    );
    assert_eq!(records[1]["job"], "exported");
    assert_eq!(records[5]["time"], 2.0);
    assert_eq!(records[0]["batch"], records[3]["batch"]);
}
