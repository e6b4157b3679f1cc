//! Primitive queues
//!
//! One state machine serves every [`SchedulingDiscipline`]: admission decides
//! what happens on arrival, the [`ServiceModel`] decides which waiting jobs
//! start and when started jobs leave. Departures are scheduled on the event
//! list and cancelled whenever the job leaves early.

use des_core::{EventId, Resettable, SimTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::discipline::{
    Admission, AutoRevocationPolicy, PreemptionStrategy, PreemptiveOrder, SchedulingDiscipline,
    ServiceModel, StartOrder,
};
use crate::error::QueueError;
use crate::job::{Job, JobId, Visit};
use crate::notification::QueueEvent;
use crate::queue::{QueueCore, QueueEntry, QueueId, QueueKind, ServerAccessCredits};
use crate::simulation::Simulation;

/// Discipline-specific state of a primitive queue.
#[derive(Debug)]
pub(crate) struct PrimitiveState {
    discipline: Box<dyn SchedulingDiscipline>,
    model: ServiceModel,
    auto_revocation: AutoRevocationPolicy,
    /// Processor-sharing virtual time: service received by every job present
    /// since the last reset.
    virtual_time: f64,
    /// The job in service under a preemptive discipline.
    served: Option<JobId>,
    /// The single pending departure of a processor-sharing queue.
    sharing_departure: Option<EventId>,
    rng: StdRng,
}

impl PrimitiveState {
    pub fn new(discipline: Box<dyn SchedulingDiscipline>, auto_revocation: AutoRevocationPolicy) -> Self {
        let model = discipline.service_model();
        let rng = StdRng::seed_from_u64(discipline.seed());
        Self {
            discipline,
            model,
            auto_revocation,
            virtual_time: 0.0,
            served: None,
            sharing_departure: None,
            rng,
        }
    }

    pub fn discipline(&self) -> &dyn SchedulingDiscipline {
        self.discipline.as_ref()
    }

    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }

    pub fn is_start_armed(&self, jobs_executing: usize) -> bool {
        self.discipline.is_start_armed(jobs_executing)
    }

    pub fn is_no_wait_armed(&self, core: &QueueCore) -> bool {
        if core.vacation {
            return false;
        }
        match self.discipline.admission() {
            Admission::Drop | Admission::DepartImmediately => true,
            Admission::DepartAfter(_) => false,
            Admission::Wait => core.credits.is_available() && core.start_armed,
        }
    }
}

impl Resettable for PrimitiveState {
    fn reset(&mut self) {
        self.virtual_time = 0.0;
        self.served = None;
        self.sharing_departure = None;
        self.rng = StdRng::seed_from_u64(self.discipline.seed());
    }
}

fn primitive_ref(queues: &[QueueEntry], q: QueueId) -> Result<&PrimitiveState, QueueError> {
    match queues.get(q.0).map(|entry| &entry.kind) {
        Some(QueueKind::Primitive(state)) => Ok(state),
        Some(QueueKind::Composite(_)) => Err(QueueError::NotPrimitive(q)),
        None => Err(QueueError::QueueNotFound(q)),
    }
}

fn primitive_mut(
    queues: &mut [QueueEntry],
    q: QueueId,
) -> Result<(&mut QueueCore, &mut PrimitiveState), QueueError> {
    match queues.get_mut(q.0) {
        Some(QueueEntry {
            core,
            kind: QueueKind::Primitive(state),
        }) => Ok((core, state)),
        Some(_) => Err(QueueError::NotPrimitive(q)),
        None => Err(QueueError::QueueNotFound(q)),
    }
}

fn visit_of(job: Option<&Job>) -> Option<&Visit> {
    job.and_then(|job| job.visit.as_ref())
}

impl Simulation {
    /// Processor-sharing virtual time of a primitive queue.
    pub fn virtual_time(&self, queue: QueueId) -> Result<f64, QueueError> {
        Ok(primitive_ref(&self.queues, queue)?.virtual_time())
    }

    pub(crate) fn primitive_arrive(
        &mut self,
        q: QueueId,
        job: JobId,
        time: SimTime,
    ) -> Result<(), QueueError> {
        let state = primitive_ref(&self.queues, q)?;
        let requested = state.discipline.service_time(self.job(job)?.service_time(q));
        if requested.is_nan() || requested < 0.0 {
            return Err(QueueError::InvalidServiceTime {
                job,
                queue: q,
                service_time: requested,
            });
        }
        let admission = state.discipline.admission();
        let waiting_room = state.discipline.waiting_room();

        self.update_queue(q, time)?;
        let job_ref = self.job_ref(job);
        if self.core(q).vacation {
            debug!(queue = %q, job = %job_ref, time = %time, "Arrival dropped during queue-access vacation");
            self.core_mut(q).push(QueueEvent::Drop(job_ref));
            return self.fire(q);
        }

        let core = self.core_mut(q);
        let seq = core.next_arrival_seq();
        core.waiting.push(job);
        core.push(QueueEvent::Arrival(job_ref.clone()));
        if let Some(entry) = self.jobs.get_mut(&job) {
            entry.attach(Visit::new(q, time, seq, requested));
        }
        debug!(queue = %q, job = %job_ref, time = %time, service = requested, "Job arrived");

        match admission {
            Admission::Drop => self.exit_job(q, job, QueueEvent::Drop),
            Admission::DepartImmediately => self.exit_job(q, job, QueueEvent::Departure),
            Admission::DepartAfter(wait) => self.schedule_departure(q, job, time + wait)?,
            Admission::Wait => {
                self.primitive_reschedule(q, time)?;
                let core = self.core(q);
                let overflow = waiting_room.is_some_and(|room| core.waiting.len() > room);
                if overflow && core.waiting.last() == Some(&job) {
                    debug!(queue = %q, job = %job_ref, "Waiting room full, job dropped");
                    self.exit_job(q, job, QueueEvent::Drop);
                }
            }
        }

        self.refresh_start_armed(q);
        self.fire(q)
    }

    pub(crate) fn primitive_revoke(
        &mut self,
        q: QueueId,
        job: JobId,
        time: SimTime,
        interrupt_service: bool,
    ) -> Result<bool, QueueError> {
        if !self.core(q).waiting.contains(&job) && !interrupt_service {
            return Ok(false);
        }
        self.update_queue(q, time)?;
        let (_, state) = primitive_mut(&mut self.queues, q)?;
        if state.served == Some(job) {
            state.served = None;
        }
        debug!(queue = %q, job = %job, time = %time, "Job revoked");
        self.exit_job(q, job, QueueEvent::Revocation);
        self.primitive_reschedule(q, time)?;
        self.refresh_start_armed(q);
        self.fire(q)?;
        Ok(true)
    }

    pub(crate) fn primitive_set_credits(
        &mut self,
        q: QueueId,
        time: SimTime,
        credits: ServerAccessCredits,
    ) -> Result<(), QueueError> {
        self.update_queue(q, time)?;
        let core = self.core_mut(q);
        let was_available = core.credits.is_available();
        core.credits = credits;
        if was_available != credits.is_available() {
            core.push(QueueEvent::ServerAccessCredits {
                available: credits.is_available(),
            });
        }
        self.primitive_reschedule(q, time)?;
        self.refresh_start_armed(q);
        self.fire(q)
    }

    pub(crate) fn primitive_reset(&mut self, q: QueueId) -> Result<(), QueueError> {
        let time = self.events.time();
        let Simulation {
            queues,
            jobs,
            events,
            ..
        } = self;
        let (core, state) = primitive_mut(queues, q)?;
        for job in core.waiting.iter().chain(core.executing.iter()) {
            if let Some(departure) = jobs.get_mut(job).and_then(|j| j.detach(time)) {
                events.cancel(departure);
            }
        }
        if let Some(departure) = state.sharing_departure.take() {
            events.cancel(departure);
        }
        state.reset();
        core.reset(time);
        core.start_armed = state.is_start_armed(0);
        core.push(QueueEvent::Reset);
        debug!(queue = %q, time = %time, "Queue reset");
        self.fire(q)
    }

    /// Departure event of a started or delayed job.
    fn primitive_depart(&mut self, q: QueueId, job: JobId, time: SimTime) -> Result<(), QueueError> {
        if !self.core(q).contains(job) {
            return Err(QueueError::JobNotInQueue { job, queue: q });
        }
        self.update_queue(q, time)?;
        if let Some(visit) = self.jobs.get_mut(&job).and_then(Job::visit_mut) {
            visit.departure_event = None;
        }
        let (_, state) = primitive_mut(&mut self.queues, q)?;
        if state.served == Some(job) {
            state.served = None;
        }
        state.sharing_departure = None;
        debug!(queue = %q, job = %job, time = %time, "Job departed");
        self.exit_job(q, job, QueueEvent::Departure);
        self.primitive_reschedule(q, time)?;
        self.refresh_start_armed(q);
        self.fire(q)
    }

    fn schedule_departure(&mut self, q: QueueId, job: JobId, at: SimTime) -> Result<(), QueueError> {
        let id = self
            .events
            .schedule_named(at, "departure", move |sim: &mut Simulation| {
                sim.primitive_depart(q, job, at)?;
                Ok(())
            })?;
        if let Some(visit) = self.jobs.get_mut(&job).and_then(Job::visit_mut) {
            visit.departure_event = Some(id);
        }
        Ok(())
    }

    /// Accumulates `elapsed` time of service on the jobs being served.
    pub(crate) fn advance_service(&mut self, q: QueueId, elapsed: f64) {
        let Simulation { queues, jobs, .. } = self;
        let Ok((core, state)) = primitive_mut(queues, q) else {
            return;
        };
        let mut credit = |job: &JobId, amount: f64| {
            if let Some(visit) = jobs.get_mut(job).and_then(Job::visit_mut) {
                visit.service_received += amount;
            }
        };
        match state.model {
            ServiceModel::NoService => {}
            ServiceModel::NonPreemptive { .. } => {
                for job in &core.executing {
                    credit(job, elapsed);
                }
            }
            ServiceModel::Preemptive { .. } => {
                if let Some(job) = state.served {
                    credit(&job, elapsed);
                }
            }
            ServiceModel::Sharing => {
                if !core.executing.is_empty() {
                    let share = elapsed / core.executing.len() as f64;
                    state.virtual_time += share;
                    for job in &core.executing {
                        credit(job, share);
                    }
                }
            }
        }
    }

    /// Starts waiting jobs and (re)schedules departures as the service model allows.
    pub(crate) fn primitive_reschedule(&mut self, q: QueueId, time: SimTime) -> Result<(), QueueError> {
        match primitive_ref(&self.queues, q)?.model {
            ServiceModel::NoService => Ok(()),
            ServiceModel::NonPreemptive { servers, order } => {
                loop {
                    let core = self.core(q);
                    if !core.credits.is_available() || core.waiting.is_empty() {
                        break;
                    }
                    if servers.is_some_and(|servers| core.executing.len() >= servers) {
                        break;
                    }
                    let job = self.pick_waiting(q, order)?;
                    if self.primitive_start(q, job, time)? {
                        let service = visit_of(self.jobs.get(&job)).map_or(0.0, |v| v.service_required);
                        if service.is_finite() {
                            self.schedule_departure(q, job, time + service)?;
                        }
                    }
                }
                Ok(())
            }
            ServiceModel::Preemptive { order, strategy } => {
                self.preemptive_reschedule(q, time, order, strategy)
            }
            ServiceModel::Sharing => {
                loop {
                    let core = self.core(q);
                    if !core.credits.is_available() {
                        break;
                    }
                    let Some(&job) = core.waiting.first() else {
                        break;
                    };
                    self.primitive_start(q, job, time)?;
                }
                self.sharing_reschedule(q, time)
            }
        }
    }

    /// Moves a waiting job into service, consuming a credit. Returns `false`
    /// when the job was auto-revoked instead.
    fn primitive_start(&mut self, q: QueueId, job: JobId, time: SimTime) -> Result<bool, QueueError> {
        let auto_revocation = primitive_ref(&self.queues, q)?.auto_revocation;
        let job_ref = self.job_ref(job);
        let core = self.core_mut(q);
        let Some(index) = core.waiting.iter().position(|j| *j == job) else {
            return Err(QueueError::JobNotInQueue { job, queue: q });
        };
        core.waiting.remove(index);
        let exhausted = core.credits.consume();

        let started = match auto_revocation {
            AutoRevocationPolicy::UponStart => {
                debug!(queue = %q, job = %job_ref, time = %time, "Job auto-revoked");
                if let Some(entry) = self.jobs.get_mut(&job) {
                    entry.detach(time);
                }
                self.core_mut(q).push(QueueEvent::AutoRevocation(job_ref));
                false
            }
            AutoRevocationPolicy::Disabled => {
                trace!(queue = %q, job = %job_ref, time = %time, "Job started");
                self.core_mut(q).executing.push(job);
                if let Some(visit) = self.jobs.get_mut(&job).and_then(Job::visit_mut) {
                    visit.start_time = Some(time);
                }
                self.core_mut(q).push(QueueEvent::Start(job_ref));
                true
            }
        };
        if exhausted {
            self.core_mut(q)
                .push(QueueEvent::ServerAccessCredits { available: false });
        }
        Ok(started)
    }

    /// Next waiting job to start; the waiting list must not be empty.
    fn pick_waiting(&mut self, q: QueueId, order: StartOrder) -> Result<JobId, QueueError> {
        let Simulation { queues, jobs, .. } = self;
        let (core, state) = primitive_mut(queues, q)?;
        let waiting = &core.waiting;
        let required = |job: &JobId| visit_of(jobs.get(job)).map_or(0.0, |v| v.service_required);

        // Ties go to the earliest arrival.
        let index = match order {
            StartOrder::Fifo => 0,
            StartOrder::Lifo => waiting.len() - 1,
            StartOrder::ShortestJob => {
                let mut best = 0;
                for (i, job) in waiting.iter().enumerate().skip(1) {
                    if required(job) < required(&waiting[best]) {
                        best = i;
                    }
                }
                best
            }
            StartOrder::LongestJob => {
                let mut best = 0;
                for (i, job) in waiting.iter().enumerate().skip(1) {
                    if required(job) > required(&waiting[best]) {
                        best = i;
                    }
                }
                best
            }
            StartOrder::Random => state.rng.gen_range(0..waiting.len()),
        };
        Ok(waiting[index])
    }

    fn preemptive_reschedule(
        &mut self,
        q: QueueId,
        time: SimTime,
        order: PreemptiveOrder,
        strategy: PreemptionStrategy,
    ) -> Result<(), QueueError> {
        loop {
            let Some(candidate) = self.preemptive_candidate(q, order)? else {
                return Ok(());
            };
            let served = primitive_ref(&self.queues, q)?.served;
            if served == Some(candidate) {
                return Ok(());
            }
            if let Some(current) = served {
                self.preempt(q, current, strategy)?;
            }
            if self.core(q).waiting.contains(&candidate) && !self.primitive_start(q, candidate, time)? {
                continue;
            }

            let (_, state) = primitive_mut(&mut self.queues, q)?;
            state.served = Some(candidate);
            let remaining = visit_of(self.jobs.get(&candidate)).map_or(0.0, Visit::remaining);
            trace!(queue = %q, job = %candidate, remaining, "Serving job");
            if remaining.is_finite() {
                self.schedule_departure(q, candidate, time + remaining)?;
            }
            return Ok(());
        }
    }

    /// The job a preemptive queue should be serving: picked among the jobs in
    /// the service area and, while credits last, the waiting jobs.
    fn preemptive_candidate(
        &self,
        q: QueueId,
        order: PreemptiveOrder,
    ) -> Result<Option<JobId>, QueueError> {
        let served = primitive_ref(&self.queues, q)?.served;
        let core = self.core(q);
        let credits = core.credits.is_available();
        let candidates = core
            .executing
            .iter()
            .chain(core.waiting.iter().filter(|_| credits))
            .filter_map(|job| visit_of(self.jobs.get(job)).map(|visit| (*job, visit)));

        let mut best: Option<(JobId, &Visit)> = None;
        for (job, visit) in candidates {
            let better = match best {
                None => true,
                Some((best_job, best_visit)) => match order {
                    PreemptiveOrder::Lifo => visit.arrival_seq > best_visit.arrival_seq,
                    PreemptiveOrder::ShortestRemaining => {
                        let (a, b) = (visit.remaining(), best_visit.remaining());
                        if a != b {
                            a < b
                        } else if Some(job) == served || Some(best_job) == served {
                            Some(job) == served
                        } else {
                            visit.arrival_seq < best_visit.arrival_seq
                        }
                    }
                },
            };
            if better {
                best = Some((job, visit));
            }
        }
        Ok(best.map(|(job, _)| job))
    }

    fn preempt(&mut self, q: QueueId, job: JobId, strategy: PreemptionStrategy) -> Result<(), QueueError> {
        let (_, state) = primitive_mut(&mut self.queues, q)?;
        state.served = None;
        debug!(queue = %q, job = %job, ?strategy, "Job preempted");
        match strategy {
            PreemptionStrategy::Resume | PreemptionStrategy::Restart => {
                let departure = self.jobs.get_mut(&job).and_then(Job::visit_mut).and_then(|visit| {
                    if strategy == PreemptionStrategy::Restart {
                        visit.service_received = 0.0;
                    }
                    visit.departure_event.take()
                });
                if let Some(departure) = departure {
                    self.events.cancel(departure);
                }
            }
            PreemptionStrategy::Drop => self.exit_job(q, job, QueueEvent::Drop),
            PreemptionStrategy::Depart => self.exit_job(q, job, QueueEvent::Departure),
        }
        Ok(())
    }

    /// Replaces the pending processor-sharing departure with one for the job
    /// that will finish first under the current number of jobs.
    fn sharing_reschedule(&mut self, q: QueueId, time: SimTime) -> Result<(), QueueError> {
        let Simulation {
            queues,
            jobs,
            events,
            ..
        } = self;
        let (core, state) = primitive_mut(queues, q)?;
        if let Some(departure) = state.sharing_departure.take() {
            events.cancel(departure);
        }

        let mut next: Option<(JobId, f64)> = None;
        for job in &core.executing {
            let remaining = visit_of(jobs.get(job)).map_or(0.0, Visit::remaining);
            if next.map_or(true, |(_, best)| remaining < best) {
                next = Some((*job, remaining));
            }
        }
        let Some((job, remaining)) = next else {
            return Ok(());
        };
        if !remaining.is_finite() {
            return Ok(());
        }
        let at = time + remaining * core.executing.len() as f64;
        let id = events.schedule_named(at, "departure", move |sim: &mut Simulation| {
            sim.primitive_depart(q, job, at)?;
            Ok(())
        })?;
        state.sharing_departure = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discipline::Discipline;
    use crate::notification::NotificationRecorder;
    use des_core::SimContextExt;

    fn t(secs: f64) -> SimTime {
        SimTime::new(secs)
    }

    fn recorded(sim: &mut Simulation, q: QueueId) -> crate::notification::NotificationLog {
        let recorder = NotificationRecorder::without_updates();
        let log = recorder.log();
        sim.add_listener(q, Box::new(recorder)).unwrap();
        log
    }

    fn kinds(log: &crate::notification::NotificationLog) -> Vec<&'static str> {
        log.records().iter().map(|r| r.kind).collect()
    }

    #[test]
    fn drop_discipline_reports_arrival_then_drop() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("drop", Discipline::Drop).unwrap();
        let log = recorded(&mut sim, q);
        let job = sim.add_job(Job::new("j").with_service_time(1.0));
        sim.arrive(q, job, t(1.0)).unwrap();
        assert_eq!(kinds(&log), vec!["ARRIVAL", "DROP"]);
        assert_eq!(log.records()[0].batch, log.records()[1].batch);
        assert_eq!(sim.number_of_jobs(q).unwrap(), 0);
        assert_eq!(sim.job(job).unwrap().queue(), None);
    }

    #[test]
    fn zero_departs_in_the_arrival_batch() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("zero", Discipline::Zero).unwrap();
        let log = recorded(&mut sim, q);
        let job = sim.add_job(Job::new("j").with_service_time(1.0));
        sim.arrive(q, job, t(2.0)).unwrap();
        assert_eq!(kinds(&log), vec!["ARRIVAL", "DEPARTURE"]);
        assert!(sim.events().is_empty());
    }

    #[test]
    fn fcfs_starts_one_job_and_schedules_its_departure() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs", Discipline::fcfs()).unwrap();
        let log = recorded(&mut sim, q);
        let a = sim.add_job(Job::new("a").with_service_time(2.0));
        let b = sim.add_job(Job::new("b").with_service_time(3.0));
        sim.arrive(q, a, t(0.0)).unwrap();
        sim.arrive(q, b, t(0.0)).unwrap();
        assert_eq!(kinds(&log), vec!["ARRIVAL", "START", "STA_FALSE", "ARRIVAL"]);
        assert_eq!(sim.jobs_waiting(q).unwrap(), 1);
        assert_eq!(sim.jobs_executing(q).unwrap(), 1);

        sim.run().unwrap();
        assert_eq!(sim.time(), t(5.0));
        let departures: Vec<_> = log
            .of_kind("DEPARTURE")
            .into_iter()
            .map(|r| (r.time, r.job.unwrap()))
            .collect();
        assert_eq!(departures, vec![(2.0, "a".to_string()), (5.0, "b".to_string())]);
        assert!(sim.is_start_armed(q).unwrap());
    }

    #[test]
    fn fcfs_without_servers_never_starts() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs0", Discipline::fcfs_c(0)).unwrap();
        let job = sim.add_job(Job::new("j").with_service_time(1.0));
        sim.arrive(q, job, t(0.0)).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.jobs_waiting(q).unwrap(), 1);
        assert!(!sim.is_start_armed(q).unwrap());
    }

    #[test]
    fn full_waiting_room_drops_the_arrival() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs_b", Discipline::fcfs_b(1)).unwrap();
        let log = recorded(&mut sim, q);
        for name in ["a", "b", "c"] {
            let job = sim.add_job(Job::new(name).with_service_time(1.0));
            sim.arrive(q, job, t(0.0)).unwrap();
        }
        let drops: Vec<_> = log.of_kind("DROP").into_iter().filter_map(|r| r.job).collect();
        assert_eq!(drops, vec!["c".to_string()]);
        assert_eq!(sim.number_of_jobs(q).unwrap(), 2);
    }

    #[test]
    fn server_access_credits_gate_starts() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs", Discipline::InfiniteServer).unwrap();
        let log = recorded(&mut sim, q);
        sim.set_server_access_credits(q, t(0.0), ServerAccessCredits::Finite(1))
            .unwrap();
        let a = sim.add_job(Job::new("a").with_service_time(1.0));
        let b = sim.add_job(Job::new("b").with_service_time(1.0));
        sim.arrive(q, a, t(0.0)).unwrap();
        sim.arrive(q, b, t(0.0)).unwrap();
        assert_eq!(sim.jobs_executing(q).unwrap(), 1);
        assert_eq!(sim.jobs_waiting(q).unwrap(), 1);
        assert_eq!(
            kinds(&log),
            vec!["ARRIVAL", "START", "OUT_OF_SAC", "ARRIVAL"]
        );

        sim.set_server_access_credits(q, t(0.5), ServerAccessCredits::Infinite)
            .unwrap();
        assert_eq!(sim.jobs_executing(q).unwrap(), 2);
        assert_eq!(&kinds(&log)[4..], &["REGAINED_SAC", "START"]);
    }

    #[test]
    fn auto_revocation_replaces_start() {
        let mut sim = Simulation::default();
        let q = sim.add_queue_with_policy("q", Discipline::fcfs(), AutoRevocationPolicy::UponStart).unwrap();
        let log = recorded(&mut sim, q);
        sim.set_server_access_credits(q, t(0.0), ServerAccessCredits::Finite(1))
            .unwrap();
        let a = sim.add_job(Job::new("a").with_service_time(1.0));
        let b = sim.add_job(Job::new("b").with_service_time(1.0));
        sim.arrive(q, a, t(0.0)).unwrap();
        sim.arrive(q, b, t(0.0)).unwrap();
        assert_eq!(
            kinds(&log),
            vec!["ARRIVAL", "AUTO_REVOCATION", "OUT_OF_SAC", "ARRIVAL"]
        );
        assert_eq!(sim.number_of_jobs(q).unwrap(), 1);
        assert_eq!(sim.job(a).unwrap().queue(), None);
    }

    #[test]
    fn revocation_of_waiting_and_served_jobs() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs", Discipline::fcfs()).unwrap();
        let log = recorded(&mut sim, q);
        let a = sim.add_job(Job::new("a").with_service_time(4.0));
        let b = sim.add_job(Job::new("b").with_service_time(4.0));
        sim.arrive(q, a, t(0.0)).unwrap();
        sim.arrive(q, b, t(0.0)).unwrap();

        assert!(!sim.revoke(q, a, t(1.0), false).unwrap());
        assert!(sim.revoke(q, b, t(1.0), false).unwrap());
        assert!(sim.revoke(q, a, t(2.0), true).unwrap());
        assert_eq!(log.of_kind("REVOCATION").len(), 2);
        assert!(sim.events().is_empty());
        assert_eq!(
            sim.revoke(q, a, t(2.0), true),
            Err(QueueError::JobNotInQueue { job: a, queue: q })
        );
    }

    #[test]
    fn negative_service_time_is_rejected_before_any_change() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs", Discipline::fcfs()).unwrap();
        let job = sim.add_job(Job::new("bad").with_service_time(-1.0));
        let err = sim.arrive(q, job, t(3.0)).unwrap_err();
        assert!(matches!(err, QueueError::InvalidServiceTime { .. }));
        assert_eq!(sim.last_update_time(q).unwrap(), t(0.0));
        assert_eq!(sim.job(job).unwrap().queue(), None);
    }

    #[test]
    fn lcfs_and_sjf_pick_from_the_waiting_area() {
        for (discipline, expected) in [
            (Discipline::Lcfs, vec!["first", "c", "b", "a"]),
            (Discipline::Sjf, vec!["first", "b", "c", "a"]),
            (Discipline::Ljf, vec!["first", "a", "c", "b"]),
        ] {
            let mut sim = Simulation::default();
            let q = sim.add_queue("q", discipline).unwrap();
            let log = recorded(&mut sim, q);
            for (name, service) in [("first", 1.0), ("a", 3.0), ("b", 1.0), ("c", 2.0)] {
                let job = sim.add_job(Job::new(name).with_service_time(service));
                sim.arrive(q, job, t(0.0)).unwrap();
            }
            sim.run().unwrap();
            let starts: Vec<_> = log.of_kind("START").into_iter().filter_map(|r| r.job).collect();
            assert_eq!(starts, expected);
        }
    }

    #[test]
    fn preemptive_lcfs_resume_keeps_received_service() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("plcfs", Discipline::PreemptiveLcfs(PreemptionStrategy::Resume)).unwrap();
        let log = recorded(&mut sim, q);
        let a = sim.add_job(Job::new("a").with_service_time(4.0));
        let b = sim.add_job(Job::new("b").with_service_time(1.0));
        sim.schedule_arrival(t(0.0), q, a).unwrap();
        sim.schedule_arrival(t(1.0), q, b).unwrap();
        sim.run().unwrap();

        let departures: Vec<_> = log
            .of_kind("DEPARTURE")
            .into_iter()
            .map(|r| (r.time, r.job.unwrap()))
            .collect();
        assert_eq!(departures, vec![(2.0, "b".to_string()), (5.0, "a".to_string())]);
        // Resuming does not start a job twice.
        assert_eq!(log.of_kind("START").len(), 2);
    }

    #[test]
    fn preemptive_lcfs_restart_and_drop() {
        let mut sim = Simulation::default();
        let restart = sim.add_queue("restart", Discipline::PreemptiveLcfs(PreemptionStrategy::Restart)).unwrap();
        let drop = sim.add_queue("drop", Discipline::PreemptiveLcfs(PreemptionStrategy::Drop)).unwrap();
        let restart_log = recorded(&mut sim, restart);
        let drop_log = recorded(&mut sim, drop);
        for q in [restart, drop] {
            let a = sim.add_job(Job::new("a").with_service_time(4.0));
            let b = sim.add_job(Job::new("b").with_service_time(1.0));
            sim.schedule_arrival(t(0.0), q, a).unwrap();
            sim.schedule_arrival(t(1.0), q, b).unwrap();
        }
        sim.run().unwrap();

        let last = restart_log.of_kind("DEPARTURE").pop().unwrap();
        assert_eq!((last.time, last.job.as_deref()), (6.0, Some("a")));
        let dropped = drop_log.of_kind("DROP");
        assert_eq!(dropped.len(), 1);
        assert_eq!((dropped[0].time, dropped[0].job.as_deref()), (1.0, Some("a")));
    }

    #[test]
    fn srtf_preempts_for_shorter_work() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("srtf", Discipline::Srtf).unwrap();
        let log = recorded(&mut sim, q);
        let a = sim.add_job(Job::new("a").with_service_time(5.0));
        let b = sim.add_job(Job::new("b").with_service_time(2.0));
        let c = sim.add_job(Job::new("c").with_service_time(4.0));
        sim.schedule_arrival(t(0.0), q, a).unwrap();
        sim.schedule_arrival(t(1.0), q, b).unwrap();
        // When b leaves at 3.0, a and c both need 4; the earlier arrival goes first.
        sim.schedule_arrival(t(2.0), q, c).unwrap();
        sim.run().unwrap();

        let departures: Vec<_> = log
            .of_kind("DEPARTURE")
            .into_iter()
            .map(|r| (r.time, r.job.unwrap()))
            .collect();
        assert_eq!(
            departures,
            vec![
                (3.0, "b".to_string()),
                (7.0, "a".to_string()),
                (11.0, "c".to_string())
            ]
        );
    }

    #[test]
    fn processor_sharing_splits_the_server() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("ps", Discipline::ProcessorSharing).unwrap();
        let log = recorded(&mut sim, q);
        let a = sim.add_job(Job::new("a").with_service_time(2.0));
        let b = sim.add_job(Job::new("b").with_service_time(1.0));
        sim.schedule_arrival(t(0.0), q, a).unwrap();
        sim.schedule_arrival(t(1.0), q, b).unwrap();
        sim.run().unwrap();

        // a alone for 1s, then both at half rate: each needs 1 more, so both
        // finish at 3.0, a first by arrival order.
        let departures: Vec<_> = log
            .of_kind("DEPARTURE")
            .into_iter()
            .map(|r| (r.time, r.job.unwrap()))
            .collect();
        assert_eq!(departures.len(), 2);
        assert_eq!(departures[0].1, "a");
        assert!((departures[0].0 - 3.0).abs() < 1e-9);
        assert!((departures[1].0 - 3.0).abs() < 1e-9);
        assert!((sim.virtual_time(q).unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(sim.events().len(), 0);
    }

    #[test]
    fn processor_sharing_revocation_reschedules() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("ps", Discipline::ProcessorSharing).unwrap();
        let a = sim.add_job(Job::new("a").with_service_time(2.0));
        let b = sim.add_job(Job::new("b").with_service_time(2.0));
        sim.arrive(q, a, t(0.0)).unwrap();
        sim.arrive(q, b, t(0.0)).unwrap();
        assert_eq!(sim.events().peek_time(), Some(t(4.0)));
        sim.revoke(q, b, t(1.0), true).unwrap();
        // a received 0.5, needs 1.5 alone.
        assert_eq!(sim.events().peek_time(), Some(t(2.5)));
        assert_eq!(sim.events().len(), 1);
    }

    #[test]
    fn random_discipline_is_reproducible() {
        let order = |seed| {
            let mut sim = Simulation::default();
            let q = sim.add_queue("random", Discipline::Random { seed }).unwrap();
            let log = recorded(&mut sim, q);
            for i in 0..20 {
                let job = sim.add_job(Job::new(format!("j{i}")).with_service_time(1.0));
                sim.arrive(q, job, t(0.0)).unwrap();
            }
            sim.run().unwrap();
            log.of_kind("START")
                .into_iter()
                .filter_map(|r| r.job)
                .collect::<Vec<_>>()
        };
        assert_eq!(order(7), order(7));
        assert_eq!(order(7).len(), 20);
    }

    #[test]
    fn reset_cancels_departures_and_restores_defaults() {
        let mut sim = Simulation::default();
        let q = sim.add_queue("fcfs", Discipline::fcfs()).unwrap();
        let log = recorded(&mut sim, q);
        let a = sim.add_job(Job::new("a").with_service_time(5.0));
        sim.arrive(q, a, t(0.0)).unwrap();
        sim.set_queue_access_vacation(q, t(0.0), true).unwrap();
        sim.set_server_access_credits(q, t(0.0), ServerAccessCredits::Finite(3))
            .unwrap();

        sim.reset_queue(q).unwrap();
        assert!(sim.events().is_empty());
        assert_eq!(sim.number_of_jobs(q).unwrap(), 0);
        assert_eq!(sim.job(a).unwrap().queue(), None);
        assert!(!sim.is_queue_access_vacation(q).unwrap());
        assert_eq!(
            sim.server_access_credits(q).unwrap(),
            ServerAccessCredits::Infinite
        );
        assert!(sim.is_start_armed(q).unwrap());
        assert_eq!(kinds(&log).last(), Some(&"RESET"));
    }
}
