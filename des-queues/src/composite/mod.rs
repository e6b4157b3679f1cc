//! Composite queues
//!
//! A composite is a queue built from other queues. Real jobs arriving at the
//! composite never enter a sub-queue themselves: the composite creates one
//! delegate job per real job and moves the delegate between sub-queues as its
//! [`QueueSelector`] directs. Everything that happens to a delegate reaches the
//! composite as a sub-queue notification and is translated into the real job's
//! life cycle at the composite.
//!
//! Sub-queue notifications are queued in an inbox and processed one at a time,
//! in the order they were fired, so a notification fired while the composite
//! is still handling an earlier one waits its turn.
//!
//! Two start models exist:
//!
//! - [`StartModel::Local`]: real jobs wait at the composite and start there,
//!   subject to the composite's own credits. Starting a job sends its delegate
//!   to the first selected sub-queue.
//! - [`StartModel::Encapsulator`]: the delegate enters the single sub-queue on
//!   arrival and the real job starts when the delegate does. The composite
//!   behaves exactly like its sub-queue.

pub mod delegate;
pub mod feedback;
pub mod selector;

use des_core::ids::{SEED_DOMAIN_FEEDBACK, SEED_DOMAIN_SELECTOR};
use des_core::{EventId, SimEntity, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, trace, warn};

use crate::discipline::AutoRevocationPolicy;
use crate::error::{ConfigurationError, QueueError};
use crate::job::{Job, JobId, JobRef, Visit};
use crate::notification::{QueueEvent, QueueNotification};
use crate::queue::{QueueEntry, QueueId, QueueKind, QueueStatus, ServerAccessCredits};
use crate::simulation::Simulation;

use delegate::{DefaultDelegateJobFactory, DelegateJobFactory, EncapsulatorDelegateJobFactory};
use feedback::{FeedbackController, FeedbackSelector, NumVisitsFeedback, ProbabilisticFeedback};
use selector::{
    JacksonSelector, JoinShortestQueueSelector, PatternSelector, QueueSelector, RandomSelector,
    RoutingContext, SingleQueueSelector, TandemSelector,
};

/// Where real jobs start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartModel {
    #[default]
    Local,
    Encapsulator,
}

/// How a delegate moves to its next sub-queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingMode {
    /// Inside the transition that released it.
    #[default]
    Immediate,
    /// Through an event at the same time, after everything already scheduled.
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeKind {
    Tandem,
    Parallel,
    Jackson,
    Feedback,
    Encapsulator,
    DropCollector,
    Custom,
}

impl fmt::Display for CompositeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositeKind::Tandem => "Tandem",
            CompositeKind::Parallel => "Parallel",
            CompositeKind::Jackson => "Jackson",
            CompositeKind::Feedback => "Feedback",
            CompositeKind::Encapsulator => "Encapsulator",
            CompositeKind::DropCollector => "DropCollector",
            CompositeKind::Custom => "Composite",
        };
        f.write_str(name)
    }
}

pub(crate) struct CompositeState {
    pub kind: CompositeKind,
    start_model: StartModel,
    routing: RoutingMode,
    sub_queues: Vec<QueueId>,
    selector: Box<dyn QueueSelector>,
    factory: Box<dyn DelegateJobFactory>,
    drop_destination: Option<usize>,
    auto_revocation: AutoRevocationPolicy,
    real_to_delegate: HashMap<JobId, JobId>,
    delegate_to_real: HashMap<JobId, JobId>,
    visits: HashMap<JobId, u32>,
    in_transit: HashMap<JobId, EventId>,
    inbox: VecDeque<QueueNotification>,
    draining: bool,
}

/// Composite-level state an operation may change before it can fail.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    last_update: SimTime,
    credits: ServerAccessCredits,
    start_armed: bool,
    arrivals: u64,
    pending: usize,
}

fn composite_ref(queues: &[QueueEntry], q: QueueId) -> Result<&CompositeState, QueueError> {
    match queues.get(q.0).map(|entry| &entry.kind) {
        Some(QueueKind::Composite(state)) => Ok(state),
        Some(QueueKind::Primitive(_)) => Err(QueueError::NotComposite(q)),
        None => Err(QueueError::QueueNotFound(q)),
    }
}

fn composite_mut(queues: &mut [QueueEntry], q: QueueId) -> Result<&mut CompositeState, QueueError> {
    match queues.get_mut(q.0).map(|entry| &mut entry.kind) {
        Some(QueueKind::Composite(state)) => Ok(state),
        Some(QueueKind::Primitive(_)) => Err(QueueError::NotComposite(q)),
        None => Err(QueueError::QueueNotFound(q)),
    }
}

/// Builder for composite queues.
pub struct CompositeBuilder {
    name: String,
    kind: CompositeKind,
    sub_queues: Vec<QueueId>,
    selector: Option<Box<dyn QueueSelector>>,
    factory: Option<Box<dyn DelegateJobFactory>>,
    start_model: StartModel,
    routing: RoutingMode,
    drop_destination: Option<usize>,
    auto_revocation: AutoRevocationPolicy,
}

impl CompositeBuilder {
    pub fn new(name: impl Into<String>, sub_queues: impl IntoIterator<Item = QueueId>) -> Self {
        Self {
            name: name.into(),
            kind: CompositeKind::Custom,
            sub_queues: sub_queues.into_iter().collect(),
            selector: None,
            factory: None,
            start_model: StartModel::Local,
            routing: RoutingMode::Immediate,
            drop_destination: None,
            auto_revocation: AutoRevocationPolicy::Disabled,
        }
    }

    pub fn kind(mut self, kind: CompositeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn selector(self, selector: impl QueueSelector + 'static) -> Self {
        self.boxed_selector(Box::new(selector))
    }

    pub fn boxed_selector(mut self, selector: Box<dyn QueueSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn delegate_factory(mut self, factory: impl DelegateJobFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn start_model(mut self, start_model: StartModel) -> Self {
        self.start_model = start_model;
        self
    }

    pub fn routing(mut self, routing: RoutingMode) -> Self {
        self.routing = routing;
        self
    }

    /// Delegates dropped by any other sub-queue go to sub-queue `index`.
    pub fn drop_destination(mut self, index: usize) -> Self {
        self.drop_destination = Some(index);
        self
    }

    /// Auto-revocation at the composite's own start; local start model only.
    pub fn auto_revocation(mut self, policy: AutoRevocationPolicy) -> Self {
        self.auto_revocation = policy;
        self
    }

    pub fn build(self, sim: &mut Simulation) -> Result<QueueId, ConfigurationError> {
        let count = self.sub_queues.len();
        if count == 0 {
            return Err(ConfigurationError::NoSubQueues(self.name));
        }
        let mut seen = HashSet::new();
        for &sub in &self.sub_queues {
            let core = sim
                .queue(sub)
                .map_err(|_| ConfigurationError::UnknownSubQueue(sub))?;
            if !seen.insert(sub) {
                return Err(ConfigurationError::DuplicateSubQueue(sub));
            }
            if let Some(parent) = core.parent() {
                return Err(ConfigurationError::AlreadyEmbedded { queue: sub, parent });
            }
            if core.number_of_jobs() > 0 {
                return Err(ConfigurationError::invalid_value(
                    "sub_queues",
                    format!("{sub} still holds jobs"),
                ));
            }
        }
        if self.start_model == StartModel::Encapsulator && count != 1 {
            return Err(ConfigurationError::SubQueueCount {
                expected: 1,
                actual: count,
            });
        }
        if self.start_model == StartModel::Encapsulator
            && self.auto_revocation != AutoRevocationPolicy::Disabled
        {
            return Err(ConfigurationError::invalid_value(
                "auto_revocation",
                "only the local start model starts jobs at the composite",
            ));
        }
        if let Some(index) = self.drop_destination.filter(|index| *index >= count) {
            return Err(ConfigurationError::invalid_value(
                "drop_destination",
                format!("index {index} out of range for {count} sub-queues"),
            ));
        }
        let selector = self
            .selector
            .ok_or_else(|| ConfigurationError::MissingSelector(self.name.clone()))?;
        selector.validate(count)?;
        let factory: Box<dyn DelegateJobFactory> = match (self.factory, self.start_model) {
            (Some(factory), _) => factory,
            (None, StartModel::Local) => Box::new(DefaultDelegateJobFactory),
            (None, StartModel::Encapsulator) => Box::new(EncapsulatorDelegateJobFactory),
        };

        let state = CompositeState {
            kind: self.kind,
            start_model: self.start_model,
            routing: self.routing,
            sub_queues: self.sub_queues.clone(),
            selector,
            factory,
            drop_destination: self.drop_destination,
            auto_revocation: self.auto_revocation,
            real_to_delegate: HashMap::new(),
            delegate_to_real: HashMap::new(),
            visits: HashMap::new(),
            in_transit: HashMap::new(),
            inbox: VecDeque::new(),
            draining: false,
        };
        let id = sim.insert_queue(self.name.clone(), QueueKind::Composite(Box::new(state)));
        for &sub in &self.sub_queues {
            sim.core_mut(sub).parent = Some(id);
        }
        let armed = sim.composite_start_armed(id);
        sim.core_mut(id).start_armed = armed;
        info!(
            queue = %id,
            name = %self.name,
            kind = %self.kind,
            sub_queues = count,
            start_model = ?self.start_model,
            "Composite queue built"
        );
        Ok(id)
    }
}

impl Simulation {
    pub fn add_tandem(
        &mut self,
        name: impl Into<String>,
        sub_queues: impl IntoIterator<Item = QueueId>,
    ) -> Result<QueueId, ConfigurationError> {
        CompositeBuilder::new(name, sub_queues)
            .kind(CompositeKind::Tandem)
            .selector(TandemSelector)
            .build(self)
    }

    /// Parallel composite: every job visits exactly one sub-queue, picked by `selector`.
    pub fn add_parallel(
        &mut self,
        name: impl Into<String>,
        sub_queues: impl IntoIterator<Item = QueueId>,
        selector: impl QueueSelector + 'static,
    ) -> Result<QueueId, ConfigurationError> {
        CompositeBuilder::new(name, sub_queues)
            .kind(CompositeKind::Parallel)
            .selector(selector)
            .build(self)
    }

    /// Parallel composite with uniform random routing, seeded from the simulation seed.
    pub fn add_random_parallel(
        &mut self,
        name: impl Into<String>,
        sub_queues: impl IntoIterator<Item = QueueId>,
    ) -> Result<QueueId, ConfigurationError> {
        let seed = self.next_seed(SEED_DOMAIN_SELECTOR);
        self.add_parallel(name, sub_queues, RandomSelector::new(seed))
    }

    pub fn add_pattern_parallel(
        &mut self,
        name: impl Into<String>,
        sub_queues: impl IntoIterator<Item = QueueId>,
        pattern: Vec<usize>,
    ) -> Result<QueueId, ConfigurationError> {
        self.add_parallel(name, sub_queues, PatternSelector::new(pattern))
    }

    pub fn add_jsq(
        &mut self,
        name: impl Into<String>,
        sub_queues: impl IntoIterator<Item = QueueId>,
    ) -> Result<QueueId, ConfigurationError> {
        self.add_parallel(name, sub_queues, JoinShortestQueueSelector)
    }

    /// Open Jackson network over `sub_queues`, seeded from the simulation seed.
    pub fn add_jackson(
        &mut self,
        name: impl Into<String>,
        sub_queues: impl IntoIterator<Item = QueueId>,
        arrival: Vec<f64>,
        transitions: Vec<Vec<f64>>,
    ) -> Result<QueueId, ConfigurationError> {
        let seed = self.next_seed(SEED_DOMAIN_SELECTOR);
        CompositeBuilder::new(name, sub_queues)
            .kind(CompositeKind::Jackson)
            .selector(JacksonSelector::new(arrival, transitions, seed))
            .build(self)
    }

    pub fn add_feedback(
        &mut self,
        name: impl Into<String>,
        sub_queue: QueueId,
        controller: impl FeedbackController + 'static,
    ) -> Result<QueueId, ConfigurationError> {
        CompositeBuilder::new(name, [sub_queue])
            .kind(CompositeKind::Feedback)
            .selector(FeedbackSelector::new(controller))
            .build(self)
    }

    /// Feedback composite in which every job visits `sub_queue` exactly `visits` times.
    pub fn add_num_visits_feedback(
        &mut self,
        name: impl Into<String>,
        sub_queue: QueueId,
        visits: u32,
    ) -> Result<QueueId, ConfigurationError> {
        self.add_feedback(name, sub_queue, NumVisitsFeedback::new(visits))
    }

    /// Feedback composite that sends a job around again with `probability`,
    /// seeded from the simulation seed.
    pub fn add_probabilistic_feedback(
        &mut self,
        name: impl Into<String>,
        sub_queue: QueueId,
        probability: f64,
    ) -> Result<QueueId, ConfigurationError> {
        let seed = self.next_seed(SEED_DOMAIN_FEEDBACK);
        let controller = ProbabilisticFeedback::new(probability, seed)?;
        self.add_feedback(name, sub_queue, controller)
    }

    /// Composite that behaves exactly like `sub_queue`.
    pub fn add_encapsulator(
        &mut self,
        name: impl Into<String>,
        sub_queue: QueueId,
    ) -> Result<QueueId, ConfigurationError> {
        CompositeBuilder::new(name, [sub_queue])
            .kind(CompositeKind::Encapsulator)
            .start_model(StartModel::Encapsulator)
            .selector(SingleQueueSelector)
            .build(self)
    }

    /// Jobs visit `main`; those dropped there are sent to `drop_queue` instead.
    pub fn add_drop_collector(
        &mut self,
        name: impl Into<String>,
        main: QueueId,
        drop_queue: QueueId,
    ) -> Result<QueueId, ConfigurationError> {
        CompositeBuilder::new(name, [main, drop_queue])
            .kind(CompositeKind::DropCollector)
            .selector(SingleQueueSelector)
            .drop_destination(1)
            .build(self)
    }

    pub fn sub_queues(&self, composite: QueueId) -> Result<&[QueueId], QueueError> {
        Ok(&composite_ref(&self.queues, composite)?.sub_queues)
    }

    /// The delegate currently standing in for `real` inside `composite`.
    pub fn delegate_of(&self, composite: QueueId, real: JobId) -> Result<Option<JobId>, QueueError> {
        Ok(composite_ref(&self.queues, composite)?
            .real_to_delegate
            .get(&real)
            .copied())
    }

    pub fn real_job_of(&self, composite: QueueId, delegate: JobId) -> Result<Option<JobId>, QueueError> {
        Ok(composite_ref(&self.queues, composite)?
            .delegate_to_real
            .get(&delegate)
            .copied())
    }

    /// Completed sub-queue visits of a real job still inside `composite`.
    pub fn visits_of(&self, composite: QueueId, real: JobId) -> Result<Option<u32>, QueueError> {
        Ok(composite_ref(&self.queues, composite)?.visits.get(&real).copied())
    }

    pub(crate) fn composite_start_armed(&self, q: QueueId) -> bool {
        match composite_ref(&self.queues, q) {
            Ok(state) if state.start_model == StartModel::Encapsulator => {
                self.core(state.sub_queues[0]).start_armed
            }
            _ => true,
        }
    }

    pub(crate) fn composite_no_wait_armed(&self, q: QueueId) -> bool {
        let core = self.core(q);
        if core.vacation {
            return false;
        }
        match composite_ref(&self.queues, q) {
            Ok(state) if state.start_model == StartModel::Encapsulator => {
                self.no_wait_armed(state.sub_queues[0])
            }
            _ => core.credits.is_available(),
        }
    }

    pub(crate) fn composite_arrive(
        &mut self,
        q: QueueId,
        real: JobId,
        time: SimTime,
    ) -> Result<(), QueueError> {
        let start_model = composite_ref(&self.queues, q)?.start_model;
        let checkpoint = self.checkpoint(q);
        self.update_queue(q, time)?;
        let job_ref = self.job_ref(real);
        if self.core(q).vacation {
            debug!(queue = %q, job = %job_ref, time = %time, "Arrival dropped during queue-access vacation");
            self.core_mut(q).push(QueueEvent::Drop(job_ref));
            return self.fire(q);
        }

        let job_last_update = self.job(real)?.last_update_time();
        let core = self.core_mut(q);
        let seq = core.next_arrival_seq();
        core.waiting.push(real);
        core.push(QueueEvent::Arrival(job_ref.clone()));
        if let Some(job) = self.jobs.get_mut(&real) {
            job.attach(Visit::new(q, time, seq, 0.0));
        }
        composite_mut(&mut self.queues, q)?.visits.insert(real, 0);

        let admitted = match start_model {
            StartModel::Local => self.start_waiting(q, time).1,
            StartModel::Encapsulator => self.enter_encapsulated(q, real, time),
        };
        if let Err(err) = admitted {
            self.abandon_arrival(q, real, job_last_update, checkpoint);
            return Err(err);
        }
        debug!(queue = %q, job = %job_ref, time = %time, "Job arrived at composite");
        self.refresh_start_armed(q);
        self.fire(q)
    }

    fn enter_encapsulated(&mut self, q: QueueId, real: JobId, time: SimTime) -> Result<(), QueueError> {
        let sub = composite_ref(&self.queues, q)?.sub_queues[0];
        let delegate = self.create_delegate(q, real, time)?;
        self.arrive_at(sub, delegate, time)
    }

    fn checkpoint(&self, q: QueueId) -> Checkpoint {
        let core = self.core(q);
        Checkpoint {
            last_update: core.last_update,
            credits: core.credits,
            start_armed: core.start_armed,
            arrivals: core.arrivals,
            pending: core.pending.len(),
        }
    }

    fn restore(&mut self, q: QueueId, checkpoint: Checkpoint) {
        let core = self.core_mut(q);
        core.last_update = checkpoint.last_update;
        core.credits = checkpoint.credits;
        core.start_armed = checkpoint.start_armed;
        core.arrivals = checkpoint.arrivals;
        core.pending.truncate(checkpoint.pending);
    }

    /// Takes back an arrival whose job could not be admitted.
    fn abandon_arrival(&mut self, q: QueueId, real: JobId, job_last_update: SimTime, checkpoint: Checkpoint) {
        self.discard_delegate(q, real);
        if let Ok(state) = composite_mut(&mut self.queues, q) {
            state.visits.remove(&real);
        }
        self.core_mut(q).remove_job(real);
        if let Some(job) = self.jobs.get_mut(&real) {
            job.abandon_visit(job_last_update);
        }
        self.restore(q, checkpoint);
    }

    /// Forgets the delegate of `real`, if it has one.
    fn discard_delegate(&mut self, q: QueueId, real: JobId) {
        let Ok(state) = composite_mut(&mut self.queues, q) else {
            return;
        };
        let Some(delegate) = state.real_to_delegate.remove(&real) else {
            return;
        };
        state.delegate_to_real.remove(&delegate);
        if let Some(routing) = state.in_transit.remove(&delegate) {
            self.events.cancel(routing);
        }
        if let Some(job) = self.jobs.remove(&delegate) {
            if let Some(sub) = job.queue() {
                warn!(queue = %q, delegate = %delegate, sub_queue = %sub, "Discarding a delegate still in a sub-queue");
            }
        }
    }

    pub(crate) fn composite_revoke(
        &mut self,
        q: QueueId,
        real: JobId,
        time: SimTime,
        interrupt_service: bool,
    ) -> Result<bool, QueueError> {
        if !self.core(q).waiting.contains(&real) && !interrupt_service {
            return Ok(false);
        }
        let checkpoint = self.checkpoint(q);
        self.update_queue(q, time)?;
        let state = composite_ref(&self.queues, q)?;
        let delegate = state.real_to_delegate.get(&real).copied();
        let in_transit = delegate.is_some_and(|d| state.in_transit.contains_key(&d));
        let location = delegate.and_then(|d| self.jobs.get(&d).and_then(Job::queue).map(|sub| (d, sub)));

        let revoked = match location {
            Some((delegate, sub)) if !in_transit => {
                trace!(queue = %q, job = %real, sub_queue = %sub, "Revoking delegate");
                match self.revoke_at(sub, delegate, time, true) {
                    Ok(revoked) => revoked,
                    Err(err) => {
                        self.restore(q, checkpoint);
                        return Err(err);
                    }
                }
            }
            _ => {
                self.exit_real(q, real, QueueEvent::Revocation)?;
                true
            }
        };
        if revoked {
            debug!(queue = %q, job = %real, time = %time, "Job revoked from composite");
        }
        self.refresh_start_armed(q);
        self.fire(q)?;
        Ok(revoked)
    }

    pub(crate) fn composite_set_credits(
        &mut self,
        q: QueueId,
        time: SimTime,
        credits: ServerAccessCredits,
    ) -> Result<(), QueueError> {
        let state = composite_ref(&self.queues, q)?;
        let start_model = state.start_model;
        let first = state.sub_queues[0];
        let checkpoint = self.checkpoint(q);
        self.update_queue(q, time)?;
        let (started, result) = match start_model {
            StartModel::Encapsulator => {
                // Mirrored back from the sub-queue once it has processed the change.
                self.core_mut(q).credits = credits;
                (0, self.set_server_access_credits(first, time, credits))
            }
            StartModel::Local => {
                let core = self.core_mut(q);
                let was_available = core.credits.is_available();
                core.credits = credits;
                if was_available != credits.is_available() {
                    core.push(QueueEvent::ServerAccessCredits {
                        available: credits.is_available(),
                    });
                }
                self.start_waiting(q, time)
            }
        };
        if let Err(err) = result {
            if started == 0 {
                self.restore(q, checkpoint);
            } else {
                // Jobs that did start keep their place and are announced.
                self.refresh_start_armed(q);
                self.fire(q)?;
            }
            return Err(err);
        }
        self.refresh_start_armed(q);
        self.fire(q)
    }

    pub(crate) fn composite_reset(&mut self, q: QueueId) -> Result<(), QueueError> {
        let time = self.events.time();
        let state = composite_mut(&mut self.queues, q)?;
        let sub_queues = state.sub_queues.clone();
        // Sub-queue resets are not translated; hold them off until the inbox is cleared.
        state.draining = true;
        let mut result = Ok(());
        for sub in sub_queues {
            result = self.reset_queue_at(sub);
            if result.is_err() {
                break;
            }
        }

        let state = composite_mut(&mut self.queues, q)?;
        state.draining = false;
        state.inbox.clear();
        result?;

        for (_, event) in state.in_transit.drain() {
            self.events.cancel(event);
        }
        let delegates: Vec<JobId> = state.delegate_to_real.keys().copied().collect();
        state.delegate_to_real.clear();
        state.real_to_delegate.clear();
        state.visits.clear();
        state.selector.reset();
        for delegate in delegates {
            self.jobs.remove(&delegate);
        }

        let core = &self.queues[q.0].core;
        let reals: Vec<JobId> = core.waiting.iter().chain(core.executing.iter()).copied().collect();
        for real in reals {
            if let Some(job) = self.jobs.get_mut(&real) {
                job.detach(time);
            }
        }
        self.core_mut(q).reset(time);
        let armed = self.composite_start_armed(q);
        let core = self.core_mut(q);
        core.start_armed = armed;
        core.push(QueueEvent::Reset);
        debug!(queue = %q, time = %time, "Composite queue reset");
        self.fire(q)
    }

    /// Queues a sub-queue notification and processes the inbox unless that is
    /// already under way further up the stack.
    pub(crate) fn deliver_to_parent(
        &mut self,
        parent: QueueId,
        notification: QueueNotification,
    ) -> Result<(), QueueError> {
        let state = composite_mut(&mut self.queues, parent)?;
        state.inbox.push_back(notification);
        if state.draining {
            return Ok(());
        }
        state.draining = true;
        let result = self.drain_inbox(parent);
        if let Ok(state) = composite_mut(&mut self.queues, parent) {
            state.draining = false;
        }
        result?;
        self.fire(parent)
    }

    fn drain_inbox(&mut self, q: QueueId) -> Result<(), QueueError> {
        while let Some(notification) = composite_mut(&mut self.queues, q)?.inbox.pop_front() {
            self.handle_sub_notification(q, notification)?;
        }
        Ok(())
    }

    fn handle_sub_notification(
        &mut self,
        q: QueueId,
        notification: QueueNotification,
    ) -> Result<(), QueueError> {
        let state = composite_ref(&self.queues, q)?;
        let start_model = state.start_model;
        let drop_destination = state.drop_destination;
        let Some(index) = state.sub_queues.iter().position(|s| *s == notification.queue) else {
            warn!(queue = %q, from = %notification.queue, "Notification from a queue that is not a sub-queue");
            return Ok(());
        };
        let time = notification.time;
        self.update_queue(q, time)?;

        for event in notification.events {
            match event {
                QueueEvent::Reset
                | QueueEvent::Update
                | QueueEvent::Arrival(_)
                | QueueEvent::QueueAccessVacation { .. } => {}
                QueueEvent::StartArmed(_) => {
                    if start_model == StartModel::Encapsulator {
                        self.refresh_start_armed(q);
                    }
                }
                QueueEvent::ServerAccessCredits { available } => {
                    if start_model == StartModel::Encapsulator {
                        self.core_mut(q)
                            .push(QueueEvent::ServerAccessCredits { available });
                    }
                }
                QueueEvent::Start(delegate) => {
                    if start_model == StartModel::Encapsulator {
                        if let Some(real) = self.real_of(q, &delegate)? {
                            self.start_real(q, real, time);
                        }
                    }
                }
                QueueEvent::Drop(delegate) => {
                    let Some(real) = self.real_of(q, &delegate)? else {
                        continue;
                    };
                    match drop_destination {
                        Some(destination) if destination != index => {
                            trace!(queue = %q, job = %real, "Dropped delegate sent to drop destination");
                            self.route(q, delegate.id, destination, time)?;
                        }
                        _ => self.exit_real(q, real, QueueEvent::Drop)?,
                    }
                }
                QueueEvent::Revocation(delegate) => {
                    if let Some(real) = self.real_of(q, &delegate)? {
                        self.exit_real(q, real, QueueEvent::Revocation)?;
                    }
                }
                QueueEvent::AutoRevocation(delegate) => {
                    if let Some(real) = self.real_of(q, &delegate)? {
                        self.exit_real(q, real, QueueEvent::AutoRevocation)?;
                    }
                }
                QueueEvent::Departure(delegate) => {
                    let Some(real) = self.real_of(q, &delegate)? else {
                        continue;
                    };
                    if let Some(visits) = composite_mut(&mut self.queues, q)?.visits.get_mut(&real) {
                        *visits += 1;
                    }
                    let next = match start_model {
                        StartModel::Encapsulator => None,
                        StartModel::Local => self.select(q, real, Some(index), time)?,
                    };
                    match next {
                        Some(next) => self.route(q, delegate.id, next, time)?,
                        None => self.exit_real(q, real, QueueEvent::Departure)?,
                    }
                }
            }
        }

        if start_model == StartModel::Encapsulator {
            let credits = self.core(notification.queue).credits;
            self.core_mut(q).credits = credits;
        }
        Ok(())
    }

    fn real_of(&self, q: QueueId, delegate: &JobRef) -> Result<Option<JobId>, QueueError> {
        let real = composite_ref(&self.queues, q)?
            .delegate_to_real
            .get(&delegate.id)
            .copied();
        if real.is_none() {
            warn!(queue = %q, delegate = %delegate, "Notification about an unknown delegate");
        }
        Ok(real)
    }

    /// Starts waiting real jobs while the composite has credits (local start model).
    ///
    /// Returns how many jobs left the waiting line, along with the error that
    /// stopped it. The job that failed to start is back at the head of the line
    /// with its credit returned.
    fn start_waiting(&mut self, q: QueueId, time: SimTime) -> (usize, Result<(), QueueError>) {
        let auto_revocation = match composite_ref(&self.queues, q) {
            Ok(state) => state.auto_revocation,
            Err(err) => return (0, Err(err)),
        };
        let mut started = 0;
        loop {
            let core = self.core_mut(q);
            if !core.credits.is_available() || core.waiting.is_empty() {
                return (started, Ok(()));
            }
            let before = (core.credits, core.pending.len());
            let real = core.waiting.remove(0);
            let exhausted = core.credits.consume();

            let result = match auto_revocation {
                AutoRevocationPolicy::UponStart => {
                    debug!(queue = %q, job = %real, time = %time, "Job auto-revoked at composite");
                    self.exit_real(q, real, QueueEvent::AutoRevocation)
                }
                AutoRevocationPolicy::Disabled => {
                    self.start_real(q, real, time);
                    if exhausted {
                        self.core_mut(q)
                            .push(QueueEvent::ServerAccessCredits { available: false });
                    }
                    self.dispatch(q, real, time)
                }
            };
            if let Err(err) = result {
                self.unstart(q, real, before);
                return (started, Err(err));
            }
            if exhausted && auto_revocation == AutoRevocationPolicy::UponStart {
                self.core_mut(q)
                    .push(QueueEvent::ServerAccessCredits { available: false });
            }
            started += 1;
        }
    }

    /// Sends a freshly started real job to its first sub-queue.
    fn dispatch(&mut self, q: QueueId, real: JobId, time: SimTime) -> Result<(), QueueError> {
        match self.select(q, real, None, time)? {
            Some(first) => {
                let delegate = self.create_delegate(q, real, time)?;
                self.route(q, delegate, first, time)
            }
            None => self.exit_real(q, real, QueueEvent::Departure),
        }
    }

    /// Puts a job whose start failed back at the head of the waiting line.
    fn unstart(&mut self, q: QueueId, real: JobId, (credits, pending): (ServerAccessCredits, usize)) {
        self.discard_delegate(q, real);
        let core = self.core_mut(q);
        core.remove_job(real);
        core.waiting.insert(0, real);
        core.credits = credits;
        core.pending.truncate(pending);
        if let Some(visit) = self.jobs.get_mut(&real).and_then(Job::visit_mut) {
            visit.start_time = None;
        }
    }

    fn start_real(&mut self, q: QueueId, real: JobId, time: SimTime) {
        let job_ref = self.job_ref(real);
        let core = self.core_mut(q);
        if let Some(index) = core.waiting.iter().position(|j| *j == real) {
            core.waiting.remove(index);
        }
        core.executing.push(real);
        core.push(QueueEvent::Start(job_ref));
        if let Some(visit) = self.jobs.get_mut(&real).and_then(Job::visit_mut) {
            visit.start_time = Some(time);
        }
        trace!(queue = %q, job = %real, time = %time, "Job started at composite");
    }

    /// Asks the selector where `real` goes next.
    fn select(
        &mut self,
        q: QueueId,
        real: JobId,
        previous: Option<usize>,
        time: SimTime,
    ) -> Result<Option<usize>, QueueError> {
        let state = composite_ref(&self.queues, q)?;
        let statuses: Vec<QueueStatus> = state.sub_queues.iter().map(|s| self.status_of(*s)).collect();
        let visits = state.visits.get(&real).copied().unwrap_or(0);

        let Simulation { queues, jobs, .. } = self;
        let job = jobs.get(&real).ok_or(QueueError::JobNotFound(real))?;
        let state = composite_mut(queues, q)?;
        let ctx = RoutingContext {
            time,
            job_id: real,
            job,
            visits,
            sub_queues: &statuses,
        };
        let choice = match previous {
            None => state.selector.select_first_queue(&ctx),
            Some(previous) => state.selector.select_next_queue(&ctx, previous),
        };
        if let Some(index) = choice.filter(|index| *index >= statuses.len()) {
            return Err(QueueError::InvalidSelection {
                queue: q,
                index,
                count: statuses.len(),
            });
        }
        trace!(queue = %q, job = %real, ?previous, ?choice, "Routing decision");
        Ok(choice)
    }

    fn create_delegate(&mut self, q: QueueId, real: JobId, time: SimTime) -> Result<JobId, QueueError> {
        let Simulation { queues, jobs, .. } = self;
        let job = jobs.get(&real).ok_or(QueueError::JobNotFound(real))?;
        let mut delegate = composite_mut(queues, q)?.factory.new_instance(time, job, q);
        delegate.mark_delegate_for(real);
        let id = self.add_job(delegate);
        let state = composite_mut(&mut self.queues, q)?;
        state.real_to_delegate.insert(real, id);
        state.delegate_to_real.insert(id, real);
        Ok(id)
    }

    /// Sends a delegate to sub-queue `index`.
    fn route(&mut self, q: QueueId, delegate: JobId, index: usize, time: SimTime) -> Result<(), QueueError> {
        let state = composite_ref(&self.queues, q)?;
        let sub = state.sub_queues[index];
        let routing = state.routing;
        match routing {
            RoutingMode::Immediate => self.arrive_at(sub, delegate, time),
            RoutingMode::Scheduled => {
                let event = self.events.schedule_named(
                    time,
                    "composite-routing",
                    move |sim: &mut Simulation| {
                        sim.routed_arrival(q, delegate, sub)?;
                        Ok(())
                    },
                )?;
                composite_mut(&mut self.queues, q)?
                    .in_transit
                    .insert(delegate, event);
                Ok(())
            }
        }
    }

    fn routed_arrival(&mut self, q: QueueId, delegate: JobId, sub: QueueId) -> Result<(), QueueError> {
        let state = composite_mut(&mut self.queues, q)?;
        state.in_transit.remove(&delegate);
        if !state.delegate_to_real.contains_key(&delegate) {
            return Ok(());
        }
        let time = self.events.time();
        self.arrive_at(sub, delegate, time)
    }

    /// Real job leaves the composite; its delegate, if any, is discarded.
    fn exit_real(&mut self, q: QueueId, real: JobId, event: fn(JobRef) -> QueueEvent) -> Result<(), QueueError> {
        composite_mut(&mut self.queues, q)?.visits.remove(&real);
        self.discard_delegate(q, real);
        self.exit_job(q, real, event);
        Ok(())
    }
}
