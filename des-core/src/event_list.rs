use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use tracing::{error, info, trace};

use crate::error::{EventError, SimError};
use crate::logging::event_span;
use crate::time::SimTime;
use crate::types::EventId;

/// The work an event performs once the event list reaches its time.
///
/// The action receives the simulation context that owns the event list, so it
/// may inspect and mutate everything, including scheduling further events.
pub type Action<C> = Box<dyn FnOnce(&mut C) -> Result<(), SimError>>;

/// An event that has not been handed to an [`EventList`] yet.
pub struct Event<C> {
    time: SimTime,
    name: Option<String>,
    action: Action<C>,
}

impl<C> Event<C> {
    pub fn new<F>(time: SimTime, action: F) -> Self
    where
        F: FnOnce(&mut C) -> Result<(), SimError> + 'static,
    {
        Self {
            time,
            name: None,
            action: Box::new(action),
        }
    }

    pub fn named<F>(time: SimTime, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&mut C) -> Result<(), SimError> + 'static,
    {
        Self {
            time,
            name: Some(name.into()),
            action: Box::new(action),
        }
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Split the event into its time and its action.
    pub fn into_action(self) -> (SimTime, Action<C>) {
        (self.time, self.action)
    }
}

impl<C> fmt::Debug for Event<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builds the events created through [`EventList::schedule`] and friends.
///
/// Swapping the factory lets a model decorate every event it schedules, for
/// example with a naming scheme used in traces.
pub trait EventFactory<C> {
    fn create(&mut self, time: SimTime, name: Option<String>, action: Action<C>) -> Event<C>;
}

/// Factory producing plain events.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEventFactory;

impl<C> EventFactory<C> for DefaultEventFactory {
    fn create(&mut self, time: SimTime, name: Option<String>, action: Action<C>) -> Event<C> {
        Event { time, name, action }
    }
}

/// Heap key of a pending event.
///
/// Ordering is by time, then by insertion sequence, reversed for min-heap
/// behaviour in `BinaryHeap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventEntry {
    time: SimTime,
    id: EventId,
}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Ordered collection of pending events plus the current simulation time.
///
/// Events execute in increasing time order; events with equal times execute in
/// insertion order. The sequence counter belongs to the list itself, so
/// independent event lists never influence each other.
pub struct EventList<C> {
    next_event_id: u64,
    queue: BinaryHeap<EventEntry>,
    pending: HashMap<EventId, Event<C>>,
    now: SimTime,
    start_time: SimTime,
    events_processed: u64,
    factory: Box<dyn EventFactory<C>>,
}

impl<C: 'static> Default for EventList<C> {
    fn default() -> Self {
        Self::new(SimTime::zero())
    }
}

impl<C> fmt::Debug for EventList<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventList")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .field("next_event_id", &self.next_event_id)
            .finish_non_exhaustive()
    }
}

impl<C: 'static> EventList<C> {
    /// Create an empty event list whose clock starts at `start_time`.
    pub fn new(start_time: SimTime) -> Self {
        Self {
            next_event_id: 0,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
            now: start_time,
            start_time,
            events_processed: 0,
            factory: Box::new(DefaultEventFactory),
        }
    }

    /// Replace the factory used by [`schedule`](Self::schedule).
    pub fn set_event_factory(&mut self, factory: Box<dyn EventFactory<C>>) {
        self.factory = factory;
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.now
    }

    /// The time the list was created with or last reset to.
    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    /// Number of events executed since the last reset.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Time of the next pending event, or `None` if none are left.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|entry| entry.time)
    }

    /// Schedules `action` at absolute time `time`.
    pub fn schedule<F>(&mut self, time: SimTime, action: F) -> Result<EventId, EventError>
    where
        F: FnOnce(&mut C) -> Result<(), SimError> + 'static,
    {
        let event = self.factory.create(time, None, Box::new(action));
        self.add(event)
    }

    /// Schedules a named `action` at absolute time `time`.
    pub fn schedule_named<F>(
        &mut self,
        time: SimTime,
        name: impl Into<String>,
        action: F,
    ) -> Result<EventId, EventError>
    where
        F: FnOnce(&mut C) -> Result<(), SimError> + 'static,
    {
        let event = self.factory.create(time, Some(name.into()), Box::new(action));
        self.add(event)
    }

    /// Schedules `action` at the current time, after all pending events at this time.
    pub fn schedule_now<F>(&mut self, action: F) -> Result<EventId, EventError>
    where
        F: FnOnce(&mut C) -> Result<(), SimError> + 'static,
    {
        self.schedule(self.now, action)
    }

    /// Adds a ready-made event.
    pub fn add(&mut self, event: Event<C>) -> Result<EventId, EventError> {
        if !event.time.is_finite() {
            return Err(EventError::NonFiniteTime(event.time));
        }
        if event.time < self.now {
            return Err(EventError::ScheduleInPast {
                time: event.time,
                now: self.now,
            });
        }
        self.next_event_id += 1;
        let id = EventId(self.next_event_id);
        trace!(event_id = %id, time = %event.time, name = ?event.name, "Event scheduled");
        self.queue.push(EventEntry {
            time: event.time,
            id,
        });
        self.pending.insert(id, event);
        Ok(id)
    }

    /// Returns `true` if the event is still waiting to be executed.
    pub fn contains(&self, id: EventId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Cancels a pending event. Returns `false` if it already ran or was cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            trace!(event_id = %id, "Event cancelled");
            self.discard_stale_head();
        }
        removed
    }

    /// Removes and returns the next pending event, advancing the clock to its time.
    pub fn pop(&mut self) -> Option<(EventId, Event<C>)> {
        let entry = self.queue.pop()?;
        let event = self.pending.remove(&entry.id);
        self.discard_stale_head();
        event.map(|event| {
            self.now = entry.time;
            self.events_processed += 1;
            (entry.id, event)
        })
    }

    /// Discards every pending event and moves the clock to `time`.
    pub fn reset(&mut self, time: SimTime) {
        info!(time = %time, discarded = self.pending.len(), "Event list reset");
        self.queue.clear();
        self.pending.clear();
        self.now = time;
        self.start_time = time;
        self.events_processed = 0;
    }

    /// Moves the clock forward without executing anything.
    pub(crate) fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    // Cancelled events leave their heap keys behind; keep the head live so that
    // `peek_time` never reports a cancelled event.
    fn discard_stale_head(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.pending.contains_key(&entry.id) {
                break;
            }
            self.queue.pop();
        }
    }
}

/// A simulation context owning an event list whose actions operate on the context.
pub trait SimContext: Sized + 'static {
    fn event_list(&mut self) -> &mut EventList<Self>;

    fn event_list_ref(&self) -> &EventList<Self>;
}

/// Run operations available on every [`SimContext`].
pub trait SimContextExt: SimContext {
    /// The current simulation time.
    fn now(&self) -> SimTime {
        self.event_list_ref().time()
    }

    /// Executes the next event. Returns `false` if there was none.
    fn run_single_step(&mut self) -> Result<bool, SimError> {
        let Some((id, event)) = self.event_list().pop() else {
            return Ok(false);
        };
        let span = event_span(id, event.name().unwrap_or("event"), event.time());
        let _guard = span.enter();
        trace!("Processing event");
        let (_, action) = event.into_action();
        if let Err(err) = action(self) {
            error!(error = %err, "Event failed, run aborted");
            return Err(err);
        }
        Ok(true)
    }

    /// Executes events until none are left.
    fn run(&mut self) -> Result<(), SimError> {
        while self.run_single_step()? {}
        Ok(())
    }

    /// Executes every event scheduled before `bound` (or at `bound` if
    /// `inclusive`). With `set_time_to_bound` the clock ends at `bound` even when
    /// the last executed event was earlier.
    fn run_until(
        &mut self,
        bound: SimTime,
        inclusive: bool,
        set_time_to_bound: bool,
    ) -> Result<(), SimError> {
        let now = self.now();
        if bound < now {
            return Err(EventError::BoundInPast { bound, now }.into());
        }
        while let Some(next) = self.event_list_ref().peek_time() {
            let due = if inclusive { next <= bound } else { next < bound };
            if !due {
                break;
            }
            self.run_single_step()?;
        }
        if set_time_to_bound && bound.is_finite() {
            self.event_list().advance_to(bound);
        }
        Ok(())
    }
}

impl<C: SimContext> SimContextExt for C {}
