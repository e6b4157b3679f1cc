//! Traits shared by the resettable, time-stamped objects of a simulation,
//! plus the ordered listener registry they notify through.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::SimTime;

/// An object that can be returned to its initial state between runs.
pub trait Resettable {
    fn reset(&mut self);
}

/// An object whose continuous-time state can be brought up to `time`.
pub trait Updatable {
    fn update(&mut self, time: SimTime);
}

/// A named simulation object (a queue or a job) that tracks when it last changed.
pub trait SimEntity {
    fn name(&self) -> &str;

    fn last_update_time(&self) -> SimTime;
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

/// Listeners kept in registration order.
///
/// Iteration always follows registration order; removing a listener keeps the
/// relative order of the others.
pub struct ListenerRegistry<L: ?Sized> {
    next_id: u64,
    listeners: Vec<(ListenerId, Box<L>)>,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<L: ?Sized> fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<L>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> Option<Box<L>> {
        let index = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        Some(self.listeners.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut L> {
        self.listeners.iter_mut().map(|(_, listener)| listener.as_mut())
    }
}
