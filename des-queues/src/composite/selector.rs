//! Routing policies of composite queues
//!
//! A selector picks sub-queues by index into the composite's sub-queue list.
//! `None` means the job leaves the composite.

use des_core::SimTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ConfigurationError;
use crate::job::{Job, JobId};
use crate::queue::QueueStatus;

/// What a selector may look at when routing a job.
pub struct RoutingContext<'a> {
    pub time: SimTime,
    /// The real job being routed.
    pub job_id: JobId,
    pub job: &'a Job,
    /// Completed sub-queue visits of this job so far.
    pub visits: u32,
    /// Status of every sub-queue, in composite order.
    pub sub_queues: &'a [QueueStatus],
}

pub trait QueueSelector {
    /// Sub-queue for a job that just started at the composite.
    fn select_first_queue(&mut self, ctx: &RoutingContext<'_>) -> Option<usize>;

    /// Sub-queue for a job that just departed from sub-queue `previous`.
    fn select_next_queue(&mut self, ctx: &RoutingContext<'_>, previous: usize) -> Option<usize>;

    /// Checks the selector against the number of sub-queues it will route over.
    fn validate(&self, _sub_queues: usize) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Returns to the state right after construction.
    fn reset(&mut self) {}
}

/// Visits every sub-queue once, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TandemSelector;

impl QueueSelector for TandemSelector {
    fn select_first_queue(&mut self, ctx: &RoutingContext<'_>) -> Option<usize> {
        (!ctx.sub_queues.is_empty()).then_some(0)
    }

    fn select_next_queue(&mut self, ctx: &RoutingContext<'_>, previous: usize) -> Option<usize> {
        let next = previous + 1;
        (next < ctx.sub_queues.len()).then_some(next)
    }
}

/// Visits the first sub-queue once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleQueueSelector;

impl QueueSelector for SingleQueueSelector {
    fn select_first_queue(&mut self, ctx: &RoutingContext<'_>) -> Option<usize> {
        (!ctx.sub_queues.is_empty()).then_some(0)
    }

    fn select_next_queue(&mut self, _ctx: &RoutingContext<'_>, _previous: usize) -> Option<usize> {
        None
    }
}

/// Sends each job to one sub-queue picked uniformly at random.
#[derive(Debug, Clone)]
pub struct RandomSelector {
    seed: u64,
    rng: StdRng,
}

impl RandomSelector {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl QueueSelector for RandomSelector {
    fn select_first_queue(&mut self, ctx: &RoutingContext<'_>) -> Option<usize> {
        match ctx.sub_queues.len() {
            0 => None,
            n => Some(self.rng.gen_range(0..n)),
        }
    }

    fn select_next_queue(&mut self, _ctx: &RoutingContext<'_>, _previous: usize) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

/// Sends successive jobs to the sub-queues of a repeating pattern.
#[derive(Debug, Clone)]
pub struct PatternSelector {
    pattern: Vec<usize>,
    position: usize,
}

impl PatternSelector {
    pub fn new(pattern: Vec<usize>) -> Self {
        Self {
            pattern,
            position: 0,
        }
    }
}

impl QueueSelector for PatternSelector {
    fn select_first_queue(&mut self, _ctx: &RoutingContext<'_>) -> Option<usize> {
        let choice = *self.pattern.get(self.position)?;
        self.position = (self.position + 1) % self.pattern.len();
        Some(choice)
    }

    fn select_next_queue(&mut self, _ctx: &RoutingContext<'_>, _previous: usize) -> Option<usize> {
        None
    }

    fn validate(&self, sub_queues: usize) -> Result<(), ConfigurationError> {
        if self.pattern.is_empty() {
            return Err(ConfigurationError::invalid_value("pattern", "must not be empty"));
        }
        if let Some(bad) = self.pattern.iter().find(|i| **i >= sub_queues) {
            return Err(ConfigurationError::invalid_value(
                "pattern",
                format!("index {bad} out of range for {sub_queues} sub-queues"),
            ));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// Sends each job to the sub-queue holding the fewest jobs, lowest index on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinShortestQueueSelector;

impl QueueSelector for JoinShortestQueueSelector {
    fn select_first_queue(&mut self, ctx: &RoutingContext<'_>) -> Option<usize> {
        ctx.sub_queues
            .iter()
            .enumerate()
            .min_by_key(|(index, status)| (status.number_of_jobs, *index))
            .map(|(index, _)| index)
    }

    fn select_next_queue(&mut self, _ctx: &RoutingContext<'_>, _previous: usize) -> Option<usize> {
        None
    }
}

/// Probabilistic routing of an open Jackson network.
///
/// `arrival[i]` is the probability that a job entering the composite goes to
/// sub-queue `i`; `transitions[i][j]` the probability that a job leaving `i`
/// goes to `j`. Whatever is left of a row or of `arrival` is the probability of
/// leaving the composite.
#[derive(Debug, Clone)]
pub struct JacksonSelector {
    arrival: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    seed: u64,
    rng: StdRng,
}

impl JacksonSelector {
    pub fn new(arrival: Vec<f64>, transitions: Vec<Vec<f64>>, seed: u64) -> Self {
        Self {
            arrival,
            transitions,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn draw(&mut self, probabilities: &[f64]) -> Option<usize> {
        let u: f64 = self.rng.gen();
        let mut cumulative = 0.0;
        for (index, p) in probabilities.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return Some(index);
            }
        }
        None
    }
}

fn check_probabilities(field: &str, row: &[f64]) -> Result<(), ConfigurationError> {
    if let Some(p) = row.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(ConfigurationError::invalid_value(
            field,
            format!("probability {p} outside [0, 1]"),
        ));
    }
    let sum: f64 = row.iter().sum();
    if sum > 1.0 + 1e-9 {
        return Err(ConfigurationError::invalid_value(
            field,
            format!("probabilities sum to {sum}"),
        ));
    }
    Ok(())
}

impl QueueSelector for JacksonSelector {
    fn select_first_queue(&mut self, _ctx: &RoutingContext<'_>) -> Option<usize> {
        let arrival = std::mem::take(&mut self.arrival);
        let choice = self.draw(&arrival);
        self.arrival = arrival;
        choice
    }

    fn select_next_queue(&mut self, _ctx: &RoutingContext<'_>, previous: usize) -> Option<usize> {
        let row = self.transitions.get(previous)?.clone();
        self.draw(&row)
    }

    fn validate(&self, sub_queues: usize) -> Result<(), ConfigurationError> {
        if self.arrival.len() != sub_queues {
            return Err(ConfigurationError::invalid_value(
                "arrival",
                format!("expected {sub_queues} probabilities, got {}", self.arrival.len()),
            ));
        }
        if self.transitions.len() != sub_queues
            || self.transitions.iter().any(|row| row.len() != sub_queues)
        {
            return Err(ConfigurationError::invalid_value(
                "transitions",
                format!("expected a {sub_queues}x{sub_queues} matrix"),
            ));
        }
        check_probabilities("arrival", &self.arrival)?;
        for row in &self.transitions {
            check_probabilities("transitions", row)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
