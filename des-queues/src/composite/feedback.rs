//! Feedback around a single sub-queue

use des_core::SimTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::selector::{QueueSelector, RoutingContext};
use crate::error::ConfigurationError;
use crate::job::Job;

/// Decides whether a job that just left the sub-queue goes around again.
pub trait FeedbackController {
    /// `visits` counts completed visits, including the one that just ended.
    fn feedback(&mut self, time: SimTime, job: &Job, visits: u32) -> bool;

    fn reset(&mut self) {}
}

/// Every job makes exactly `visits` visits.
#[derive(Debug, Clone, Copy)]
pub struct NumVisitsFeedback {
    visits: u32,
}

impl NumVisitsFeedback {
    pub fn new(visits: u32) -> Self {
        Self { visits }
    }
}

impl FeedbackController for NumVisitsFeedback {
    fn feedback(&mut self, _time: SimTime, _job: &Job, visits: u32) -> bool {
        visits < self.visits
    }
}

/// A job goes around again with a fixed probability.
#[derive(Debug, Clone)]
pub struct ProbabilisticFeedback {
    probability: f64,
    seed: u64,
    rng: StdRng,
}

impl ProbabilisticFeedback {
    pub fn new(probability: f64, seed: u64) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigurationError::invalid_value(
                "probability",
                format!("{probability} outside [0, 1]"),
            ));
        }
        Ok(Self {
            probability,
            seed,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl FeedbackController for ProbabilisticFeedback {
    fn feedback(&mut self, _time: SimTime, _job: &Job, _visits: u32) -> bool {
        self.rng.gen::<f64>() < self.probability
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

/// Routes every job into the only sub-queue and back while the controller says so.
pub struct FeedbackSelector<F> {
    controller: F,
}

impl<F: FeedbackController> FeedbackSelector<F> {
    pub fn new(controller: F) -> Self {
        Self { controller }
    }
}

impl<F: FeedbackController> QueueSelector for FeedbackSelector<F> {
    fn select_first_queue(&mut self, _ctx: &RoutingContext<'_>) -> Option<usize> {
        Some(0)
    }

    fn select_next_queue(&mut self, ctx: &RoutingContext<'_>, _previous: usize) -> Option<usize> {
        self.controller
            .feedback(ctx.time, ctx.job, ctx.visits)
            .then_some(0)
    }

    fn validate(&self, sub_queues: usize) -> Result<(), ConfigurationError> {
        if sub_queues != 1 {
            return Err(ConfigurationError::SubQueueCount {
                expected: 1,
                actual: sub_queues,
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.controller.reset();
    }
}
