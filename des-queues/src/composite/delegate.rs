//! Delegate jobs
//!
//! A composite never puts a real job into a sub-queue. It creates a delegate
//! that travels the sub-queues instead, and translates what happens to the
//! delegate back into notifications about the real job.

use des_core::{SimEntity, SimTime};

use crate::job::Job;
use crate::queue::QueueId;

pub trait DelegateJobFactory {
    fn new_instance(&mut self, time: SimTime, real_job: &Job, composite: QueueId) -> Job;
}

/// Delegate with the same name and the same per-queue service times as the real job.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDelegateJobFactory;

impl DelegateJobFactory for DefaultDelegateJobFactory {
    fn new_instance(&mut self, _time: SimTime, real_job: &Job, _composite: QueueId) -> Job {
        real_job.duplicate(real_job.name())
    }
}

/// Delegate requesting, at any queue, the service time the real job requests
/// at the composite.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncapsulatorDelegateJobFactory;

impl DelegateJobFactory for EncapsulatorDelegateJobFactory {
    fn new_instance(&mut self, _time: SimTime, real_job: &Job, composite: QueueId) -> Job {
        Job::new(real_job.name()).with_service_time(real_job.service_time(composite))
    }
}
