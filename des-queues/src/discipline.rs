//! Queueing disciplines
//!
//! A discipline is a pure policy: it decides what happens to an arriving job
//! and how the service area is organised. The mechanics of moving jobs, firing
//! notifications and scheduling departures live in the primitive queue code and
//! are the same for every discipline.
//!
//! [`Discipline`] covers the standard disciplines. Other policies can be
//! plugged in by implementing [`SchedulingDiscipline`] and describing
//! themselves in terms of a [`ServiceModel`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigurationError;

/// What happens to a job the moment it is admitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// The job is dropped right after its arrival.
    Drop,
    /// The job departs right after its arrival, without ever starting.
    DepartImmediately,
    /// The job departs a fixed time after its arrival, without ever starting.
    DepartAfter(f64),
    /// The job waits to be started by the service model.
    Wait,
}

/// Order in which waiting jobs are taken into service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartOrder {
    Fifo,
    Lifo,
    ShortestJob,
    LongestJob,
    Random,
}

/// Selection rule of a preemptive single-server discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreemptiveOrder {
    /// The most recent arrival is served.
    Lifo,
    /// The job with the least remaining work is served.
    ShortestRemaining,
}

/// What happens to the job being served when it is preempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreemptionStrategy {
    /// Keep the service received so far.
    Resume,
    /// Forget the service received so far.
    Restart,
    /// Drop the preempted job.
    Drop,
    /// Let the preempted job depart.
    Depart,
}

/// Whether a queue revokes jobs at the moment they would start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoRevocationPolicy {
    #[default]
    Disabled,
    /// A job leaves the queue with an auto-revocation instead of starting.
    UponStart,
}

/// How the service area of a queue works.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceModel {
    /// Jobs never start.
    NoService,
    /// Started jobs are served to completion; `servers: None` means unlimited.
    NonPreemptive {
        servers: Option<usize>,
        order: StartOrder,
    },
    /// One job at a time is in service and may be preempted.
    Preemptive {
        order: PreemptiveOrder,
        strategy: PreemptionStrategy,
    },
    /// Every started job is served at rate `1/n`.
    Sharing,
}

/// Admission behaviour of a discipline.
pub trait AdmissionPolicy {
    fn admission(&self) -> Admission;

    /// Maximum number of waiting jobs; arrivals beyond it are dropped.
    fn waiting_room(&self) -> Option<usize> {
        None
    }
}

/// A queueing discipline usable by a primitive queue.
pub trait SchedulingDiscipline: AdmissionPolicy + fmt::Debug {
    /// Short conventional name, e.g. `FCFS` or `FCFS_B[2]`.
    fn name(&self) -> String;

    fn service_model(&self) -> ServiceModel;

    /// Service time actually applied to a job requesting `requested`.
    fn service_time(&self, requested: f64) -> f64 {
        requested
    }

    /// Seed for [`StartOrder::Random`].
    fn seed(&self) -> u64 {
        0
    }

    /// Checks the parameters before a queue is built with this discipline.
    fn validate(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Whether an arriving job would start immediately, given the number of
    /// jobs in the service area.
    fn is_start_armed(&self, jobs_executing: usize) -> bool {
        match self.service_model() {
            ServiceModel::NoService => false,
            ServiceModel::NonPreemptive { servers, .. } => {
                servers.map_or(true, |servers| jobs_executing < servers)
            }
            ServiceModel::Preemptive { order, .. } => match order {
                PreemptiveOrder::Lifo => true,
                PreemptiveOrder::ShortestRemaining => jobs_executing == 0,
            },
            ServiceModel::Sharing => true,
        }
    }
}

/// The standard disciplines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Discipline {
    /// Every arrival is dropped.
    Drop,
    /// Jobs stay forever.
    Sink,
    /// Jobs depart immediately.
    Zero,
    /// Every job departs `wait` after arrival without being served.
    Delay { wait: f64 },
    /// First come first served with `servers` servers and an optional waiting room.
    Fcfs {
        servers: usize,
        buffer: Option<usize>,
    },
    /// Non-preemptive last come first served.
    Lcfs,
    /// Preemptive last come first served.
    PreemptiveLcfs(PreemptionStrategy),
    /// Shortest job first.
    Sjf,
    /// Longest job first.
    Ljf,
    /// Shortest remaining time first, preempt-resume.
    Srtf,
    /// Waiting jobs are started in random order.
    Random { seed: u64 },
    /// Every job starts immediately.
    InfiniteServer,
    /// Every job starts immediately and is served for exactly `service_time`.
    InfiniteServerConstant { service_time: f64 },
    /// Egalitarian processor sharing.
    ProcessorSharing,
}

impl Discipline {
    /// Single-server FCFS with an unlimited waiting room.
    pub fn fcfs() -> Self {
        Discipline::Fcfs {
            servers: 1,
            buffer: None,
        }
    }

    pub fn fcfs_c(servers: usize) -> Self {
        Discipline::Fcfs {
            servers,
            buffer: None,
        }
    }

    /// Single-server FCFS with a waiting room of `buffer` jobs.
    pub fn fcfs_b(buffer: usize) -> Self {
        Discipline::Fcfs {
            servers: 1,
            buffer: Some(buffer),
        }
    }

    pub fn delay(wait: f64) -> Self {
        Discipline::Delay { wait }
    }
}

impl AdmissionPolicy for Discipline {
    fn admission(&self) -> Admission {
        match self {
            Discipline::Drop => Admission::Drop,
            Discipline::Zero => Admission::DepartImmediately,
            Discipline::Delay { wait } if *wait == 0.0 => Admission::DepartImmediately,
            Discipline::Delay { wait } if wait.is_finite() => Admission::DepartAfter(*wait),
            _ => Admission::Wait,
        }
    }

    fn waiting_room(&self) -> Option<usize> {
        match self {
            Discipline::Fcfs { buffer, .. } => *buffer,
            _ => None,
        }
    }
}

impl SchedulingDiscipline for Discipline {
    fn name(&self) -> String {
        match self {
            Discipline::Drop => "DROP".to_string(),
            Discipline::Sink => "SINK".to_string(),
            Discipline::Zero => "ZERO".to_string(),
            Discipline::Delay { wait } => format!("WUR[{wait}]"),
            Discipline::Fcfs { servers, buffer } => match (servers, buffer) {
                (1, None) => "FCFS".to_string(),
                (1, Some(b)) => format!("FCFS_B[{b}]"),
                (c, None) => format!("FCFS_c[{c}]"),
                (c, Some(b)) => format!("FCFS_c[{c}]_B[{b}]"),
            },
            Discipline::Lcfs => "LCFS".to_string(),
            Discipline::PreemptiveLcfs(strategy) => format!("P_LCFS[{strategy:?}]"),
            Discipline::Sjf => "SJF".to_string(),
            Discipline::Ljf => "LJF".to_string(),
            Discipline::Srtf => "SRTF".to_string(),
            Discipline::Random { .. } => "RANDOM".to_string(),
            Discipline::InfiniteServer => "IS".to_string(),
            Discipline::InfiniteServerConstant { service_time } => format!("IS_CST[{service_time}]"),
            Discipline::ProcessorSharing => "PS".to_string(),
        }
    }

    fn service_model(&self) -> ServiceModel {
        let single = |order| ServiceModel::NonPreemptive {
            servers: Some(1),
            order,
        };
        match self {
            Discipline::Drop | Discipline::Sink | Discipline::Zero | Discipline::Delay { .. } => {
                ServiceModel::NoService
            }
            Discipline::Fcfs { servers, .. } => ServiceModel::NonPreemptive {
                servers: Some(*servers),
                order: StartOrder::Fifo,
            },
            Discipline::Lcfs => single(StartOrder::Lifo),
            Discipline::Sjf => single(StartOrder::ShortestJob),
            Discipline::Ljf => single(StartOrder::LongestJob),
            Discipline::Random { .. } => single(StartOrder::Random),
            Discipline::PreemptiveLcfs(strategy) => ServiceModel::Preemptive {
                order: PreemptiveOrder::Lifo,
                strategy: *strategy,
            },
            Discipline::Srtf => ServiceModel::Preemptive {
                order: PreemptiveOrder::ShortestRemaining,
                strategy: PreemptionStrategy::Resume,
            },
            Discipline::InfiniteServer | Discipline::InfiniteServerConstant { .. } => {
                ServiceModel::NonPreemptive {
                    servers: None,
                    order: StartOrder::Fifo,
                }
            }
            Discipline::ProcessorSharing => ServiceModel::Sharing,
        }
    }

    fn service_time(&self, requested: f64) -> f64 {
        match self {
            Discipline::InfiniteServerConstant { service_time } => *service_time,
            _ => requested,
        }
    }

    fn seed(&self) -> u64 {
        match self {
            Discipline::Random { seed } => *seed,
            _ => 0,
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let (field, value) = match self {
            Discipline::Delay { wait } => ("wait", *wait),
            Discipline::InfiniteServerConstant { service_time } => ("service_time", *service_time),
            _ => return Ok(()),
        };
        // +inf is allowed: such jobs never leave.
        if value.is_nan() || value < 0.0 {
            return Err(ConfigurationError::invalid_value(
                field,
                format!("{value} is not a valid duration"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_edge_values() {
        assert_eq!(Discipline::delay(0.0).admission(), Admission::DepartImmediately);
        assert_eq!(Discipline::delay(2.5).admission(), Admission::DepartAfter(2.5));
        assert_eq!(Discipline::delay(f64::INFINITY).admission(), Admission::Wait);
        assert_eq!(
            Discipline::delay(f64::INFINITY).service_model(),
            ServiceModel::NoService
        );
    }

    #[test]
    fn durations_must_be_non_negative() {
        assert_eq!(Discipline::delay(0.0).validate(), Ok(()));
        assert_eq!(Discipline::delay(f64::INFINITY).validate(), Ok(()));
        assert!(matches!(
            Discipline::delay(-3.0).validate(),
            Err(ConfigurationError::InvalidValue { field, .. }) if field == "wait"
        ));
        assert!(Discipline::delay(f64::NAN).validate().is_err());
        assert!(Discipline::InfiniteServerConstant { service_time: -0.5 }
            .validate()
            .is_err());
        assert_eq!(Discipline::fcfs().validate(), Ok(()));
    }

    #[test]
    fn start_armed_follows_service_area() {
        assert!(!Discipline::Sink.is_start_armed(0));
        assert!(Discipline::fcfs().is_start_armed(0));
        assert!(!Discipline::fcfs().is_start_armed(1));
        assert!(Discipline::fcfs_c(3).is_start_armed(2));
        assert!(!Discipline::fcfs_c(0).is_start_armed(0));
        assert!(Discipline::InfiniteServer.is_start_armed(100));
        assert!(Discipline::PreemptiveLcfs(PreemptionStrategy::Resume).is_start_armed(1));
        assert!(!Discipline::Srtf.is_start_armed(1));
        assert!(Discipline::ProcessorSharing.is_start_armed(4));
    }

    #[test]
    fn names() {
        assert_eq!(Discipline::fcfs().name(), "FCFS");
        assert_eq!(Discipline::fcfs_b(2).name(), "FCFS_B[2]");
        assert_eq!(Discipline::fcfs_c(4).name(), "FCFS_c[4]");
        assert_eq!(Discipline::ProcessorSharing.to_string(), "PS");
    }

    #[test]
    fn constant_service_overrides_request() {
        let is_cst = Discipline::InfiniteServerConstant { service_time: 3.0 };
        assert_eq!(is_cst.service_time(7.0), 3.0);
        assert_eq!(Discipline::InfiniteServer.service_time(7.0), 7.0);
    }
}
