use crate::error::SimError;
use crate::event_list::{SimContext, SimContextExt};
use crate::time::SimTime;

/// Simulation execution trait.
pub trait Execute<C: SimContext> {
    /// Executes the simulation until some stopping condition is reached.
    /// The condition is implementation-specific.
    fn execute(self, ctx: &mut C) -> Result<(), SimError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndCondition {
    Time(SimTime),
    NoEvents,
    Steps(usize),
}

/// Executor is used for simple execution of an entire simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executor {
    end_condition: EndCondition,
}

impl Executor {
    /// Simulation will end only once there is no available events in the queue.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            end_condition: EndCondition::NoEvents,
        }
    }

    /// Simulation will run every event scheduled no later than the given time.
    /// It may terminate early if no events are available.
    #[must_use]
    pub fn timed(time: SimTime) -> Self {
        Self {
            end_condition: EndCondition::Time(time),
        }
    }

    /// Simulation will execute exactly this many steps, unless we run out of events.
    #[must_use]
    pub fn steps(steps: usize) -> Self {
        Self {
            end_condition: EndCondition::Steps(steps),
        }
    }

    /// Registers a side effect that is called _after_ each simulation step.
    #[must_use]
    pub fn side_effect<C, F>(self, func: F) -> ExecutorWithSideEffect<F>
    where
        F: FnMut(&C),
    {
        ExecutorWithSideEffect {
            end_condition: self.end_condition,
            side_effect: func,
        }
    }
}

impl<C: SimContext> Execute<C> for Executor {
    fn execute(self, ctx: &mut C) -> Result<(), SimError> {
        run_with(ctx, self.end_condition, |_| {})
    }
}

pub struct ExecutorWithSideEffect<F> {
    end_condition: EndCondition,
    side_effect: F,
}

impl<C, F> Execute<C> for ExecutorWithSideEffect<F>
where
    C: SimContext,
    F: FnMut(&C),
{
    fn execute(self, ctx: &mut C) -> Result<(), SimError> {
        run_with(ctx, self.end_condition, self.side_effect)
    }
}

fn run_with<C, F>(ctx: &mut C, end_condition: EndCondition, mut side_effect: F) -> Result<(), SimError>
where
    C: SimContext,
    F: FnMut(&C),
{
    let mut step = |ctx: &mut C| -> Result<bool, SimError> {
        let stepped = ctx.run_single_step()?;
        if stepped {
            side_effect(ctx);
        }
        Ok(stepped)
    };
    match end_condition {
        EndCondition::Time(time) => {
            while ctx.event_list_ref().peek_time().is_some_and(|t| t <= time) {
                step(ctx)?;
            }
        }
        EndCondition::NoEvents => while step(ctx)? {},
        EndCondition::Steps(steps) => {
            for _ in 0..steps {
                if !step(ctx)? {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_list::EventList;

    #[derive(Default)]
    struct Ticker {
        events: EventList<Ticker>,
        counter: usize,
    }

    impl SimContext for Ticker {
        fn event_list(&mut self) -> &mut EventList<Self> {
            &mut self.events
        }

        fn event_list_ref(&self) -> &EventList<Self> {
            &self.events
        }
    }

    // Ticks every two seconds, ten times in total.
    fn tick(ticker: &mut Ticker) -> Result<(), SimError> {
        ticker.counter += 1;
        if ticker.counter < 10 {
            let next = ticker.now() + 2.0;
            ticker.events.schedule(next, tick)?;
        }
        Ok(())
    }

    fn started() -> Ticker {
        let mut ticker = Ticker::default();
        ticker.events.schedule(SimTime::zero(), tick).unwrap();
        ticker
    }

    #[test]
    fn test_create_executor() {
        assert_eq!(
            Executor::unbound(),
            Executor {
                end_condition: EndCondition::NoEvents
            }
        );
        assert_eq!(
            Executor::timed(SimTime::new(3.0)),
            Executor {
                end_condition: EndCondition::Time(SimTime::new(3.0))
            }
        );
        assert_eq!(
            Executor::steps(7),
            Executor {
                end_condition: EndCondition::Steps(7)
            }
        );
    }

    #[test]
    fn test_steps() {
        let mut ticker = started();
        Executor::steps(10).execute(&mut ticker).unwrap();
        assert_eq!(ticker.counter, 10);
    }

    #[test]
    fn test_steps_stops_before() {
        let mut ticker = started();
        // After 10 steps there are no events, so it will not execute all 100
        Executor::steps(100).execute(&mut ticker).unwrap();
        assert_eq!(ticker.counter, 10);
    }

    #[test]
    fn test_timed() {
        let mut ticker = started();
        Executor::timed(SimTime::new(6.0)).execute(&mut ticker).unwrap();
        assert_eq!(ticker.counter, 4);
        assert_eq!(ticker.now(), SimTime::new(6.0));
    }

    #[test]
    fn test_timed_clock_stops_early() {
        let mut ticker = started();
        Executor::timed(SimTime::new(5.0)).execute(&mut ticker).unwrap();
        assert_eq!(ticker.counter, 3);
        assert_eq!(ticker.now(), SimTime::new(4.0));
    }

    #[test]
    fn test_side_effect_runs_after_each_step() {
        let mut ticker = started();
        let mut observed = Vec::new();
        Executor::unbound()
            .side_effect(|t: &Ticker| observed.push(t.counter))
            .execute(&mut ticker)
            .unwrap();
        assert_eq!(observed, (1..=10).collect::<Vec<_>>());
    }
}
