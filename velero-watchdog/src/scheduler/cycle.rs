//! Poll cycle state machine.
//!
//! ```text
//! ReportStart -> Schedules -> Backups -> ReportEnd -> Rest -> ReportStart
//! ```
//!
//! One step runs per second once the cycle interval has elapsed. `Rest`
//! restarts the interval.

/// Loop counter wraps back to 1 above this value.
pub const MAX_LOOP_COUNTER: u64 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    ReportStart,
    Schedules,
    Backups,
    ReportEnd,
    Rest,
}

impl CycleStep {
    pub fn next(self) -> Self {
        match self {
            Self::ReportStart => Self::Schedules,
            Self::Schedules => Self::Backups,
            Self::Backups => Self::ReportEnd,
            Self::ReportEnd => Self::Rest,
            Self::Rest => Self::ReportStart,
        }
    }
}

/// Scheduler-private progress through the cycle.
#[derive(Debug, Clone)]
pub struct CycleState {
    cycle_seconds: u64,
    elapsed_seconds: u64,
    step: CycleStep,
    loop_counter: u64,
}

impl CycleState {
    /// Start with the interval already elapsed so the first round runs
    /// immediately.
    pub fn new(cycle_seconds: u64) -> Self {
        // Leave room for the elapsed counter to exceed the interval.
        let cycle_seconds = cycle_seconds.min(u64::MAX - 1);
        Self {
            cycle_seconds,
            elapsed_seconds: cycle_seconds + 1,
            step: CycleStep::ReportStart,
            loop_counter: 0,
        }
    }

    /// The step to run on this tick, if the interval has elapsed.
    pub fn due_step(&self) -> Option<CycleStep> {
        (self.elapsed_seconds > self.cycle_seconds).then_some(self.step)
    }

    /// Record that `step` ran and move to the next one.
    pub fn complete(&mut self, step: CycleStep) {
        match step {
            CycleStep::ReportStart => {
                self.loop_counter += 1;
                if self.loop_counter > MAX_LOOP_COUNTER {
                    self.loop_counter = 1;
                }
            }
            CycleStep::Rest => self.elapsed_seconds = 0,
            _ => {}
        }
        self.step = step.next();
    }

    /// One second of idle wait passed.
    pub fn tick(&mut self) {
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn loop_counter(&self) -> u64 {
        self.loop_counter
    }

    /// Seconds left before the next round starts.
    pub fn seconds_to_next_round(&self) -> u64 {
        self.cycle_seconds.saturating_sub(self.elapsed_seconds)
    }
}
