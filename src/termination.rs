//! A [`TerminationCondition`] is polled by the branch-and-bound
//! components during the search. It indicates when the search should
//! stop, even if no definitive conclusion has been reached. Expiry is
//! cooperative: in-flight work is never killed, subsequent polls merely
//! return early with the best result found so far.

use std::time::Duration;
use std::time::Instant;

/// The central trait that defines a termination condition.
///
/// Conditions are polled concurrently from worker tasks, hence the
/// shared receiver.
pub trait TerminationCondition {
    /// Returns `true` when the search should stop, `false` otherwise.
    fn should_stop(&self) -> bool;
}

impl<T: TerminationCondition> TerminationCondition for Option<T> {
    fn should_stop(&self) -> bool {
        match self {
            Some(t) => t.should_stop(),
            None => false,
        }
    }
}

/// Give the search a specific time budget, measured on a monotonic
/// clock.
#[derive(Clone, Copy, Debug)]
pub struct TimeBudget {
    /// The point in time from which to measure the budget.
    started_at: Instant,
    /// The amount of time before [`TimeBudget::should_stop()`] becomes
    /// true.
    budget: Duration,
}

impl TimeBudget {
    /// Give the search a time budget, starting now.
    pub fn starting_now(budget: Duration) -> TimeBudget {
        let started_at = Instant::now();

        TimeBudget { started_at, budget }
    }

    /// The unspent part of the budget.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started_at.elapsed())
    }
}

impl TerminationCondition for TimeBudget {
    fn should_stop(&self) -> bool {
        self.started_at.elapsed() >= self.budget
    }
}

/// Never terminates the search; it runs to exhaustion.
#[derive(Clone, Copy, Debug, Default)]
pub struct Indefinite;

impl TerminationCondition for Indefinite {
    fn should_stop(&self) -> bool {
        false
    }
}
