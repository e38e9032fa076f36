//! Schedulers assign a thread and start time to every operation of a
//! sequence, minimising the makespan on a bounded number of threads.

mod branch_and_bound;
mod priority_list;

pub use branch_and_bound::BranchAndBoundScheduler;
pub use priority_list::PriorityListScheduler;

use crate::basic_types::Action;
use crate::basic_types::Sequence;

/// The available scheduling strategies. Solvers hold a shared reference
/// and dispatch through [`Scheduler::schedule`].
#[derive(Debug)]
pub enum Scheduler {
    /// Greedy priority-list scheduling; fast, not necessarily optimal.
    PriorityList(PriorityListScheduler),
    /// Exhaustive branch-and-bound over thread assignments; optimal
    /// within its deadline.
    BranchAndBound(BranchAndBoundScheduler),
}

impl Scheduler {
    /// Schedules `sequence` on at most `threads` threads (0 means
    /// unlimited) and returns the achieved makespan, or a value `>=
    /// upper_bound` when no schedule better than `upper_bound` exists.
    ///
    /// A schedule can never occupy more threads than the sequence has
    /// accumulations, so the thread count is capped accordingly before
    /// dispatching.
    pub fn schedule(&self, sequence: &mut Sequence, threads: usize, upper_bound: usize) -> usize {
        let accumulations = sequence
            .iter()
            .filter(|op| op.action == Action::Accumulation)
            .count();

        let mut usable_threads = accumulations;
        if threads > 0 && threads < usable_threads {
            usable_threads = threads;
        }

        match self {
            Scheduler::PriorityList(scheduler) => {
                scheduler.schedule_impl(sequence, usable_threads, upper_bound)
            }
            Scheduler::BranchAndBound(scheduler) => {
                scheduler.schedule_impl(sequence, usable_threads, upper_bound)
            }
        }
    }

    /// Whether the last schedule completed without hitting a deadline.
    pub fn finished_in_time(&self) -> bool {
        match self {
            Scheduler::PriorityList(_) => true,
            Scheduler::BranchAndBound(scheduler) => scheduler.finished_in_time(),
        }
    }
}
