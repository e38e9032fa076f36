use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use crate::basic_types::JacobianChain;
use crate::basic_types::Mode;
use crate::basic_types::Operation;
use crate::basic_types::SearchState;
use crate::basic_types::Sequence;
use crate::bracken_assert_moderate;
use crate::scheduling::Scheduler;
use crate::solvers::SolverOptions;
use crate::statistics::BranchAndBoundStatistics;
use crate::termination::TerminationCondition;
use crate::termination::TimeBudget;

/// Exhaustive search over pre-accumulation choices and elimination
/// orderings.
///
/// The outer loop fixes how many elementals are pre-accumulated and
/// enumerates their identities in increasing order; each complete
/// choice spawns an independent task that descends into the elimination
/// orderings enabled by it. Partial sequences are cut when their
/// critical path cannot beat the incumbent; complete sequences are
/// handed to the scheduler, which may itself use the incumbent as a
/// bound.
///
/// All branches read one immutable chain; every branch owns its
/// sequence, flag state and candidate stack, cloned at spawn.
#[derive(Debug)]
pub struct BranchAndBoundSolver {
    options: SolverOptions,
    /// Makespan a solution has to beat. Seeding via
    /// [`BranchAndBoundSolver::set_upper_bound`] stores `U + 1` so a
    /// solution matching the seed is still accepted; among equals the
    /// first one found wins.
    upper_bound: AtomicUsize,
    timed_out: AtomicBool,
}

/// What a [`BranchAndBoundSolver::solve`] call found.
#[derive(Clone, Debug)]
pub struct BranchAndBoundResult {
    /// The best scheduled sequence, or `None` when no solution beat the
    /// seeded bound before the deadline.
    pub sequence: Option<Sequence>,
    /// Makespan of that sequence (`usize::MAX` without one).
    pub makespan: usize,
    /// `false` when the deadline cut the search short; the result is
    /// still valid, merely not proven optimal.
    pub finished_in_time: bool,
}

impl BranchAndBoundSolver {
    pub fn new(options: SolverOptions) -> BranchAndBoundSolver {
        BranchAndBoundSolver {
            options,
            upper_bound: AtomicUsize::new(usize::MAX),
            timed_out: AtomicBool::new(false),
        }
    }

    /// Seeds the search with a known solution cost, typically the
    /// dynamic-programming optimum.
    pub fn set_upper_bound(&self, upper_bound: usize) {
        self.upper_bound
            .store(upper_bound.saturating_add(1), Ordering::Relaxed);
    }

    pub fn solve(&self, chain: &JacobianChain, scheduler: &Scheduler) -> BranchAndBoundResult {
        chain.init_subchains();
        self.timed_out.store(false, Ordering::Relaxed);

        let length = chain.length();
        let best = Mutex::new(None);
        let statistics = BranchAndBoundStatistics::new(chain.longest_possible_sequence() + 1);

        let search = EliminationSearch {
            chain,
            scheduler,
            options: &self.options,
            usable_threads: self.options.usable_threads(length),
            bound: &self.upper_bound,
            best: &best,
            statistics: &statistics,
            time_budget: self.options.time_budget(),
            timed_out: &self.timed_out,
        };

        rayon::scope(|scope| {
            // Without eliminations at least L - 1 elementals must be
            // materialised; matrix-free chains can get away with a
            // single one.
            let mut accumulations = if self.options.matrix_free {
                0
            } else {
                length - 1
            };

            loop {
                accumulations += 1;
                if accumulations > length {
                    break;
                }

                let mut frame = SearchFrame::new(length);
                search.add_accumulation(scope, &mut frame, accumulations, 0);
            }
        });

        statistics.log();

        let sequence: Option<Sequence> = best
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let makespan = sequence
            .as_ref()
            .map_or(usize::MAX, |sequence| sequence.makespan(None));

        BranchAndBoundResult {
            sequence,
            makespan,
            finished_in_time: !self.timed_out.load(Ordering::Relaxed)
                && scheduler.finished_in_time(),
        }
    }
}

/// The owned state of one search branch; cloned whenever a branch is
/// handed to a task.
#[derive(Clone, Debug)]
struct SearchFrame {
    sequence: Sequence,
    state: SearchState,
    candidates: Vec<Operation>,
}

impl SearchFrame {
    fn new(length: usize) -> SearchFrame {
        SearchFrame {
            sequence: Sequence::new(),
            state: SearchState::new(length),
            candidates: Vec::new(),
        }
    }

    fn pop_candidates(&mut self, amount: usize) {
        for _ in 0..amount {
            let _ = self.candidates.pop();
        }
    }
}

/// Read-only context shared by all branches of one solve.
struct EliminationSearch<'a> {
    chain: &'a JacobianChain,
    scheduler: &'a Scheduler,
    options: &'a SolverOptions,
    usable_threads: usize,
    bound: &'a AtomicUsize,
    best: &'a Mutex<Option<Sequence>>,
    statistics: &'a BranchAndBoundStatistics,
    time_budget: Option<TimeBudget>,
    timed_out: &'a AtomicBool,
}

impl<'a> EliminationSearch<'a> {
    /// Picks `remaining` further elementals (in increasing order,
    /// starting at `first_j`) to pre-accumulate, then spawns the
    /// elimination descent for the completed choice.
    fn add_accumulation<'scope>(
        &'scope self,
        scope: &rayon::Scope<'scope>,
        frame: &mut SearchFrame,
        remaining: usize,
        first_j: usize,
    ) {
        if self.time_budget.should_stop() {
            self.timed_out.store(true, Ordering::Relaxed);
            return;
        }

        if remaining == 0 {
            let task_frame = frame.clone();
            scope.spawn(move |_| {
                let mut frame = task_frame;
                self.add_elimination(&mut frame, 0);
            });
            return;
        }

        for j in first_j..self.chain.length() {
            let op = self.cheapest_accumulation(j);
            if !frame.state.apply(&op) {
                continue;
            }

            frame.sequence.push(op);
            let pushed = self.push_possible_eliminations(frame, op.j, op.i);

            self.add_accumulation(scope, frame, remaining - 1, j + 1);

            frame.pop_candidates(pushed);
            let _ = frame.sequence.pop();
            frame.state.revert(&op);
        }
    }

    /// Descends into the elimination orderings over the candidate
    /// stack, starting at `elimination_idx`.
    fn add_elimination(&self, frame: &mut SearchFrame, elimination_idx: usize) {
        if self.time_budget.should_stop() {
            self.timed_out.store(true, Ordering::Relaxed);
            return;
        }

        let length = self.chain.length();
        if frame.state.is_accumulated(length - 1, 0) {
            // The completing operation is always the newest candidate,
            // so the stack holds nothing beyond it.
            bracken_assert_moderate!(elimination_idx == frame.candidates.len());
            self.statistics.count_leaf();
            self.dispatch_leaf(frame);
            return;
        }

        if frame.sequence.critical_path() >= self.bound.load(Ordering::Relaxed) {
            self.statistics.count_prune(frame.sequence.len());
            return;
        }

        for idx in elimination_idx..frame.candidates.len() {
            let op = frame.candidates[idx];
            if !frame.state.apply(&op) {
                continue;
            }

            frame.sequence.push(op);
            let pushed = self.push_possible_eliminations(frame, op.j, op.i);

            self.add_elimination(frame, idx + 1);

            frame.pop_candidates(pushed);
            let _ = frame.sequence.pop();
            frame.state.revert(&op);
        }
    }

    /// Schedules a fully eliminated sequence and installs it as the
    /// incumbent if strictly better.
    fn dispatch_leaf(&self, frame: &SearchFrame) {
        let mut scheduled = frame.sequence.clone();
        let upper_bound = self.bound.load(Ordering::Relaxed);
        let new_makespan = self
            .scheduler
            .schedule(&mut scheduled, self.usable_threads, upper_bound);

        if let Ok(mut best) = self.best.lock() {
            // Re-check under the lock; the bound may have moved.
            if new_makespan < self.bound.load(Ordering::Relaxed) {
                self.bound.store(new_makespan, Ordering::Relaxed);
                *best = Some(scheduled);
            }
        }
    }

    /// The cheaper of the two accumulation modes for elemental `j`;
    /// adjoint only when its tape fits the memory budget.
    fn cheapest_accumulation(&self, j: usize) -> Operation {
        let jac = self.chain.jacobian(j, j);
        let mut op = Operation::accumulation(j, Mode::Tangent, jac.accumulation_fma(Mode::Tangent));

        if self.options.fits_memory(jac.edges_in_dag) {
            let adjoint_fma = jac.accumulation_fma(Mode::Adjoint);
            if adjoint_fma < op.fma {
                op = Operation::accumulation(j, Mode::Adjoint, adjoint_fma);
            }
        }

        op
    }

    /// Pushes the eliminations enabled by the freshly produced Jacobian
    /// `(op_j, op_i)`: at most one extending it to the right and one to
    /// the left. Returns how many candidates were pushed.
    fn push_possible_eliminations(
        &self,
        frame: &mut SearchFrame,
        op_j: usize,
        op_i: usize,
    ) -> usize {
        let length = self.chain.length();
        let mut pushed = 0;

        // To the right: a multiplication with the longest accumulated
        // right partner, or a tangent elimination over the next
        // elemental.
        if op_j < length - 1 {
            let k = op_j;
            let i = op_i;
            let ki = self.chain.jacobian(k, i);

            let mut partner = None;
            for j in (k + 1..length).rev() {
                if frame.state.is_accumulated(j, k + 1) {
                    partner = Some(j);
                    break;
                }
            }

            match partner {
                Some(j) => {
                    let jk = self.chain.jacobian(j, k + 1);
                    frame
                        .candidates
                        .push(Operation::multiplication(j, k, i, jk.m * ki.m * ki.n));
                    pushed += 1;
                }
                None if self.options.matrix_free => {
                    let j = k + 1;
                    let jk = self.chain.jacobian(j, j);
                    bracken_assert_moderate!(!frame.state.is_accumulated(j, j));

                    frame.candidates.push(Operation::elimination(
                        Mode::Tangent,
                        j,
                        k,
                        i,
                        jk.elimination_fma(Mode::Tangent, ki.n),
                    ));
                    pushed += 1;
                }
                None => {}
            }
        }

        // To the left: a multiplication with the longest accumulated
        // left partner, or an adjoint elimination over the previous
        // elemental.
        if op_i > 0 {
            let k = op_i - 1;
            let j = op_j;
            let jk = self.chain.jacobian(j, k + 1);

            let mut partner = None;
            for i in 0..=k {
                if frame.state.is_accumulated(k, i) {
                    partner = Some(i);
                    break;
                }
            }

            match partner {
                Some(i) => {
                    let ki = self.chain.jacobian(k, i);
                    frame
                        .candidates
                        .push(Operation::multiplication(j, k, i, jk.m * ki.m * ki.n));
                    pushed += 1;
                }
                None if self.options.matrix_free => {
                    let i = k;
                    let ki = self.chain.jacobian(k, k);
                    bracken_assert_moderate!(!frame.state.is_accumulated(k, k));

                    if self.options.fits_memory(ki.edges_in_dag) {
                        frame.candidates.push(Operation::elimination(
                            Mode::Adjoint,
                            j,
                            k,
                            i,
                            ki.elimination_fma(Mode::Adjoint, jk.m),
                        ));
                        pushed += 1;
                    }
                }
                None => {}
            }
        }

        pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::Action;
    use crate::basic_types::Jacobian;
    use crate::scheduling::BranchAndBoundScheduler;
    use crate::scheduling::PriorityListScheduler;
    use crate::solvers::DynamicProgrammingSolver;

    fn elemental(k: usize, n: usize, m: usize, edges: usize) -> Jacobian {
        let mut jac = Jacobian {
            i: k,
            j: k + 1,
            n,
            m,
            edges_in_dag: edges,
            ..Jacobian::default()
        };
        jac.derive_sweep_costs();
        jac
    }

    fn mixed_chain() -> JacobianChain {
        JacobianChain::new(
            vec![
                elemental(0, 3, 4, 20),
                elemental(1, 4, 2, 7),
                elemental(2, 2, 5, 13),
                elemental(3, 5, 3, 9),
            ],
            0,
        )
    }

    fn options(threads: usize) -> SolverOptions {
        SolverOptions {
            available_threads: threads,
            ..SolverOptions::default()
        }
    }

    fn list_scheduler() -> Scheduler {
        Scheduler::PriorityList(PriorityListScheduler)
    }

    #[test]
    fn single_thread_optimum_matches_dynamic_programming() {
        let chain = mixed_chain();

        let mut dp = DynamicProgrammingSolver::new(options(1));
        let _ = dp.solve(&chain);

        let solver = BranchAndBoundSolver::new(options(1));
        let result = solver.solve(&chain, &list_scheduler());

        assert!(result.finished_in_time);
        assert_eq!(result.makespan, dp.optimal_cost(None));
    }

    #[test]
    fn found_sequences_apply_cleanly_and_accumulate_the_chain() {
        let chain = mixed_chain();
        let solver = BranchAndBoundSolver::new(options(2));
        let result = solver.solve(&chain, &list_scheduler());

        let sequence = result.sequence.expect("search ran to exhaustion");
        let mut state = SearchState::new(chain.length());
        for op in sequence.iter() {
            assert!(state.apply(op));
        }
        assert!(state.is_accumulated(chain.length() - 1, 0));
        assert_eq!(result.makespan, sequence.makespan(None));
        assert!(sequence.critical_path() <= result.makespan);
    }

    #[test]
    fn seeded_upper_bound_still_admits_an_equal_solution() {
        let chain = mixed_chain();

        let mut dp = DynamicProgrammingSolver::new(options(1));
        let _ = dp.solve(&chain);
        let dp_cost = dp.optimal_cost(None);

        let solver = BranchAndBoundSolver::new(options(1));
        solver.set_upper_bound(dp_cost);
        let result = solver.solve(&chain, &list_scheduler());

        // At one thread the search cannot beat the DP optimum, but the
        // seed admits matching it.
        assert_eq!(result.makespan, dp_cost);
        assert!(result.sequence.is_some());
    }

    #[test]
    fn unbeatable_upper_bound_yields_no_sequence() {
        let chain = mixed_chain();
        let solver = BranchAndBoundSolver::new(options(1));
        // Strictly below the optimum minus the seed slack.
        solver.set_upper_bound(0);
        let result = solver.solve(&chain, &list_scheduler());

        assert!(result.sequence.is_none());
        assert_eq!(result.makespan, usize::MAX);
        assert!(result.finished_in_time);
    }

    #[test]
    fn more_threads_never_worsen_the_makespan() {
        let chain = mixed_chain();

        let serial = BranchAndBoundSolver::new(options(1)).solve(&chain, &list_scheduler());
        let parallel = BranchAndBoundSolver::new(options(2)).solve(&chain, &list_scheduler());

        assert!(parallel.makespan <= serial.makespan);
    }

    #[test]
    fn tight_memory_budget_forces_pure_tangent_sequences() {
        let chain = JacobianChain::new(
            (0..4).map(|k| elemental(k, 3, 3, 10)).collect::<Vec<_>>(),
            0,
        );
        let solver_options = SolverOptions {
            available_threads: 1,
            matrix_free: true,
            available_memory: 1,
            ..SolverOptions::default()
        };

        let solver = BranchAndBoundSolver::new(solver_options);
        let result = solver.solve(&chain, &list_scheduler());

        let sequence = result.sequence.expect("tangent-only plans remain feasible");
        assert!(sequence.iter().all(|op| op.mode != Mode::Adjoint));
    }

    #[test]
    fn matrix_free_search_uses_eliminations() {
        // Large dimensions make dense products expensive while single
        // sweeps stay cheap.
        let chain = JacobianChain::new(
            vec![elemental(0, 10, 10, 5), elemental(1, 10, 10, 5)],
            0,
        );
        let solver_options = SolverOptions {
            available_threads: 1,
            matrix_free: true,
            ..SolverOptions::default()
        };

        let solver = BranchAndBoundSolver::new(solver_options);
        let result = solver.solve(&chain, &list_scheduler());

        let sequence = result.sequence.expect("search ran to exhaustion");
        assert_eq!(result.makespan, 100);
        assert!(sequence.iter().any(|op| op.action == Action::Elimination));
    }

    #[test]
    fn expired_deadline_reports_not_finished() {
        let chain = mixed_chain();
        let solver_options = SolverOptions {
            available_threads: 1,
            time_to_solve: 1e-9,
            ..SolverOptions::default()
        };

        let solver = BranchAndBoundSolver::new(solver_options);
        let result = solver.solve(&chain, &list_scheduler());

        assert!(!result.finished_in_time);
    }

    #[test]
    fn branch_and_bound_scheduler_leaves_match_the_list_or_better() {
        let chain = mixed_chain();

        let listed = BranchAndBoundSolver::new(options(2)).solve(&chain, &list_scheduler());

        let bnb_scheduler = Scheduler::BranchAndBound(BranchAndBoundScheduler::new());
        let exact = BranchAndBoundSolver::new(options(2)).solve(&chain, &bnb_scheduler);

        assert!(exact.makespan <= listed.makespan);
    }
}
