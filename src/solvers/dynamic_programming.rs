use log::debug;
use rayon::prelude::*;

use crate::basic_types::Action;
use crate::basic_types::JacobianChain;
use crate::basic_types::Mode;
use crate::basic_types::Operation;
use crate::basic_types::Sequence;
use crate::bracken_assert_simple;
use crate::solvers::SolverOptions;
use crate::statistics::log_statistic;

/// One entry of the dynamic-programming table: the cheapest known way
/// to accumulate the subchain `(j, i)` on `t` threads.
#[derive(Clone, Debug)]
struct Cell {
    op: Operation,
    cost: usize,
    /// Threads handed to the right subproblem of a parallel
    /// multiplication; 0 means the subproblems run in serial.
    thread_split: usize,
    visited: bool,
}

impl Cell {
    fn unvisited() -> Cell {
        Cell {
            op: Operation::accumulation(0, Mode::Tangent, 0),
            cost: usize::MAX,
            thread_split: 0,
            visited: false,
        }
    }
}

/// Optimal bracketing of a Jacobian chain by dynamic programming over
/// the triangular subchain lattice, parameterised by the number of
/// available threads.
///
/// `table[(j, i, t)]` holds the cheapest plan for the subchain `(j, i)`
/// on `t` threads. Entries of the same subchain length and thread count
/// are mutually independent, so each (length, t) anti-diagonal is
/// filled in parallel. The optimum is exact for one thread and for the
/// unlimited-thread model; for intermediate thread counts the emitted
/// schedule may be improvable and is typically post-processed by a
/// scheduler.
///
/// `O(L^3 * T^2)` time, `O(L^2 * T)` space.
#[derive(Debug)]
pub struct DynamicProgrammingSolver {
    options: SolverOptions,
    length: usize,
    usable_threads: usize,
    table: Vec<Cell>,
}

impl DynamicProgrammingSolver {
    pub fn new(options: SolverOptions) -> DynamicProgrammingSolver {
        DynamicProgrammingSolver {
            options,
            length: 0,
            usable_threads: 0,
            table: Vec::new(),
        }
    }

    /// Fills the table for `chain` and returns the reconstructed
    /// sequence for the full thread allowance.
    pub fn solve(&mut self, chain: &JacobianChain) -> Sequence {
        self.init(chain);

        let length = self.length;

        // Pre-accumulation costs; every diagonal cell lives at t = 1.
        let cells: Vec<(usize, Cell)> = (0..length)
            .into_par_iter()
            .map(|j| (self.cell_index(j, j, 1), self.accumulation_cell(chain, j)))
            .collect();
        self.commit(cells);

        // The thread counts iterate monotonically: parallel
        // multiplications at t read results for every t' < t.
        // `usable_threads` may be 0 (unlimited), hence the do-while
        // shape.
        let mut threads = 1;
        loop {
            for len in 2..=length {
                // Cells of equal length and thread count are mutually
                // independent.
                let cells: Vec<(usize, Cell)> = (len - 1..length)
                    .into_par_iter()
                    .map(|j| {
                        let i = j - (len - 1);
                        (self.cell_index(j, i, threads), self.subchain_cell(chain, j, i, threads))
                    })
                    .collect();
                self.commit(cells);
            }

            threads += 1;
            if threads > self.usable_threads {
                break;
            }
        }

        self.sequence(None)
    }

    fn init(&mut self, chain: &JacobianChain) {
        chain.init_subchains();
        self.length = chain.length();
        self.usable_threads = self.options.usable_threads(self.length);

        let mut cells = self.length * (self.length + 1) / 2;
        if self.usable_threads > 0 {
            cells *= self.usable_threads;
            // Pre-accumulation cells only ever use one thread.
            cells -= (self.usable_threads - 1) * self.length;
        }

        debug!("dynamic programming table cells: {cells}");
        log_statistic("dpTableCells", cells);

        self.table.clear();
        self.table.resize(cells, Cell::unvisited());
    }

    fn commit(&mut self, cells: Vec<(usize, Cell)>) {
        for (idx, cell) in cells {
            self.table[idx] = cell;
        }
    }

    /// The optimal cost of the full chain on `threads` threads (`None`
    /// for the full allowance).
    pub fn optimal_cost(&self, threads: Option<usize>) -> usize {
        let t = threads.unwrap_or(self.usable_threads);
        let cell = self.cell(self.length - 1, 0, t.max(1));
        bracken_assert_simple!(cell.visited, "no feasible plan reached the terminal cell");

        cell.cost
    }

    /// Reconstructs the operation sequence for `threads` threads
    /// (`None` for the full allowance). The schedule mirrors the cost
    /// accounting of the table; sibling ordering inside serial
    /// multiplications can leave idle gaps, so callers usually
    /// reschedule the result.
    pub fn sequence(&self, threads: Option<usize>) -> Sequence {
        let mut seq = Sequence::new();
        if self.length == 0 {
            return seq;
        }

        let t = threads.unwrap_or(self.usable_threads);
        let _ = self.build_sequence(
            self.length - 1,
            0,
            (0, t.saturating_sub(1)),
            &mut seq,
            0,
        );
        seq
    }

    fn build_sequence(
        &self,
        j: usize,
        i: usize,
        thread_pool: (usize, usize),
        seq: &mut Sequence,
        mut start_time: usize,
    ) -> usize {
        let t = if self.usable_threads == 0 {
            1
        } else {
            thread_pool.1 - thread_pool.0 + 1
        };
        let cell = self.cell(j, i, t);
        bracken_assert_simple!(cell.visited, "no feasible plan reached cell ({j}, {i})");

        let mut op = cell.op;
        match op.action {
            Action::Accumulation => {
                op.thread = thread_pool.0;
                op.start_time = if self.usable_threads > 0 {
                    seq.makespan(Some(op.thread)).max(start_time)
                } else {
                    0
                };
            }
            Action::Multiplication => {
                let mut pool_jk = thread_pool;
                let mut pool_ki = thread_pool;
                if cell.thread_split > 0 {
                    pool_ki.0 = thread_pool.0 + cell.thread_split;
                    pool_jk.1 = pool_ki.0 - 1;
                }

                let jk_end_time = self.build_sequence(j, op.k + 1, pool_jk, seq, start_time);

                // A zero split means the subproblems share the pool in
                // serial, so the left sibling waits for the right one.
                // The resulting schedule may be improvable; the caller
                // reschedules as a post-pass.
                if cell.thread_split == 0 {
                    start_time = jk_end_time;
                }

                let ki_end_time = self.build_sequence(op.k, i, pool_ki, seq, start_time);

                if jk_end_time >= ki_end_time {
                    op.thread = pool_jk.0;
                    op.start_time = jk_end_time;
                } else {
                    op.thread = pool_ki.0;
                    op.start_time = ki_end_time;
                }
            }
            Action::Elimination => {
                let end_time = if op.mode == Mode::Tangent {
                    self.build_sequence(op.k, i, thread_pool, seq, start_time)
                } else {
                    self.build_sequence(j, op.k + 1, thread_pool, seq, start_time)
                };

                op.thread = thread_pool.0;
                op.start_time = end_time;
            }
        }

        op.is_scheduled = true;
        let end_time = op.end_time();
        seq.push(op);
        end_time
    }

    /// Table index of `(j, i, t)`.
    ///
    /// The table stacks one triangular block per thread count, except
    /// that diagonal (pre-accumulation) cells exist only in the first
    /// block: a single accumulation can never use more than one thread.
    /// Blocks past the first therefore shrink by the `L` diagonal cells
    /// they do not store, and within such a block the `j` diagonal
    /// cells preceding `(j, i)` are gone as well, giving the
    /// `(t - 2) * L + j` correction.
    fn cell_index(&self, j: usize, i: usize, t: usize) -> usize {
        bracken_assert_simple!(j < self.length && i <= j);

        let mut idx = j * (j + 1) / 2 + i;
        if self.usable_threads > 0 && j != i {
            bracken_assert_simple!(t >= 1 && t <= self.usable_threads);

            idx += (t - 1) * self.length * (self.length + 1) / 2;
            if t >= 2 {
                idx -= (t - 2) * self.length + j;
            }
        }

        idx
    }

    fn cell(&self, j: usize, i: usize, t: usize) -> &Cell {
        &self.table[self.cell_index(j, i, t)]
    }

    /// The cheaper of the tangent and adjoint pre-accumulation of
    /// elemental `j`; adjoint only when its tape fits the memory
    /// budget.
    fn accumulation_cell(&self, chain: &JacobianChain, j: usize) -> Cell {
        let jac = chain.jacobian(j, j);

        let tangent_fma = jac.accumulation_fma(Mode::Tangent);
        let mut best = Cell {
            op: Operation::accumulation(j, Mode::Tangent, tangent_fma),
            cost: tangent_fma,
            thread_split: 0,
            visited: true,
        };

        if self.options.fits_memory(jac.edges_in_dag) {
            let adjoint_fma = jac.accumulation_fma(Mode::Adjoint);
            if adjoint_fma < best.cost {
                best = Cell {
                    op: Operation::accumulation(j, Mode::Adjoint, adjoint_fma),
                    cost: adjoint_fma,
                    thread_split: 0,
                    visited: true,
                };
            }
        }

        best
    }

    /// The cheapest way to accumulate the subchain `(j, i)` on `t`
    /// threads, over all split positions and actions.
    fn subchain_cell(&self, chain: &JacobianChain, j: usize, i: usize, t: usize) -> Cell {
        let mut best = Cell::unvisited();

        for k in i..j {
            self.try_multiplication(chain, j, i, k, t, &mut best);

            if self.options.matrix_free {
                self.try_elimination(chain, Mode::Tangent, j, i, k, t, &mut best);

                // Scan adjoint splits from the back so the longest
                // feasible adjoint elimination wins ties; this does not
                // change the cost but shortens the emitted sequence.
                let k_mirrored = j - (k - i + 1);
                self.try_elimination(chain, Mode::Adjoint, j, i, k_mirrored, t, &mut best);
            }
        }

        best
    }

    fn try_multiplication(
        &self,
        chain: &JacobianChain,
        j: usize,
        i: usize,
        k: usize,
        t: usize,
        best: &mut Cell,
    ) {
        let jk = self.cell(j, k + 1, t);
        let ki = self.cell(k, i, t);
        bracken_assert_simple!(jk.visited && ki.visited);

        // Both subproblems on the full pool. With a strict thread
        // resource the bundle serialises; in the unlimited model
        // siblings are free to overlap.
        let mut cost = if self.usable_threads > 0 {
            jk.cost + ki.cost
        } else {
            jk.cost.max(ki.cost)
        };
        let mut thread_split = 0;

        // Split the pool between the subproblems.
        for t1 in 1..t {
            let t2 = t - t1;
            let jk = self.cell(j, k + 1, t1);
            let ki = self.cell(k, i, t2);
            bracken_assert_simple!(jk.visited && ki.visited);

            let split_cost = jk.cost.max(ki.cost);
            if split_cost < cost {
                cost = split_cost;
                thread_split = t1;
            }
        }

        let fma = chain.elemental(j).m * chain.elemental(k).m * chain.elemental(i).n;
        let cost = cost + fma;

        if cost < best.cost {
            *best = Cell {
                op: Operation::multiplication(j, k, i, fma),
                cost,
                thread_split,
                visited: true,
            };
        }
    }

    fn try_elimination(
        &self,
        chain: &JacobianChain,
        mode: Mode,
        j: usize,
        i: usize,
        k: usize,
        t: usize,
        best: &mut Cell,
    ) {
        let (child_cost, fma) = match mode {
            Mode::Adjoint => {
                if !self.options.fits_memory(chain.jacobian(k, i).edges_in_dag) {
                    return;
                }

                let jk = self.cell(j, k + 1, t);
                bracken_assert_simple!(jk.visited);

                let fma = chain
                    .jacobian(k, i)
                    .elimination_fma(Mode::Adjoint, chain.elemental(j).m);
                (jk.cost, fma)
            }
            _ => {
                let ki = self.cell(k, i, t);
                bracken_assert_simple!(ki.visited);

                let fma = chain
                    .jacobian(j, k + 1)
                    .elimination_fma(Mode::Tangent, chain.elemental(i).n);
                (ki.cost, fma)
            }
        };

        let cost = child_cost + fma;
        if cost < best.cost {
            *best = Cell {
                op: Operation::elimination(mode, j, k, i, fma),
                cost,
                thread_split: 0,
                visited: true,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::Jacobian;
    use crate::basic_types::SearchState;

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

    fn uniform_chain(length: usize, dim: usize, edges: usize) -> JacobianChain {
        let elementals = (0..length).map(|k| elemental(k, dim, dim, edges)).collect();
        JacobianChain::new(elementals, 0)
    }

    fn options(threads: usize) -> SolverOptions {
        SolverOptions {
            available_threads: threads,
            ..SolverOptions::default()
        }
    }

    #[test]
    fn single_elemental_picks_the_cheaper_accumulation() {
        let mut jac = elemental(0, 5, 5, 100);
        jac.tangent_factor = 1.0;
        jac.adjoint_factor = 3.0;
        jac.derive_sweep_costs();
        let chain = JacobianChain::new(vec![jac], 0);

        let mut solver = DynamicProgrammingSolver::new(options(1));
        let seq = solver.solve(&chain);

        assert_eq!(solver.optimal_cost(None), 500);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].action, Action::Accumulation);
        assert_eq!(seq[0].mode, Mode::Tangent);
        assert_eq!(seq.makespan(None), 500);
    }

    #[test]
    fn bottleneck_chain_accumulates_around_the_thin_dimension() {
        // (1 -> 10 -> 1): tangent-accumulate the first elemental (one
        // sweep), adjoint-accumulate the second (one sweep), multiply.
        let chain = JacobianChain::new(
            vec![elemental(0, 1, 10, 10), elemental(1, 10, 1, 10)],
            0,
        );

        let mut solver = DynamicProgrammingSolver::new(options(1));
        let seq = solver.solve(&chain);

        // 10 (tangent acc) + 10 (adjoint acc) + 1 * 10 * 1 (product).
        assert_eq!(solver.optimal_cost(None), 30);

        assert_eq!(seq.len(), 3);
        let first = seq.iter().find(|op| op.j == 0).unwrap();
        let second = seq.iter().find(|op| op.j == 1 && op.i == 1).unwrap();
        assert_eq!(first.mode, Mode::Tangent);
        assert_eq!(second.mode, Mode::Adjoint);
        assert_eq!(seq[2].action, Action::Multiplication);
    }

    #[test]
    fn serial_composition_sums_with_strict_threads_and_maxes_unlimited() {
        let chain = uniform_chain(2, 2, 4);

        // Strict resource: both accumulations share the one thread.
        let mut strict = DynamicProgrammingSolver::new(options(1));
        let _ = strict.solve(&chain);
        assert_eq!(strict.optimal_cost(None), 8 + 8 + 8);

        // Unlimited model: siblings overlap for free.
        let mut unlimited = DynamicProgrammingSolver::new(options(0));
        let _ = unlimited.solve(&chain);
        assert_eq!(unlimited.optimal_cost(None), 8 + 8);
    }

    #[test]
    fn two_threads_overlap_sibling_subchains() {
        let chain = uniform_chain(3, 2, 4);

        let mut solver = DynamicProgrammingSolver::new(options(3));
        let seq = solver.solve(&chain);

        // Serial: 3 accumulations + 2 products = 24 + 16.
        assert_eq!(solver.optimal_cost(Some(1)), 40);
        // Two threads: one accumulation overlaps the inner product.
        assert!(solver.optimal_cost(Some(2)) < solver.optimal_cost(Some(1)));
        // The sequence for the full allowance achieves the table cost.
        assert_eq!(
            seq.makespan(None),
            solver.optimal_cost(None),
        );
    }

    #[test]
    fn makespans_never_increase_with_more_threads() {
        let chain = JacobianChain::new(
            vec![
                elemental(0, 3, 4, 20),
                elemental(1, 4, 2, 7),
                elemental(2, 2, 5, 13),
                elemental(3, 5, 3, 9),
            ],
            0,
        );

        let mut solver = DynamicProgrammingSolver::new(options(4));
        let _ = solver.solve(&chain);

        for t in 2..=4 {
            assert!(solver.optimal_cost(Some(t)) <= solver.optimal_cost(Some(t - 1)));
            assert!(
                solver.sequence(Some(t)).makespan(None)
                    <= solver.sequence(Some(1)).makespan(None)
            );
        }
    }

    #[test]
    fn memory_budget_excludes_adjoint_accumulations() {
        // Adjoint would be cheaper (m < n) but its tape does not fit.
        let mut jac = elemental(0, 5, 1, 100);
        jac.derive_sweep_costs();
        let chain = JacobianChain::new(vec![jac], 0);

        let solver_options = SolverOptions {
            available_threads: 1,
            available_memory: 50,
            ..SolverOptions::default()
        };
        let mut solver = DynamicProgrammingSolver::new(solver_options);
        let seq = solver.solve(&chain);

        assert_eq!(seq[0].mode, Mode::Tangent);
        assert_eq!(solver.optimal_cost(None), 500);
    }

    #[test]
    fn matrix_free_chains_prefer_eliminations_over_dense_products() {
        // Large dimensions make dense products expensive while a
        // single tangent sweep stays cheap.
        let chain = JacobianChain::new(
            vec![elemental(0, 10, 10, 5), elemental(1, 10, 10, 5)],
            0,
        );

        let solver_options = SolverOptions {
            available_threads: 1,
            matrix_free: true,
            ..SolverOptions::default()
        };
        let mut solver = DynamicProgrammingSolver::new(solver_options);
        let seq = solver.solve(&chain);

        // Accumulate one elemental (5 * 10 = 50), eliminate the other
        // across it (5 * 10 = 50); the dense route would add a
        // 10 * 10 * 10 product.
        assert_eq!(solver.optimal_cost(None), 100);
        assert!(seq.iter().any(|op| op.action == Action::Elimination));
    }

    #[test]
    fn emitted_sequences_apply_cleanly_and_accumulate_the_chain() {
        let chain = uniform_chain(4, 2, 4);
        let mut solver = DynamicProgrammingSolver::new(options(2));
        let seq = solver.solve(&chain);

        let mut state = SearchState::new(chain.length());
        for op in seq.iter() {
            assert!(state.apply(op), "operation {op} violates its preconditions");
        }
        assert!(state.is_accumulated(chain.length() - 1, 0));
    }

    #[test]
    fn start_times_respect_dependencies() {
        let chain = uniform_chain(5, 3, 6);
        let mut solver = DynamicProgrammingSolver::new(options(3));
        let seq = solver.solve(&chain);

        assert!(seq.is_scheduled());
        for op_idx in 0..seq.len() {
            assert!(seq[op_idx].start_time >= seq.earliest_start(op_idx));
        }
    }
}
