use std::sync::OnceLock;

use crate::basic_types::Action;
use crate::basic_types::Jacobian;
use crate::basic_types::Mode;
use crate::basic_types::Operation;
use crate::bracken_assert_moderate;
use crate::bracken_assert_simple;

/// An immutable chain of elemental Jacobians `F'_{L-1} * ... * F'_0`
/// together with lazily materialised summaries of every contiguous
/// subchain.
///
/// Subchain summaries are stored in an upper-triangular table indexed by
/// `(j, i)` with `i < j`; the diagonal maps to the elementals
/// themselves. Each slot is initialised at most once and may be forced
/// up-front with [`JacobianChain::init_subchains`], which keeps the
/// first-access critical section out of the solver hot loops.
#[derive(Debug, Default)]
pub struct JacobianChain {
    elementals: Vec<Jacobian>,
    sub_chains: Vec<OnceLock<Jacobian>>,
    /// Best makespan found per thread count; `optimized_costs[t]` is
    /// filled by the front end and consumed by the GraphML writer.
    pub optimized_costs: Vec<usize>,
    pub id: usize,
}

impl JacobianChain {
    pub fn new(elementals: Vec<Jacobian>, id: usize) -> JacobianChain {
        let len = elementals.len();
        let mut sub_chains = Vec::new();
        sub_chains.resize_with(len * len.saturating_sub(1) / 2, OnceLock::new);

        JacobianChain {
            elementals,
            sub_chains,
            optimized_costs: Vec::new(),
            id,
        }
    }

    /// Number of elemental Jacobians in the chain.
    pub fn length(&self) -> usize {
        self.elementals.len()
    }

    pub fn elemental(&self, k: usize) -> &Jacobian {
        &self.elementals[k]
    }

    pub fn elementals(&self) -> &[Jacobian] {
        &self.elementals
    }

    /// Forces every subchain summary so that later queries are pure
    /// reads.
    pub fn init_subchains(&self) {
        for j in 0..self.length() {
            for i in 0..j {
                let _ = self.jacobian(j, i);
            }
        }
    }

    /// The Jacobian summary of the subchain `F'_j * ... * F'_i`.
    ///
    /// The diagonal returns the elemental itself; off-diagonal entries
    /// are built on first access.
    pub fn jacobian(&self, j: usize, i: usize) -> &Jacobian {
        bracken_assert_simple!(j < self.length());
        bracken_assert_simple!(i <= j);

        if j == i {
            return &self.elementals[j];
        }

        let idx = j * (j - 1) / 2 + i;
        self.sub_chains[idx].get_or_init(|| self.build_subchain(j, i))
    }

    fn build_subchain(&self, j: usize, i: usize) -> Jacobian {
        let mut sub = Jacobian {
            i: self.elementals[i].i,
            j: self.elementals[j].j,
            n: self.elementals[i].n,
            m: self.elementals[j].m,
            ..Jacobian::default()
        };

        for k in i..=j {
            sub.edges_in_dag += self.elementals[k].edges_in_dag;
            sub.tangent_cost += self.elementals[k].tangent_cost;
            sub.adjoint_cost += self.elementals[k].adjoint_cost;
        }

        sub
    }

    /// Number of elementals currently accumulated in `state`.
    pub fn accumulated_jacobians(&self, state: &SearchState) -> usize {
        (0..self.length())
            .filter(|&j| state.is_accumulated(j, j))
            .count()
    }

    /// Upper bound on the number of operations any elimination sequence
    /// over this chain can contain. Sizes per-depth search statistics.
    pub fn longest_possible_sequence(&self) -> usize {
        let mut len = self.length();
        let mut remaining = self.length();

        while remaining > 0 {
            len += remaining % 2;
            remaining /= 2;
            len += remaining;
        }

        len
    }
}

/// The mutable flags of one branch of the search: per `(j, i)` whether
/// the subchain Jacobian has been materialised and whether it has been
/// consumed. The branch-and-bound solver owns one copy per branch and
/// unwinds it with strict stack discipline.
#[derive(Clone, Debug)]
pub struct SearchState {
    accumulated: Vec<bool>,
    used: Vec<bool>,
    length: usize,
}

impl SearchState {
    pub fn new(length: usize) -> SearchState {
        let slots = length * (length + 1) / 2;

        SearchState {
            accumulated: vec![false; slots],
            used: vec![false; slots],
            length,
        }
    }

    fn idx(&self, j: usize, i: usize) -> usize {
        bracken_assert_simple!(j < self.length);
        bracken_assert_simple!(i <= j);

        j * (j + 1) / 2 + i
    }

    pub fn is_accumulated(&self, j: usize, i: usize) -> bool {
        self.accumulated[self.idx(j, i)]
    }

    pub fn is_used(&self, j: usize, i: usize) -> bool {
        self.used[self.idx(j, i)]
    }

    /// Atomically checks the preconditions of `op` and toggles the
    /// affected flags. Returns `false` (leaving the state untouched)
    /// when a precondition is unmet.
    pub fn apply(&mut self, op: &Operation) -> bool {
        let ji = self.idx(op.j, op.i);
        if self.accumulated[ji] {
            return false;
        }

        if op.action != Action::Accumulation {
            let jk = self.idx(op.j, op.k + 1);
            let ki = self.idx(op.k, op.i);

            match op.mode {
                Mode::Tangent => {
                    if !self.accumulated[ki] || self.used[ki] || self.accumulated[jk] {
                        return false;
                    }
                    self.accumulated[jk] = true;
                    self.used[ki] = true;
                }
                Mode::Adjoint => {
                    if !self.accumulated[jk] || self.used[jk] || self.accumulated[ki] {
                        return false;
                    }
                    self.accumulated[ki] = true;
                    self.used[jk] = true;
                }
                Mode::None => {
                    if !self.accumulated[jk]
                        || self.used[jk]
                        || !self.accumulated[ki]
                        || self.used[ki]
                    {
                        return false;
                    }
                    self.used[jk] = true;
                    self.used[ki] = true;
                }
            }
        }

        self.accumulated[ji] = true;
        true
    }

    /// Undoes a previously applied `op`. Reverting an operation that was
    /// not applied is a programmer error.
    pub fn revert(&mut self, op: &Operation) {
        let ji = self.idx(op.j, op.i);
        bracken_assert_simple!(self.accumulated[ji], "revert without a prior apply");
        self.accumulated[ji] = false;

        if op.action != Action::Accumulation {
            let jk = self.idx(op.j, op.k + 1);
            let ki = self.idx(op.k, op.i);

            if op.mode == Mode::Tangent {
                self.accumulated[jk] = false;
            } else {
                self.used[jk] = false;
            }

            if op.mode == Mode::Adjoint {
                self.accumulated[ki] = false;
            } else {
                self.used[ki] = false;
            }
        }

        bracken_assert_moderate!(!self.accumulated[ji]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_chain(length: usize, edges: usize) -> JacobianChain {
        let elementals = (0..length)
            .map(|k| {
                let mut jac = Jacobian {
                    i: k,
                    j: k + 1,
                    n: 2,
                    m: 2,
                    edges_in_dag: edges,
                    ..Jacobian::default()
                };
                jac.derive_sweep_costs();
                jac
            })
            .collect();

        JacobianChain::new(elementals, 0)
    }

    #[test]
    fn subchain_summaries_sum_their_members() {
        let chain = uniform_chain(4, 10);
        chain.init_subchains();

        let sub = chain.jacobian(3, 1);
        assert_eq!(sub.edges_in_dag, 30);
        assert_eq!(sub.tangent_cost, 30);
        assert_eq!(sub.adjoint_cost, 30);
        assert_eq!(sub.n, 2);
        assert_eq!(sub.m, 2);
        assert_eq!(sub.i, 1);
        assert_eq!(sub.j, 4);
    }

    #[test]
    fn diagonal_queries_return_the_elemental() {
        let chain = uniform_chain(3, 7);

        assert_eq!(chain.jacobian(1, 1).edges_in_dag, 7);
        assert_eq!(chain.jacobian(1, 1), chain.elemental(1));
    }

    #[test]
    fn lazy_and_eager_subchains_agree() {
        let eager = uniform_chain(5, 3);
        eager.init_subchains();
        let lazy = uniform_chain(5, 3);

        for j in 0..5 {
            for i in 0..=j {
                assert_eq!(eager.jacobian(j, i), lazy.jacobian(j, i));
            }
        }
    }

    #[test]
    fn apply_rejects_unmet_preconditions() {
        let mut state = SearchState::new(2);

        // Multiplying (1, 0) requires both elementals accumulated.
        let product = Operation::multiplication(1, 0, 0, 1);
        assert!(!state.apply(&product));

        assert!(state.apply(&Operation::accumulation(0, Mode::Tangent, 1)));
        assert!(!state.apply(&product));

        assert!(state.apply(&Operation::accumulation(1, Mode::Tangent, 1)));
        assert!(state.apply(&product));
        assert!(state.is_accumulated(1, 0));
        assert!(state.is_used(0, 0));
        assert!(state.is_used(1, 1));
    }

    #[test]
    fn accumulating_twice_is_rejected() {
        let mut state = SearchState::new(2);
        let acc = Operation::accumulation(0, Mode::Tangent, 1);

        assert!(state.apply(&acc));
        assert!(!state.apply(&acc));
    }

    #[test]
    fn apply_then_revert_restores_the_state() {
        let mut state = SearchState::new(3);
        assert!(state.apply(&Operation::accumulation(0, Mode::Tangent, 1)));
        assert!(state.apply(&Operation::accumulation(1, Mode::Adjoint, 1)));

        let reference = state.clone();

        let product = Operation::multiplication(1, 0, 0, 4);
        assert!(state.apply(&product));
        state.revert(&product);

        assert_eq!(state.accumulated, reference.accumulated);
        assert_eq!(state.used, reference.used);
    }

    #[test]
    fn tangent_elimination_marks_the_folded_subchain() {
        let mut state = SearchState::new(2);
        assert!(state.apply(&Operation::accumulation(0, Mode::Tangent, 1)));

        // Folding elemental 1 over the accumulated J[0, 0] produces
        // J[1, 0] and blocks a later accumulation of elemental 1.
        let elimination = Operation::elimination(Mode::Tangent, 1, 0, 0, 2);
        assert!(state.apply(&elimination));
        assert!(state.is_accumulated(1, 0));
        assert!(state.is_accumulated(1, 1));
        assert!(state.is_used(0, 0));
        assert!(!state.apply(&Operation::accumulation(1, Mode::Tangent, 1)));

        state.revert(&elimination);
        assert!(!state.is_accumulated(1, 0));
        assert!(!state.is_accumulated(1, 1));
        assert!(!state.is_used(0, 0));
    }

    #[test]
    fn longest_possible_sequence_counts_accumulations_and_merges() {
        // Four elementals: 4 accumulations, then the halving bound
        // 2 + 1 + 1 on merge rounds.
        assert_eq!(uniform_chain(4, 1).longest_possible_sequence(), 8);
        // Odd lengths add a straggler at each halving.
        assert_eq!(uniform_chain(5, 1).longest_possible_sequence(), 10);
    }

    #[test]
    fn accumulated_jacobians_counts_the_diagonal() {
        let chain = uniform_chain(3, 1);
        let mut state = SearchState::new(3);

        assert_eq!(chain.accumulated_jacobians(&state), 0);
        assert!(state.apply(&Operation::accumulation(1, Mode::Tangent, 1)));
        assert_eq!(chain.accumulated_jacobians(&state), 1);
    }
}
