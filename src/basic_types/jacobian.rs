use crate::basic_types::Mode;
use crate::bracken_assert_moderate;

/// One link of a Jacobian chain, or the synthesised summary of a
/// contiguous subchain.
///
/// An elemental Jacobian `F'_k` maps input variable `i` (dimension `n`)
/// to output variable `j = i + 1` (dimension `m`). The cost model is
/// derived from the DAG of the primal function: a single tangent or
/// adjoint sweep costs `round(edges_in_dag * factor)` fused
/// multiply-adds, and an adjoint sweep additionally requires a tape of
/// `edges_in_dag` persistent memory.
///
/// Subchain summaries keep the outer dimensions of the spanned range and
/// the sums of the contained tape sizes and sweep costs.
#[derive(Clone, Debug, PartialEq)]
pub struct Jacobian {
    /// Index of the input variable.
    pub i: usize,
    /// Index of the output variable.
    pub j: usize,
    /// Input dimension.
    pub n: usize,
    /// Output dimension.
    pub m: usize,
    /// Number of super-diagonals (upper bandwidth).
    pub ku: usize,
    /// Number of sub-diagonals (lower bandwidth).
    pub kl: usize,
    /// Number of non-zero elements (general sparsity).
    pub non_zero_elements: usize,
    /// Edges in the DAG of the primal function (~ tape size).
    pub edges_in_dag: usize,
    /// Runtime factor of a single tangent evaluation.
    pub tangent_factor: f64,
    /// Runtime factor of a single adjoint evaluation.
    pub adjoint_factor: f64,
    /// Cost of a single tangent sweep in fma.
    pub tangent_cost: usize,
    /// Cost of a single adjoint sweep in fma.
    pub adjoint_cost: usize,
}

impl Default for Jacobian {
    fn default() -> Jacobian {
        Jacobian {
            i: 0,
            j: 0,
            n: 0,
            m: 0,
            ku: 0,
            kl: 0,
            non_zero_elements: 0,
            edges_in_dag: 0,
            tangent_factor: 1.0,
            adjoint_factor: 1.0,
            tangent_cost: 0,
            adjoint_cost: 0,
        }
    }
}

impl Jacobian {
    /// Derives the sweep costs from the tape size and runtime factors.
    pub fn derive_sweep_costs(&mut self) {
        self.tangent_cost = (self.edges_in_dag as f64 * self.tangent_factor).round() as usize;
        self.adjoint_cost = (self.edges_in_dag as f64 * self.adjoint_factor).round() as usize;
    }

    /// Cost of a single directional sweep in the given mode.
    pub fn single_evaluation_fma(&self, mode: Mode) -> usize {
        bracken_assert_moderate!(mode != Mode::None);

        match mode {
            Mode::Adjoint => self.adjoint_cost,
            _ => self.tangent_cost,
        }
    }

    /// Cost of materialising this Jacobian as a dense matrix: one sweep
    /// per input column (tangent) or output row (adjoint).
    pub fn accumulation_fma(&self, mode: Mode) -> usize {
        let sweeps = match mode {
            Mode::Adjoint => self.m,
            _ => self.n,
        };

        self.single_evaluation_fma(mode) * sweeps
    }

    /// Cost of applying this (sub)chain's linear map across `width` rows
    /// or columns of an accumulated operand without materialising it.
    pub fn elimination_fma(&self, mode: Mode, width: usize) -> usize {
        self.single_evaluation_fma(mode) * width
    }
}
