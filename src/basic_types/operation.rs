use std::fmt::Display;
use std::fmt::Formatter;

use crate::bracken_assert_moderate;

/// What an [`Operation`] does to the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Materialise an elemental Jacobian as a dense matrix.
    Accumulation,
    /// Dense product of two accumulated (sub)Jacobians.
    Multiplication,
    /// Matrix-free application of an unaccumulated subchain across an
    /// accumulated operand.
    Elimination,
}

/// Evaluation mode of an accumulation or elimination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// No mode; only valid for [`Action::Multiplication`].
    None,
    /// Forward mode; cost scales with the input dimension.
    Tangent,
    /// Reverse mode; cost scales with the output dimension and requires
    /// persistent memory proportional to the tape size.
    Adjoint,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::None => write!(f, "---"),
            Mode::Tangent => write!(f, "TAN"),
            Mode::Adjoint => write!(f, "ADJ"),
        }
    }
}

/// A single abstract step of an elimination sequence.
///
/// The index triple `(j, k, i)` is interpreted per action:
///  - `Accumulation`: `j == k == i`, the elemental to accumulate.
///  - `Multiplication`: the product `J[j, k+1] * J[k, i]` with
///    `i <= k < j`.
///  - `Elimination`: tangent mode folds the subchain `(j, k+1)` over the
///    accumulated `J[k, i]`; adjoint mode folds `(k, i)` over the
///    accumulated `J[j, k+1]`.
///
/// Every operation produces the accumulated Jacobian `J[j, i]`. The
/// `thread`/`start_time`/`is_scheduled` fields are filled in by a
/// scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operation {
    pub action: Action,
    pub mode: Mode,
    pub j: usize,
    pub k: usize,
    pub i: usize,
    /// Work of this operation in fused multiply-adds.
    pub fma: usize,
    pub thread: usize,
    pub start_time: usize,
    pub is_scheduled: bool,
}

impl Operation {
    pub fn accumulation(j: usize, mode: Mode, fma: usize) -> Operation {
        bracken_assert_moderate!(mode != Mode::None);

        Operation {
            action: Action::Accumulation,
            mode,
            j,
            k: j,
            i: j,
            fma,
            thread: 0,
            start_time: 0,
            is_scheduled: false,
        }
    }

    pub fn multiplication(j: usize, k: usize, i: usize, fma: usize) -> Operation {
        bracken_assert_moderate!(i <= k && k < j);

        Operation {
            action: Action::Multiplication,
            mode: Mode::None,
            j,
            k,
            i,
            fma,
            thread: 0,
            start_time: 0,
            is_scheduled: false,
        }
    }

    pub fn elimination(mode: Mode, j: usize, k: usize, i: usize, fma: usize) -> Operation {
        bracken_assert_moderate!(mode != Mode::None);
        bracken_assert_moderate!(i <= k && k < j);

        Operation {
            action: Action::Elimination,
            mode,
            j,
            k,
            i,
            fma,
            thread: 0,
            start_time: 0,
            is_scheduled: false,
        }
    }

    /// The `(j, i)` range of the accumulated Jacobian this operation
    /// produces.
    pub fn result(&self) -> (usize, usize) {
        (self.j, self.i)
    }

    /// The point in time at which this operation finishes under the
    /// current schedule.
    pub fn end_time(&self) -> usize {
        self.start_time + self.fma
    }

    /// Whether `other` produces an accumulated Jacobian that this
    /// operation consumes. This is the dependency relation of the
    /// operation DAG: `other` must finish before `self` can start.
    pub fn consumes(&self, other: &Operation) -> bool {
        match (self.action, self.mode) {
            (Action::Accumulation, _) => false,
            (Action::Multiplication, _) => {
                other.result() == (self.j, self.k + 1) || other.result() == (self.k, self.i)
            }
            (Action::Elimination, Mode::Tangent) => other.result() == (self.k, self.i),
            (Action::Elimination, Mode::Adjoint) => other.result() == (self.j, self.k + 1),
            (Action::Elimination, Mode::None) => unreachable!("elimination without a mode"),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.action {
            Action::Accumulation => write!(f, "ACC {} ({})", self.mode, self.j)?,
            Action::Multiplication => {
                write!(
                    f,
                    "MUL ({} {}) ({} {})",
                    self.j,
                    self.k + 1,
                    self.k,
                    self.i
                )?;
            }
            Action::Elimination => {
                write!(f, "ELI {} ({} {} {})", self.mode, self.j, self.k, self.i)?;
            }
        }

        if self.is_scheduled {
            write!(f, "\t[thread {} @ {}]", self.thread, self.start_time)?;
        }

        write!(f, "\t{}", self.fma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplication_consumes_both_operands() {
        let left = Operation::accumulation(0, Mode::Tangent, 10);
        let right = Operation::accumulation(1, Mode::Adjoint, 20);
        let product = Operation::multiplication(1, 0, 0, 30);

        assert!(product.consumes(&left));
        assert!(product.consumes(&right));
        assert!(!left.consumes(&product));
        assert!(!left.consumes(&right));
    }

    #[test]
    fn accumulation_consumes_nothing() {
        let a = Operation::accumulation(2, Mode::Tangent, 1);
        let b = Operation::accumulation(3, Mode::Tangent, 1);

        assert!(!a.consumes(&b));
        assert!(!b.consumes(&a));
    }

    #[test]
    fn tangent_elimination_consumes_left_operand_only() {
        let left = Operation::accumulation(0, Mode::Tangent, 10);
        let elimination = Operation::elimination(Mode::Tangent, 1, 0, 0, 5);

        assert!(elimination.consumes(&left));

        let unrelated = Operation::accumulation(1, Mode::Tangent, 10);
        assert!(!elimination.consumes(&unrelated));
    }

    #[test]
    fn adjoint_elimination_consumes_right_operand_only() {
        let right = Operation::accumulation(2, Mode::Adjoint, 10);
        let elimination = Operation::elimination(Mode::Adjoint, 2, 1, 0, 5);

        assert!(elimination.consumes(&right));

        let unrelated = Operation::accumulation(1, Mode::Tangent, 10);
        assert!(!elimination.consumes(&unrelated));
    }

    #[test]
    fn nested_results_chain_through_consumes() {
        // (1, 0) produced by a multiplication is consumed by the wider
        // multiplication producing (2, 0).
        let inner = Operation::multiplication(1, 0, 0, 10);
        let top = Operation::accumulation(2, Mode::Tangent, 10);
        let outer = Operation::multiplication(2, 1, 0, 10);

        assert!(outer.consumes(&inner));
        assert!(outer.consumes(&top));
        assert!(!outer.consumes(&outer));
    }
}
