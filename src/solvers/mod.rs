//! Solvers search the space of elimination sequences over a Jacobian
//! chain: the dynamic program over the subchain lattice and the
//! exhaustive branch-and-bound over elimination orderings.

mod branch_and_bound;
mod dynamic_programming;

pub use branch_and_bound::BranchAndBoundResult;
pub use branch_and_bound::BranchAndBoundSolver;
pub use dynamic_programming::DynamicProgrammingSolver;

use std::time::Duration;

use crate::config::PropertyRegistry;
use crate::termination::TimeBudget;

/// The configured knobs shared by both solvers; every field has a
/// config-file key.
#[derive(Clone, Debug)]
pub struct SolverOptions {
    /// Whether eliminations are permitted (no materialisation of
    /// intermediate Jacobians).
    pub matrix_free: bool,
    /// Whether to assume that the Jacobians are banded. Stored but not
    /// consumed by the dense cost model.
    pub banded: bool,
    /// Whether to assume that the Jacobians are sparse. Stored but not
    /// consumed by the dense cost model.
    pub sparse: bool,
    /// Memory budget for adjoint-producing operations; 0 means
    /// unlimited.
    pub available_memory: usize,
    /// Threads available for the evaluation of the chain; 0 means
    /// unlimited.
    pub available_threads: usize,
    /// Wall-clock limit in seconds for the branch & bound searches;
    /// non-positive values disable the limit.
    pub time_to_solve: f64,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            matrix_free: false,
            banded: false,
            sparse: false,
            available_memory: 0,
            available_threads: 0,
            time_to_solve: -1.0,
        }
    }
}

impl SolverOptions {
    pub fn registry() -> PropertyRegistry<SolverOptions> {
        let mut registry = PropertyRegistry::new();

        registry.register(
            "matrix_free",
            "Whether we optimize the matrix-free problem.",
            |options: &mut SolverOptions, tokens| {
                options.matrix_free = tokens.parse_bool("matrix_free")?;
                Ok(())
            },
        );
        registry.register(
            "banded",
            "Whether to assume that the Jacobians are banded.",
            |options, tokens| {
                options.banded = tokens.parse_bool("banded")?;
                Ok(())
            },
        );
        registry.register(
            "sparse",
            "Whether to assume that the Jacobians are sparse.",
            |options, tokens| {
                options.sparse = tokens.parse_bool("sparse")?;
                Ok(())
            },
        );
        registry.register(
            "available_memory",
            "Amount of available persistent memory (0 = unlimited).",
            |options, tokens| {
                options.available_memory = tokens.parse_value("available_memory")?;
                Ok(())
            },
        );
        registry.register(
            "available_threads",
            "Amount of threads that are available for the evaluation of the \
             Jacobian chain (0 = unlimited).",
            |options, tokens| {
                options.available_threads = tokens.parse_value("available_threads")?;
                Ok(())
            },
        );
        registry.register(
            "time_to_solve",
            "Time limit for the branch & bound searches in seconds \
             (non-positive = unlimited).",
            |options, tokens| {
                options.time_to_solve = tokens.parse_value("time_to_solve")?;
                Ok(())
            },
        );

        registry
    }

    /// Threads the solvers actually plan for: never more than the chain
    /// has elementals; 0 keeps the unlimited-thread model.
    pub fn usable_threads(&self, chain_length: usize) -> usize {
        self.available_threads.min(chain_length)
    }

    /// Whether a tape of `edges_in_dag` fits the memory budget.
    pub fn fits_memory(&self, edges_in_dag: usize) -> bool {
        self.available_memory == 0 || edges_in_dag <= self.available_memory
    }

    /// A fresh deadline for one solve, if a limit is configured.
    pub fn time_budget(&self) -> Option<TimeBudget> {
        (self.time_to_solve > 0.0)
            .then(|| TimeBudget::starting_now(Duration::from_secs_f64(self.time_to_solve)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parse_from_config_records() {
        let mut options = SolverOptions::default();
        SolverOptions::registry()
            .parse_str(
                &mut options,
                "matrix_free 1 available_memory 512 available_threads 4 time_to_solve 2.5",
                false,
            )
            .unwrap();

        assert!(options.matrix_free);
        assert_eq!(options.available_memory, 512);
        assert_eq!(options.available_threads, 4);
        assert!(options.time_budget().is_some());
    }

    #[test]
    fn zero_memory_means_unlimited() {
        let options = SolverOptions::default();

        assert!(options.fits_memory(usize::MAX));

        let bounded = SolverOptions {
            available_memory: 10,
            ..SolverOptions::default()
        };
        assert!(bounded.fits_memory(10));
        assert!(!bounded.fits_memory(11));
    }

    #[test]
    fn usable_threads_never_exceed_the_chain_length() {
        let options = SolverOptions {
            available_threads: 16,
            ..SolverOptions::default()
        };

        assert_eq!(options.usable_threads(4), 4);
        assert_eq!(options.usable_threads(32), 16);
        assert_eq!(SolverOptions::default().usable_threads(4), 0);
    }

    #[test]
    fn non_positive_time_limits_are_unbounded() {
        assert!(SolverOptions::default().time_budget().is_none());
    }
}
