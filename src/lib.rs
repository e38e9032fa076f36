//! Provably good parallel evaluation schedules for Jacobian chains.
//!
//! A Jacobian chain is a sequence of local derivative matrices whose
//! product is the Jacobian of the composed function. How the product is
//! bracketed, which elementals are materialised in tangent or adjoint
//! mode, and how the resulting operations are mapped onto threads
//! together determine the arithmetic cost and the makespan of the
//! evaluation.
//!
//! The crate provides:
//!  - a chain model with subchain summaries and per-branch search state
//!    ([`JacobianChain`], [`SearchState`]),
//!  - abstract operations and elimination sequences with partial-order
//!    queries ([`Operation`], [`Sequence`]),
//!  - a dynamic-programming solver over the subchain lattice
//!    ([`solvers::DynamicProgrammingSolver`]) and an exhaustive
//!    branch-and-bound solver over elimination orderings
//!    ([`solvers::BranchAndBoundSolver`]),
//!  - a greedy list scheduler and an optimal branch-and-bound scheduler
//!    ([`scheduling::Scheduler`]),
//!  - a random chain generator, a key/value config loader and writers
//!    for GraphML, DOT and CSV output.

pub mod asserts;
pub mod basic_types;
pub mod config;
pub mod generation;
pub mod output;
pub mod scheduling;
pub mod solvers;
pub mod statistics;
pub mod termination;

pub use basic_types::Action;
pub use basic_types::Jacobian;
pub use basic_types::JacobianChain;
pub use basic_types::Mode;
pub use basic_types::Operation;
pub use basic_types::SearchState;
pub use basic_types::Sequence;
