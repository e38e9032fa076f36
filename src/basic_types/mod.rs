mod chain;
mod jacobian;
mod operation;
mod sequence;

pub use chain::JacobianChain;
pub use chain::SearchState;
pub use jacobian::Jacobian;
pub use operation::Action;
pub use operation::Mode;
pub use operation::Operation;
pub use sequence::Sequence;
