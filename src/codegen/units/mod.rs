//! The emission-unit kinds

mod alg_state;
mod constant;
mod control;
mod delay;
mod diff_state;
mod eval;
mod function;
mod param;
mod plot;

pub use alg_state::AlgStateCoder;
pub use constant::ConstantCoder;
pub use control::{ControlCoder, Discretization};
pub use delay::DelayCoder;
pub use diff_state::DiffStateCoder;
pub use eval::EvalCoder;
pub use function::FnCallCoder;
pub use param::ParamCoder;
pub use plot::PlotCoder;
