//! FORTRAN Code Generation
//!
//! This module turns a parsed reaction-network model into the FORTRAN-77
//! subroutine suite a dynamic-optimization solver consumes: a derivative
//! function, a residual function for algebraic states, a plot function and
//! one measurement function per requested observable.
//!
//! The [`Compiler`] scans the model once into a [`Bindings`] registry of
//! emission units. Experiment variants shallow-clone that registry and
//! rebind individual symbols (controls, calibration parameters) before
//! compiling; units are shared between clones, so a round resets every unit
//! it touched when it finishes.
//!
//! # Example
//!
//! ```
//! use sbmlfort::codegen::Compiler;
//! use sbmlfort::sbml::{Expr, Model, Rule, Species, Compartment};
//!
//! let mut model = Model::new("decay");
//! model.compartments.push(Compartment::new("cell").with_size(1.0));
//! model.species.push(Species::new("S", "cell").with_amount(1.0));
//! model.rules.push(Rule::rate("S", Expr::neg(Expr::name("S"))));
//!
//! let compiler = Compiler::new(model)?;
//! let mut bindings = compiler.default_bindings()?;
//! let functions = compiler.compile(&mut bindings, "", &[])?;
//! assert!(functions[0].to_string().contains("f(1) = -xd1"));
//! # Ok::<(), sbmlfort::error::CompilerError>(())
//! ```

mod bindings;
mod coder;
mod compiler;
mod fortran;
mod units;

pub use bindings::{Bindings, CoderRef};
pub use coder::Coder;
pub use compiler::Compiler;
pub use fortran::{Subroutine, WRAP_COLUMN};
pub use units::{
    AlgStateCoder, ConstantCoder, ControlCoder, DelayCoder, DiffStateCoder, Discretization,
    EvalCoder, FnCallCoder, ParamCoder, PlotCoder,
};

/// Index of the derivative-function buffer
pub const FFCN: usize = 0;
/// Index of the residual-function buffer
pub const GFCN: usize = 1;
/// Index of the plot-function buffer
pub const PLOTFCN: usize = 2;

/// Length of the transport chain a delay is lowered to
pub const DELAY_CHAIN: u32 = 5;
