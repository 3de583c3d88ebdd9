//! `sbmlfort` compiles biochemical reaction-network models (SBML semantics,
//! delivered as an in-memory entity table) into FORTRAN-77 model functions:
//! a derivative subroutine, a residual subroutine for algebraic states, a
//! plot subroutine and one subroutine per measured observable, in the fixed
//! calling conventions of a dynamic-optimization solver suite.
//!
//! Typical flow: build or parse a [`sbml::Model`], hand it to
//! [`codegen::Compiler::new`], clone the default binding registry per
//! experiment, rebind controls and calibration parameters, compile.

pub mod codegen;
pub mod error;
pub mod sbml;

pub use codegen::{Bindings, Compiler, Discretization, Subroutine};
pub use error::CompilerError;
pub use sbml::{Expr, Model};
