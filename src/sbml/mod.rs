//! Model Representation
//!
//! This module holds the in-memory form of a reaction-network model: the
//! entity table (compartments, species, parameters, reactions, function
//! definitions), the rule list, and the typed expression trees used by
//! kinetic laws, rules and function bodies.
//!
//! Parsing the XML document format is the job of an external frontend; this
//! crate accepts the parsed structures, which also (de)serialize to a JSON
//! form via serde.

mod ast;
mod model;

pub use ast::{BinOp, BuiltinConst, Expr};
pub use model::{
    Compartment, Function, Model, Parameter, Reaction, Role, Rule, RuleKind, Species,
    SpeciesReference, Stoichiometry,
};

pub(crate) use ast::fmt_number;
