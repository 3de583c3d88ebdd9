//! Expression trees for kinetic laws, rules and function bodies
//!
//! The external document parser hands expressions over as `Expr` trees. The
//! tree is a tagged union: the tag fixes the child count, so malformed
//! operator arities cannot be represented.

use serde::{Deserialize, Serialize};

/// Binary operators of the expression language
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Named mathematical constants
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinConst {
    Pi,
    E,
}

impl BuiltinConst {
    /// Registry key the constant is bound under
    pub fn key(&self) -> &'static str {
        match self {
            BuiltinConst::Pi => "pi",
            BuiltinConst::E => "e",
        }
    }
}

/// A node of the expression tree
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Num(f64),
    /// Reference to a model entity by id
    Name(String),
    /// The independent variable of the model
    Time,
    /// A named constant (`pi`, `e`)
    Const(BuiltinConst),
    /// Unary minus
    Neg(Box<Expr>),
    /// Binary operation
    Bin(BinOp, Box<Expr>, Box<Expr>),
    /// n-th root: degree, radicand
    Root(Box<Expr>, Box<Expr>),
    /// Function application
    Call(String, Vec<Expr>),
    /// Explicitly delayed value: expression, delay time
    Delay(Box<Expr>, Box<Expr>),
    /// Function definition body: formal arguments, body
    Lambda(Vec<String>, Box<Expr>),
}

impl Expr {
    pub fn num(v: f64) -> Self {
        Expr::Num(v)
    }

    pub fn name(id: impl Into<String>) -> Self {
        Expr::Name(id.into())
    }

    pub fn neg(x: Expr) -> Self {
        Expr::Neg(Box::new(x))
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Expr::Bin(BinOp::Add, Box::new(a), Box::new(b))
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::Bin(BinOp::Sub, Box::new(a), Box::new(b))
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::Bin(BinOp::Mul, Box::new(a), Box::new(b))
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::Bin(BinOp::Div, Box::new(a), Box::new(b))
    }

    pub fn pow(a: Expr, b: Expr) -> Self {
        Expr::Bin(BinOp::Pow, Box::new(a), Box::new(b))
    }

    pub fn root(degree: Expr, x: Expr) -> Self {
        Expr::Root(Box::new(degree), Box::new(x))
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(name.into(), args)
    }

    pub fn delay(value: Expr, delay: Expr) -> Self {
        Expr::Delay(Box::new(value), Box::new(delay))
    }

    pub fn lambda(args: Vec<&str>, body: Expr) -> Self {
        Expr::Lambda(args.iter().map(|a| a.to_string()).collect(), Box::new(body))
    }

    /// Collect every entity id referenced by name below this node
    ///
    /// Time and numeric literals are not references; call arguments are
    /// walked, call targets are not entity references.
    pub fn collect_names(&self, out: &mut std::collections::BTreeSet<String>) {
        match self {
            Expr::Name(n) => {
                out.insert(n.clone());
            }
            Expr::Num(_) | Expr::Time | Expr::Const(_) => {}
            Expr::Neg(a) => a.collect_names(out),
            Expr::Bin(_, a, b) | Expr::Root(a, b) | Expr::Delay(a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
            Expr::Call(_, args) => {
                for a in args {
                    a.collect_names(out);
                }
            }
            Expr::Lambda(_, body) => body.collect_names(out),
        }
    }
}

/// Format a numeric literal for FORTRAN source text
///
/// Whole numbers print without a decimal point.
pub(crate) fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}
