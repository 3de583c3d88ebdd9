//! Algebraic state variables

use std::collections::BTreeSet;

use crate::codegen::bindings::Bindings;
use crate::codegen::coder::{CoderBase, EmitCtx, IdGen, Outer};
use crate::codegen::fortran::Subroutine;
use crate::error::CompilerError;
use crate::sbml::{Expr, Model};

/// A state variable determined implicitly by an algebraic constraint
///
/// Emits its residual `g(id) = …` into the residual buffer. In the flat
/// state vector, algebraic states sit behind all differential states, so
/// the header offsets by the number of `xd` ids handed out this round.
#[derive(Debug)]
pub struct AlgStateCoder {
    pub(crate) base: CoderBase,
    expr: Expr,
    /// Volatile quantities this constraint could determine; pruned during
    /// the assignment scan
    pub(crate) candidates: BTreeSet<String>,
}

impl AlgStateCoder {
    pub fn new(expr: Expr) -> Self {
        let mut candidates = BTreeSet::new();
        expr.collect_names(&mut candidates);
        AlgStateCoder {
            base: CoderBase::new(None, false),
            expr,
            candidates,
        }
    }

    pub(crate) fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        let expr = self.expr.clone();
        self.base.scan_expr(&expr, bindings, model, idgen, queue)
    }

    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        let text = self.base.formula(ctx).render(&self.expr, Outer::Top)?;
        target.stmt(&format!("g({}) = {}", self.base.id, text));
        Ok(())
    }

    pub(crate) fn emit_header(&self, target: &mut Subroutine, idgen: &IdGen) {
        target.declare(&self.base.var_name);
        target.stmt(&format!(
            "{} = x({})",
            self.base.var_name,
            self.base.id + idgen.count("xd")
        ));
    }
}
