//! Generic expression evaluation into a local variable

use crate::codegen::bindings::Bindings;
use crate::codegen::coder::{CoderBase, EmitCtx, IdGen, Outer};
use crate::codegen::fortran::Subroutine;
use crate::error::CompilerError;
use crate::sbml::{Expr, Model};

/// Evaluates one expression and assigns it to a generated variable
///
/// Used for assignment rules (`asgn`), kinetic laws (`rxn`, concentration
/// mode), stoichiometry math (`st`) and lowered function arguments (`arg`).
#[derive(Debug)]
pub struct EvalCoder {
    pub(crate) base: CoderBase,
    prefix: String,
    expr: Expr,
}

impl EvalCoder {
    pub fn new(
        entity: Option<String>,
        expr: Expr,
        prefix: impl Into<String>,
        only_conc: bool,
    ) -> Self {
        EvalCoder {
            base: CoderBase::new(entity, only_conc),
            prefix: prefix.into(),
            expr,
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        self.base.scan_expr(&self.expr, bindings, model, idgen, queue)
    }

    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        let text = self.base.formula(ctx).render(&self.expr, Outer::Top)?;
        target.declare(&self.base.var_name);
        target.stmt(&format!("{} = {}", self.base.var_name, text));
        Ok(())
    }
}
