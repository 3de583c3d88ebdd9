//! Explicit time delays lowered to transport chains

use crate::codegen::bindings::Bindings;
use crate::codegen::coder::{CoderBase, EmitCtx, IdGen, Outer};
use crate::codegen::fortran::Subroutine;
use crate::codegen::DELAY_CHAIN;
use crate::error::CompilerError;
use crate::sbml::{Expr, Model};

/// Approximates `delay(value, tau)` by a linear chain of hidden
/// differential states
///
/// Discovery claims a contiguous block of `xd` ids; the chain transports
/// the delayed expression at rate `chain_length / tau`, and the visible
/// value is the last link.
#[derive(Debug)]
pub struct DelayCoder {
    pub(crate) base: CoderBase,
    value: Expr,
    delay: Expr,
    first_id: u32,
    last_id: u32,
}

impl DelayCoder {
    pub fn new(value: Expr, delay: Expr, only_conc: bool) -> Self {
        DelayCoder {
            base: CoderBase::new(None, only_conc),
            value,
            delay,
            first_id: 0,
            last_id: 0,
        }
    }

    pub(crate) fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        let value = self.value.clone();
        let delay = self.delay.clone();
        self.base.scan_expr(&value, bindings, model, idgen, queue)?;
        self.base.scan_expr(&delay, bindings, model, idgen, queue)?;
        self.first_id = idgen.next("xd");
        for _ in 0..DELAY_CHAIN - 2 {
            idgen.next("xd");
        }
        self.last_id = idgen.next("xd");
        Ok(())
    }

    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        let mut formula = self.base.formula(ctx);
        let value = formula.render(&self.value, Outer::Top)?;
        let delay = formula.render(&self.delay, Outer::Top)?;
        let rate = format!("{}v", self.base.var_name);
        target.declare(&rate);
        target.stmt(&format!("{rate} = {DELAY_CHAIN} / ({delay})"));
        target.stmt(&format!(
            "f({}) = (({}) - x({})) * {}",
            self.first_id, value, self.first_id, rate
        ));
        for i in self.first_id + 1..=self.last_id {
            target.stmt(&format!("f({i}) = (x({}) - x({i})) * {rate}", i - 1));
        }
        Ok(())
    }

    pub(crate) fn emit_header(&self, target: &mut Subroutine) {
        target.declare(&self.base.var_name);
        target.stmt(&format!("{} = x({})", self.base.var_name, self.last_id));
    }
}
