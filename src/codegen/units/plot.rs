//! Trajectory plot output

use crate::codegen::bindings::Bindings;
use crate::codegen::coder::{CoderBase, EmitCtx, IdGen};
use crate::codegen::fortran::Subroutine;
use crate::error::CompilerError;
use crate::sbml::Model;

/// Writes selected entity trajectories to the plot channel
#[derive(Debug)]
pub struct PlotCoder {
    pub(crate) base: CoderBase,
    outputs: Vec<String>,
}

impl PlotCoder {
    pub fn new(outputs: Vec<String>) -> Self {
        PlotCoder {
            base: CoderBase::new(None, false),
            outputs,
        }
    }

    pub(crate) fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        _idgen: &mut IdGen,
        _queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        for id in &self.outputs.clone() {
            if !bindings.contains(id) {
                return Err(CompilerError::unknown_entity(id.clone()));
            }
            self.base.add_depend(id, model);
        }
        Ok(())
    }

    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        let formula = self.base.formula(ctx);
        let mut stmt = String::from("WRITE(10,100) t");
        for id in &self.outputs {
            stmt.push_str(", ");
            stmt.push_str(&formula.var(id)?);
        }
        target.stmt(&stmt);
        target.numbered_stmt(
            100,
            &format!("FORMAT(E20.10,{}(1X,E20.10))", self.outputs.len()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::coder::{resolve, Coder};
    use crate::codegen::units::ConstantCoder;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_writes_selected_trajectories() {
        let model = Model::default();
        let mut bindings = Bindings::new();
        bindings.bind("A", Coder::Constant(ConstantCoder::literal("A", 1.0)));
        bindings.bind("B", Coder::Constant(ConstantCoder::literal("B", 2.0)));

        let rc = Rc::new(RefCell::new(Coder::Plot(PlotCoder::new(vec![
            "A".to_string(),
            "B".to_string(),
        ]))));
        let mut idgen = IdGen::default();
        resolve(&rc, &mut bindings, &model, &mut idgen).unwrap();

        let mut sub = Subroutine::plot("plot");
        let ctx = EmitCtx {
            bindings: &bindings,
            model: &model,
        };
        rc.borrow().emit(&mut sub, &ctx).unwrap();
        let code = sub.to_string();
        assert!(code.contains("        WRITE(10,100) t, const1, const2\n"));
        assert!(code.contains("100     FORMAT(E20.10,2(1X,E20.10))\n"));
    }

    #[test]
    fn test_unknown_output_is_rejected() {
        let model = Model::default();
        let mut bindings = Bindings::new();
        let rc = Rc::new(RefCell::new(Coder::Plot(PlotCoder::new(vec![
            "ghost".to_string()
        ]))));
        let mut idgen = IdGen::default();
        let err = resolve(&rc, &mut bindings, &model, &mut idgen).unwrap_err();
        assert!(matches!(err, CompilerError::UnknownModelEntity { id } if id == "ghost"));
    }
}
