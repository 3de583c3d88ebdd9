//! Control variables of an experiment

use serde::{Deserialize, Serialize};

use crate::codegen::coder::CoderBase;
use crate::codegen::fortran::Subroutine;
use crate::error::CompilerError;

/// Time discretization of a control variable
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discretization {
    /// One value for the whole horizon, read from the control vector
    Constant,
    /// Piecewise constant over the solver's control grid
    PiecewiseConstant,
    /// Piecewise linear; no backend support
    PiecewiseLinear,
}

/// A model quantity steered by the experimenter
#[derive(Debug)]
pub struct ControlCoder {
    pub(crate) base: CoderBase,
    discretization: Discretization,
}

impl ControlCoder {
    pub fn new(entity: impl Into<String>, discretization: Discretization) -> Self {
        ControlCoder {
            base: CoderBase::new(Some(entity.into()), false),
            discretization,
        }
    }

    pub(crate) fn prefix(&self) -> &'static str {
        match self.discretization {
            Discretization::Constant => "q",
            _ => "u",
        }
    }

    pub(crate) fn emit(&self, target: &mut Subroutine) -> Result<(), CompilerError> {
        match self.discretization {
            Discretization::Constant => {
                target.declare(&self.base.var_name);
                target.stmt(&format!("{} = q({})", self.base.var_name, self.base.id));
                Ok(())
            }
            Discretization::PiecewiseConstant => {
                target.declare(&self.base.var_name);
                target.comment(&format!("DISCRETIZE1( {}, rwh, iwh )", self.base.var_name));
                Ok(())
            }
            Discretization::PiecewiseLinear => Err(CompilerError::UnsupportedControl {
                id: self
                    .base
                    .entity
                    .clone()
                    .unwrap_or_else(|| self.base.var_name.clone()),
            }),
        }
    }
}
