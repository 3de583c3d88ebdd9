//! Calibration-parameter placeholders

use crate::codegen::coder::CoderBase;
use crate::codegen::fortran::Subroutine;

/// A quantity estimated by the downstream solver
///
/// Emits `var = $mark$`; the solver frontend substitutes the placeholder
/// with its parameter-vector element when it instantiates the generated
/// code.
#[derive(Debug)]
pub struct ParamCoder {
    pub(crate) base: CoderBase,
    mark: String,
}

impl ParamCoder {
    pub fn new(entity: impl Into<String>, mark: impl Into<String>) -> Self {
        ParamCoder {
            base: CoderBase::new(Some(entity.into()), false),
            mark: mark.into(),
        }
    }

    pub fn mark(&self) -> &str {
        &self.mark
    }

    pub(crate) fn emit(&self, target: &mut Subroutine) -> Result<(), crate::error::CompilerError> {
        target.declare(&self.base.var_name);
        target.stmt(&format!("{} = ${}$", self.base.var_name, self.mark));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_placeholder() {
        let mut p = ParamCoder::new("R1:k1", "R1:k1");
        p.base.begin("par", 3);
        let mut sub = Subroutine::new("ffcn", "f");
        p.emit(&mut sub).unwrap();
        assert!(sub.to_string().contains("        par3 = $R1:k1$\n"));
    }
}
