//! Constants folded into PARAMETER definitions

use crate::codegen::coder::CoderBase;
use crate::codegen::fortran::Subroutine;
use crate::sbml::{fmt_number, Compartment, Species};

/// A fixed quantity emitted as a PARAMETER definition
#[derive(Debug)]
pub struct ConstantCoder {
    pub(crate) base: CoderBase,
    value: f64,
}

impl ConstantCoder {
    /// A literal constant bound under `key` (the builtin `pi` and `e`)
    pub fn literal(key: impl Into<String>, value: f64) -> Self {
        ConstantCoder {
            base: CoderBase::new(Some(key.into()), false),
            value,
        }
    }

    pub fn for_compartment(c: &Compartment) -> Self {
        ConstantCoder {
            base: CoderBase::new(Some(c.id.clone()), false),
            value: c.size.unwrap_or(1.0),
        }
    }

    pub fn for_species(s: &Species) -> Self {
        ConstantCoder {
            base: CoderBase::new(Some(s.id.clone()), false),
            value: s.initial_concentration.or(s.initial_amount).unwrap_or(0.0),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn emit(&self, target: &mut Subroutine) -> Result<(), crate::error::CompilerError> {
        target.declare(&self.base.var_name);
        target.define_const(format!("{} = {}", self.base.var_name, fmt_number(self.value)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compartment_size_defaults_to_one() {
        let c = ConstantCoder::for_compartment(&Compartment::new("cell"));
        assert_eq!(c.value(), 1.0);
    }

    #[test]
    fn test_species_prefers_concentration() {
        let sp = Species::new("S", "cell")
            .with_amount(4.0)
            .with_concentration(0.5);
        assert_eq!(ConstantCoder::for_species(&sp).value(), 0.5);
    }

    #[test]
    fn test_emits_parameter_definition() {
        let mut c = ConstantCoder::literal("pi", 3.14159);
        c.base.begin("const", 1);
        let mut sub = Subroutine::new("ffcn", "f");
        c.emit(&mut sub).unwrap();
        let code = sub.to_string();
        assert!(code.contains("REAL*8 const1"));
        assert!(code.contains("PARAMETER (const1 = 3.14159)"));
    }
}
