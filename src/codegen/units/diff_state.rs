//! Differential state variables

use crate::codegen::bindings::Bindings;
use crate::codegen::coder::{fast_prepare, Coder, CoderBase, EmitCtx, IdGen, Outer};
use crate::codegen::fortran::Subroutine;
use crate::error::CompilerError;
use crate::sbml::{Expr, Model, Role, Stoichiometry};

use super::EvalCoder;

#[derive(Debug)]
enum Kind {
    /// Species determined by the reactions it takes part in
    Reactions {
        species: String,
        reactions: Vec<String>,
        /// Variables of the stoichiometry-math evaluators, in term order
        st_vars: Vec<String>,
    },
    /// Entity determined by an explicit rate rule
    Rate { expr: Expr },
}

/// A state variable integrated by the solver
///
/// Emits its derivative equation `f(id) = …` into the derivative buffer;
/// dependents extract its value with `var = x(id)`.
#[derive(Debug)]
pub struct DiffStateCoder {
    pub(crate) base: CoderBase,
    kind: Kind,
}

impl DiffStateCoder {
    /// Species driven by its reaction terms
    pub fn for_species(species: impl Into<String>, reactions: Vec<String>) -> Self {
        let species = species.into();
        DiffStateCoder {
            base: CoderBase::new(Some(species.clone()), false),
            kind: Kind::Reactions {
                species,
                reactions,
                st_vars: Vec::new(),
            },
        }
    }

    /// Entity governed by a rate rule
    pub fn for_rate(entity: impl Into<String>, expr: Expr) -> Self {
        DiffStateCoder {
            base: CoderBase::new(Some(entity.into()), false),
            kind: Kind::Rate { expr },
        }
    }

    pub(crate) fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        match &mut self.kind {
            Kind::Rate { expr } => {
                let expr = expr.clone();
                self.base.scan_expr(&expr, bindings, model, idgen, queue)
            }
            Kind::Reactions {
                species,
                reactions,
                st_vars,
            } => {
                st_vars.clear();
                for rxn_id in reactions.iter() {
                    self.base.depends.insert(rxn_id.clone());
                    // a reaction rebound to a constant emits `+ 0`; its
                    // stoichiometry is never read, so lowering it would
                    // mispair the evaluators with the surviving terms
                    let knocked_out = match bindings.get(rxn_id) {
                        Some(rc) => matches!(&*rc.borrow(), Coder::Constant(_)),
                        None => true,
                    };
                    if knocked_out {
                        continue;
                    }
                    let Some(reaction) = model.reaction(rxn_id) else {
                        continue;
                    };
                    for sref in &reaction.species {
                        if sref.species != *species || sref.role == Role::Modifier {
                            continue;
                        }
                        if let Stoichiometry::Math(expr) = &sref.stoichiometry {
                            let unit = Coder::Eval(EvalCoder::new(
                                None,
                                expr.clone(),
                                "st",
                                false,
                            ));
                            let rc = std::rc::Rc::new(std::cell::RefCell::new(unit));
                            let var = fast_prepare(&rc, bindings, model, idgen, queue)?;
                            self.base.depends.insert(format!("#{var}"));
                            st_vars.push(var);
                        }
                    }
                }
                let sp = model
                    .get_species(species)
                    .ok_or_else(|| CompilerError::unknown_entity(species.clone()))?;
                if sp.initial_amount.is_none() {
                    self.base.depends.insert(sp.compartment.clone());
                }
                Ok(())
            }
        }
    }

    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        match &self.kind {
            Kind::Rate { expr } => {
                let text = self.base.formula(ctx).render(expr, Outer::Top)?;
                target.stmt(&format!("f({}) = {}", self.base.id, text));
                Ok(())
            }
            Kind::Reactions {
                species,
                reactions,
                st_vars,
            } => {
                let sp = ctx
                    .model
                    .get_species(species)
                    .ok_or_else(|| CompilerError::unknown_entity(species.clone()))?;
                let mut st = st_vars.iter();
                let mut terms = String::new();
                for rxn_id in reactions {
                    // a reaction rebound to a constant contributes nothing
                    let rvar = match ctx.bindings.get(rxn_id) {
                        Some(rc) if !matches!(&*rc.borrow(), Coder::Constant(_)) => {
                            rc.borrow().var_name().to_string()
                        }
                        _ => {
                            terms.push_str("+ 0 ");
                            continue;
                        }
                    };
                    let reaction = ctx
                        .model
                        .reaction(rxn_id)
                        .ok_or_else(|| CompilerError::unknown_entity(rxn_id.clone()))?;
                    for sref in &reaction.species {
                        if sref.species != *species || sref.role == Role::Modifier {
                            continue;
                        }
                        terms.push_str(match sref.role {
                            Role::Product => "+ ",
                            _ => "- ",
                        });
                        match &sref.stoichiometry {
                            Stoichiometry::Int(1) => {}
                            Stoichiometry::Int(n) => terms.push_str(&format!("{n} * ")),
                            Stoichiometry::Math(_) => {
                                let var = st
                                    .next()
                                    .unwrap_or_else(|| panic!("stoichiometry evaluator missing"));
                                terms.push_str(&format!("{var} * "));
                            }
                        }
                        terms.push_str(&rvar);
                        terms.push(' ');
                    }
                }
                let terms = terms.trim_end();
                // reactions produce amounts; a concentration state divides by
                // its compartment volume unless that volume is fixed at 1
                let mut divide = false;
                let mut vol = String::new();
                if sp.initial_amount.is_none() {
                    let comp = ctx.bindings.get(&sp.compartment).unwrap_or_else(|| {
                        panic!("no unit bound for compartment `{}`", sp.compartment)
                    });
                    let unit = comp.borrow();
                    match &*unit {
                        Coder::Constant(c) if c.value() == 1.0 => {}
                        _ => {
                            divide = true;
                            vol = unit.var_name().to_string();
                        }
                    }
                }
                if divide {
                    target.stmt(&format!("f({}) = ({}) / {}", self.base.id, terms, vol));
                } else {
                    target.stmt(&format!("f({}) = {}", self.base.id, terms));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn emit_header(&self, target: &mut Subroutine) {
        target.declare(&self.base.var_name);
        target.stmt(&format!("{} = x({})", self.base.var_name, self.base.id));
    }
}
