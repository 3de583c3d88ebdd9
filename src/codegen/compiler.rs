//! The compiler driver

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use super::bindings::{Bindings, CoderRef};
use super::coder::{prepare, resolve, unprepare, Coder, EmitCtx, IdGen};
use super::fortran::Subroutine;
use super::units::{
    AlgStateCoder, ConstantCoder, ControlCoder, DiffStateCoder, Discretization, EvalCoder,
    ParamCoder, PlotCoder,
};
use super::FFCN;
use crate::error::CompilerError;
use crate::sbml::{Model, Role, RuleKind};

/// Per-round emission bookkeeping, discarded when the round ends
///
/// Units are shared between registry clones, so none of this may live on
/// the units themselves.
#[derive(Default)]
struct Scratch {
    /// Units already emitted into a buffer: (variable, buffer index)
    visited: HashSet<(String, usize)>,
    /// State headers already extracted into a buffer
    headered: HashSet<(String, usize)>,
    /// State bodies emitted this round (at most once globally)
    body_done: HashSet<String>,
}

/// Compiles one model into FORTRAN subroutine suites
///
/// Construction scans the model into the default binding registry and
/// solves the algebraic-state assignment; `compile` runs any number of
/// rounds against registry clones.
#[derive(Debug)]
pub struct Compiler {
    model: Model,
    bindings: Bindings,
}

impl Compiler {
    pub fn new(model: Model) -> Result<Self, CompilerError> {
        let mut bindings = Bindings::new();
        let mut volatile: BTreeSet<String> = BTreeSet::new();
        let mut alg_units: Vec<CoderRef> = Vec::new();

        // rules bind their variables first; reaction determinations must not
        // shadow an explicit equation
        for rule in &model.rules {
            match rule.kind {
                RuleKind::Algebraic => {
                    alg_units.push(std::rc::Rc::new(std::cell::RefCell::new(Coder::AlgState(
                        AlgStateCoder::new(rule.math.clone()),
                    ))));
                }
                RuleKind::Assignment | RuleKind::Rate => {
                    let var = rule.variable.clone().ok_or_else(|| {
                        CompilerError::unsupported("explicit rule without a variable")
                    })?;
                    if !model.has_entity(&var) {
                        return Err(CompilerError::unknown_entity(var));
                    }
                    let unit = if rule.kind == RuleKind::Assignment {
                        Coder::Eval(EvalCoder::new(
                            Some(var.clone()),
                            rule.math.clone(),
                            "asgn",
                            false,
                        ))
                    } else {
                        Coder::DiffState(DiffStateCoder::for_rate(var.clone(), rule.math.clone()))
                    };
                    bindings.bind(var, unit);
                }
            }
        }

        // reactions: kinetic laws evaluate in concentration mode; reactant
        // and product species accumulate the reactome
        let mut reactome: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for reaction in &model.reactions {
            for sref in &reaction.species {
                if sref.role == Role::Modifier || bindings.contains(&sref.species) {
                    continue;
                }
                let entry = reactome.entry(sref.species.clone()).or_default();
                if !entry.contains(&reaction.id) {
                    entry.push(reaction.id.clone());
                }
            }
            bindings.bind(
                reaction.id.clone(),
                Coder::Eval(EvalCoder::new(
                    Some(reaction.id.clone()),
                    reaction.kinetic_law.clone(),
                    "rxn",
                    true,
                )),
            );
        }
        for (species, reactions) in &reactome {
            bindings.bind(
                species.clone(),
                Coder::DiffState(DiffStateCoder::for_species(species.clone(), reactions.clone())),
            );
        }

        for p in &model.parameters {
            if p.scope.is_some() {
                // rescoped kinetic-law parameter, marked by its full id
                bindings.bind(
                    p.id.clone(),
                    Coder::Param(ParamCoder::new(p.id.clone(), p.id.clone())),
                );
            } else if p.constant {
                let mark = p.name.clone().unwrap_or_else(|| p.id.clone());
                bindings.bind(p.id.clone(), Coder::Param(ParamCoder::new(p.id.clone(), mark)));
            } else if !bindings.contains(&p.id) {
                volatile.insert(p.id.clone());
            }
        }
        for c in &model.compartments {
            if c.constant {
                bindings.bind(c.id.clone(), Coder::Constant(ConstantCoder::for_compartment(c)));
            } else if !bindings.contains(&c.id) {
                volatile.insert(c.id.clone());
            }
        }
        for s in &model.species {
            if s.constant {
                // a constant species overrides any reaction determination
                bindings.bind(s.id.clone(), Coder::Constant(ConstantCoder::for_species(s)));
            } else if !bindings.contains(&s.id) {
                volatile.insert(s.id.clone());
            }
        }

        assign_algebraic_states(&mut bindings, &alg_units, volatile)?;

        if !bindings.contains("pi") {
            bindings.bind("pi", Coder::Constant(ConstantCoder::literal("pi", 3.14159)));
        }
        if !bindings.contains("e") {
            bindings.bind("e", Coder::Constant(ConstantCoder::literal("e", 2.71828)));
        }

        debug!(
            species = model.species.len(),
            reactions = model.reactions.len(),
            rules = model.rules.len(),
            "model scan complete"
        );
        Ok(Compiler { model, bindings })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Fresh shallow clone of the construction registry
    pub fn default_bindings(&self) -> Result<Bindings, CompilerError> {
        self.bindings.try_clone()
    }

    /// Rebind an entity to a control variable of the experiment
    pub fn bind_control(
        &self,
        bindings: &mut Bindings,
        id: &str,
        discretization: Discretization,
    ) -> Result<(), CompilerError> {
        if !self.model.has_entity(id) {
            return Err(CompilerError::unknown_entity(id));
        }
        bindings.bind(id, Coder::Control(ControlCoder::new(id, discretization)));
        Ok(())
    }

    /// Rebind an entity to a calibration parameter placeholder
    pub fn bind_calibration(
        &self,
        bindings: &mut Bindings,
        id: &str,
        mark: &str,
    ) -> Result<(), CompilerError> {
        if !self.model.has_entity(id) {
            return Err(CompilerError::unknown_entity(id));
        }
        let mut chars = mark.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(CompilerError::InvalidParameterName {
                name: mark.to_string(),
            });
        }
        let collides_entity = self.model.has_entity(mark) && mark != id;
        let collides_mark = bindings.iter().any(|(_, rc)| match &*rc.borrow() {
            Coder::Param(p) => p.mark() == mark,
            _ => false,
        });
        if collides_entity || collides_mark {
            return Err(CompilerError::DuplicateParameterName {
                name: mark.to_string(),
            });
        }
        bindings.bind(id, Coder::Param(ParamCoder::new(id, mark)));
        Ok(())
    }

    /// Select the entity trajectories the plot function writes
    ///
    /// Unknown ids are rejected when the round resolves the plot unit.
    pub fn bind_plot(&self, bindings: &mut Bindings, outputs: Vec<String>) {
        bindings.bind("#plot", Coder::Plot(PlotCoder::new(outputs)));
    }

    /// Run one compilation round
    ///
    /// Produces the derivative, residual and plot buffers followed by one
    /// measurement buffer per key in `measurements`. The registry is frozen
    /// against further cloning; its units are reset when the round ends, so
    /// the same registry can be compiled again.
    pub fn compile(
        &self,
        bindings: &mut Bindings,
        prefix: &str,
        measurements: &[String],
    ) -> Result<Vec<Subroutine>, CompilerError> {
        bindings.freeze();
        let mut fns = vec![
            Subroutine::new(format!("{prefix}ffcn"), "f"),
            Subroutine::new(format!("{prefix}gfcn"), "g"),
            Subroutine::plot(format!("{prefix}plot")),
        ];
        let mut outputs: Vec<Vec<CoderRef>> = vec![Vec::new(), Vec::new(), Vec::new()];
        for (_, rc) in bindings.iter() {
            if let Some(buf) = rc.borrow().register_buffer() {
                outputs[buf].push(rc.clone());
            }
        }

        let mut idgen = IdGen::default();
        let mut scratch = Scratch::default();
        let mut entries: Vec<CoderRef> = Vec::new();
        debug!(prefix, measurements = measurements.len(), "round started");

        for key in measurements {
            let rc = bindings
                .get(key)
                .ok_or_else(|| CompilerError::unknown_entity(key.clone()))?;
            let var = prepare(&rc, bindings, &self.model, &mut idgen)?;
            fns.push(Subroutine::new(format!("{prefix}{key}"), var));
            outputs.push(vec![rc]);
        }

        for buf in 0..fns.len() {
            for rc in outputs[buf].clone() {
                resolve(&rc, bindings, &self.model, &mut idgen)?;
                let (var, is_state) = {
                    let unit = rc.borrow();
                    (unit.var_name().to_string(), unit.is_state())
                };
                if is_state {
                    let home = rc.borrow().home_buffer().unwrap_or(FFCN);
                    if home == buf {
                        // body at most once globally; the header appears in
                        // the home buffer only when a dependent reads it
                        if !scratch.body_done.contains(&var) {
                            scratch.body_done.insert(var.clone());
                            self.emit_unit(&rc, bindings, &mut fns, buf, &idgen, &mut scratch)?;
                        }
                    } else {
                        // a state measured away from home extracts its
                        // value there, header at most once per buffer
                        self.close_loop(&rc, bindings, &mut fns, buf, &idgen, &mut scratch)?;
                    }
                } else {
                    if scratch.visited.contains(&(var, buf)) {
                        continue;
                    }
                    self.emit_unit(&rc, bindings, &mut fns, buf, &idgen, &mut scratch)?;
                }
                entries.push(rc);
            }
        }

        // a delay chain discovered away from the derivative buffer still
        // integrates there; emit any state body the buffers never pulled in
        let strays: Vec<CoderRef> = bindings
            .iter()
            .filter(|(_, rc)| {
                let unit = rc.borrow();
                unit.is_state()
                    && unit.is_initialized()
                    && !scratch.body_done.contains(unit.var_name())
            })
            .map(|(_, rc)| rc.clone())
            .collect();
        for rc in strays {
            let (var, home) = {
                let unit = rc.borrow();
                (
                    unit.var_name().to_string(),
                    unit.home_buffer().unwrap_or(FFCN),
                )
            };
            scratch.body_done.insert(var);
            self.emit_unit(&rc, bindings, &mut fns, home, &idgen, &mut scratch)?;
            entries.push(rc);
        }

        for rc in &entries {
            unprepare(rc, bindings);
        }
        debug!(buffers = fns.len(), "round finished");
        Ok(fns)
    }

    /// Emit a unit's dependencies depth-first, then the unit itself
    fn emit_unit(
        &self,
        rc: &CoderRef,
        bindings: &Bindings,
        fns: &mut [Subroutine],
        buf: usize,
        idgen: &IdGen,
        scratch: &mut Scratch,
    ) -> Result<(), CompilerError> {
        self.visit(rc, bindings, fns, buf, idgen, scratch)?;
        let ctx = EmitCtx {
            bindings,
            model: &self.model,
        };
        rc.borrow().emit(&mut fns[buf], &ctx)
    }

    fn visit(
        &self,
        rc: &CoderRef,
        bindings: &Bindings,
        fns: &mut [Subroutine],
        buf: usize,
        idgen: &IdGen,
        scratch: &mut Scratch,
    ) -> Result<(), CompilerError> {
        let (var, deps) = {
            let unit = rc.borrow();
            (
                unit.var_name().to_string(),
                unit.base().depends.iter().cloned().collect::<Vec<_>>(),
            )
        };
        scratch.visited.insert((var, buf));
        for key in deps {
            let dep = bindings
                .get(&key)
                .unwrap_or_else(|| panic!("no unit bound for dependency key `{key}`"));
            let (dvar, is_state) = {
                let unit = dep.borrow();
                (unit.var_name().to_string(), unit.is_state())
            };
            if is_state {
                self.close_loop(&dep, bindings, fns, buf, idgen, scratch)?;
            } else if !scratch.visited.contains(&(dvar, buf)) {
                self.visit(&dep, bindings, fns, buf, idgen, scratch)?;
                let ctx = EmitCtx {
                    bindings,
                    model: &self.model,
                };
                dep.borrow().emit(&mut fns[buf], &ctx)?;
            }
        }
        Ok(())
    }

    /// A dependent reached a state unit: emit its body if this is its home
    /// buffer and it has none yet, then extract its header at most once per
    /// buffer
    fn close_loop(
        &self,
        rc: &CoderRef,
        bindings: &Bindings,
        fns: &mut [Subroutine],
        buf: usize,
        idgen: &IdGen,
        scratch: &mut Scratch,
    ) -> Result<(), CompilerError> {
        let (var, home) = {
            let unit = rc.borrow();
            (
                unit.var_name().to_string(),
                unit.home_buffer().unwrap_or(FFCN),
            )
        };
        if home == buf && !scratch.body_done.contains(&var) {
            scratch.body_done.insert(var.clone());
            self.emit_unit(rc, bindings, fns, buf, idgen, scratch)?;
        }
        if scratch.headered.insert((var, buf)) {
            rc.borrow().emit_header(&mut fns[buf], idgen);
        }
        Ok(())
    }
}

/// Greedy assignment of algebraic constraints to undetermined volatiles
///
/// Per equation, in document order: prune the candidate set to volatiles
/// still undetermined and unbound, then pick the first candidate no later
/// equation also wants. Running out of alternatives forces the choice and
/// removes the variable from every later candidate set.
fn assign_algebraic_states(
    bindings: &mut Bindings,
    alg_units: &[CoderRef],
    volatile: BTreeSet<String>,
) -> Result<(), CompilerError> {
    let mut remaining = volatile;
    for (i, rc) in alg_units.iter().enumerate() {
        let candidates: Vec<String> = {
            let mut unit = rc.borrow_mut();
            let Coder::AlgState(alg) = &mut *unit else {
                unreachable!("algebraic rule list holds algebraic units");
            };
            alg.candidates
                .retain(|c| remaining.contains(c) && !bindings.contains(c));
            alg.candidates.iter().cloned().collect()
        };
        if candidates.is_empty() {
            return Err(CompilerError::AlgebraicConstraint);
        }
        let mut chosen = None;
        for (j, candidate) in candidates.iter().enumerate() {
            let force = j + 1 == candidates.len();
            let mut wanted_later = false;
            for later in alg_units.iter().skip(i + 1) {
                let mut unit = later.borrow_mut();
                let Coder::AlgState(other) = &mut *unit else {
                    unreachable!("algebraic rule list holds algebraic units");
                };
                if other.candidates.contains(candidate) {
                    wanted_later = true;
                    if force {
                        other.candidates.remove(candidate);
                    }
                }
            }
            if !wanted_later || force {
                chosen = Some(candidate.clone());
                break;
            }
        }
        // the last candidate always forces a decision
        let chosen = chosen.unwrap_or_else(|| unreachable!());
        debug!(equation = i, variable = %chosen, "algebraic state assigned");
        {
            let mut unit = rc.borrow_mut();
            unit.base_mut().entity = Some(chosen.clone());
        }
        bindings.bind_ref(chosen.clone(), rc.clone());
        remaining.remove(&chosen);
    }
    if !remaining.is_empty() {
        return Err(CompilerError::UndefinedVolatile {
            ids: remaining.into_iter().collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::{Compartment, Expr, Model, Parameter, Rule, Species};

    fn decay_model() -> Model {
        let mut model = Model::new("decay");
        model.compartments.push(Compartment::new("cell").with_size(1.0));
        model.species.push(Species::new("S", "cell").with_amount(1.0));
        model
            .rules
            .push(Rule::rate("S", Expr::neg(Expr::name("S"))));
        model
    }

    fn algebraic_model(constraints: &[Expr], free: &[&str]) -> Model {
        let mut model = Model::new("constraints");
        for id in free {
            model.parameters.push(Parameter::new(*id).volatile());
        }
        for c in constraints {
            model.rules.push(Rule::algebraic(c.clone()));
        }
        model
    }

    #[test]
    fn test_rate_rule_compiles_to_derivative() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        let fns = compiler.compile(&mut bindings, "", &[]).unwrap();
        let ffcn = fns[FFCN].to_string();
        assert!(ffcn.contains("      SUBROUTINE ffcn(t, x, f, p, q, rwh, iwh, iflag)"));
        assert!(ffcn.contains("        xd1 = x(1)\n"));
        assert!(ffcn.contains("        f(1) = -xd1\n"));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        let first: Vec<String> = compiler
            .compile(&mut bindings, "", &[])
            .unwrap()
            .iter()
            .map(|f| f.to_string())
            .collect();
        let second: Vec<String> = compiler
            .compile(&mut bindings, "", &[])
            .unwrap()
            .iter()
            .map(|f| f.to_string())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_state_header_appears_once_per_buffer() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        let fns = compiler.compile(&mut bindings, "", &[]).unwrap();
        let ffcn = fns[FFCN].to_string();
        assert_eq!(ffcn.matches("xd1 = x(1)").count(), 1);
        assert_eq!(ffcn.matches("f(1) =").count(), 1);
    }

    #[test]
    fn test_assignment_prefers_uncontested_candidates() {
        // eq1 could determine a or b, eq2 only b: eq1 takes a
        let model = algebraic_model(
            &[
                Expr::sub(Expr::name("a"), Expr::name("b")),
                Expr::name("b"),
            ],
            &["a", "b"],
        );
        let compiler = Compiler::new(model).unwrap();
        let bindings = compiler.default_bindings().unwrap();
        assert_eq!(bindings.get("a").unwrap().borrow().entity(), Some("a"));
        assert_eq!(bindings.get("b").unwrap().borrow().entity(), Some("b"));
        assert!(bindings.get("a").unwrap().borrow().is_state());
    }

    #[test]
    fn test_assignment_forced_move_releases_contested_candidate() {
        // eq1 sees {a, b} but a is wanted by eq2, whose only option it is
        let model = algebraic_model(
            &[
                Expr::sub(Expr::name("a"), Expr::name("b")),
                Expr::name("a"),
            ],
            &["a", "b"],
        );
        let compiler = Compiler::new(model).unwrap();
        let bindings = compiler.default_bindings().unwrap();
        // eq1 skips a (contested), is forced to b; eq2 takes a
        let b_unit = bindings.get("b").unwrap();
        assert!(b_unit.borrow().is_state());
        let a_unit = bindings.get("a").unwrap();
        assert!(a_unit.borrow().is_state());
    }

    #[test]
    fn test_three_way_contention_is_unsatisfiable() {
        // the forced removal of b from later candidate sets starves eq3
        let model = algebraic_model(
            &[
                Expr::sub(Expr::name("a"), Expr::name("b")),
                Expr::add(Expr::name("a"), Expr::name("b")),
                Expr::name("b"),
            ],
            &["a", "b"],
        );
        let err = Compiler::new(model).unwrap_err();
        assert!(matches!(err, CompilerError::AlgebraicConstraint));
    }

    #[test]
    fn test_leftover_volatile_is_reported() {
        let mut model = Model::new("dangling");
        model.parameters.push(Parameter::new("loose").volatile());
        let err = Compiler::new(model).unwrap_err();
        assert!(matches!(
            err,
            CompilerError::UndefinedVolatile { ids } if ids == vec!["loose".to_string()]
        ));
    }

    #[test]
    fn test_state_measurement_reads_the_state_vector() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        let fns = compiler
            .compile(&mut bindings, "", &["S".to_string()])
            .unwrap();
        let mfcn = fns[3].to_string();
        assert!(mfcn.contains("SUBROUTINE S(t, x, xd1, p, q, rwh, iwh, iflag)"));
        // the derivative equation stays in ffcn, the measurement buffer only
        // extracts the value
        assert!(mfcn.contains("        xd1 = x(1)\n"));
        assert!(!mfcn.contains("f(1)"));
        assert!(fns[FFCN].to_string().contains("        f(1) = -xd1\n"));
    }

    #[test]
    fn test_unread_state_keeps_header_out_of_home_buffer() {
        // the derivative never references S itself, so ffcn needs no
        // `xd1 = x(1)` extraction
        let mut model = Model::new("fill");
        model.compartments.push(Compartment::new("cell").with_size(1.0));
        model.species.push(Species::new("S", "cell").with_amount(0.0));
        model.rules.push(Rule::rate("S", Expr::name("cell")));
        let compiler = Compiler::new(model).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        let fns = compiler.compile(&mut bindings, "", &[]).unwrap();
        let ffcn = fns[FFCN].to_string();
        assert!(ffcn.contains("        f(1) = const1\n"));
        assert!(!ffcn.contains("xd1 = x(1)"));
        // a measurement buffer still extracts the value
        let fns = compiler
            .compile(&mut bindings, "", &["S".to_string()])
            .unwrap();
        assert!(fns[3].to_string().contains("        xd1 = x(1)\n"));
        assert!(!fns[FFCN].to_string().contains("xd1 = x(1)"));
    }

    #[test]
    fn test_plot_buffer_writes_requested_trajectories() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        compiler.bind_plot(&mut bindings, vec!["S".to_string()]);
        let fns = compiler.compile(&mut bindings, "", &[]).unwrap();
        let plot = fns[super::super::PLOTFCN].to_string();
        assert!(plot.contains("        WRITE(10,100) t, xd1\n"));
        assert!(plot.contains("100     FORMAT(E20.10,1(1X,E20.10))\n"));
        // reading the state pulled its header into the plot buffer
        assert!(plot.contains("        xd1 = x(1)\n"));
    }

    #[test]
    fn test_unknown_measurement_key() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        let err = compiler
            .compile(&mut bindings, "", &["ghost".to_string()])
            .unwrap_err();
        assert!(matches!(err, CompilerError::UnknownModelEntity { id } if id == "ghost"));
    }

    #[test]
    fn test_calibration_name_validation() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        assert!(matches!(
            compiler.bind_calibration(&mut bindings, "S", "2fast"),
            Err(CompilerError::InvalidParameterName { .. })
        ));
        assert!(matches!(
            compiler.bind_calibration(&mut bindings, "S", "ghost$"),
            Err(CompilerError::InvalidParameterName { .. })
        ));
        compiler.bind_calibration(&mut bindings, "S", "s0").unwrap();
        // the mark is now taken
        assert!(matches!(
            compiler.bind_calibration(&mut bindings, "cell", "s0"),
            Err(CompilerError::DuplicateParameterName { .. })
        ));
    }

    #[test]
    fn test_control_rebinding() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        compiler
            .bind_control(&mut bindings, "cell", Discretization::Constant)
            .unwrap();
        let fns = compiler.compile(&mut bindings, "", &[]).unwrap();
        // S is amount-defined, so the volume variable is not referenced, but
        // the rebinding must not break compilation
        assert!(fns[FFCN].to_string().contains("f(1) = -xd1"));
        assert!(matches!(
            compiler.bind_control(&mut bindings, "ghost", Discretization::Constant),
            Err(CompilerError::UnknownModelEntity { .. })
        ));
    }

    #[test]
    fn test_frozen_bindings_cannot_branch() {
        let compiler = Compiler::new(decay_model()).unwrap();
        let mut bindings = compiler.default_bindings().unwrap();
        compiler.compile(&mut bindings, "", &[]).unwrap();
        assert!(matches!(
            bindings.try_clone(),
            Err(CompilerError::FrozenBindings)
        ));
        // the construction registry is still open
        assert!(compiler.default_bindings().is_ok());
    }
}
