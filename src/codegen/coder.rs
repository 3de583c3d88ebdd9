//! Emission units and the expression emitter
//!
//! Every symbol of the model compiles through an emission unit: a small
//! object that knows which FORTRAN variable it owns, which other symbols its
//! code reads, and how to write its statements into a subroutine buffer.
//! Units live in the binding registry and reference each other exclusively
//! by key, so registry clones can rebind individual symbols without copying
//! the rest of the graph.
//!
//! A unit's round lifecycle: `begin` assigns its variable name from the
//! per-prefix id sequence and clears per-round state, discovery populates
//! the dependency set (creating delegated units for function calls and
//! delays on the fly), emission renders statements without mutating the
//! unit, and `unprepare` resets it for the next round.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lazy_static::lazy_static;

use super::bindings::{Bindings, CoderRef};
use super::fortran::Subroutine;
use super::units::{
    AlgStateCoder, ConstantCoder, ControlCoder, DelayCoder, DiffStateCoder, EvalCoder,
    FnCallCoder, ParamCoder, PlotCoder,
};
use super::{FFCN, GFCN, PLOTFCN};
use crate::error::CompilerError;
use crate::sbml::{fmt_number, BinOp, Expr, Model};

lazy_static! {
    /// Function names with a native FORTRAN counterpart
    static ref RESERVED: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("abs", "abs");
        m.insert("arccos", "acos");
        m.insert("arcsin", "asin");
        m.insert("arctan", "atan");
        m.insert("cos", "cos");
        m.insert("exp", "exp");
        m.insert("ln", "log");
        m.insert("sin", "sin");
        m.insert("tan", "tan");
        m
    };
}

/// FORTRAN name of a reserved function, if there is one
pub(crate) fn reserved_name(name: &str) -> Option<&'static str> {
    RESERVED.get(name).copied()
}

/// Per-prefix monotonic id sequence, reset for every compilation round
#[derive(Default)]
pub(crate) struct IdGen {
    seq: BTreeMap<String, u32>,
}

impl IdGen {
    pub fn next(&mut self, prefix: &str) -> u32 {
        let n = self.seq.entry(prefix.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    /// Greatest id handed out for `prefix` so far this round
    pub fn count(&self, prefix: &str) -> u32 {
        self.seq.get(prefix).copied().unwrap_or(0)
    }
}

/// Shared read-only context of the emission phase
pub(crate) struct EmitCtx<'a> {
    pub bindings: &'a Bindings,
    pub model: &'a Model,
}

/// How a function formal is substituted during body emission
#[derive(Debug, Clone)]
pub(crate) enum ArgSymbol {
    /// Verbatim replacement text (literal, time, delegated variable)
    Text(String),
    /// Pass-through reference to a model entity
    Entity(String),
}

/// State shared by all emission-unit kinds
#[derive(Debug, Clone, Default)]
pub(crate) struct CoderBase {
    pub var_name: String,
    pub id: u32,
    pub only_conc: bool,
    pub depends: BTreeSet<String>,
    pub call_queue: Vec<String>,
    pub entity: Option<String>,
    pub initialized: bool,
}

impl CoderBase {
    pub fn new(entity: Option<String>, only_conc: bool) -> Self {
        CoderBase {
            entity,
            only_conc,
            ..Default::default()
        }
    }

    /// Start a round: assign the variable name, clear per-round state
    pub fn begin(&mut self, prefix: &str, id: u32) {
        self.id = id;
        self.var_name = format!("{prefix}{id}");
        self.depends.clear();
        self.call_queue.clear();
        self.initialized = true;
    }

    /// Record a dependency, honoring this unit's concentration mode
    pub fn add_depend(&mut self, key: &str, model: &Model) {
        self.add_depend_conc(key, self.only_conc, model);
    }

    /// Record a dependency with an explicit concentration mode
    ///
    /// A concentration-mode reference to an amount-defined species also pulls
    /// in that species' compartment, whose variable the rescale divides by.
    pub fn add_depend_conc(&mut self, key: &str, conc: bool, model: &Model) {
        self.depends.insert(key.to_string());
        if conc {
            if let Some(sp) = model.get_species(key) {
                if sp.initial_amount.is_some() {
                    self.depends.insert(sp.compartment.clone());
                }
            }
        }
    }

    /// Walk an expression, recording dependencies and spawning delegated
    /// units for delays and user-function calls
    pub fn scan_expr(
        &mut self,
        x: &Expr,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        match x {
            Expr::Num(_) | Expr::Time => {}
            Expr::Const(c) => {
                self.depends.insert(c.key().to_string());
            }
            Expr::Name(n) => self.add_depend(n, model),
            Expr::Neg(a) => self.scan_expr(a, bindings, model, idgen, queue)?,
            Expr::Bin(_, a, b) | Expr::Root(a, b) => {
                self.scan_expr(a, bindings, model, idgen, queue)?;
                self.scan_expr(b, bindings, model, idgen, queue)?;
            }
            Expr::Call(name, args) => {
                // the reserved table shadows a model function of the same
                // name; emission resolves the call the same way
                if reserved_name(name).is_some() {
                    for a in args {
                        self.scan_expr(a, bindings, model, idgen, queue)?;
                    }
                } else if let Some(def) = model.function(name).cloned() {
                    let unit = Coder::FnCall(FnCallCoder::new(def, args.clone(), self.only_conc));
                    self.delegate(unit, bindings, model, idgen, queue)?;
                } else {
                    return Err(CompilerError::function_not_found(name.clone()));
                }
            }
            Expr::Delay(value, delay) => {
                let unit = Coder::Delay(DelayCoder::new(
                    (**value).clone(),
                    (**delay).clone(),
                    self.only_conc,
                ));
                self.delegate(unit, bindings, model, idgen, queue)?;
            }
            Expr::Lambda(..) => {
                return Err(CompilerError::unsupported(
                    "function definition in expression context",
                ));
            }
        }
        Ok(())
    }

    /// Spawn a delegated unit, queue its variable for call substitution
    fn delegate(
        &mut self,
        unit: Coder,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        let rc = std::rc::Rc::new(std::cell::RefCell::new(unit));
        let var = fast_prepare(&rc, bindings, model, idgen, queue)?;
        self.call_queue.push(var.clone());
        self.depends.insert(format!("#{var}"));
        Ok(())
    }

    /// Fresh expression renderer for one emission
    pub fn formula<'a>(&self, ctx: &'a EmitCtx<'a>) -> Formula<'a> {
        Formula {
            ctx,
            cursor: ArgCursor {
                queue: self.call_queue.clone(),
                pos: 0,
            },
            only_conc: self.only_conc,
            args: None,
            arg_conc: false,
        }
    }
}

/// Round-robin cursor over a unit's delegated-call variables
struct ArgCursor {
    queue: Vec<String>,
    pos: usize,
}

impl ArgCursor {
    fn next(&mut self) -> String {
        assert!(
            !self.queue.is_empty(),
            "call queue exhausted during emission"
        );
        let var = self.queue[self.pos].clone();
        self.pos = (self.pos + 1) % self.queue.len();
        var
    }
}

/// Syntactic context an expression is rendered into
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outer {
    Top,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Call,
}

/// Renders expression trees as FORTRAN text with minimal parentheses
pub(crate) struct Formula<'a> {
    ctx: &'a EmitCtx<'a>,
    cursor: ArgCursor,
    only_conc: bool,
    args: Option<&'a BTreeMap<String, ArgSymbol>>,
    arg_conc: bool,
}

impl<'a> Formula<'a> {
    /// Enable formal-argument substitution (function-body emission)
    pub fn with_args(mut self, args: &'a BTreeMap<String, ArgSymbol>, arg_conc: bool) -> Self {
        self.args = Some(args);
        self.arg_conc = arg_conc;
        self
    }

    pub fn render(&mut self, x: &Expr, outer: Outer) -> Result<String, CompilerError> {
        let mut parens = false;
        let text = match x {
            Expr::Num(v) => fmt_number(*v),
            Expr::Time => "t".to_string(),
            Expr::Const(c) => self.var(c.key())?,
            Expr::Name(n) => match self.args.and_then(|m| m.get(n)) {
                Some(ArgSymbol::Text(s)) => s.clone(),
                Some(ArgSymbol::Entity(key)) => self.var_conc(key, self.arg_conc)?,
                None => self.var(n)?,
            },
            Expr::Neg(a) => format!("-{}", self.render(a, Outer::Sub)?),
            Expr::Bin(op, a, b) => {
                let (token, inner) = match op {
                    BinOp::Add => (" + ", Outer::Add),
                    BinOp::Sub => (" - ", Outer::Sub),
                    BinOp::Mul => (" * ", Outer::Mul),
                    BinOp::Div => (" / ", Outer::Div),
                    BinOp::Pow => (" ** ", Outer::Pow),
                };
                parens = match op {
                    BinOp::Add | BinOp::Sub => !matches!(outer, Outer::Add | Outer::Top),
                    BinOp::Mul | BinOp::Div => matches!(outer, Outer::Div | Outer::Pow),
                    BinOp::Pow => outer == Outer::Pow,
                };
                format!(
                    "{}{}{}",
                    self.render(a, inner)?,
                    token,
                    self.render(b, inner)?
                )
            }
            Expr::Root(degree, radicand) => {
                parens = outer == Outer::Pow;
                format!(
                    "{} ** (1 / {})",
                    self.render(radicand, Outer::Pow)?,
                    self.render(degree, Outer::Div)?
                )
            }
            Expr::Call(name, args) => {
                if let Some(f) = reserved_name(name) {
                    let rendered = args
                        .iter()
                        .map(|a| self.render(a, Outer::Call))
                        .collect::<Result<Vec<_>, _>>()?;
                    format!("{f}({})", rendered.join(", "))
                } else {
                    // delegated unit created during discovery
                    self.cursor.next()
                }
            }
            Expr::Delay(..) => self.cursor.next(),
            Expr::Lambda(..) => {
                return Err(CompilerError::unsupported(
                    "function definition in expression context",
                ));
            }
        };
        Ok(if parens { format!("({text})") } else { text })
    }

    /// Variable text for an entity reference in this unit's mode
    pub fn var(&self, key: &str) -> Result<String, CompilerError> {
        self.var_conc(key, self.only_conc)
    }

    /// Variable text with an explicit concentration mode
    ///
    /// An amount-defined species referenced in concentration mode renders as
    /// `(var / volume)`, unless the unit coding it is a control.
    pub fn var_conc(&self, key: &str, conc: bool) -> Result<String, CompilerError> {
        let rc = self
            .ctx
            .bindings
            .get(key)
            .unwrap_or_else(|| panic!("no unit bound for `{key}` during emission"));
        let unit = rc.borrow();
        let name = unit.var_name().to_string();
        if conc && !matches!(&*unit, Coder::Control(_)) {
            if let Some(entity) = unit.entity() {
                if let Some(sp) = self.ctx.model.get_species(entity) {
                    if sp.initial_amount.is_some() {
                        let vol = self
                            .ctx
                            .bindings
                            .get(&sp.compartment)
                            .unwrap_or_else(|| {
                                panic!("no unit bound for compartment `{}`", sp.compartment)
                            })
                            .borrow()
                            .var_name()
                            .to_string();
                        return Ok(format!("({name} / {vol})"));
                    }
                }
            }
        }
        Ok(name)
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Unit dispatch
// ═════════════════════════════════════════════════════════════════════════

/// An emission unit
#[derive(Debug)]
pub enum Coder {
    Constant(ConstantCoder),
    Param(ParamCoder),
    Control(ControlCoder),
    Eval(EvalCoder),
    FnCall(FnCallCoder),
    DiffState(DiffStateCoder),
    AlgState(AlgStateCoder),
    Delay(DelayCoder),
    Plot(PlotCoder),
}

impl Coder {
    pub(crate) fn base(&self) -> &CoderBase {
        match self {
            Coder::Constant(c) => &c.base,
            Coder::Param(c) => &c.base,
            Coder::Control(c) => &c.base,
            Coder::Eval(c) => &c.base,
            Coder::FnCall(c) => &c.base,
            Coder::DiffState(c) => &c.base,
            Coder::AlgState(c) => &c.base,
            Coder::Delay(c) => &c.base,
            Coder::Plot(c) => &c.base,
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut CoderBase {
        match self {
            Coder::Constant(c) => &mut c.base,
            Coder::Param(c) => &mut c.base,
            Coder::Control(c) => &mut c.base,
            Coder::Eval(c) => &mut c.base,
            Coder::FnCall(c) => &mut c.base,
            Coder::DiffState(c) => &mut c.base,
            Coder::AlgState(c) => &mut c.base,
            Coder::Delay(c) => &mut c.base,
            Coder::Plot(c) => &mut c.base,
        }
    }

    /// Generated FORTRAN variable owned by this unit
    pub fn var_name(&self) -> &str {
        &self.base().var_name
    }

    pub fn is_initialized(&self) -> bool {
        self.base().initialized
    }

    /// Model entity this unit codes for, if any
    pub fn entity(&self) -> Option<&str> {
        self.base().entity.as_deref()
    }

    /// Whether this unit owns entries of the state vector
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            Coder::DiffState(_) | Coder::AlgState(_) | Coder::Delay(_)
        )
    }

    /// Buffer the unit's defining equations belong to
    pub(crate) fn home_buffer(&self) -> Option<usize> {
        match self {
            Coder::DiffState(_) | Coder::Delay(_) => Some(FFCN),
            Coder::AlgState(_) => Some(GFCN),
            _ => None,
        }
    }

    /// Buffer this unit registers as an output of
    pub(crate) fn register_buffer(&self) -> Option<usize> {
        match self {
            Coder::DiffState(_) => Some(FFCN),
            Coder::AlgState(_) => Some(GFCN),
            Coder::Plot(_) => Some(PLOTFCN),
            _ => None,
        }
    }

    fn prefix(&self) -> &str {
        match self {
            Coder::Constant(_) => "const",
            Coder::Param(_) => "par",
            Coder::Control(c) => c.prefix(),
            Coder::Eval(c) => c.prefix(),
            Coder::FnCall(_) => "fn",
            Coder::DiffState(_) => "xd",
            Coder::AlgState(_) => "xa",
            Coder::Delay(_) => "dly",
            Coder::Plot(_) => "plot",
        }
    }

    fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        match self {
            Coder::Constant(_) | Coder::Param(_) | Coder::Control(_) => Ok(()),
            Coder::Eval(c) => c.discover(bindings, model, idgen, queue),
            Coder::FnCall(c) => c.discover(bindings, model, idgen, queue),
            Coder::DiffState(c) => c.discover(bindings, model, idgen, queue),
            Coder::AlgState(c) => c.discover(bindings, model, idgen, queue),
            Coder::Delay(c) => c.discover(bindings, model, idgen, queue),
            Coder::Plot(c) => c.discover(bindings, model, idgen, queue),
        }
    }

    /// Write this unit's statements (for state units: the defining equation)
    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        match self {
            Coder::Constant(c) => c.emit(target),
            Coder::Param(c) => c.emit(target),
            Coder::Control(c) => c.emit(target),
            Coder::Eval(c) => c.emit(target, ctx),
            Coder::FnCall(c) => c.emit(target, ctx),
            Coder::DiffState(c) => c.emit(target, ctx),
            Coder::AlgState(c) => c.emit(target, ctx),
            Coder::Delay(c) => c.emit(target, ctx),
            Coder::Plot(c) => c.emit(target, ctx),
        }
    }

    /// Extract a state unit's value from the state vector
    pub(crate) fn emit_header(&self, target: &mut Subroutine, idgen: &IdGen) {
        match self {
            Coder::DiffState(c) => c.emit_header(target),
            Coder::AlgState(c) => c.emit_header(target, idgen),
            Coder::Delay(c) => c.emit_header(target),
            _ => unreachable!("only state units extract headers"),
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Resolution
// ═════════════════════════════════════════════════════════════════════════

fn init_unit(
    rc: &CoderRef,
    bindings: &mut Bindings,
    model: &Model,
    idgen: &mut IdGen,
    queue: &mut Vec<String>,
) -> Result<(), CompilerError> {
    let mut unit = rc.borrow_mut();
    if unit.base().initialized {
        return Ok(());
    }
    let id = idgen.next(unit.prefix());
    let prefix = unit.prefix().to_string();
    unit.base_mut().begin(&prefix, id);
    tracing::trace!(var = %unit.var_name(), "unit initialized");
    unit.discover(bindings, model, idgen, queue)?;
    queue.extend(unit.base().depends.iter().cloned());
    Ok(())
}

fn drain(
    queue: &mut Vec<String>,
    bindings: &mut Bindings,
    model: &Model,
    idgen: &mut IdGen,
) -> Result<(), CompilerError> {
    while let Some(key) = queue.pop() {
        let rc = bindings
            .get(&key)
            .unwrap_or_else(|| panic!("no unit bound for dependency key `{key}`"));
        init_unit(&rc, bindings, model, idgen, queue)?;
    }
    Ok(())
}

/// Initialize a unit and its full dependency closure
pub(crate) fn resolve(
    rc: &CoderRef,
    bindings: &mut Bindings,
    model: &Model,
    idgen: &mut IdGen,
) -> Result<(), CompilerError> {
    let mut queue = Vec::new();
    init_unit(rc, bindings, model, idgen, &mut queue)?;
    drain(&mut queue, bindings, model, idgen)
}

/// Initialize a delegated unit and bind it under its synthetic key
///
/// The unit's own dependency keys go onto the shared worklist; the caller
/// drains them once its own discovery is complete.
pub(crate) fn fast_prepare(
    rc: &CoderRef,
    bindings: &mut Bindings,
    model: &Model,
    idgen: &mut IdGen,
    queue: &mut Vec<String>,
) -> Result<String, CompilerError> {
    init_unit(rc, bindings, model, idgen, queue)?;
    let var = rc.borrow().var_name().to_string();
    bindings.bind_ref(format!("#{var}"), rc.clone());
    Ok(var)
}

/// Resolve an entry unit (measurement function) and expose it by `#var`
pub(crate) fn prepare(
    rc: &CoderRef,
    bindings: &mut Bindings,
    model: &Model,
    idgen: &mut IdGen,
) -> Result<String, CompilerError> {
    let mut queue = Vec::new();
    let var = fast_prepare(rc, bindings, model, idgen, &mut queue)?;
    drain(&mut queue, bindings, model, idgen)?;
    Ok(var)
}

/// Reset a unit and its initialized dependency closure at round end
pub(crate) fn unprepare(rc: &CoderRef, bindings: &Bindings) {
    let mut queue: Vec<String> = Vec::new();
    {
        let mut unit = rc.borrow_mut();
        if !unit.base().initialized {
            return;
        }
        unit.base_mut().initialized = false;
        queue.extend(unit.base().depends.iter().cloned());
    }
    while let Some(key) = queue.pop() {
        if let Some(dep) = bindings.get(&key) {
            let mut unit = dep.borrow_mut();
            if unit.base().initialized {
                unit.base_mut().initialized = false;
                queue.extend(unit.base().depends.iter().cloned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbml::{Compartment, Function, Species};

    fn named(bindings: &mut Bindings, key: &str, var: &str, entity: Option<&str>) {
        let mut c = ConstantCoder::literal(key, 1.0);
        c.base.var_name = var.to_string();
        c.base.initialized = true;
        c.base.entity = entity.map(|e| e.to_string());
        bindings.bind(key, Coder::Constant(c));
    }

    fn render(expr: &Expr, bindings: &Bindings, model: &Model, conc: bool) -> String {
        let ctx = EmitCtx { bindings, model };
        let mut base = CoderBase::new(None, conc);
        base.begin("v", 1);
        base.formula(&ctx).render(expr, Outer::Top).unwrap()
    }

    fn abc_bindings() -> (Bindings, Model) {
        let mut bindings = Bindings::new();
        named(&mut bindings, "a", "a1", None);
        named(&mut bindings, "b", "b1", None);
        named(&mut bindings, "c", "c1", None);
        (bindings, Model::default())
    }

    #[test]
    fn test_subtraction_keeps_necessary_parens() {
        let (bindings, model) = abc_bindings();
        let x = Expr::sub(Expr::name("a"), Expr::sub(Expr::name("b"), Expr::name("c")));
        assert_eq!(render(&x, &bindings, &model, false), "a1 - (b1 - c1)");
    }

    #[test]
    fn test_power_under_product_needs_no_parens() {
        let (bindings, model) = abc_bindings();
        let x = Expr::mul(Expr::name("a"), Expr::pow(Expr::name("b"), Expr::name("c")));
        assert_eq!(render(&x, &bindings, &model, false), "a1 * b1 ** c1");
    }

    #[test]
    fn test_nested_power_keeps_parens() {
        let (bindings, model) = abc_bindings();
        let x = Expr::pow(Expr::name("a"), Expr::pow(Expr::name("b"), Expr::name("c")));
        assert_eq!(render(&x, &bindings, &model, false), "a1 ** (b1 ** c1)");
    }

    #[test]
    fn test_product_under_division_is_parenthesized() {
        let (bindings, model) = abc_bindings();
        let x = Expr::div(Expr::name("a"), Expr::mul(Expr::name("b"), Expr::name("c")));
        assert_eq!(render(&x, &bindings, &model, false), "a1 / (b1 * c1)");
    }

    #[test]
    fn test_unary_minus_parenthesizes_additive_child() {
        let (bindings, model) = abc_bindings();
        let x = Expr::neg(Expr::add(Expr::name("a"), Expr::name("b")));
        assert_eq!(render(&x, &bindings, &model, false), "-(a1 + b1)");
    }

    #[test]
    fn test_root_renders_as_fractional_power() {
        let (bindings, model) = abc_bindings();
        let x = Expr::root(Expr::num(3.0), Expr::name("a"));
        assert_eq!(render(&x, &bindings, &model, false), "a1 ** (1 / 3)");
    }

    #[test]
    fn test_reserved_function_translation() {
        let (bindings, model) = abc_bindings();
        let x = Expr::call("ln", vec![Expr::name("a")]);
        assert_eq!(render(&x, &bindings, &model, false), "log(a1)");
        let x = Expr::call("arctan", vec![Expr::Time]);
        assert_eq!(render(&x, &bindings, &model, false), "atan(t)");
    }

    #[test]
    fn test_amount_species_rescales_in_concentration_mode() {
        let mut model = Model::default();
        model.compartments.push(Compartment::new("cell").with_size(2.0));
        model.species.push(Species::new("S", "cell").with_amount(5.0));
        let mut bindings = Bindings::new();
        named(&mut bindings, "S", "xd1", Some("S"));
        named(&mut bindings, "cell", "const1", Some("cell"));

        let x = Expr::name("S");
        assert_eq!(render(&x, &bindings, &model, true), "(xd1 / const1)");
        // amount mode reads the variable as-is
        assert_eq!(render(&x, &bindings, &model, false), "xd1");
    }

    #[test]
    fn test_concentration_species_never_rescales() {
        let mut model = Model::default();
        model.compartments.push(Compartment::new("cell"));
        model.species.push(Species::new("S", "cell").with_concentration(0.5));
        let mut bindings = Bindings::new();
        named(&mut bindings, "S", "xd1", Some("S"));
        assert_eq!(render(&Expr::name("S"), &bindings, &model, true), "xd1");
    }

    #[test]
    fn test_conc_dependency_pulls_in_compartment() {
        let mut model = Model::default();
        model.compartments.push(Compartment::new("cell"));
        model.species.push(Species::new("S", "cell").with_amount(1.0));
        let mut base = CoderBase::new(None, true);
        base.begin("rxn", 1);
        base.add_depend("S", &model);
        assert!(base.depends.contains("S"));
        assert!(base.depends.contains("cell"));
    }

    #[test]
    fn test_unknown_call_is_function_not_found() {
        let model = Model::default();
        let mut bindings = Bindings::new();
        let mut base = CoderBase::new(None, false);
        base.begin("v", 1);
        let mut idgen = IdGen::default();
        let mut queue = Vec::new();
        let x = Expr::call("mystery", vec![Expr::num(1.0)]);
        let err = base
            .scan_expr(&x, &mut bindings, &model, &mut idgen, &mut queue)
            .unwrap_err();
        assert!(matches!(err, CompilerError::FunctionNotFound { name } if name == "mystery"));
    }

    #[test]
    fn test_reserved_name_shadows_model_function() {
        let mut model = Model::default();
        model
            .functions
            .push(Function::new("ln", vec!["v"], Expr::name("v")));
        let mut bindings = Bindings::new();
        named(&mut bindings, "a", "a1", None);
        let mut base = CoderBase::new(None, false);
        base.begin("v", 1);
        let mut idgen = IdGen::default();
        let mut queue = Vec::new();
        let x = Expr::call("ln", vec![Expr::name("a")]);
        base.scan_expr(&x, &mut bindings, &model, &mut idgen, &mut queue)
            .unwrap();
        // discovery spawns no delegated unit, emission renders the native
        // call, so neither side leaves a queue entry behind
        assert!(base.call_queue.is_empty());
        let ctx = EmitCtx {
            bindings: &bindings,
            model: &model,
        };
        assert_eq!(
            base.formula(&ctx).render(&x, Outer::Top).unwrap(),
            "log(a1)"
        );
    }
}
