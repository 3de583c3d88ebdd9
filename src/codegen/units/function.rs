//! User-defined function application

use std::collections::BTreeMap;

use crate::codegen::bindings::Bindings;
use crate::codegen::coder::{
    fast_prepare, reserved_name, ArgSymbol, Coder, CoderBase, EmitCtx, IdGen, Outer,
};
use crate::codegen::fortran::Subroutine;
use crate::error::CompilerError;
use crate::sbml::{fmt_number, Expr, Function, Model};

use super::EvalCoder;

/// Applies a user-defined function by emitting its body with the formal
/// arguments substituted
///
/// Plain-name arguments pass the entity reference through, honoring the
/// caller's concentration mode; composite arguments are lowered into `arg`
/// evaluation units first.
#[derive(Debug)]
pub struct FnCallCoder {
    pub(crate) base: CoderBase,
    formals: Vec<String>,
    body: Expr,
    call_args: Vec<Expr>,
    arg_conc: bool,
    arg_symbols: BTreeMap<String, ArgSymbol>,
}

impl FnCallCoder {
    pub fn new(def: Function, call_args: Vec<Expr>, arg_conc: bool) -> Self {
        FnCallCoder {
            base: CoderBase::new(None, false),
            formals: def.args,
            body: def.body,
            call_args,
            arg_conc,
            arg_symbols: BTreeMap::new(),
        }
    }

    pub(crate) fn discover(
        &mut self,
        bindings: &mut Bindings,
        model: &Model,
        idgen: &mut IdGen,
        queue: &mut Vec<String>,
    ) -> Result<(), CompilerError> {
        if self.call_args.len() != self.formals.len() {
            return Err(CompilerError::unsupported(format!(
                "function applied to {} arguments, expected {}",
                self.call_args.len(),
                self.formals.len()
            )));
        }
        self.arg_symbols.clear();
        let call_args = self.call_args.clone();
        for (formal, arg) in self.formals.clone().iter().zip(call_args.iter()) {
            let symbol = match arg {
                Expr::Name(n) => {
                    self.base.add_depend_conc(n, self.arg_conc, model);
                    ArgSymbol::Entity(n.clone())
                }
                Expr::Const(c) => {
                    self.base.depends.insert(c.key().to_string());
                    ArgSymbol::Entity(c.key().to_string())
                }
                Expr::Time => ArgSymbol::Text("t".to_string()),
                Expr::Num(v) => ArgSymbol::Text(fmt_number(*v)),
                composite => {
                    let unit = Coder::Eval(EvalCoder::new(
                        None,
                        composite.clone(),
                        "arg",
                        self.arg_conc,
                    ));
                    let rc = std::rc::Rc::new(std::cell::RefCell::new(unit));
                    let var = fast_prepare(&rc, bindings, model, idgen, queue)?;
                    self.base.depends.insert(format!("#{var}"));
                    ArgSymbol::Text(var)
                }
            };
            self.arg_symbols.insert(formal.clone(), symbol);
        }
        let body = self.body.clone();
        self.scan_body(&body, model)
    }

    /// Track free names of the body; formals are substituted at emission
    fn scan_body(&mut self, x: &Expr, model: &Model) -> Result<(), CompilerError> {
        match x {
            Expr::Num(_) | Expr::Time => {}
            Expr::Const(c) => {
                self.base.depends.insert(c.key().to_string());
            }
            Expr::Name(n) => {
                if !self.formals.contains(n) {
                    self.base.add_depend_conc(n, false, model);
                }
            }
            Expr::Neg(a) => self.scan_body(a, model)?,
            Expr::Bin(_, a, b) | Expr::Root(a, b) => {
                self.scan_body(a, model)?;
                self.scan_body(b, model)?;
            }
            Expr::Call(name, args) => {
                if reserved_name(name).is_none() {
                    return Err(CompilerError::function_not_found(name.clone()));
                }
                for a in args {
                    self.scan_body(a, model)?;
                }
            }
            Expr::Delay(..) => {
                return Err(CompilerError::unsupported(
                    "delay inside a function body",
                ));
            }
            Expr::Lambda(..) => {
                return Err(CompilerError::unsupported(
                    "function definition in expression context",
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn emit(
        &self,
        target: &mut Subroutine,
        ctx: &EmitCtx,
    ) -> Result<(), CompilerError> {
        let text = self
            .base
            .formula(ctx)
            .with_args(&self.arg_symbols, self.arg_conc)
            .render(&self.body, Outer::Top)?;
        target.declare(&self.base.var_name);
        target.stmt(&format!("{} = {}", self.base.var_name, text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::coder::resolve;
    use crate::codegen::units::ConstantCoder;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn hill() -> Function {
        // hill(s, k) = s / (k + s)
        Function::new(
            "hill",
            vec!["s", "k"],
            Expr::div(
                Expr::name("s"),
                Expr::add(Expr::name("k"), Expr::name("s")),
            ),
        )
    }

    #[test]
    fn test_plain_name_argument_passes_through() {
        let mut model = Model::default();
        model.functions.push(hill());
        let mut bindings = Bindings::new();
        bindings.bind("S", Coder::Constant(ConstantCoder::literal("S", 1.0)));
        bindings.bind("km", Coder::Constant(ConstantCoder::literal("km", 0.5)));

        let rc = Rc::new(RefCell::new(Coder::FnCall(FnCallCoder::new(
            hill(),
            vec![Expr::name("S"), Expr::name("km")],
            false,
        ))));
        let mut idgen = IdGen::default();
        resolve(&rc, &mut bindings, &model, &mut idgen).unwrap();

        let mut sub = Subroutine::new("ffcn", "f");
        let ctx = EmitCtx {
            bindings: &bindings,
            model: &model,
        };
        rc.borrow().emit(&mut sub, &ctx).unwrap();
        // S -> const1, km -> const2
        assert!(sub
            .to_string()
            .contains("        fn1 = const1 / (const2 + const1)\n"));
    }

    #[test]
    fn test_composite_argument_is_lowered() {
        let mut model = Model::default();
        model.functions.push(hill());
        let mut bindings = Bindings::new();
        bindings.bind("S", Coder::Constant(ConstantCoder::literal("S", 1.0)));
        bindings.bind("km", Coder::Constant(ConstantCoder::literal("km", 0.5)));

        let rc = Rc::new(RefCell::new(Coder::FnCall(FnCallCoder::new(
            hill(),
            vec![
                Expr::mul(Expr::num(2.0), Expr::name("S")),
                Expr::name("km"),
            ],
            false,
        ))));
        let mut idgen = IdGen::default();
        resolve(&rc, &mut bindings, &model, &mut idgen).unwrap();
        assert!(bindings.get("#arg1").is_some());

        let mut sub = Subroutine::new("ffcn", "f");
        let ctx = EmitCtx {
            bindings: &bindings,
            model: &model,
        };
        rc.borrow().emit(&mut sub, &ctx).unwrap();
        assert!(sub
            .to_string()
            .contains("        fn1 = arg1 / (const2 + arg1)\n"));
    }

    #[test]
    fn test_nested_user_call_in_body_is_rejected() {
        let mut model = Model::default();
        model.functions.push(Function::new(
            "outer",
            vec!["s"],
            Expr::call("inner", vec![Expr::name("s")]),
        ));
        let mut bindings = Bindings::new();
        let rc = Rc::new(RefCell::new(Coder::FnCall(FnCallCoder::new(
            model.functions[0].clone(),
            vec![Expr::num(1.0)],
            false,
        ))));
        let mut idgen = IdGen::default();
        let err = resolve(&rc, &mut bindings, &model, &mut idgen).unwrap_err();
        assert!(matches!(err, CompilerError::FunctionNotFound { .. }));
    }
}
