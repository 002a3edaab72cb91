//! Lowering of function applications.
//!
//! Calls to builtin-module functions are emitted inline. Every other call
//! explodes its callee into `(code, context)`, marshals the argument into
//! the callee type's lowered signature and calls through the code pointer.

use sable_core::ast::{Expr, ExprKind};
use sable_core::builtins::BuiltinKind;
use tracing::trace;

use crate::builtin::emit_builtin;
use crate::function::FunctionEmitter;
use crate::ir::ParamAttr;
use crate::layout::{Address, Explosion, RValue, TypeLayout, ValueSchema};

fn apply_parts(expr: &Expr) -> (&Expr, &Expr) {
    match &expr.kind {
        ExprKind::Apply { callee, arg } => (&**callee, &**arg),
        other => panic!("expected an application, found {other:?}"),
    }
}

impl FunctionEmitter<'_, '_> {
    /// Emit the application `expr`, whose result has layout `result_layout`.
    pub fn emit_apply(&mut self, expr: &Expr, result_layout: &TypeLayout) -> RValue {
        let (callee, arg) = apply_parts(expr);

        if let Some(decl) = expr.called_decl() {
            let func = self.source().decl(decl);
            if func.is_builtin() {
                return self.emit_builtin_call(&func.name, arg, result_layout);
            }
        }

        let mut fn_values = Explosion::new();
        self.emit_explosion(callee, &mut fn_values);
        let code = fn_values.claim_next();
        let context = fn_values.claim_next();
        fn_values.finish();

        let mut args = Explosion::new();
        let mut attrs = Vec::new();

        // The implicit result slot always comes first.
        let result_slot = match &result_layout.schema {
            ValueSchema::Aggregate { storage, align } => {
                let slot = self.create_alloca(storage.clone(), *align, "call.aggresult");
                args.add(slot.ptr);
                attrs.push((0, ParamAttr::StructReturn(storage.clone())));
                attrs.push((0, ParamAttr::NoAlias));
                Some(slot)
            }
            ValueSchema::Scalars(_) => None,
        };

        self.emit_argument_explosion(arg, &mut args);

        let needs_context = !self.builder.is_undef(context);
        if needs_context {
            args.add(context);
        }

        let sig = self.module.function_type(callee.ty, needs_context);
        trace!(
            callee = %self.types().display(callee.ty),
            needs_context,
            signature = %sig,
            "emitting call"
        );
        let result = self
            .builder
            .build_call(code, sig, args.claim_all(), attrs);

        match (&result_layout.schema, result_slot) {
            (ValueSchema::Aggregate { .. }, Some(slot)) => RValue::Aggregate(slot),
            (ValueSchema::Scalars(scalars), None) => match (scalars.len(), result) {
                (0, None) => RValue::Scalars(Vec::new()),
                (1, Some(value)) => RValue::Scalars(vec![value]),
                (count, Some(value)) => RValue::Scalars(
                    (0..count)
                        .map(|index| self.builder.build_extract_value(value, index))
                        .collect(),
                ),
                (count, None) => panic!("call to a {count}-scalar result produced no value"),
            },
            _ => unreachable!("aggregate results always have a result slot"),
        }
    }

    /// Emit the application `expr` and add its decomposed result to `out`.
    pub fn emit_exploded_apply(&mut self, expr: &Expr, out: &mut Explosion) {
        let layout = self.layout(expr.ty);
        let value = self.emit_apply(expr, &layout);
        layout.explode(&value, out);
    }

    /// Emit `expr` directly into memory if its result is passed indirectly,
    /// returning the result's address. Returns `None` for scalar results.
    pub fn try_emit_apply_as_address(&mut self, expr: &Expr) -> Option<Address> {
        let layout = self.layout(expr.ty);
        if !layout.schema.is_aggregate() {
            return None;
        }
        Some(self.emit_apply(expr, &layout).aggregate_address())
    }

    /// Explode a call argument, drilling into one level of tuple so each
    /// element is passed as its own logical argument.
    fn emit_argument_explosion(&mut self, arg: &Expr, out: &mut Explosion) {
        if let ExprKind::Tuple(elements) = &arg.kind {
            for element in elements {
                self.emit_explosion(element, out);
            }
            return;
        }
        let layout = self.layout(arg.ty);
        if self.types().tuple_fields(arg.ty).is_some() && layout.schema.is_aggregate() {
            let addr = self.emit_rvalue(arg).aggregate_address();
            layout.load_field_explosions(&mut self.builder, addr, out);
        } else {
            self.emit_explosion(arg, out);
        }
    }

    fn emit_builtin_call(&mut self, name: &str, arg: &Expr, result_layout: &TypeLayout) -> RValue {
        assert!(
            !result_layout.schema.is_aggregate(),
            "builtin `{name}` has an aggregate result"
        );
        let kind = BuiltinKind::lookup(name)
            .unwrap_or_else(|| panic!("`{name}` is not a builtin after all"));
        let mut args = Explosion::new();
        self.emit_explosion(arg, &mut args);
        trace!(builtin = %kind, "emitting builtin inline");
        let value = emit_builtin(&mut self.builder, kind, &mut args);
        RValue::Scalars(vec![value])
    }
}
