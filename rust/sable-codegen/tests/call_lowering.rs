//! End-to-end lowering of calls, signatures and function frames.

use std::rc::Rc;

use sable_codegen::ir::{self, Function, InstKind, ParamAttr, Signature, ValueDef};
use sable_codegen::layout::ValueSchema;
use sable_codegen::{lower_module, CodegenError, CodegenSettings, ModuleEmitter};
use sable_core::ast::{DeclContext, SourceModule};
use sable_core::builder::{self as sb, ModuleBuilder};
use sable_core::builtins::BuiltinKind;
use sable_core::types::TupleField;

fn lower(source: &SourceModule) -> ir::Module {
    lower_module(source, CodegenSettings::default()).unwrap()
}

fn function<'a>(module: &'a ir::Module, name: &str) -> &'a Function {
    module
        .get(name)
        .unwrap_or_else(|| panic!("`{name}` was not lowered"))
}

fn calls(func: &Function) -> Vec<(Rc<Signature>, usize, Vec<(usize, ParamAttr)>)> {
    func.iter_insts()
        .filter_map(|(_, _, data)| match &data.kind {
            InstKind::Call {
                sig, args, attrs, ..
            } => Some((sig.clone(), args.len(), attrs.clone())),
            _ => None,
        })
        .collect()
}

fn count(func: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    func.count_insts(pred)
}

fn is_call(kind: &InstKind) -> bool {
    matches!(kind, InstKind::Call { .. })
}

fn is_ret(kind: &InstKind) -> bool {
    matches!(kind, InstKind::Ret { .. })
}

/// `sum(a, b) = add(a, b)` plus a caller `inc(x) = sum(x, 1)`.
fn sum_and_inc() -> SourceModule {
    let mut mb = ModuleBuilder::new("calls");
    let int = mb.types.int(64);
    let pair = mb.types.tuple(&[int, int]);
    let binary = mb.types.function(pair, int);
    let unary = mb.types.function(int, int);
    let add = mb.declare_builtin(BuiltinKind::Add, binary);

    let sum = mb.declare_global("sum", binary);
    let a = mb.param(sum, 0);
    let b = mb.param(sum, 1);
    let args = mb.tuple(vec![a, b]);
    let body = mb.call(add, args);
    mb.define(sum, vec![sb::ret(body)]);

    let inc = mb.declare_global("inc", unary);
    let x = mb.param(inc, 0);
    let one = mb.int(1);
    let args = mb.tuple(vec![x, one]);
    let body = mb.call(sum, args);
    mb.define(inc, vec![sb::ret(body)]);

    mb.finish()
}

#[test]
fn scalar_call_uses_the_context_free_signature() {
    let module = lower(&sum_and_inc());
    let inc = function(&module, "inc");

    let calls = calls(inc);
    assert_eq!(calls.len(), 1);
    let (sig, nargs, attrs) = &calls[0];
    assert_eq!(sig.to_string(), "i64 (i64, i64)");
    assert!(!sig.has_context);
    assert_eq!(*nargs, 2);
    assert!(attrs.is_empty());

    let callee = inc
        .iter_insts()
        .find_map(|(_, _, data)| match &data.kind {
            InstKind::Call { callee, .. } => Some(*callee),
            _ => None,
        })
        .unwrap();
    assert!(matches!(inc.value(callee).def, ValueDef::FuncAddr(_)));
    assert_eq!(module.get("sum").unwrap().sig.to_string(), "i64 (i64, i64)");
}

#[test]
fn builtin_calls_are_emitted_inline() {
    let module = lower(&sum_and_inc());
    let sum = function(&module, "sum");
    assert_eq!(count(sum, is_call), 0);
    assert_eq!(
        count(sum, |k| matches!(
            k,
            InstKind::Binary {
                op: ir::BinaryOp::Add,
                ..
            }
        )),
        1
    );
    assert!(module.get("add").is_none());
}

#[test]
fn single_return_edge_is_merged_into_its_block() {
    let module = lower(&sum_and_inc());
    let sum = function(&module, "sum");
    assert_eq!(sum.layout().len(), 1);
    assert_eq!(count(sum, |k| matches!(k, InstKind::Br { .. })), 0);
    assert_eq!(count(sum, is_ret), 1);
    assert_eq!(count(sum, |k| matches!(k, InstKind::AllocaPoint)), 0);
}

#[test]
fn record_results_are_returned_through_memory() {
    let mut mb = ModuleBuilder::new("records");
    let int = mb.types.int(64);
    let point = mb.types.record(
        "Point",
        vec![TupleField::named("x", int), TupleField::named("y", int)],
    );
    let make_ty = mb.types.function(int, point);
    let unit = mb.types.unit();
    let getter_ty = mb.types.function(unit, int);

    let make = mb.declare_global("make_point", make_ty);
    let x = mb.param(make, 0);
    let y = mb.param(make, 0);
    let literal = mb.record(point, vec![x, y]);
    mb.define(make, vec![sb::ret(literal)]);

    let first = mb.declare_global("first", getter_ty);
    let five = mb.int(5);
    let call = mb.call(make, five);
    let field = mb.element(call, 0);
    mb.define(first, vec![sb::ret(field)]);

    let module = lower(&mb.finish());

    let make = function(&module, "make_point");
    assert_eq!(
        make.sig.to_string(),
        "void (ptr sret({ i64, i64 }) noalias, i64)"
    );
    assert_eq!(count(make, |k| matches!(k, InstKind::Ret { value: None })), 1);
    assert_eq!(count(make, |k| matches!(k, InstKind::MemCopy { .. })), 1);

    let first = function(&module, "first");
    let calls = calls(first);
    assert_eq!(calls.len(), 1);
    let (sig, nargs, attrs) = &calls[0];
    assert!(sig.has_struct_return());
    assert_eq!(*nargs, 2);
    assert_eq!(attrs.len(), 2);
    assert!(attrs
        .iter()
        .all(|(index, _)| *index == 0));
    assert!(attrs.contains(&(0, ParamAttr::NoAlias)));
    let slot_named = first.iter_insts().any(|(_, _, data)| {
        matches!(data.kind, InstKind::Alloca { .. })
            && data
                .result
                .and_then(|v| first.value(v).name.clone())
                .as_deref()
                == Some("call.aggresult")
    });
    assert!(slot_named);
}

#[test]
fn multi_scalar_results_round_trip_through_struct_values() {
    let mut mb = ModuleBuilder::new("tuples");
    let int = mb.types.int(64);
    let pair = mb.types.tuple(&[int, int]);
    let swap_ty = mb.types.function(pair, pair);
    let second_ty = mb.types.function(pair, int);

    let swap = mb.declare_global("swap", swap_ty);
    let a = mb.param(swap, 0);
    let b = mb.param(swap, 1);
    let swapped = mb.tuple(vec![b, a]);
    mb.define(swap, vec![sb::ret(swapped)]);

    let second = mb.declare_global("second", second_ty);
    let a = mb.param(second, 0);
    let b = mb.param(second, 1);
    let args = mb.tuple(vec![a, b]);
    let call = mb.call(swap, args);
    let field = mb.element(call, 1);
    mb.define(second, vec![sb::ret(field)]);

    let module = lower(&mb.finish());
    let swap = function(&module, "swap");
    assert_eq!(swap.sig.to_string(), "{ i64, i64 } (i64, i64)");
    assert_eq!(count(swap, |k| matches!(k, InstKind::InsertValue { .. })), 2);

    let second = function(&module, "second");
    assert_eq!(count(second, is_call), 1);
    assert_eq!(count(second, |k| matches!(k, InstKind::ExtractValue { .. })), 2);
}

#[test]
fn trapping_function_has_no_return() {
    let mut mb = ModuleBuilder::new("traps");
    let int = mb.types.int(64);
    let unit = mb.types.unit();
    let fn_ty = mb.types.function(unit, int);
    let f = mb.declare_global("never", fn_ty);
    mb.define(f, vec![sb::trap()]);

    let module = lower(&mb.finish());
    let never = function(&module, "never");
    assert_eq!(never.layout().len(), 1);
    assert_eq!(count(never, is_ret), 0);
    assert_eq!(count(never, |k| matches!(k, InstKind::Unreachable)), 1);
}

#[test]
fn both_branches_returning_share_the_return_block() {
    let mut mb = ModuleBuilder::new("branches");
    let int = mb.types.int(64);
    let bool_ty = mb.types.bool();
    let pair = mb.types.tuple(&[int, int]);
    let cmp_ty = mb.types.function(pair, bool_ty);
    let neg_ty = mb.types.function(int, int);
    let slt = mb.declare_builtin(BuiltinKind::CmpSlt, cmp_ty);
    let neg = mb.declare_builtin(BuiltinKind::Neg, neg_ty);

    let abs = mb.declare_global("abs", neg_ty);
    let x = mb.param(abs, 0);
    let zero = mb.int(0);
    let args = mb.tuple(vec![x, zero]);
    let cond = mb.call(slt, args);
    let x = mb.param(abs, 0);
    let negated = mb.call(neg, x);
    let x = mb.param(abs, 0);
    mb.define(
        abs,
        vec![sb::if_stmt(
            cond,
            vec![sb::ret(negated)],
            Some(vec![sb::ret(x)]),
        )],
    );

    let module = lower(&mb.finish());
    let abs = function(&module, "abs");
    let names: Vec<&str> = abs
        .layout()
        .iter()
        .map(|&b| abs.block(b).name.as_str())
        .collect();
    assert_eq!(names, ["entry", "if.then", "if.else", "return"]);
    assert_eq!(count(abs, is_ret), 1);
    assert_eq!(count(abs, |k| matches!(k, InstKind::CondBr { .. })), 1);
    assert_eq!(count(abs, is_call), 0);
}

#[test]
fn fallthrough_after_if_reaches_the_return_block() {
    let mut mb = ModuleBuilder::new("branches");
    let int = mb.types.int(64);
    let bool_ty = mb.types.bool();
    let fn_ty = mb.types.function(bool_ty, int);

    let pick = mb.declare_global("pick", fn_ty);
    let local = mb.fresh_local();
    let cond = mb.param(pick, 0);
    let one = mb.int(1);
    let two = mb.int(2);
    let result = mb.local(local, int);
    mb.define(
        pick,
        vec![
            sb::let_stmt(local, "dflt", two),
            sb::if_stmt(cond, vec![sb::ret(one)], None),
            sb::ret(result),
        ],
    );

    let module = lower(&mb.finish());
    let pick = function(&module, "pick");
    let names: Vec<&str> = pick
        .layout()
        .iter()
        .map(|&b| pick.block(b).name.as_str())
        .collect();
    assert_eq!(names, ["entry", "if.then", "if.end", "return"]);
    assert_eq!(count(pick, is_ret), 1);
}

#[test]
fn function_values_carry_their_context() {
    let mut mb = ModuleBuilder::new("higher");
    let int = mb.types.int(64);
    let unary = mb.types.function(int, int);
    let pair = mb.types.tuple(&[int, int]);
    let binary = mb.types.function(pair, int);
    let apply_input = mb.types.tuple(&[unary, int]);
    let apply_ty = mb.types.function(apply_input, int);
    let add = mb.declare_builtin(BuiltinKind::Add, binary);

    let double = mb.declare_global("double", unary);
    let a = mb.param(double, 0);
    let b = mb.param(double, 0);
    let args = mb.tuple(vec![a, b]);
    let body = mb.call(add, args);
    mb.define(double, vec![sb::ret(body)]);

    let apply = mb.declare_global("apply", apply_ty);
    let f = mb.param(apply, 0);
    let x = mb.param(apply, 1);
    let body = mb.apply(f, x);
    mb.define(apply, vec![sb::ret(body)]);

    let unit = mb.types.unit();
    let nullary = mb.types.function(unit, int);
    let run = mb.declare_global("run", nullary);
    let f = mb.func_ref(double);
    let n = mb.int(21);
    let args = mb.tuple(vec![f, n]);
    let body = mb.call(apply, args);
    mb.define(run, vec![sb::ret(body)]);

    let module = lower(&mb.finish());

    let apply = function(&module, "apply");
    assert_eq!(apply.sig.to_string(), "i64 (ptr, ptr, i64)");
    let apply_calls = calls(apply);
    assert_eq!(apply_calls.len(), 1);
    assert!(apply_calls[0].0.has_context);
    assert_eq!(apply_calls[0].0.to_string(), "i64 (i64, ptr)");

    let run = function(&module, "run");
    let run_calls = calls(run);
    assert_eq!(run_calls.len(), 1);
    assert!(!run_calls[0].0.has_context);
    assert_eq!(run_calls[0].1, 3);
}

#[test]
fn signatures_are_memoized_per_context_flag() {
    let mut mb = ModuleBuilder::new("sigs");
    let int = mb.types.int(64);
    let pair = mb.types.tuple(&[int, int]);
    let fn_ty = mb.types.function(pair, int);
    let source = mb.finish();

    let mut emitter = ModuleEmitter::new(&source, CodegenSettings::default()).unwrap();
    let thin = emitter.function_type(fn_ty, false);
    let again = emitter.function_type(fn_ty, false);
    let thick = emitter.function_type(fn_ty, true);
    assert!(Rc::ptr_eq(&thin, &again));
    assert!(!Rc::ptr_eq(&thin, &thick));
    assert_eq!(thick.to_string(), "i64 (i64, i64, ptr)");
    assert_eq!(thick.params.last().unwrap().ty, ir::IrType::Ptr);
}

#[test]
fn small_explosion_limit_moves_results_into_memory() {
    let mut mb = ModuleBuilder::new("limits");
    let int = mb.types.int(64);
    let triple = mb.types.tuple(&[int, int, int]);
    let unit = mb.types.unit();
    let fn_ty = mb.types.function(unit, triple);
    let f = mb.declare_global("triple", fn_ty);
    let a = mb.int(1);
    let b = mb.int(2);
    let c = mb.int(3);
    let literal = mb.tuple(vec![a, b, c]);
    mb.define(f, vec![sb::ret(literal)]);
    let source = mb.finish();

    let settings = CodegenSettings::from_toml_str("[codegen]\nmax_scalar_explosion = 2\n").unwrap();
    let module = lower_module(&source, settings).unwrap();
    assert_eq!(
        function(&module, "triple").sig.to_string(),
        "void (ptr sret({ i64, i64, i64 }) noalias)"
    );

    let module = lower(&source);
    assert_eq!(
        function(&module, "triple").sig.to_string(),
        "{ i64, i64, i64 } ()"
    );
}

#[test]
fn closures_on_a_32_bit_target() {
    let mut mb = ModuleBuilder::new("i686");
    let int = mb.types.int(32);
    let fn_ty = mb.types.function(int, int);
    let source = mb.finish();

    let settings = CodegenSettings {
        target: Some("i686-unknown-linux-gnu".to_string()),
        ..CodegenSettings::default()
    };
    let mut emitter = ModuleEmitter::new(&source, settings).unwrap();
    let layout = emitter.layout(fn_ty);
    assert_eq!(layout.size, 8);
    assert_eq!(layout.align, 4);
    assert_eq!(
        layout.schema,
        ValueSchema::Scalars(vec![ir::IrType::Ptr, ir::IrType::Ptr])
    );
}

#[test]
fn local_functions_are_reported_as_unimplemented() {
    let mut mb = ModuleBuilder::new("nested");
    let int = mb.types.int(64);
    let fn_ty = mb.types.function(int, int);
    let outer = mb.declare_global("outer", fn_ty);
    let inner = mb.declare("inner", fn_ty, DeclContext::Local { parent: outer });
    let x = mb.param(outer, 0);
    let body = mb.call(inner, x);
    mb.define(outer, vec![sb::ret(body)]);

    let err = lower_module(&mb.finish(), CodegenSettings::default()).unwrap_err();
    match err {
        CodegenError::Unimplemented {
            module,
            diagnostics,
        } => {
            assert_eq!(module, "nested");
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(
                diagnostics[0].message,
                "unimplemented IR generation feature: local function emission"
            );
        }
        other => panic!("expected an unimplemented-feature error, got {other}"),
    }
}

#[test]
fn aggregate_arguments_are_passed_by_address() {
    let mut mb = ModuleBuilder::new("wide");
    let int = mb.types.int(64);
    let wide = mb.types.tuple(&[int, int, int, int, int]);
    let input = mb.types.tuple(&[wide, int]);
    let fn_ty = mb.types.function(input, int);
    let unit = mb.types.unit();
    let nullary = mb.types.function(unit, int);

    let take = mb.declare_global("take", fn_ty);
    let n = mb.param(take, 1);
    mb.define(take, vec![sb::ret(n)]);

    let caller = mb.declare_global("caller", nullary);
    let fields: Vec<_> = (0..5).map(|i| mb.int(i)).collect();
    let wide_literal = mb.tuple(fields);
    let seven = mb.int(7);
    let args = mb.tuple(vec![wide_literal, seven]);
    let body = mb.call(take, args);
    mb.define(caller, vec![sb::ret(body)]);

    let module = lower(&mb.finish());
    assert_eq!(function(&module, "take").sig.to_string(), "i64 (ptr, i64)");
    let calls = calls(function(&module, "caller"));
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, 2);
}

#[test]
fn let_bound_record_calls_reuse_the_result_slot() {
    let mut mb = ModuleBuilder::new("bindings");
    let int = mb.types.int(64);
    let point = mb.types.record(
        "Point",
        vec![TupleField::named("x", int), TupleField::named("y", int)],
    );
    let make_ty = mb.types.function(int, point);
    let unit = mb.types.unit();
    let getter_ty = mb.types.function(unit, int);

    let make = mb.declare_global("make_point", make_ty);
    let x = mb.param(make, 0);
    let y = mb.param(make, 0);
    let literal = mb.record(point, vec![x, y]);
    mb.define(make, vec![sb::ret(literal)]);

    let getter = mb.declare_global("second", getter_ty);
    let p = mb.fresh_local();
    let three = mb.int(3);
    let call = mb.call(make, three);
    let bound = mb.local(p, point);
    let field = mb.element(bound, 1);
    mb.define(getter, vec![sb::let_stmt(p, "p", call), sb::ret(field)]);

    let module = lower(&mb.finish());
    let second = function(&module, "second");
    let mut slots: Vec<_> = second
        .iter_insts()
        .filter(|(_, _, data)| matches!(data.kind, InstKind::Alloca { .. }))
        .filter_map(|(_, _, data)| data.result)
        .map(|slot| second.value(slot).name.clone().unwrap_or_default())
        .collect();
    slots.sort();
    assert_eq!(slots, vec!["call.aggresult", "return_value"]);
    assert_eq!(count(second, |k| matches!(k, InstKind::MemCopy { .. })), 0);
    // Only the scalar result is stored.
    assert_eq!(count(second, |k| matches!(k, InstKind::Store { .. })), 1);
}
