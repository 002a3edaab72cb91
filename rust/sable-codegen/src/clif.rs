//! IR-to-Cranelift translation.
//!
//! Works with any `cranelift_module::Module` (JIT or object). Struct-typed
//! SSA values have no Cranelift counterpart, so each IR value maps to the
//! list of scalar Cranelift values it flattens to.

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::stackslot::{StackSlotData, StackSlotKind};
use cranelift_codegen::ir::{
    self as clif, types, AbiParam, ArgumentPurpose, InstBuilder, MemFlags, TrapCode,
    Type as ClifType, UserFuncName,
};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage as ClifLinkage, Module};
use tracing::debug;

use crate::error::CodegenError;
use crate::ir::{
    self, BinaryOp, FloatPredicate, InstKind, IntPredicate, IrType, Linkage, Signature, UnaryOp,
    ValueDef,
};
use crate::target::TargetInfo;

/// A function defined or declared by [`define_module`].
#[derive(Debug, Clone)]
pub struct DefinedFunction {
    pub name: String,
    pub func_id: FuncId,
    pub is_definition: bool,
}

// ---------------------------------------------------------------------------
// Types and signatures
// ---------------------------------------------------------------------------

/// The Cranelift type of a scalar IR type. Booleans are bytes.
pub fn clif_scalar_type(ty: &IrType, pointer_type: ClifType) -> ClifType {
    match ty {
        IrType::Int(1) | IrType::Int(8) => types::I8,
        IrType::Int(16) => types::I16,
        IrType::Int(32) => types::I32,
        IrType::Int(64) => types::I64,
        IrType::F32 => types::F32,
        IrType::F64 => types::F64,
        IrType::Ptr => pointer_type,
        other => panic!("{other} is not a scalar type"),
    }
}

/// Scalar leaves of `ty` with their byte offsets, in field order.
fn flatten(ty: &IrType, target: &TargetInfo) -> Vec<(u64, IrType)> {
    fn walk(ty: &IrType, base: u64, target: &TargetInfo, out: &mut Vec<(u64, IrType)>) {
        match ty {
            IrType::Void => {}
            IrType::Struct(fields) => {
                for (index, field) in fields.iter().enumerate() {
                    walk(field, base + ty.field_offset(index, target), target, out);
                }
            }
            scalar => out.push((base, scalar.clone())),
        }
    }
    let mut out = Vec::new();
    walk(ty, 0, target, &mut out);
    out
}

fn flat_len(ty: &IrType) -> usize {
    match ty {
        IrType::Void => 0,
        IrType::Struct(fields) => fields.iter().map(flat_len).sum(),
        _ => 1,
    }
}

fn abi_param(ty: &IrType, pointer_type: ClifType) -> AbiParam {
    let clif_ty = clif_scalar_type(ty, pointer_type);
    match ty {
        IrType::Int(1) => AbiParam::new(clif_ty).uext(),
        _ => AbiParam::new(clif_ty),
    }
}

/// Build the Cranelift signature of an IR signature.
pub fn clif_signature<M: Module>(module: &M, sig: &Signature) -> clif::Signature {
    let pointer_type = module.target_config().pointer_type();
    let mut clif_sig = module.make_signature();
    for param in &sig.params {
        if param.is_struct_return() {
            clif_sig
                .params
                .push(AbiParam::special(pointer_type, ArgumentPurpose::StructReturn));
        } else {
            clif_sig.params.push(abi_param(&param.ty, pointer_type));
        }
    }
    match &sig.ret {
        IrType::Void => {}
        IrType::Struct(fields) => {
            for field in fields {
                clif_sig.returns.push(abi_param(field, pointer_type));
            }
        }
        scalar => clif_sig.returns.push(abi_param(scalar, pointer_type)),
    }
    clif_sig
}

// ---------------------------------------------------------------------------
// Module translation
// ---------------------------------------------------------------------------

/// Declare every function of `ir_module` in `module` and define those with
/// bodies. Returns one entry per IR function, in module order.
pub fn define_module<M: Module>(
    module: &mut M,
    ir_module: &ir::Module,
) -> Result<Vec<DefinedFunction>, CodegenError> {
    let pointer_bytes = u64::from(module.target_config().pointer_bytes());
    let target = TargetInfo::with_pointer(pointer_bytes, pointer_bytes);

    let mut declared = Vec::with_capacity(ir_module.len());
    for (_, func) in ir_module.functions() {
        let sig = clif_signature(module, &func.sig);
        let linkage = match (func.is_declaration(), func.linkage) {
            (true, _) => ClifLinkage::Import,
            (false, Linkage::Export) => ClifLinkage::Export,
            (false, Linkage::Local) => ClifLinkage::Local,
        };
        let func_id = module
            .declare_function(&func.name, linkage, &sig)
            .map_err(|e| CodegenError::LoweringError(format!("declare_function({}): {e}", func.name)))?;
        declared.push(DefinedFunction {
            name: func.name.clone(),
            func_id,
            is_definition: !func.is_declaration(),
        });
    }
    let func_ids: Vec<FuncId> = declared.iter().map(|d| d.func_id).collect();

    let mut fb_ctx = FunctionBuilderContext::new();
    for (fref, func) in ir_module.functions() {
        if func.is_declaration() {
            continue;
        }
        let func_id = func_ids[fref.index()];
        let mut clif_func = clif::Function::with_name_signature(
            UserFuncName::user(0, func_id.as_u32()),
            clif_signature(module, &func.sig),
        );
        FunctionTranslator::new(&mut clif_func, &mut fb_ctx, module, func, &func_ids, &target)
            .translate();

        let mut ctx = Context::for_function(clif_func);
        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| CodegenError::LoweringError(format!("define_function({}): {e:?}", func.name)))?;
        debug!(function = %func.name, "defined native function");
    }

    Ok(declared)
}

// ---------------------------------------------------------------------------
// Function translation
// ---------------------------------------------------------------------------

struct FunctionTranslator<'a, M: Module> {
    builder: FunctionBuilder<'a>,
    module: &'a mut M,
    func: &'a ir::Function,
    func_ids: &'a [FuncId],
    target: &'a TargetInfo,
    pointer_type: ClifType,
    blocks: HashMap<ir::Block, clif::Block>,
    values: HashMap<ir::Value, Vec<clif::Value>>,
    sig_refs: HashMap<Signature, clif::SigRef>,
    func_refs: HashMap<ir::FuncRef, clif::FuncRef>,
}

impl<'a, M: Module> FunctionTranslator<'a, M> {
    fn new(
        clif_func: &'a mut clif::Function,
        fb_ctx: &'a mut FunctionBuilderContext,
        module: &'a mut M,
        func: &'a ir::Function,
        func_ids: &'a [FuncId],
        target: &'a TargetInfo,
    ) -> Self {
        let pointer_type = module.target_config().pointer_type();
        Self {
            builder: FunctionBuilder::new(clif_func, fb_ctx),
            module,
            func,
            func_ids,
            target,
            pointer_type,
            blocks: HashMap::new(),
            values: HashMap::new(),
            sig_refs: HashMap::new(),
            func_refs: HashMap::new(),
        }
    }

    fn translate(mut self) {
        let func = self.func;
        for &block in func.layout() {
            let clif_block = self.builder.create_block();
            self.blocks.insert(block, clif_block);
        }

        let entry = func
            .entry_block()
            .unwrap_or_else(|| panic!("`{}` has no body", func.name));
        let clif_entry = self.blocks[&entry];
        self.builder
            .append_block_params_for_function_params(clif_entry);
        let params = self.builder.block_params(clif_entry).to_vec();
        for (value, param) in func.params().iter().zip(params) {
            self.values.insert(*value, vec![param]);
        }

        for &block in func.layout() {
            self.builder.switch_to_block(self.blocks[&block]);
            for &inst in func.block_insts(block) {
                self.translate_inst(inst);
            }
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    // -- Operands -----------------------------------------------------------

    fn operand(&mut self, value: ir::Value) -> Vec<clif::Value> {
        let func = self.func;
        let data = func.value(value);
        match &data.def {
            ValueDef::Param(_) | ValueDef::Result(_) => self
                .values
                .get(&value)
                .cloned()
                .unwrap_or_else(|| panic!("value {value:?} used before its definition")),
            ValueDef::IntConst(n) => {
                let ty = clif_scalar_type(&data.ty, self.pointer_type);
                vec![self.builder.ins().iconst(ty, *n)]
            }
            ValueDef::FloatConst(x) => match data.ty {
                IrType::F32 => vec![self.builder.ins().f32const(*x as f32)],
                _ => vec![self.builder.ins().f64const(*x)],
            },
            ValueDef::Undef => {
                let leaves = flatten(&data.ty, self.target);
                leaves
                    .into_iter()
                    .map(|(_, ty)| self.zero(&ty))
                    .collect()
            }
            ValueDef::FuncAddr(fref) => {
                let clif_ref = self.func_ref(*fref);
                vec![self.builder.ins().func_addr(self.pointer_type, clif_ref)]
            }
        }
    }

    fn scalar(&mut self, value: ir::Value) -> clif::Value {
        match self.operand(value).as_slice() {
            [single] => *single,
            other => panic!("expected a scalar, found {} values", other.len()),
        }
    }

    fn zero(&mut self, ty: &IrType) -> clif::Value {
        match ty {
            IrType::F32 => self.builder.ins().f32const(0.0),
            IrType::F64 => self.builder.ins().f64const(0.0),
            other => {
                let clif_ty = clif_scalar_type(other, self.pointer_type);
                self.builder.ins().iconst(clif_ty, 0)
            }
        }
    }

    fn func_ref(&mut self, fref: ir::FuncRef) -> clif::FuncRef {
        if let Some(&existing) = self.func_refs.get(&fref) {
            return existing;
        }
        let id = self.func_ids[fref.index()];
        let clif_ref = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(fref, clif_ref);
        clif_ref
    }

    fn sig_ref(&mut self, sig: &Signature) -> clif::SigRef {
        if let Some(&existing) = self.sig_refs.get(sig) {
            return existing;
        }
        let clif_sig = clif_signature(&*self.module, sig);
        let sig_ref = self.builder.import_signature(clif_sig);
        self.sig_refs.insert(sig.clone(), sig_ref);
        sig_ref
    }

    fn mem_flags(ty: &IrType, align: u64, target: &TargetInfo) -> MemFlags {
        let mut flags = MemFlags::new();
        flags.set_notrap();
        if align >= ty.align(target) {
            flags.set_aligned();
        }
        flags
    }

    fn define(&mut self, inst: ir::Inst, values: Vec<clif::Value>) {
        if let Some(result) = self.func.inst_result(inst) {
            self.values.insert(result, values);
        }
    }

    // -- Instructions -------------------------------------------------------

    fn translate_inst(&mut self, inst: ir::Inst) {
        let func = self.func;
        let kind = &func.inst(inst).kind;
        match kind {
            InstKind::AllocaPoint => {}
            InstKind::Alloca { ty, align } => {
                let size = u32::try_from(ty.size(self.target).max(1))
                    .unwrap_or_else(|_| panic!("stack slot of {ty} is too large"));
                let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
                    StackSlotKind::ExplicitSlot,
                    size,
                    align.trailing_zeros() as u8,
                ));
                let addr = self.builder.ins().stack_addr(self.pointer_type, slot, 0);
                self.define(inst, vec![addr]);
            }
            InstKind::Load { ptr, align } => {
                let ty = self
                    .func
                    .inst_result(inst)
                    .map(|v| self.func.value_type(v).clone())
                    .unwrap_or(IrType::Void);
                let base = self.scalar(*ptr);
                let mut loaded = Vec::new();
                for (offset, leaf) in flatten(&ty, self.target) {
                    let clif_ty = clif_scalar_type(&leaf, self.pointer_type);
                    let flags = Self::mem_flags(&leaf, *align, self.target);
                    loaded.push(self.builder.ins().load(clif_ty, flags, base, offset as i32));
                }
                self.define(inst, loaded);
            }
            InstKind::Store { value, ptr, align } => {
                let ty = self.func.value_type(*value).clone();
                let parts = self.operand(*value);
                let base = self.scalar(*ptr);
                for ((offset, leaf), part) in flatten(&ty, self.target).into_iter().zip(parts) {
                    let flags = Self::mem_flags(&leaf, *align, self.target);
                    self.builder.ins().store(flags, part, base, offset as i32);
                }
            }
            InstKind::FieldAddr {
                base,
                aggregate,
                index,
            } => {
                let base = self.scalar(*base);
                let offset = aggregate.field_offset(*index, self.target);
                let addr = if offset == 0 {
                    base
                } else {
                    self.builder.ins().iadd_imm(base, offset as i64)
                };
                self.define(inst, vec![addr]);
            }
            InstKind::MemCopy {
                dst,
                src,
                size,
                align,
            } => {
                let dst = self.scalar(*dst);
                let src = self.scalar(*src);
                let align = (*align).min(u64::from(u8::MAX)) as u8;
                let config = self.module.target_config();
                self.builder.emit_small_memory_copy(
                    config,
                    dst,
                    src,
                    *size,
                    align,
                    align,
                    true,
                    MemFlags::new(),
                );
            }
            InstKind::Unary { op, arg } => {
                let is_bool = self.func.value_type(*arg) == &IrType::I1;
                let arg = self.scalar(*arg);
                let result = match op {
                    UnaryOp::Neg => self.builder.ins().ineg(arg),
                    UnaryOp::FNeg => self.builder.ins().fneg(arg),
                    UnaryOp::Not if is_bool => self.builder.ins().bxor_imm(arg, 1),
                    UnaryOp::Not => self.builder.ins().bnot(arg),
                };
                self.define(inst, vec![result]);
            }
            InstKind::Binary { op, lhs, rhs } => {
                let lhs = self.scalar(*lhs);
                let rhs = self.scalar(*rhs);
                let ins = self.builder.ins();
                let result = match op {
                    BinaryOp::Add => ins.iadd(lhs, rhs),
                    BinaryOp::Sub => ins.isub(lhs, rhs),
                    BinaryOp::Mul => ins.imul(lhs, rhs),
                    BinaryOp::SDiv | BinaryOp::SDivExact => ins.sdiv(lhs, rhs),
                    BinaryOp::UDiv | BinaryOp::UDivExact => ins.udiv(lhs, rhs),
                    BinaryOp::SRem => ins.srem(lhs, rhs),
                    BinaryOp::URem => ins.urem(lhs, rhs),
                    BinaryOp::And => ins.band(lhs, rhs),
                    BinaryOp::Or => ins.bor(lhs, rhs),
                    BinaryOp::Xor => ins.bxor(lhs, rhs),
                    BinaryOp::FAdd => ins.fadd(lhs, rhs),
                    BinaryOp::FSub => ins.fsub(lhs, rhs),
                    BinaryOp::FMul => ins.fmul(lhs, rhs),
                    BinaryOp::FDiv => ins.fdiv(lhs, rhs),
                };
                self.define(inst, vec![result]);
            }
            InstKind::IntCompare { pred, lhs, rhs } => {
                let lhs = self.scalar(*lhs);
                let rhs = self.scalar(*rhs);
                let result = self.builder.ins().icmp(int_cc(*pred), lhs, rhs);
                self.define(inst, vec![result]);
            }
            InstKind::FloatCompare { pred, lhs, rhs } => {
                let lhs = self.scalar(*lhs);
                let rhs = self.scalar(*rhs);
                let result = self.builder.ins().fcmp(float_cc(*pred), lhs, rhs);
                self.define(inst, vec![result]);
            }
            InstKind::ExtractValue { aggregate, index } => {
                let ty = self.func.value_type(*aggregate).clone();
                let parts = self.operand(*aggregate);
                let fields = ty.struct_fields();
                let start: usize = fields[..*index].iter().map(flat_len).sum();
                let len = flat_len(&fields[*index]);
                self.define(inst, parts[start..start + len].to_vec());
            }
            InstKind::InsertValue {
                aggregate,
                value,
                index,
            } => {
                let ty = self.func.value_type(*aggregate).clone();
                let mut parts = self.operand(*aggregate);
                let replacement = self.operand(*value);
                let fields = ty.struct_fields();
                let start: usize = fields[..*index].iter().map(flat_len).sum();
                let len = flat_len(&fields[*index]);
                parts.splice(start..start + len, replacement);
                self.define(inst, parts);
            }
            InstKind::Call {
                callee, sig, args, ..
            } => {
                let callee = self.scalar(*callee);
                let mut clif_args = Vec::with_capacity(args.len());
                for arg in args {
                    clif_args.extend(self.operand(*arg));
                }
                let sig_ref = self.sig_ref(sig);
                let call = self.builder.ins().call_indirect(sig_ref, callee, &clif_args);
                let results = self.builder.inst_results(call).to_vec();
                self.define(inst, results);
            }
            InstKind::Br { dest } => {
                let dest = self.blocks[dest];
                self.builder.ins().jump(dest, &[]);
            }
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                let cond = self.scalar(*cond);
                let then_dest = self.blocks[then_dest];
                let else_dest = self.blocks[else_dest];
                self.builder
                    .ins()
                    .brif(cond, then_dest, &[], else_dest, &[]);
            }
            InstKind::Ret { value } => {
                let values = match value {
                    Some(v) => self.operand(*v),
                    None => Vec::new(),
                };
                self.builder.ins().return_(&values);
            }
            InstKind::Unreachable => {
                self.builder.ins().trap(TrapCode::unwrap_user(1));
            }
        }
    }
}

fn int_cc(pred: IntPredicate) -> IntCC {
    match pred {
        IntPredicate::Eq => IntCC::Equal,
        IntPredicate::Ne => IntCC::NotEqual,
        IntPredicate::Slt => IntCC::SignedLessThan,
        IntPredicate::Sle => IntCC::SignedLessThanOrEqual,
        IntPredicate::Sgt => IntCC::SignedGreaterThan,
        IntPredicate::Sge => IntCC::SignedGreaterThanOrEqual,
        IntPredicate::Ult => IntCC::UnsignedLessThan,
        IntPredicate::Ule => IntCC::UnsignedLessThanOrEqual,
        IntPredicate::Ugt => IntCC::UnsignedGreaterThan,
        IntPredicate::Uge => IntCC::UnsignedGreaterThanOrEqual,
    }
}

fn float_cc(pred: FloatPredicate) -> FloatCC {
    match pred {
        FloatPredicate::Oeq => FloatCC::Equal,
        FloatPredicate::Ogt => FloatCC::GreaterThan,
        FloatPredicate::Oge => FloatCC::GreaterThanOrEqual,
        FloatPredicate::Olt => FloatCC::LessThan,
        FloatPredicate::Ole => FloatCC::LessThanOrEqual,
        FloatPredicate::One => FloatCC::OrderedNotEqual,
        FloatPredicate::Ord => FloatCC::Ordered,
        FloatPredicate::Ueq => FloatCC::UnorderedOrEqual,
        FloatPredicate::Ugt => FloatCC::UnorderedOrGreaterThan,
        FloatPredicate::Uge => FloatCC::UnorderedOrGreaterThanOrEqual,
        FloatPredicate::Ult => FloatCC::UnorderedOrLessThan,
        FloatPredicate::Ule => FloatCC::UnorderedOrLessThanOrEqual,
        FloatPredicate::Une => FloatCC::NotEqual,
        FloatPredicate::Uno => FloatCC::Unordered,
    }
}
