//! Instruction builder with an explicit insertion point.
//!
//! Emitting a terminator clears the insertion point; code emitted afterwards
//! would be unreachable, so callers check [`IrBuilder::has_valid_position`]
//! before lowering further statements.

use std::rc::Rc;

use super::function::{
    BinaryOp, Block, FloatPredicate, FuncRef, Function, Inst, InstKind, IntPredicate, ParamAttr,
    Signature, UnaryOp, Value, ValueDef,
};
use super::types::IrType;

pub struct IrBuilder {
    func: Function,
    position: Option<Block>,
}

impl IrBuilder {
    pub fn new(func: Function) -> Self {
        Self {
            func,
            position: None,
        }
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        &mut self.func
    }

    pub fn finish(self) -> Function {
        self.func
    }

    // -- Positioning --------------------------------------------------------

    pub fn create_block(&mut self, name: &str) -> Block {
        self.func.create_block(name)
    }

    pub fn append_block(&mut self, block: Block) {
        self.func.append_block(block);
    }

    pub fn position_at_end(&mut self, block: Block) {
        assert!(
            self.func.is_inserted(block),
            "cannot position in block `{}` before it is inserted",
            self.func.block(block).name
        );
        self.position = Some(block);
    }

    pub fn clear_position(&mut self) {
        self.position = None;
    }

    pub fn has_valid_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn current_block(&self) -> Option<Block> {
        self.position
    }

    fn emit(&mut self, kind: InstKind, result_ty: IrType) -> (Inst, Option<Value>) {
        let block = self
            .position
            .unwrap_or_else(|| panic!("no insertion point for {kind:?}"));
        let terminates = kind.is_terminator();
        let emitted = self.func.push_inst(block, kind, result_ty);
        if terminates {
            self.position = None;
        }
        emitted
    }

    fn emit_value(&mut self, kind: InstKind, result_ty: IrType) -> Value {
        match self.emit(kind, result_ty) {
            (_, Some(v)) => v,
            (_, None) => unreachable!("instruction produces no value"),
        }
    }

    // -- Constants ----------------------------------------------------------

    pub fn const_int(&mut self, ty: IrType, value: i64) -> Value {
        assert!(ty.is_int(), "integer constant of type {ty}");
        self.func.make_value(ValueDef::IntConst(value), ty, None)
    }

    pub fn const_float(&mut self, ty: IrType, value: f64) -> Value {
        assert!(ty.is_float(), "float constant of type {ty}");
        self.func.make_value(ValueDef::FloatConst(value), ty, None)
    }

    pub fn undef(&mut self, ty: IrType) -> Value {
        self.func.make_value(ValueDef::Undef, ty, None)
    }

    pub fn is_undef(&self, v: Value) -> bool {
        self.func.is_undef(v)
    }

    pub fn func_addr(&mut self, func: FuncRef) -> Value {
        self.func.make_value(ValueDef::FuncAddr(func), IrType::Ptr, None)
    }

    pub fn value_type(&self, v: Value) -> &IrType {
        self.func.value_type(v)
    }

    // -- Memory -------------------------------------------------------------

    /// Emit the entry-block marker that allocas are placed before.
    pub fn build_alloca_point(&mut self) -> Inst {
        self.emit(InstKind::AllocaPoint, IrType::Void).0
    }

    /// Allocate a stack slot in the entry block, just before `marker`.
    pub fn build_alloca(&mut self, marker: Inst, ty: IrType, align: u64, name: &str) -> Value {
        let (_, result) = self
            .func
            .insert_inst_before(marker, InstKind::Alloca { ty, align }, IrType::Ptr);
        let slot = result.unwrap_or_else(|| unreachable!("alloca produces a pointer"));
        self.func.set_value_name(slot, name);
        slot
    }

    pub fn build_load(&mut self, ty: IrType, ptr: Value, align: u64) -> Value {
        self.emit_value(InstKind::Load { ptr, align }, ty)
    }

    pub fn build_store(&mut self, value: Value, ptr: Value, align: u64) {
        self.emit(InstKind::Store { value, ptr, align }, IrType::Void);
    }

    pub fn build_field_addr(&mut self, base: Value, aggregate: &IrType, index: usize) -> Value {
        assert!(
            index < aggregate.struct_fields().len(),
            "field {index} out of range for {aggregate}"
        );
        self.emit_value(
            InstKind::FieldAddr {
                base,
                aggregate: aggregate.clone(),
                index,
            },
            IrType::Ptr,
        )
    }

    pub fn build_memcpy(&mut self, dst: Value, src: Value, size: u64, align: u64) {
        self.emit(
            InstKind::MemCopy {
                dst,
                src,
                size,
                align,
            },
            IrType::Void,
        );
    }

    // -- Arithmetic ---------------------------------------------------------

    pub fn build_unary(&mut self, op: UnaryOp, arg: Value) -> Value {
        let ty = self.func.value_type(arg).clone();
        self.emit_value(InstKind::Unary { op, arg }, ty)
    }

    pub fn build_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.func.value_type(lhs).clone();
        assert_eq!(
            &ty,
            self.func.value_type(rhs),
            "operand types of {op:?} differ"
        );
        self.emit_value(InstKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn build_icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Value {
        self.emit_value(InstKind::IntCompare { pred, lhs, rhs }, IrType::I1)
    }

    pub fn build_fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Value {
        self.emit_value(InstKind::FloatCompare { pred, lhs, rhs }, IrType::I1)
    }

    // -- Aggregates ---------------------------------------------------------

    pub fn build_extract_value(&mut self, aggregate: Value, index: usize) -> Value {
        let ty = self.func.value_type(aggregate).struct_fields()[index].clone();
        self.emit_value(InstKind::ExtractValue { aggregate, index }, ty)
    }

    pub fn build_insert_value(&mut self, aggregate: Value, value: Value, index: usize) -> Value {
        let ty = self.func.value_type(aggregate).clone();
        self.emit_value(
            InstKind::InsertValue {
                aggregate,
                value,
                index,
            },
            ty,
        )
    }

    // -- Calls --------------------------------------------------------------

    /// Call `callee` under `sig`. Returns `None` for void signatures.
    pub fn build_call(
        &mut self,
        callee: Value,
        sig: Rc<Signature>,
        args: Vec<Value>,
        attrs: Vec<(usize, ParamAttr)>,
    ) -> Option<Value> {
        assert_eq!(
            args.len(),
            sig.params.len(),
            "call passes {} arguments to `{sig}`",
            args.len()
        );
        for (i, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
            assert_eq!(
                self.func.value_type(*arg),
                &param.ty,
                "argument {i} does not match `{sig}`"
            );
        }
        let ret = sig.ret.clone();
        self.emit(
            InstKind::Call {
                callee,
                sig,
                args,
                attrs,
            },
            ret,
        )
        .1
    }

    // -- Terminators --------------------------------------------------------

    pub fn build_br(&mut self, dest: Block) {
        self.emit(InstKind::Br { dest }, IrType::Void);
    }

    pub fn build_cond_br(&mut self, cond: Value, then_dest: Block, else_dest: Block) {
        self.emit(
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            },
            IrType::Void,
        );
    }

    pub fn build_ret(&mut self, value: Option<Value>) {
        self.emit(InstKind::Ret { value }, IrType::Void);
    }

    pub fn build_unreachable(&mut self) {
        self.emit(InstKind::Unreachable, IrType::Void);
    }
}
