//! IR functions: value, instruction and block arenas plus the block layout.
//!
//! Blocks keep an explicit predecessor list (the branch instructions that
//! target them). Every structural edit goes through [`Function`] so that the
//! lists stay consistent with the branches actually present in the body.

use std::fmt;
use std::rc::Rc;

use super::types::IrType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(pub(crate) u32);

/// Index of a function declaration within a [`super::Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(pub(crate) u32);

impl Value {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Block {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Inst {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FuncRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamAttr {
    /// Caller-allocated output slot holding a value of the given type.
    StructReturn(IrType),
    NoAlias,
}

impl fmt::Display for ParamAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamAttr::StructReturn(ty) => write!(f, "sret({ty})"),
            ParamAttr::NoAlias => write!(f, "noalias"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SigParam {
    pub ty: IrType,
    pub attrs: Vec<ParamAttr>,
}

impl SigParam {
    pub fn new(ty: IrType) -> Self {
        Self {
            ty,
            attrs: Vec::new(),
        }
    }

    pub fn is_struct_return(&self) -> bool {
        self.attrs
            .iter()
            .any(|a| matches!(a, ParamAttr::StructReturn(_)))
    }
}

/// A concrete low-level call signature. Never variadic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<SigParam>,
    pub ret: IrType,
    /// The last parameter is the closure context pointer.
    pub has_context: bool,
}

impl Signature {
    pub fn param_types(&self) -> impl Iterator<Item = &IrType> {
        self.params.iter().map(|p| &p.ty)
    }

    pub fn has_struct_return(&self) -> bool {
        self.params.first().is_some_and(SigParam::is_struct_return)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.ty)?;
            for attr in &param.attrs {
                write!(f, " {attr}")?;
            }
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Values and instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ValueDef {
    Param(usize),
    Result(Inst),
    IntConst(i64),
    FloatConst(f64),
    Undef,
    FuncAddr(FuncRef),
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub def: ValueDef,
    pub ty: IrType,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    FNeg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SDivExact,
    UDiv,
    UDivExact,
    SRem,
    URem,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ord,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
    Uno,
}

#[derive(Debug, Clone)]
pub enum InstKind {
    /// Placeholder marking where entry-block allocas are inserted.
    AllocaPoint,
    Alloca {
        ty: IrType,
        align: u64,
    },
    Load {
        ptr: Value,
        align: u64,
    },
    Store {
        value: Value,
        ptr: Value,
        align: u64,
    },
    /// Address of field `index` of an `aggregate`-typed object at `base`.
    FieldAddr {
        base: Value,
        aggregate: IrType,
        index: usize,
    },
    MemCopy {
        dst: Value,
        src: Value,
        size: u64,
        align: u64,
    },
    Unary {
        op: UnaryOp,
        arg: Value,
    },
    Binary {
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    },
    IntCompare {
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },
    FloatCompare {
        pred: FloatPredicate,
        lhs: Value,
        rhs: Value,
    },
    ExtractValue {
        aggregate: Value,
        index: usize,
    },
    InsertValue {
        aggregate: Value,
        value: Value,
        index: usize,
    },
    /// Call through `callee` reinterpreted as a pointer to `sig`.
    Call {
        callee: Value,
        sig: Rc<Signature>,
        args: Vec<Value>,
        /// Call-site attributes by argument index.
        attrs: Vec<(usize, ParamAttr)>,
    },
    Br {
        dest: Block,
    },
    CondBr {
        cond: Value,
        then_dest: Block,
        else_dest: Block,
    },
    Ret {
        value: Option<Value>,
    },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }

    /// Blocks this instruction may transfer control to.
    pub fn successors(&self) -> Vec<Block> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    /// `None` once the instruction has been removed.
    pub block: Option<Block>,
    pub result: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct BlockData {
    pub name: String,
    pub insts: Vec<Inst>,
    /// Branch instructions targeting this block, one entry per edge.
    pub preds: Vec<Inst>,
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Export,
    Local,
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub sig: Rc<Signature>,
    pub linkage: Linkage,
    params: Vec<Value>,
    values: Vec<ValueData>,
    insts: Vec<InstData>,
    blocks: Vec<BlockData>,
    layout: Vec<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>, sig: Rc<Signature>, linkage: Linkage) -> Self {
        let mut func = Self {
            name: name.into(),
            sig: sig.clone(),
            linkage,
            params: Vec::new(),
            values: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
        };
        for (i, param) in sig.params.iter().enumerate() {
            let v = func.make_value(ValueDef::Param(i), param.ty.clone(), None);
            func.params.push(v);
        }
        func
    }

    /// A function with no blocks is only a declaration.
    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    // -- Values -------------------------------------------------------------

    pub(crate) fn make_value(&mut self, def: ValueDef, ty: IrType, name: Option<String>) -> Value {
        let v = Value(self.values.len() as u32);
        self.values.push(ValueData { def, ty, name });
        v
    }

    pub fn value(&self, v: Value) -> &ValueData {
        &self.values[v.index()]
    }

    pub fn value_type(&self, v: Value) -> &IrType {
        &self.values[v.index()].ty
    }

    pub fn set_value_name(&mut self, v: Value, name: impl Into<String>) {
        self.values[v.index()].name = Some(name.into());
    }

    pub fn is_undef(&self, v: Value) -> bool {
        matches!(self.values[v.index()].def, ValueDef::Undef)
    }

    // -- Blocks -------------------------------------------------------------

    /// Create a block that is not yet part of the layout.
    pub fn create_block(&mut self, name: impl Into<String>) -> Block {
        let b = Block(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name: name.into(),
            insts: Vec::new(),
            preds: Vec::new(),
            inserted: false,
        });
        b
    }

    pub fn append_block(&mut self, b: Block) {
        let data = &mut self.blocks[b.index()];
        assert!(!data.inserted, "block `{}` inserted twice", data.name);
        data.inserted = true;
        self.layout.push(b);
    }

    pub fn block(&self, b: Block) -> &BlockData {
        &self.blocks[b.index()]
    }

    pub fn is_inserted(&self, b: Block) -> bool {
        self.blocks[b.index()].inserted
    }

    /// Blocks in layout order.
    pub fn layout(&self) -> &[Block] {
        &self.layout
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.layout.first().copied()
    }

    pub fn block_insts(&self, b: Block) -> &[Inst] {
        &self.blocks[b.index()].insts
    }

    pub fn preds(&self, b: Block) -> &[Inst] {
        &self.blocks[b.index()].preds
    }

    pub fn pred_count(&self, b: Block) -> usize {
        self.blocks[b.index()].preds.len()
    }

    pub fn terminator(&self, b: Block) -> Option<Inst> {
        let last = *self.blocks[b.index()].insts.last()?;
        self.insts[last.index()].kind.is_terminator().then_some(last)
    }

    /// Remove an unreferenced block and every instruction in it.
    pub fn remove_block(&mut self, b: Block) {
        assert!(
            self.blocks[b.index()].preds.is_empty(),
            "cannot remove block `{}` while it has predecessors",
            self.blocks[b.index()].name
        );
        let insts = std::mem::take(&mut self.blocks[b.index()].insts);
        for inst in insts {
            self.detach_edges(inst);
            self.insts[inst.index()].block = None;
        }
        if self.blocks[b.index()].inserted {
            self.layout.retain(|&x| x != b);
            self.blocks[b.index()].inserted = false;
        }
    }

    // -- Instructions -------------------------------------------------------

    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst.index()]
    }

    pub fn inst_result(&self, inst: Inst) -> Option<Value> {
        self.insts[inst.index()].result
    }

    fn new_inst(&mut self, block: Block, kind: InstKind, result_ty: IrType) -> (Inst, Option<Value>) {
        let inst = Inst(self.insts.len() as u32);
        let successors = kind.successors();
        self.insts.push(InstData {
            kind,
            block: Some(block),
            result: None,
        });
        let result = if result_ty.is_void() {
            None
        } else {
            Some(self.make_value(ValueDef::Result(inst), result_ty, None))
        };
        self.insts[inst.index()].result = result;
        for succ in successors {
            self.blocks[succ.index()].preds.push(inst);
        }
        (inst, result)
    }

    /// Append an instruction at the end of `block`.
    pub(crate) fn push_inst(&mut self, block: Block, kind: InstKind, result_ty: IrType) -> (Inst, Option<Value>) {
        if let Some(term) = self.terminator(block) {
            panic!(
                "appending to block `{}` after its terminator {:?}",
                self.blocks[block.index()].name,
                self.insts[term.index()].kind
            );
        }
        let (inst, result) = self.new_inst(block, kind, result_ty);
        self.blocks[block.index()].insts.push(inst);
        (inst, result)
    }

    /// Insert an instruction immediately before `before`.
    pub(crate) fn insert_inst_before(
        &mut self,
        before: Inst,
        kind: InstKind,
        result_ty: IrType,
    ) -> (Inst, Option<Value>) {
        let block = self.insts[before.index()]
            .block
            .expect("insertion anchor has been removed");
        let (inst, result) = self.new_inst(block, kind, result_ty);
        let list = &mut self.blocks[block.index()].insts;
        let pos = list
            .iter()
            .position(|&i| i == before)
            .expect("insertion anchor is not in its block");
        list.insert(pos, inst);
        (inst, result)
    }

    /// Remove an instruction from its block, dropping any CFG edges it created.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.insts[inst.index()]
            .block
            .expect("instruction removed twice");
        self.blocks[block.index()].insts.retain(|&i| i != inst);
        self.detach_edges(inst);
        self.insts[inst.index()].block = None;
    }

    fn detach_edges(&mut self, inst: Inst) {
        for succ in self.insts[inst.index()].kind.successors() {
            let preds = &mut self.blocks[succ.index()].preds;
            if let Some(pos) = preds.iter().position(|&p| p == inst) {
                preds.remove(pos);
            }
        }
    }

    /// Live instructions in layout order.
    pub fn iter_insts(&self) -> impl Iterator<Item = (Block, Inst, &InstData)> + '_ {
        self.layout.iter().flat_map(move |&b| {
            self.blocks[b.index()]
                .insts
                .iter()
                .map(move |&i| (b, i, &self.insts[i.index()]))
        })
    }

    /// Number of live instructions satisfying `pred`.
    pub fn count_insts(&self, pred: impl Fn(&InstKind) -> bool) -> usize {
        self.iter_insts().filter(|(_, _, data)| pred(&data.kind)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn void_fn() -> Function {
        let sig = Rc::new(Signature {
            params: vec![SigParam::new(IrType::I64)],
            ret: IrType::Void,
            has_context: false,
        });
        Function::new("f", sig, Linkage::Local)
    }

    #[test]
    fn params_are_values() {
        let func = void_fn();
        assert_eq!(func.params().len(), 1);
        assert_eq!(func.value_type(func.params()[0]), &IrType::I64);
        assert!(func.is_declaration());
    }

    #[test]
    fn branches_maintain_predecessors() {
        let mut func = void_fn();
        let entry = func.create_block("entry");
        let exit = func.create_block("exit");
        func.append_block(entry);
        func.append_block(exit);

        let (br, _) = func.push_inst(entry, InstKind::Br { dest: exit }, IrType::Void);
        assert_eq!(func.preds(exit), &[br]);
        assert_eq!(func.terminator(entry), Some(br));

        func.remove_inst(br);
        assert_eq!(func.pred_count(exit), 0);
        assert_eq!(func.terminator(entry), None);
    }

    #[test]
    fn removing_a_block_drops_its_outgoing_edges() {
        let mut func = void_fn();
        let entry = func.create_block("entry");
        let dead = func.create_block("dead");
        let exit = func.create_block("exit");
        func.append_block(entry);
        func.append_block(dead);
        func.append_block(exit);
        func.push_inst(dead, InstKind::Br { dest: exit }, IrType::Void);
        assert_eq!(func.pred_count(exit), 1);

        func.remove_block(dead);
        assert_eq!(func.pred_count(exit), 0);
        assert_eq!(func.layout(), &[entry, exit]);
    }

    #[test]
    #[should_panic(expected = "while it has predecessors")]
    fn cannot_remove_reachable_block() {
        let mut func = void_fn();
        let entry = func.create_block("entry");
        let exit = func.create_block("exit");
        func.append_block(entry);
        func.append_block(exit);
        func.push_inst(entry, InstKind::Br { dest: exit }, IrType::Void);
        func.remove_block(exit);
    }

    #[test]
    fn insert_before_keeps_order() {
        let mut func = void_fn();
        let entry = func.create_block("entry");
        func.append_block(entry);
        let (marker, _) = func.push_inst(entry, InstKind::AllocaPoint, IrType::Void);
        let (slot, _) = func.insert_inst_before(
            marker,
            InstKind::Alloca {
                ty: IrType::I64,
                align: 8,
            },
            IrType::Ptr,
        );
        assert_eq!(func.block_insts(entry), &[slot, marker]);
    }

    #[test]
    fn signature_display() {
        let sig = Signature {
            params: vec![
                SigParam {
                    ty: IrType::Ptr,
                    attrs: vec![
                        ParamAttr::StructReturn(IrType::Struct(vec![IrType::I64, IrType::I64])),
                        ParamAttr::NoAlias,
                    ],
                },
                SigParam::new(IrType::I64),
            ],
            ret: IrType::Void,
            has_context: false,
        };
        assert!(sig.has_struct_return());
        assert_eq!(sig.to_string(), "void (ptr sret({ i64, i64 }) noalias, i64)");
    }
}
