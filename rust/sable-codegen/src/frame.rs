//! Function prologue and epilogue.
//!
//! The prologue creates the entry block, the alloca insertion marker and the
//! (not yet inserted) return block, then binds the result slot and every
//! formal parameter. The epilogue reconciles the return block with the
//! control flow the body actually produced and emits the `ret`.

use std::collections::HashMap;
use std::rc::Rc;

use sable_core::ast::{FuncDecl, LocalId};
use sable_core::types::TypeTable;
use tracing::trace;

use crate::ir::{Block, Function, Inst, InstKind, IrBuilder, IrType, Value};
use crate::layout::{Address, Explosion, TypeLayout, TypeLayoutCatalog, ValueSchema};

/// A named stack location and the layout of the value it holds.
#[derive(Debug, Clone)]
pub struct Local {
    pub addr: Address,
    pub layout: Rc<TypeLayout>,
}

#[derive(Debug)]
pub struct FunctionFrame {
    pub entry: Block,
    alloca_point: Inst,
    pub return_block: Block,
    /// Where `return` stores its value; `None` for an empty result.
    pub result_slot: Option<Address>,
    pub result_layout: Rc<TypeLayout>,
    locals: HashMap<LocalId, Local>,
}

impl FunctionFrame {
    pub fn alloca_point(&self) -> Inst {
        self.alloca_point
    }

    pub fn local(&self, id: LocalId) -> &Local {
        self.locals
            .get(&id)
            .unwrap_or_else(|| panic!("reference to unbound local {id:?}"))
    }

    pub fn bind(&mut self, id: LocalId, local: Local) {
        assert!(
            !self.locals.contains_key(&id),
            "local {id:?} bound twice"
        );
        self.locals.insert(id, local);
    }

    /// Allocate a stack slot in the entry block.
    pub fn create_alloca(&self, b: &mut IrBuilder, ty: IrType, align: u64, name: &str) -> Address {
        let ptr = b.build_alloca(self.alloca_point, ty, align, name);
        Address::new(ptr, align)
    }

    // -----------------------------------------------------------------------
    // Prologue
    // -----------------------------------------------------------------------

    pub fn emit_prologue(
        b: &mut IrBuilder,
        catalog: &mut TypeLayoutCatalog,
        types: &TypeTable,
        decl: &FuncDecl,
    ) -> Self {
        assert!(
            b.func().layout().is_empty(),
            "prologue already emitted for `{}`",
            decl.name
        );
        let entry = b.create_block("entry");
        b.append_block(entry);
        b.position_at_end(entry);
        let alloca_point = b.build_alloca_point();
        let return_block = b.create_block("return");

        let (_, result) = types
            .as_function(decl.ty)
            .unwrap_or_else(|| panic!("emitting `{}` without a function type", decl.name));
        let mut incoming = IncomingParams::new(b.func());

        let result_layout = catalog.layout(types, result);
        let result_slot = match &result_layout.schema {
            ValueSchema::Aggregate { .. } => {
                Some(Address::new(incoming.next(), result_layout.align))
            }
            ValueSchema::Scalars(scalars) if scalars.is_empty() => None,
            ValueSchema::Scalars(_) => {
                let ptr = b.build_alloca(
                    alloca_point,
                    result_layout.storage.clone(),
                    result_layout.align,
                    "return_value",
                );
                Some(Address::new(ptr, result_layout.align))
            }
        };

        let mut frame = Self {
            entry,
            alloca_point,
            return_block,
            result_slot,
            result_layout,
            locals: HashMap::new(),
        };

        for param in &decl.params {
            let layout = catalog.layout(types, param.ty);
            let addr = match &layout.schema {
                ValueSchema::Aggregate { .. } => Address::new(incoming.next(), layout.align),
                ValueSchema::Scalars(scalars) => {
                    let addr =
                        frame.create_alloca(b, layout.storage.clone(), layout.align, &param.name);
                    let mut values = Explosion::new();
                    for ty in scalars {
                        let value = incoming.next();
                        assert_eq!(
                            b.value_type(value),
                            ty,
                            "parameter `{}` does not match the signature",
                            param.name
                        );
                        values.add(value);
                    }
                    layout.store_explosion(b, &mut values, addr);
                    values.finish();
                    addr
                }
            };
            frame.bind(param.id, Local { addr, layout });
        }

        incoming.finish();
        frame
    }

    // -----------------------------------------------------------------------
    // Epilogue
    // -----------------------------------------------------------------------

    /// Finish the function. Consumes the frame and the builder.
    pub fn emit_epilogue(self, mut b: IrBuilder) -> Function {
        b.func_mut().remove_inst(self.alloca_point);

        let ret_block = self.return_block;
        let uses = b.func().pred_count(ret_block);
        if uses == 0 {
            trace!("return block unused");
            b.func_mut().remove_block(ret_block);
            if !b.has_valid_position() {
                return b.finish();
            }
        } else if b.has_valid_position() {
            trace!("falling through into the return block");
            b.build_br(ret_block);
            b.append_block(ret_block);
            b.position_at_end(ret_block);
        } else if uses == 1 {
            let br = b.func().preds(ret_block)[0];
            let data = b.func().inst(br);
            assert!(
                matches!(data.kind, InstKind::Br { .. }),
                "return edges are always unconditional branches"
            );
            let source = data
                .block
                .unwrap_or_else(|| unreachable!("live predecessor outside any block"));
            trace!("merging the return block into its only predecessor");
            b.func_mut().remove_inst(br);
            b.func_mut().remove_block(ret_block);
            b.position_at_end(source);
        } else {
            trace!(predecessors = uses, "returning through the return block");
            b.append_block(ret_block);
            b.position_at_end(ret_block);
        }

        match &self.result_layout.schema {
            ValueSchema::Aggregate { .. } => {
                assert!(
                    self.result_slot.map(|slot| slot.ptr) == b.func().params().first().copied(),
                    "aggregate results are returned through the first parameter"
                );
                b.build_ret(None);
            }
            ValueSchema::Scalars(scalars) if scalars.is_empty() => {
                assert!(self.result_slot.is_none());
                b.build_ret(None);
            }
            ValueSchema::Scalars(_) => {
                let slot = self
                    .result_slot
                    .unwrap_or_else(|| unreachable!("scalar results always have a slot"));
                let value = self.result_layout.load(&mut b, slot);
                match value.scalars() {
                    [single] => b.build_ret(Some(*single)),
                    many => {
                        let ret_ty = b.func().sig.ret.clone();
                        let mut result = b.undef(ret_ty);
                        for (index, scalar) in many.iter().enumerate() {
                            result = b.build_insert_value(result, *scalar, index);
                        }
                        b.build_ret(Some(result));
                    }
                }
            }
        }
        b.finish()
    }
}

/// Cursor over a function's incoming parameters, in signature order.
struct IncomingParams {
    values: Vec<Value>,
    next: usize,
}

impl IncomingParams {
    fn new(func: &Function) -> Self {
        Self {
            values: func.params().to_vec(),
            next: 0,
        }
    }

    fn next(&mut self) -> Value {
        let value = *self
            .values
            .get(self.next)
            .unwrap_or_else(|| panic!("ran out of incoming parameters"));
        self.next += 1;
        value
    }

    fn finish(&self) {
        assert_eq!(
            self.next,
            self.values.len(),
            "didn't exhaust all parameters"
        );
    }
}
