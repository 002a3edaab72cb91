//! Function values: the two-word `(code, context)` closure representation.
//!
//! Every function-typed value is a code pointer followed by a context
//! pointer. Top-level functions capture nothing and carry an `undef` context,
//! which lets call sites drop the context argument entirely.

use std::rc::Rc;

use once_cell::unsync::OnceCell;
use sable_core::ast::{DeclContext, DeclId};
use sable_core::diagnostics::Diagnostic;
use sable_core::types::TypeId;
use tracing::trace;

use crate::function::FunctionEmitter;
use crate::ir::{IrBuilder, IrType, Signature};
use crate::layout::{align_at_offset, Address, Explosion};

#[derive(Debug)]
pub struct ClosureLayout {
    pub input: TypeId,
    pub result: TypeId,
    pointer_size: u64,
    with_context: OnceCell<Rc<Signature>>,
    without_context: OnceCell<Rc<Signature>>,
}

impl ClosureLayout {
    pub fn new(input: TypeId, result: TypeId, pointer_size: u64) -> Self {
        Self {
            input,
            result,
            pointer_size,
            with_context: OnceCell::new(),
            without_context: OnceCell::new(),
        }
    }

    /// Storage of every closure: `{ ptr, ptr }`.
    pub fn storage() -> IrType {
        IrType::Struct(vec![IrType::Ptr, IrType::Ptr])
    }

    /// The cache slot for the signature variant selected by `needs_context`.
    pub(crate) fn signature_slot(&self, needs_context: bool) -> &OnceCell<Rc<Signature>> {
        if needs_context {
            &self.with_context
        } else {
            &self.without_context
        }
    }

    pub fn cached_signature(&self, needs_context: bool) -> Option<Rc<Signature>> {
        self.signature_slot(needs_context).get().cloned()
    }

    fn context_address(&self, b: &mut IrBuilder, addr: Address) -> Address {
        let ptr = b.build_field_addr(addr.ptr, &Self::storage(), 1);
        Address::new(ptr, align_at_offset(addr.align, self.pointer_size))
    }

    /// Load `(code, context)` from `addr` into `out`.
    pub fn load(&self, b: &mut IrBuilder, addr: Address, out: &mut Explosion) {
        let code = b.build_load(IrType::Ptr, addr.ptr, addr.align);
        let context_addr = self.context_address(b, addr);
        let context = b.build_load(IrType::Ptr, context_addr.ptr, context_addr.align);
        out.add(code);
        out.add(context);
    }

    /// Claim `(code, context)` from `src` and store them at `addr`.
    pub fn store(&self, b: &mut IrBuilder, src: &mut Explosion, addr: Address) {
        let code = src.claim_next();
        b.build_store(code, addr.ptr, addr.align);
        let context = src.claim_next();
        let context_addr = self.context_address(b, addr);
        b.build_store(context, context_addr.ptr, context_addr.align);
    }
}

// ---------------------------------------------------------------------------
// Function references
// ---------------------------------------------------------------------------

impl FunctionEmitter<'_, '_> {
    /// Explode a reference to the declaration `decl` into `(code, context)`.
    pub fn emit_exploded_function_ref(&mut self, decl: DeclId, out: &mut Explosion) {
        let func = self.source().decl(decl);
        match func.context {
            DeclContext::Module => {
                let fref = self.module.addr_of_global_function(decl);
                let code = self.builder.func_addr(fref);
                let context = self.builder.undef(IrType::Ptr);
                out.add(code);
                out.add(context);
            }
            DeclContext::Local { .. } => {
                let diag = Diagnostic::unimplemented(func.span, "local function emission");
                self.emit_placeholder_closure(diag, out);
            }
            DeclContext::Builtin => {
                let diag = Diagnostic::unimplemented(func.span, "builtin function used as a value")
                    .with_note(format!("`{}` can only be called directly", func.name));
                self.emit_placeholder_closure(diag, out);
            }
        }
    }

    /// Report `diag` and stand in an all-undef closure so emission can continue.
    fn emit_placeholder_closure(&mut self, diag: Diagnostic, out: &mut Explosion) {
        trace!(message = %diag.message, "emitting placeholder closure");
        self.module.report(diag);
        let undef = self.builder.undef(IrType::Ptr);
        out.add(undef);
        out.add(undef);
    }
}
