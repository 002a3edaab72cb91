//! Lowered call signatures for source function types.
//!
//! A function type `Input -> Result` lowers to one concrete signature per
//! context variant:
//!
//! * an aggregate result becomes a leading `sret noalias ptr` parameter and a
//!   `void` return; an empty scalar list returns `void`; one scalar is
//!   returned directly; several scalars are returned as a literal struct;
//! * a tuple input contributes each field separately (one level only), a
//!   non-tuple input is a single logical argument; aggregates pass one
//!   pointer, everything else passes its scalars;
//! * the context pointer, when present, is always the last parameter.

use std::rc::Rc;

use sable_core::types::{TypeId, TypeTable};
use tracing::trace;

use crate::ir::{IrType, ParamAttr, SigParam, Signature};
use crate::layout::{TypeLayoutCatalog, ValueSchema};

/// The logical arguments of a function with the given input type.
pub fn flattened_inputs(types: &TypeTable, input: TypeId) -> Vec<TypeId> {
    match types.tuple_fields(input) {
        Some(fields) => fields.iter().map(|f| f.ty).collect(),
        None => vec![input],
    }
}

impl TypeLayoutCatalog {
    /// The signature of function type `fn_ty`, with or without a trailing
    /// context parameter. Each variant is built once and shared afterwards.
    pub fn function_type(
        &mut self,
        types: &TypeTable,
        fn_ty: TypeId,
        needs_context: bool,
    ) -> Rc<Signature> {
        let layout = self.layout(types, fn_ty);
        let closure = layout.as_closure().unwrap_or_else(|| {
            panic!("`{}` is not a function type", types.display(fn_ty))
        });
        closure
            .signature_slot(needs_context)
            .get_or_init(|| {
                let sig =
                    self.build_signature(types, closure.input, closure.result, needs_context);
                trace!(
                    ty = %types.display(fn_ty),
                    needs_context,
                    signature = %sig,
                    "built function signature"
                );
                Rc::new(sig)
            })
            .clone()
    }

    fn build_signature(
        &mut self,
        types: &TypeTable,
        input: TypeId,
        result: TypeId,
        needs_context: bool,
    ) -> Signature {
        let mut params = Vec::new();

        let result_layout = self.layout(types, result);
        let ret = match &result_layout.schema {
            ValueSchema::Aggregate { storage, .. } => {
                params.push(SigParam {
                    ty: IrType::Ptr,
                    attrs: vec![ParamAttr::StructReturn(storage.clone()), ParamAttr::NoAlias],
                });
                IrType::Void
            }
            ValueSchema::Scalars(scalars) => match scalars.as_slice() {
                [] => IrType::Void,
                [single] => single.clone(),
                many => IrType::Struct(many.to_vec()),
            },
        };

        for arg in flattened_inputs(types, input) {
            let arg_layout = self.layout(types, arg);
            params.extend(
                arg_layout
                    .schema
                    .argument_types()
                    .into_iter()
                    .map(SigParam::new),
            );
        }

        if needs_context {
            params.push(SigParam::new(IrType::Ptr));
        }

        Signature {
            params,
            ret,
            has_context: needs_context,
        }
    }
}
