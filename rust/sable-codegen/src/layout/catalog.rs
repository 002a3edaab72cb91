use std::collections::HashMap;
use std::rc::Rc;

use sable_core::types::{TypeId, TypeKind, TypeTable};
use tracing::trace;

use super::{FieldLayout, LayoutKind, TypeLayout, ValueSchema};
use crate::closure::ClosureLayout;
use crate::ir::IrType;
use crate::target::TargetInfo;

/// Memoized type layouts for one compilation unit. Entries are never evicted.
#[derive(Debug)]
pub struct TypeLayoutCatalog {
    target: TargetInfo,
    max_scalars: usize,
    entries: HashMap<TypeId, Rc<TypeLayout>>,
}

impl TypeLayoutCatalog {
    /// `max_scalars` bounds how many scalars a tuple may explode into before
    /// it is passed indirectly.
    pub fn new(target: TargetInfo, max_scalars: usize) -> Self {
        Self {
            target,
            max_scalars,
            entries: HashMap::new(),
        }
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The layout of `ty`, computed on first request.
    pub fn layout(&mut self, types: &TypeTable, ty: TypeId) -> Rc<TypeLayout> {
        if let Some(layout) = self.entries.get(&ty) {
            return layout.clone();
        }
        let layout = Rc::new(self.compute(types, ty));
        trace!(
            ty = %types.display(ty),
            size = layout.size,
            align = layout.align,
            aggregate = layout.schema.is_aggregate(),
            "computed type layout"
        );
        self.entries.insert(ty, layout.clone());
        layout
    }

    fn compute(&mut self, types: &TypeTable, ty: TypeId) -> TypeLayout {
        match types.kind(ty) {
            TypeKind::Int(bits) => self.primitive(ty, IrType::Int(*bits)),
            TypeKind::Float(32) => self.primitive(ty, IrType::F32),
            TypeKind::Float(_) => self.primitive(ty, IrType::F64),
            TypeKind::Bool => self.primitive(ty, IrType::I1),
            TypeKind::RawPointer => self.primitive(ty, IrType::Ptr),
            TypeKind::Tuple(fields) => {
                let field_tys: Vec<TypeId> = fields.iter().map(|f| f.ty).collect();
                self.structure(types, ty, &field_tys, false)
            }
            TypeKind::Record { fields, .. } => {
                let field_tys: Vec<TypeId> = fields.iter().map(|f| f.ty).collect();
                self.structure(types, ty, &field_tys, true)
            }
            TypeKind::Function { input, result } => self.closure(ty, *input, *result),
        }
    }

    fn primitive(&self, ty: TypeId, storage: IrType) -> TypeLayout {
        TypeLayout {
            ty,
            size: storage.size(&self.target),
            align: storage.align(&self.target),
            schema: ValueSchema::Scalars(vec![storage.clone()]),
            storage,
            kind: LayoutKind::Primitive,
        }
    }

    fn structure(
        &mut self,
        types: &TypeTable,
        ty: TypeId,
        field_tys: &[TypeId],
        nominal: bool,
    ) -> TypeLayout {
        let field_layouts: Vec<Rc<TypeLayout>> =
            field_tys.iter().map(|&f| self.layout(types, f)).collect();
        let storage = IrType::Struct(field_layouts.iter().map(|f| f.storage.clone()).collect());
        let size = storage.size(&self.target);
        let align = storage.align(&self.target);

        let mut scalars = Vec::new();
        let mut all_scalar = !nominal;
        for field in &field_layouts {
            match field.schema.scalar_types() {
                Some(field_scalars) if all_scalar => scalars.extend_from_slice(field_scalars),
                _ => all_scalar = false,
            }
        }
        let schema = if all_scalar && scalars.len() <= self.max_scalars {
            ValueSchema::Scalars(scalars)
        } else {
            ValueSchema::Aggregate {
                storage: storage.clone(),
                align,
            }
        };

        let fields: Vec<FieldLayout> = field_layouts
            .into_iter()
            .enumerate()
            .map(|(i, layout)| FieldLayout {
                layout,
                offset: storage.field_offset(i, &self.target),
            })
            .collect();
        let kind = if nominal {
            LayoutKind::Record(fields)
        } else {
            LayoutKind::Tuple(fields)
        };

        TypeLayout {
            ty,
            storage,
            size,
            align,
            schema,
            kind,
        }
    }

    fn closure(&self, ty: TypeId, input: TypeId, result: TypeId) -> TypeLayout {
        let pointer_size = self.target.pointer_size;
        TypeLayout {
            ty,
            storage: ClosureLayout::storage(),
            size: 2 * pointer_size,
            align: self.target.pointer_align,
            schema: ValueSchema::Scalars(vec![IrType::Ptr, IrType::Ptr]),
            kind: LayoutKind::Function(ClosureLayout::new(input, result, pointer_size)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::types::TupleField;

    fn catalog(pointer_size: u64) -> TypeLayoutCatalog {
        TypeLayoutCatalog::new(TargetInfo::with_pointer(pointer_size, pointer_size), 4)
    }

    #[test]
    fn layouts_are_memoized() {
        let mut types = TypeTable::new();
        let int = types.int(64);
        let mut cat = catalog(8);
        let a = cat.layout(&types, int);
        let b = cat.layout(&types, int);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cat.len(), 1);
    }

    #[test]
    fn primitives_are_single_scalars() {
        let mut types = TypeTable::new();
        let int = types.int(32);
        let float = types.float(64);
        let boolean = types.bool();
        let mut cat = catalog(8);
        assert_eq!(cat.layout(&types, int).schema, ValueSchema::Scalars(vec![IrType::Int(32)]));
        assert_eq!(cat.layout(&types, float).size, 8);
        assert_eq!(cat.layout(&types, boolean).schema, ValueSchema::Scalars(vec![IrType::I1]));
    }

    #[test]
    fn function_types_are_pointer_pairs() {
        for pointer_size in [4, 8] {
            let mut types = TypeTable::new();
            let int = types.int(64);
            let pair = types.tuple(&[int, int]);
            let fn_ty = types.function(pair, int);
            let mut cat = catalog(pointer_size);
            let layout = cat.layout(&types, fn_ty);
            assert_eq!(layout.size, 2 * pointer_size);
            assert_eq!(layout.align, pointer_size);
            assert_eq!(layout.schema, ValueSchema::Scalars(vec![IrType::Ptr, IrType::Ptr]));
            assert!(layout.as_closure().is_some());
        }
    }

    #[test]
    fn small_tuples_explode_and_large_ones_do_not() {
        let mut types = TypeTable::new();
        let int = types.int(64);
        let float = types.float(64);
        let small = types.tuple(&[int, float]);
        let large = types.tuple(&[int, int, int, int, int]);
        let nested = types.tuple(&[small, int]);
        let unit = types.unit();
        let mut cat = catalog(8);

        assert_eq!(
            cat.layout(&types, small).schema,
            ValueSchema::Scalars(vec![IrType::I64, IrType::F64])
        );
        assert_eq!(cat.layout(&types, nested).explosion_size(), 3);
        assert!(cat.layout(&types, large).schema.is_aggregate());
        assert!(cat.layout(&types, unit).schema.is_scalars(0));
        assert_eq!(cat.layout(&types, unit).size, 0);
    }

    #[test]
    fn tuples_containing_aggregates_are_aggregates() {
        let mut types = TypeTable::new();
        let int = types.int(64);
        let point = types.record(
            "Point",
            vec![TupleField::named("x", int), TupleField::named("y", int)],
        );
        let with_record = types.tuple(&[point, int]);
        let mut cat = catalog(8);
        assert!(cat.layout(&types, point).schema.is_aggregate());
        assert!(cat.layout(&types, with_record).schema.is_aggregate());
    }

    #[test]
    fn records_use_natural_layout() {
        let mut types = TypeTable::new();
        let byte = types.int(8);
        let int = types.int(64);
        let rec = types.record(
            "Padded",
            vec![TupleField::named("a", byte), TupleField::named("b", int)],
        );
        let mut cat = catalog(8);
        let layout = cat.layout(&types, rec);
        assert_eq!(layout.size, 16);
        assert_eq!(layout.align, 8);
        assert_eq!(layout.fields()[1].offset, 8);
    }
}
