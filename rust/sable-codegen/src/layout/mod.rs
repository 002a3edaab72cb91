//! Physical layout of source types and the value-passing protocol.
//!
//! Every source type has one memoized [`TypeLayout`] per compilation unit,
//! produced by the [`TypeLayoutCatalog`]. A layout knows the type's storage
//! representation and its [`ValueSchema`], and moves values between memory,
//! [`RValue`]s and [`Explosion`]s.

pub mod catalog;
pub mod explosion;
pub mod schema;

use sable_core::types::TypeId;

use crate::closure::ClosureLayout;
use crate::ir::{IrBuilder, IrType, Value};

pub use catalog::TypeLayoutCatalog;
pub use explosion::Explosion;
pub use schema::ValueSchema;

/// Alignment guaranteed at `offset` bytes past an address aligned to `align`.
pub fn align_at_offset(align: u64, offset: u64) -> u64 {
    if offset == 0 {
        align
    } else {
        align.min(1 << offset.trailing_zeros())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub ptr: Value,
    pub align: u64,
}

impl Address {
    pub fn new(ptr: Value, align: u64) -> Self {
        Self { ptr, align }
    }
}

/// A source value materialized for use: either its scalars or the address
/// of its storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RValue {
    Scalars(Vec<Value>),
    Aggregate(Address),
}

impl RValue {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, RValue::Aggregate(_))
    }

    pub fn scalars(&self) -> &[Value] {
        match self {
            RValue::Scalars(values) => values,
            RValue::Aggregate(_) => panic!("aggregate r-value used as scalars"),
        }
    }

    pub fn aggregate_address(&self) -> Address {
        match self {
            RValue::Aggregate(addr) => *addr,
            RValue::Scalars(_) => panic!("scalar r-value used as an aggregate"),
        }
    }
}

#[derive(Debug)]
pub struct FieldLayout {
    pub layout: std::rc::Rc<TypeLayout>,
    /// Byte offset within the parent's storage.
    pub offset: u64,
}

#[derive(Debug)]
pub enum LayoutKind {
    Primitive,
    Tuple(Vec<FieldLayout>),
    Record(Vec<FieldLayout>),
    Function(ClosureLayout),
}

#[derive(Debug)]
pub struct TypeLayout {
    pub ty: TypeId,
    pub storage: IrType,
    pub size: u64,
    pub align: u64,
    pub schema: ValueSchema,
    pub kind: LayoutKind,
}

impl TypeLayout {
    pub fn fields(&self) -> &[FieldLayout] {
        match &self.kind {
            LayoutKind::Tuple(fields) | LayoutKind::Record(fields) => fields,
            LayoutKind::Primitive | LayoutKind::Function(_) => &[],
        }
    }

    pub fn as_closure(&self) -> Option<&ClosureLayout> {
        match &self.kind {
            LayoutKind::Function(closure) => Some(closure),
            _ => None,
        }
    }

    pub fn explosion_size(&self) -> usize {
        self.schema.explosion_size()
    }

    /// Address of field `index` of the object at `addr`.
    pub fn field_address(&self, b: &mut IrBuilder, addr: Address, index: usize) -> Address {
        let offset = self.fields()[index].offset;
        let ptr = b.build_field_addr(addr.ptr, &self.storage, index);
        Address::new(ptr, align_at_offset(addr.align, offset))
    }

    /// Index of the first explosion value belonging to field `index`, for
    /// scalar-schema tuples.
    pub fn field_explosion_start(&self, index: usize) -> usize {
        self.fields()[..index]
            .iter()
            .map(|f| f.layout.explosion_size())
            .sum()
    }

    // -- Memory <-> explosion -----------------------------------------------

    /// Add the value stored at `addr` to `out`: its scalars, or for an
    /// aggregate, the address itself.
    pub fn load_explosion(&self, b: &mut IrBuilder, addr: Address, out: &mut Explosion) {
        if self.schema.is_aggregate() {
            out.add(addr.ptr);
            return;
        }
        match &self.kind {
            LayoutKind::Primitive => {
                let value = b.build_load(self.storage.clone(), addr.ptr, addr.align);
                out.add(value);
            }
            LayoutKind::Function(closure) => closure.load(b, addr, out),
            LayoutKind::Tuple(_) | LayoutKind::Record(_) => {
                for index in 0..self.fields().len() {
                    let field_addr = self.field_address(b, addr, index);
                    self.fields()[index]
                        .layout
                        .load_explosion(b, field_addr, out);
                }
            }
        }
    }

    /// Claim this type's values from `src` and write them to `addr`.
    pub fn store_explosion(&self, b: &mut IrBuilder, src: &mut Explosion, addr: Address) {
        if self.schema.is_aggregate() {
            let from = src.claim_next();
            if from != addr.ptr {
                b.build_memcpy(addr.ptr, from, self.size, addr.align.min(self.align));
            }
            return;
        }
        match &self.kind {
            LayoutKind::Primitive => {
                let value = src.claim_next();
                b.build_store(value, addr.ptr, addr.align);
            }
            LayoutKind::Function(closure) => closure.store(b, src, addr),
            LayoutKind::Tuple(_) | LayoutKind::Record(_) => {
                for index in 0..self.fields().len() {
                    let field_addr = self.field_address(b, addr, index);
                    self.fields()[index]
                        .layout
                        .store_explosion(b, src, field_addr);
                }
            }
        }
    }

    /// Explode each field of the tuple at `addr` into `out`, one level deep.
    pub fn load_field_explosions(&self, b: &mut IrBuilder, addr: Address, out: &mut Explosion) {
        for index in 0..self.fields().len() {
            let field_addr = self.field_address(b, addr, index);
            self.fields()[index]
                .layout
                .load_explosion(b, field_addr, out);
        }
    }

    // -- Memory <-> r-value -------------------------------------------------

    pub fn load(&self, b: &mut IrBuilder, addr: Address) -> RValue {
        if self.schema.is_aggregate() {
            return RValue::Aggregate(addr);
        }
        let mut ex = Explosion::new();
        self.load_explosion(b, addr, &mut ex);
        RValue::Scalars(ex.claim_all())
    }

    pub fn store(&self, b: &mut IrBuilder, value: &RValue, addr: Address) {
        let mut ex = Explosion::new();
        self.explode(value, &mut ex);
        self.store_explosion(b, &mut ex, addr);
        ex.finish();
    }

    // -- R-value <-> explosion ----------------------------------------------

    pub fn explode(&self, value: &RValue, out: &mut Explosion) {
        match (value, &self.schema) {
            (RValue::Aggregate(addr), ValueSchema::Aggregate { .. }) => out.add(addr.ptr),
            (RValue::Scalars(values), ValueSchema::Scalars(types)) => {
                assert_eq!(
                    values.len(),
                    types.len(),
                    "r-value does not match its scalar schema"
                );
                out.add_all(values.iter().copied());
            }
            (value, schema) => panic!("r-value {value:?} does not match schema {schema:?}"),
        }
    }

    pub fn implode(&self, src: &mut Explosion) -> RValue {
        match &self.schema {
            ValueSchema::Aggregate { .. } => {
                RValue::Aggregate(Address::new(src.claim_next(), self.align))
            }
            ValueSchema::Scalars(types) => RValue::Scalars(src.claim(types.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use sable_core::types::TypeTable;

    use super::*;
    use crate::ir::{Function, InstKind, Linkage, SigParam, Signature, ValueDef};
    use crate::target::TargetInfo;

    fn layout_of(build: impl FnOnce(&mut TypeTable) -> TypeId) -> Rc<TypeLayout> {
        let mut types = TypeTable::new();
        let ty = build(&mut types);
        let mut catalog = TypeLayoutCatalog::new(TargetInfo::with_pointer(8, 8), 4);
        catalog.layout(&types, ty)
    }

    /// `(int -> int, (i64, i32))`: a closure and a nested tuple, four scalars.
    fn mixed_layout() -> Rc<TypeLayout> {
        layout_of(|types| {
            let int = types.int(64);
            let small = types.int(32);
            let closure = types.function(int, int);
            let inner = types.tuple(&[int, small]);
            types.tuple(&[closure, inner])
        })
    }

    fn builder(params: usize) -> IrBuilder {
        let sig = Rc::new(Signature {
            params: (0..params).map(|_| SigParam::new(IrType::Ptr)).collect(),
            ret: IrType::Void,
            has_context: false,
        });
        let mut b = IrBuilder::new(Function::new("f", sig, Linkage::Local));
        let entry = b.create_block("entry");
        b.append_block(entry);
        b.position_at_end(entry);
        b
    }

    /// Field indices from the parameter `ptr` is derived from, outermost first.
    fn field_path(func: &Function, mut ptr: Value) -> (usize, Vec<usize>) {
        let mut path = Vec::new();
        loop {
            match func.value(ptr).def {
                ValueDef::Param(index) => {
                    path.reverse();
                    return (index, path);
                }
                ValueDef::Result(inst) => match func.inst(inst).kind {
                    InstKind::FieldAddr { base, index, .. } => {
                        path.push(index);
                        ptr = base;
                    }
                    ref other => panic!("pointer derived from {other:?}"),
                },
                ref other => panic!("pointer defined by {other:?}"),
            }
        }
    }

    #[test]
    fn store_explosion_mirrors_load_explosion() {
        let layout = mixed_layout();
        assert!(layout.schema.is_scalars(4));

        let mut b = builder(2);
        let (src, dst) = (b.func().params()[0], b.func().params()[1]);
        let mut ex = Explosion::new();
        layout.load_explosion(&mut b, Address::new(src, 8), &mut ex);
        assert_eq!(ex.len(), 4);
        layout.store_explosion(&mut b, &mut ex, Address::new(dst, 8));
        ex.finish();

        let func = b.func();
        let mut loads = Vec::new();
        let mut stores = Vec::new();
        for (_, _, data) in func.iter_insts() {
            match data.kind {
                InstKind::Load { ptr, align } => {
                    let result = data.result.expect("loads produce a value");
                    loads.push((result, field_path(func, ptr), align));
                }
                InstKind::Store { value, ptr, align } => {
                    stores.push((value, field_path(func, ptr), align));
                }
                _ => {}
            }
        }
        assert_eq!(loads.len(), 4);
        assert_eq!(stores.len(), 4);
        for ((loaded, (from, load_path), load_align), (stored, (to, store_path), store_align)) in
            loads.iter().zip(&stores)
        {
            assert_eq!(loaded, stored);
            assert_eq!((*from, *to), (0, 1));
            assert_eq!(load_path, store_path);
            assert_eq!(load_align, store_align);
        }
        let paths: Vec<_> = loads.iter().map(|(_, (_, path), _)| path.clone()).collect();
        assert_eq!(paths, vec![vec![0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn implode_inverts_explode() {
        let scalars = layout_of(|types| {
            let int = types.int(64);
            types.tuple(&[int, int])
        });
        let value = RValue::Scalars(vec![Value(3), Value(5)]);
        let mut ex = Explosion::new();
        scalars.explode(&value, &mut ex);
        assert_eq!(scalars.implode(&mut ex), value);
        assert!(ex.is_empty());

        let wide = layout_of(|types| {
            let int = types.int(64);
            types.tuple(&[int, int, int, int, int])
        });
        assert!(wide.schema.is_aggregate());
        let value = RValue::Aggregate(Address::new(Value(7), wide.align));
        wide.explode(&value, &mut ex);
        assert_eq!(ex.len(), 1);
        assert_eq!(wide.implode(&mut ex), value);
        assert!(ex.is_empty());
    }

    #[test]
    fn alignment_at_offsets() {
        assert_eq!(align_at_offset(8, 0), 8);
        assert_eq!(align_at_offset(8, 8), 8);
        assert_eq!(align_at_offset(8, 4), 4);
        assert_eq!(align_at_offset(16, 8), 8);
        assert_eq!(align_at_offset(4, 12), 4);
    }

    #[test]
    fn rvalue_accessors() {
        let scalars = RValue::Scalars(vec![Value(0), Value(1)]);
        assert_eq!(scalars.scalars().len(), 2);
        assert!(!scalars.is_aggregate());

        let agg = RValue::Aggregate(Address::new(Value(4), 8));
        assert_eq!(agg.aggregate_address().align, 8);
    }

    #[test]
    #[should_panic(expected = "aggregate r-value used as scalars")]
    fn aggregate_is_not_scalars() {
        RValue::Aggregate(Address::new(Value(0), 8)).scalars();
    }
}
