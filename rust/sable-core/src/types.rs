//! Interned source-language types.
//!
//! Every type the front end hands to the backend is a [`TypeId`] handle into a
//! [`TypeTable`]. The table interns structurally, so two equal types always
//! share one id and the id can be used as a canonical cache key.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A tuple or record field. Labels are purely informational.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleField {
    pub name: Option<String>,
    pub ty: TypeId,
}

impl TupleField {
    pub fn new(ty: TypeId) -> Self {
        Self { name: None, ty }
    }

    pub fn named(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Two's-complement integer of 8, 16, 32 or 64 bits.
    Int(u8),
    /// IEEE float of 32 or 64 bits.
    Float(u8),
    Bool,
    RawPointer,
    /// Structural tuple. The empty tuple is the unit type.
    Tuple(Vec<TupleField>),
    /// Nominal record; always passed indirectly.
    Record {
        name: String,
        fields: Vec<TupleField>,
    },
    Function {
        input: TypeId,
        result: TypeId,
    },
}

/// Intern table mapping type structures to unique ids.
#[derive(Debug, Default, Clone)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    lookup: HashMap<TypeKind, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.lookup.get(&kind) {
            return id;
        }
        match &kind {
            TypeKind::Int(bits) => assert!(
                matches!(bits, 8 | 16 | 32 | 64),
                "unsupported integer width {bits}"
            ),
            TypeKind::Float(bits) => {
                assert!(matches!(bits, 32 | 64), "unsupported float width {bits}")
            }
            _ => {}
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.lookup.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn int(&mut self, bits: u8) -> TypeId {
        self.intern(TypeKind::Int(bits))
    }

    pub fn float(&mut self, bits: u8) -> TypeId {
        self.intern(TypeKind::Float(bits))
    }

    pub fn bool(&mut self) -> TypeId {
        self.intern(TypeKind::Bool)
    }

    pub fn raw_pointer(&mut self) -> TypeId {
        self.intern(TypeKind::RawPointer)
    }

    pub fn unit(&mut self) -> TypeId {
        self.intern(TypeKind::Tuple(Vec::new()))
    }

    /// Unlabelled tuple of the given element types.
    pub fn tuple(&mut self, elements: &[TypeId]) -> TypeId {
        let fields = elements.iter().copied().map(TupleField::new).collect();
        self.intern(TypeKind::Tuple(fields))
    }

    pub fn record(&mut self, name: impl Into<String>, fields: Vec<TupleField>) -> TypeId {
        self.intern(TypeKind::Record {
            name: name.into(),
            fields,
        })
    }

    pub fn function(&mut self, input: TypeId, result: TypeId) -> TypeId {
        self.intern(TypeKind::Function { input, result })
    }

    /// `(input, result)` if `id` is a function type.
    pub fn as_function(&self, id: TypeId) -> Option<(TypeId, TypeId)> {
        match self.kind(id) {
            TypeKind::Function { input, result } => Some((*input, *result)),
            _ => None,
        }
    }

    /// Fields of a tuple type. Records are not tuples.
    pub fn tuple_fields(&self, id: TypeId) -> Option<&[TupleField]> {
        match self.kind(id) {
            TypeKind::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn display(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { table: self, id }
    }
}

/// Renders a type the way the front end spells it, e.g. `(Int64, Int64) -> Int64`.
#[derive(Clone, Copy)]
pub struct TypeDisplay<'a> {
    table: &'a TypeTable,
    id: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table.kind(self.id) {
            TypeKind::Int(bits) => write!(f, "Int{bits}"),
            TypeKind::Float(bits) => write!(f, "Float{bits}"),
            TypeKind::Bool => write!(f, "Bool"),
            TypeKind::RawPointer => write!(f, "RawPointer"),
            TypeKind::Record { name, .. } => write!(f, "{name}"),
            TypeKind::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(name) = &field.name {
                        write!(f, "{name}: ")?;
                    }
                    write!(f, "{}", self.table.display(field.ty))?;
                }
                write!(f, ")")
            }
            TypeKind::Function { input, result } => {
                let is_tuple = matches!(self.table.kind(*input), TypeKind::Tuple(_));
                let input = self.table.display(*input);
                let result = self.table.display(*result);
                if is_tuple {
                    write!(f, "{input} -> {result}")
                } else {
                    write!(f, "({input}) -> {result}")
                }
            }
        }
    }
}
