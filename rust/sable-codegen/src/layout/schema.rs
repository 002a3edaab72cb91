use crate::ir::IrType;

/// How a value crosses a call boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSchema {
    /// Passed indirectly, by the address of a `storage`-typed object.
    Aggregate { storage: IrType, align: u64 },
    /// Passed as independent register values, in order. May be empty.
    Scalars(Vec<IrType>),
}

impl ValueSchema {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ValueSchema::Aggregate { .. })
    }

    /// `true` for a scalar list of exactly `count` elements.
    pub fn is_scalars(&self, count: usize) -> bool {
        matches!(self, ValueSchema::Scalars(s) if s.len() == count)
    }

    pub fn scalar_types(&self) -> Option<&[IrType]> {
        match self {
            ValueSchema::Scalars(s) => Some(s),
            ValueSchema::Aggregate { .. } => None,
        }
    }

    /// Number of values the schema contributes to an explosion.
    pub fn explosion_size(&self) -> usize {
        match self {
            ValueSchema::Aggregate { .. } => 1,
            ValueSchema::Scalars(s) => s.len(),
        }
    }

    /// The argument types this schema contributes to a signature.
    pub fn argument_types(&self) -> Vec<IrType> {
        match self {
            ValueSchema::Aggregate { .. } => vec![IrType::Ptr],
            ValueSchema::Scalars(s) => s.clone(),
        }
    }
}
