//! Low-level IR types and their target layout.

use std::fmt;

use crate::target::TargetInfo;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    /// Integer of 1, 8, 16, 32 or 64 bits.
    Int(u8),
    F32,
    F64,
    /// Opaque pointer; pointee types live on the instructions that use it.
    Ptr,
    /// Literal struct with natural (C) layout.
    Struct(Vec<IrType>),
}

impl IrType {
    pub const I1: IrType = IrType::Int(1);
    pub const I8: IrType = IrType::Int(8);
    pub const I64: IrType = IrType::Int(64);

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, IrType::Int(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, IrType::Struct(_))
    }

    pub fn struct_fields(&self) -> &[IrType] {
        match self {
            IrType::Struct(fields) => fields,
            other => panic!("{other} is not a struct type"),
        }
    }

    /// Allocation size in bytes, including tail padding.
    pub fn size(&self, target: &TargetInfo) -> u64 {
        match self {
            IrType::Void => 0,
            IrType::Int(bits) => u64::from(*bits).div_ceil(8),
            IrType::F32 => 4,
            IrType::F64 => 8,
            IrType::Ptr => target.pointer_size,
            IrType::Struct(fields) => {
                let mut offset = 0;
                for field in fields {
                    offset = align_to(offset, field.align(target)) + field.size(target);
                }
                align_to(offset, self.align(target))
            }
        }
    }

    /// ABI alignment in bytes.
    pub fn align(&self, target: &TargetInfo) -> u64 {
        match self {
            IrType::Void => 1,
            IrType::Ptr => target.pointer_align,
            IrType::Struct(fields) => fields.iter().map(|f| f.align(target)).max().unwrap_or(1),
            scalar => scalar.size(target).max(1),
        }
    }

    /// Byte offset of field `index` within a struct type.
    pub fn field_offset(&self, index: usize, target: &TargetInfo) -> u64 {
        let fields = self.struct_fields();
        assert!(index < fields.len(), "field {index} out of range for {self}");
        let mut offset = 0;
        for (i, field) in fields.iter().enumerate() {
            offset = align_to(offset, field.align(target));
            if i == index {
                return offset;
            }
            offset += field.size(target);
        }
        unreachable!()
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{bits}"),
            IrType::F32 => write!(f, "float"),
            IrType::F64 => write!(f, "double"),
            IrType::Ptr => write!(f, "ptr"),
            IrType::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

pub fn align_to(offset: u64, align: u64) -> u64 {
    offset.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x64() -> TargetInfo {
        TargetInfo::with_pointer(8, 8)
    }

    #[test]
    fn scalar_layout() {
        let t = x64();
        assert_eq!(IrType::I1.size(&t), 1);
        assert_eq!(IrType::Int(32).align(&t), 4);
        assert_eq!(IrType::F64.size(&t), 8);
        assert_eq!(IrType::Ptr.size(&TargetInfo::with_pointer(4, 4)), 4);
    }

    #[test]
    fn struct_layout_pads_fields() {
        let t = x64();
        let ty = IrType::Struct(vec![IrType::I8, IrType::I64, IrType::Int(16)]);
        assert_eq!(ty.field_offset(0, &t), 0);
        assert_eq!(ty.field_offset(1, &t), 8);
        assert_eq!(ty.field_offset(2, &t), 16);
        assert_eq!(ty.size(&t), 24);
        assert_eq!(ty.align(&t), 8);
    }

    #[test]
    fn pointer_pair_is_unpadded() {
        let t = x64();
        let pair = IrType::Struct(vec![IrType::Ptr, IrType::Ptr]);
        assert_eq!(pair.size(&t), 16);
        assert_eq!(pair.field_offset(1, &t), 8);
    }

    #[test]
    fn display() {
        let ty = IrType::Struct(vec![IrType::I64, IrType::F64, IrType::Ptr]);
        assert_eq!(ty.to_string(), "{ i64, double, ptr }");
    }
}
