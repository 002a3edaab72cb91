//! Target description: the only per-target facts lowering depends on.

use std::str::FromStr;

use target_lexicon::Triple;

use crate::error::CodegenError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// Pointer size in bytes.
    pub pointer_size: u64,
    /// ABI alignment of a pointer in bytes.
    pub pointer_align: u64,
    pub triple: Triple,
}

impl TargetInfo {
    /// Describe the host platform.
    pub fn host() -> Result<Self, CodegenError> {
        Self::from_triple(Triple::host())
    }

    /// Describe the target named by a triple string, e.g. `"i686-unknown-linux-gnu"`.
    pub fn from_triple_str(triple_str: &str) -> Result<Self, CodegenError> {
        let triple = Triple::from_str(triple_str)
            .map_err(|e| CodegenError::TargetError(format!("invalid target triple: {e}")))?;
        Self::from_triple(triple)
    }

    /// Resolve the optional target of a settings file; `None` means host.
    pub fn from_setting(target: Option<&str>) -> Result<Self, CodegenError> {
        match target {
            Some(triple) => Self::from_triple_str(triple),
            None => Self::host(),
        }
    }

    pub fn from_triple(triple: Triple) -> Result<Self, CodegenError> {
        let width = triple.pointer_width().map_err(|()| {
            CodegenError::TargetError(format!("unknown pointer width for target {triple}"))
        })?;
        let size = u64::from(width.bytes());
        Ok(Self {
            pointer_size: size,
            pointer_align: size,
            triple,
        })
    }

    /// A target with explicit pointer facts and no triple, for layout-only work.
    pub fn with_pointer(pointer_size: u64, pointer_align: u64) -> Self {
        assert!(
            pointer_align.is_power_of_two(),
            "pointer alignment must be a power of two"
        );
        Self {
            pointer_size,
            pointer_align,
            triple: Triple::unknown(),
        }
    }
}
