//! Compilation context: ISA selection and object module creation.

use std::sync::Arc;

use cranelift_codegen::isa::{self, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_object::{ObjectBuilder, ObjectModule};
use target_lexicon::Triple;
use tracing::debug;

use crate::error::CodegenError;
use crate::settings::CodegenSettings;

/// Build the target ISA described by `settings`. With no target triple the
/// host ISA is detected natively.
pub fn build_isa(settings: &CodegenSettings) -> Result<Arc<dyn TargetIsa>, CodegenError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", settings.opt_level.as_flag())
        .map_err(|e| CodegenError::TargetError(format!("failed to set opt_level: {e}")))?;

    let isa_builder = match settings.target.as_deref() {
        Some(triple_str) => {
            let triple: Triple = triple_str
                .parse()
                .map_err(|e| CodegenError::TargetError(format!("invalid target triple: {e}")))?;
            isa::lookup(triple.clone()).map_err(|e| {
                CodegenError::TargetError(format!("unsupported target {triple}: {e}"))
            })?
        }
        None => cranelift_native::builder()
            .map_err(|e| CodegenError::TargetError(format!("host is not supported: {e}")))?,
    };

    let flags = settings::Flags::new(flag_builder);
    let isa = isa_builder
        .finish(flags)
        .map_err(|e| CodegenError::TargetError(format!("failed to build ISA: {e}")))?;
    debug!(triple = %isa.triple(), opt_level = settings.opt_level.as_flag(), "built target ISA");
    Ok(isa)
}

/// Holds the Cranelift state for one object-file compilation.
pub struct CodegenContext {
    pub isa: Arc<dyn TargetIsa>,
    pub module: ObjectModule,
}

impl CodegenContext {
    /// Create a context for the target in `settings`, naming the object `name`.
    pub fn new(name: &str, settings: &CodegenSettings) -> Result<Self, CodegenError> {
        let isa = build_isa(settings)?;
        let obj_builder =
            ObjectBuilder::new(isa.clone(), name, cranelift_module::default_libcall_names())
                .map_err(|e| {
                    CodegenError::TargetError(format!("failed to create ObjectBuilder: {e}"))
                })?;
        Ok(Self {
            isa,
            module: ObjectModule::new(obj_builder),
        })
    }

    /// The pointer type of the target (e.g. I64 on 64-bit).
    pub fn pointer_type(&self) -> cranelift_codegen::ir::Type {
        self.isa.pointer_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OptLevel;

    #[test]
    fn host_context_creation() {
        let ctx = CodegenContext::new("host", &CodegenSettings::default()).unwrap();
        let bits = ctx.pointer_type().bits();
        assert!(bits == 32 || bits == 64);
    }

    #[test]
    fn cross_target_pointer_type() {
        let settings = CodegenSettings {
            target: Some("aarch64-unknown-linux-gnu".to_string()),
            opt_level: OptLevel::None,
            ..CodegenSettings::default()
        };
        let ctx = CodegenContext::new("cross", &settings).unwrap();
        assert_eq!(ctx.pointer_type(), cranelift_codegen::ir::types::I64);
    }

    #[test]
    fn invalid_target_triple() {
        let settings = CodegenSettings {
            target: Some("not-a-real-triple".to_string()),
            ..CodegenSettings::default()
        };
        let result = CodegenContext::new("bad", &settings);
        assert!(matches!(result, Err(CodegenError::TargetError(_))));
    }
}
