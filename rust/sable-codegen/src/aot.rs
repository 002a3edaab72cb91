//! Ahead-of-time compilation of lowered modules into object files.

use cranelift_object::ObjectModule;
use sable_core::ast::SourceModule;
use tracing::info;

use crate::clif::define_module;
use crate::context::CodegenContext;
use crate::error::CodegenError;
use crate::ir;
use crate::module::lower_module;
use crate::settings::CodegenSettings;

/// Translate an IR module into a Cranelift object module for the target in
/// `settings`.
pub fn compile_object_module(
    ir_module: &ir::Module,
    settings: &CodegenSettings,
) -> Result<ObjectModule, CodegenError> {
    let mut ctx = CodegenContext::new(&ir_module.name, settings)?;
    let defined = define_module(&mut ctx.module, ir_module)?;
    info!(
        module = %ir_module.name,
        functions = defined.iter().filter(|f| f.is_definition).count(),
        "compiled object module"
    );
    Ok(ctx.module)
}

/// Finish `module` into the bytes of a relocatable object file.
pub fn emit_object(module: ObjectModule) -> Result<Vec<u8>, CodegenError> {
    module
        .finish()
        .emit()
        .map_err(|e| CodegenError::EmissionError(format!("failed to emit object file: {e}")))
}

/// Lower `source` and compile it straight to object file bytes.
pub fn compile_object(
    source: &SourceModule,
    settings: &CodegenSettings,
) -> Result<Vec<u8>, CodegenError> {
    let ir_module = lower_module(source, settings.clone())?;
    emit_object(compile_object_module(&ir_module, settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::builder::{self as sb, ModuleBuilder};
    use sable_core::builtins::BuiltinKind;

    fn add_module() -> SourceModule {
        let mut mb = ModuleBuilder::new("arith");
        let int = mb.types.int(64);
        let pair = mb.types.tuple(&[int, int]);
        let fn_ty = mb.types.function(pair, int);
        let add = mb.declare_builtin(BuiltinKind::Add, fn_ty);
        let f = mb.declare_global("sum", fn_ty);
        let a = mb.param(f, 0);
        let b = mb.param(f, 1);
        let args = mb.tuple(vec![a, b]);
        let call = mb.call(add, args);
        mb.define(f, vec![sb::ret(call)]);
        mb.finish()
    }

    #[test]
    fn compiles_to_nonempty_object() {
        let bytes = compile_object(&add_module(), &CodegenSettings::default()).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn cross_compiles_for_a_non_host_target() {
        let settings = CodegenSettings {
            target: Some("aarch64-unknown-linux-gnu".to_string()),
            ..CodegenSettings::default()
        };
        let bytes = compile_object(&add_module(), &settings).unwrap();
        assert_eq!(&bytes[..4], b"\x7fELF");
    }
}
