//! In-process native execution of lowered modules.
//!
//! [`JitEngine`] translates an IR module through Cranelift's JIT backend and
//! hands out the finalized entry points. The typed `execute_*` helpers check
//! the lowered signature before transmuting, so they can only call functions
//! whose ABI they actually match.

use std::collections::HashMap;
use std::rc::Rc;

use cranelift_jit::{JITBuilder, JITModule};
use sable_core::ast::SourceModule;
use tracing::debug;

use crate::clif::define_module;
use crate::context::build_isa;
use crate::error::CodegenError;
use crate::ir::{self, IrType, Signature};
use crate::module::lower_module;
use crate::settings::CodegenSettings;

// ---------------------------------------------------------------------------
// JIT Error
// ---------------------------------------------------------------------------

/// Errors specific to JIT compilation and execution.
#[derive(Debug)]
pub enum JitError {
    /// Lowering or translation failed.
    CompileError(CodegenError),
    /// The requested function was not compiled.
    FunctionNotFound(String),
    /// The function's lowered signature differs from the one the caller asked for.
    SignatureMismatch { name: String, signature: String },
    /// JIT module creation or finalization failed.
    ModuleError(String),
}

impl std::fmt::Display for JitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JitError::CompileError(e) => write!(f, "JIT compile error: {e}"),
            JitError::FunctionNotFound(name) => write!(f, "function not found: {name}"),
            JitError::SignatureMismatch { name, signature } => {
                write!(f, "`{name}` has signature `{signature}`")
            }
            JitError::ModuleError(msg) => write!(f, "JIT module error: {msg}"),
        }
    }
}

impl std::error::Error for JitError {}

impl From<CodegenError> for JitError {
    fn from(e: CodegenError) -> Self {
        JitError::CompileError(e)
    }
}

// ---------------------------------------------------------------------------
// JIT Engine
// ---------------------------------------------------------------------------

/// A finalized function and the signature it was compiled with.
struct CompiledFunction {
    fn_ptr: *const u8,
    signature: Rc<Signature>,
}

/// Aggregated statistics about JIT activity.
#[derive(Debug, Clone, Default)]
pub struct JitStats {
    pub modules_compiled: u64,
    pub functions_compiled: u64,
    pub executions: u64,
}

pub struct JitEngine {
    settings: CodegenSettings,
    /// Owns the compiled code memory; every cached pointer points into it.
    jit_modules: Vec<JITModule>,
    cache: HashMap<String, CompiledFunction>,
    stats: JitStats,
}

impl JitEngine {
    /// Create an engine for the host. A target triple in `settings` is
    /// ignored; JIT code always runs in-process.
    pub fn new(settings: CodegenSettings) -> Self {
        Self {
            settings: CodegenSettings {
                target: None,
                ..settings
            },
            jit_modules: Vec::new(),
            cache: HashMap::new(),
            stats: JitStats::default(),
        }
    }

    pub fn stats(&self) -> &JitStats {
        &self.stats
    }

    /// Lower `source` and compile the result.
    pub fn compile_source(&mut self, source: &SourceModule) -> Result<(), JitError> {
        let ir_module = lower_module(source, self.settings.clone())?;
        self.compile_module(&ir_module)
    }

    /// Compile every function defined in `ir_module`. Functions that are only
    /// declared are resolved as imports by the JIT linker.
    pub fn compile_module(&mut self, ir_module: &ir::Module) -> Result<(), JitError> {
        let isa = build_isa(&self.settings)?;
        let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let mut jit_module = JITModule::new(builder);

        let defined = define_module(&mut jit_module, ir_module)?;

        jit_module
            .finalize_definitions()
            .map_err(|e| JitError::ModuleError(format!("finalize_definitions failed: {e}")))?;

        for func in defined.iter().filter(|f| f.is_definition) {
            let fn_ptr = jit_module.get_finalized_function(func.func_id);
            let signature = match ir_module.get(&func.name) {
                Some(lowered) => lowered.sig.clone(),
                None => return Err(JitError::FunctionNotFound(func.name.clone())),
            };
            self.cache.insert(
                func.name.clone(),
                CompiledFunction { fn_ptr, signature },
            );
            self.stats.functions_compiled += 1;
        }
        self.stats.modules_compiled += 1;
        debug!(
            module = %ir_module.name,
            functions = self.cache.len(),
            "finalized JIT module"
        );

        self.jit_modules.push(jit_module);
        Ok(())
    }

    /// The lowered signature of a compiled function.
    pub fn signature(&self, name: &str) -> Result<&Signature, JitError> {
        self.lookup(name).map(|f| &*f.signature)
    }

    fn lookup(&self, name: &str) -> Result<&CompiledFunction, JitError> {
        self.cache
            .get(name)
            .ok_or_else(|| JitError::FunctionNotFound(name.to_string()))
    }

    fn checked_ptr(&mut self, name: &str, params: usize, ret: &IrType) -> Result<*const u8, JitError> {
        let sig = self.signature(name)?;
        let matches = !sig.has_context
            && sig.params.len() == params
            && sig.params.iter().all(|p| p.ty == IrType::I64 && p.attrs.is_empty())
            && &sig.ret == ret;
        if !matches {
            return Err(JitError::SignatureMismatch {
                name: name.to_string(),
                signature: sig.to_string(),
            });
        }
        let fn_ptr = self.lookup(name)?.fn_ptr;
        self.stats.executions += 1;
        Ok(fn_ptr)
    }

    /// Call a compiled `() -> i64` function.
    pub fn execute_nullary(&mut self, name: &str) -> Result<i64, JitError> {
        let fn_ptr = self.checked_ptr(name, 0, &IrType::I64)?;
        // SAFETY: the pointer comes from a JIT module we own and its lowered
        // signature was checked to be `i64 ()`.
        let code_fn = unsafe { std::mem::transmute::<*const u8, extern "C" fn() -> i64>(fn_ptr) };
        Ok(code_fn())
    }

    /// Call a compiled `(i64) -> i64` function.
    pub fn execute_unary(&mut self, name: &str, a: i64) -> Result<i64, JitError> {
        let fn_ptr = self.checked_ptr(name, 1, &IrType::I64)?;
        // SAFETY: signature checked to be `i64 (i64)`.
        let code_fn =
            unsafe { std::mem::transmute::<*const u8, extern "C" fn(i64) -> i64>(fn_ptr) };
        Ok(code_fn(a))
    }

    /// Call a compiled `(i64, i64) -> i64` function.
    pub fn execute_binary(&mut self, name: &str, a: i64, b: i64) -> Result<i64, JitError> {
        let fn_ptr = self.checked_ptr(name, 2, &IrType::I64)?;
        // SAFETY: signature checked to be `i64 (i64, i64)`.
        let code_fn =
            unsafe { std::mem::transmute::<*const u8, extern "C" fn(i64, i64) -> i64>(fn_ptr) };
        Ok(code_fn(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::builder::{self as sb, ModuleBuilder};
    use sable_core::builtins::BuiltinKind;

    fn arith_module() -> SourceModule {
        let mut mb = ModuleBuilder::new("arith");
        let int = mb.types.int(64);
        let pair = mb.types.tuple(&[int, int]);
        let binary = mb.types.function(pair, int);
        let unary = mb.types.function(int, int);
        let unit = mb.types.unit();
        let nullary = mb.types.function(unit, int);

        let add = mb.declare_builtin(BuiltinKind::Add, binary);
        let mul = mb.declare_builtin(BuiltinKind::Mul, binary);

        let sum = mb.declare_global("sum", binary);
        let a = mb.param(sum, 0);
        let b = mb.param(sum, 1);
        let args = mb.tuple(vec![a, b]);
        let body = mb.call(add, args);
        mb.define(sum, vec![sb::ret(body)]);

        let square = mb.declare_global("square", unary);
        let x = mb.param(square, 0);
        let y = mb.param(square, 0);
        let args = mb.tuple(vec![x, y]);
        let body = mb.call(mul, args);
        mb.define(square, vec![sb::ret(body)]);

        let answer = mb.declare_global("answer", nullary);
        let six = mb.int(6);
        let seven = mb.int(7);
        let args = mb.tuple(vec![six, seven]);
        let body = mb.call(mul, args);
        mb.define(answer, vec![sb::ret(body)]);

        mb.finish()
    }

    #[test]
    fn executes_compiled_functions() {
        let mut engine = JitEngine::new(CodegenSettings::default());
        engine.compile_source(&arith_module()).unwrap();
        assert_eq!(engine.execute_binary("sum", 3, 4).unwrap(), 7);
        assert_eq!(engine.execute_unary("square", 9).unwrap(), 81);
        assert_eq!(engine.execute_nullary("answer").unwrap(), 42);
        assert_eq!(engine.stats().executions, 3);
        assert_eq!(engine.stats().functions_compiled, 3);
    }

    #[test]
    fn rejects_mismatched_signature() {
        let mut engine = JitEngine::new(CodegenSettings::default());
        engine.compile_source(&arith_module()).unwrap();
        let err = engine.execute_nullary("sum").unwrap_err();
        assert!(matches!(err, JitError::SignatureMismatch { .. }));
        assert_eq!(err.to_string(), "`sum` has signature `i64 (i64, i64)`");
    }

    #[test]
    fn missing_function() {
        let mut engine = JitEngine::new(CodegenSettings::default());
        assert!(matches!(
            engine.execute_nullary("nope"),
            Err(JitError::FunctionNotFound(_))
        ));
    }
}
