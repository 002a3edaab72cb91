//! Sable native code generation.
//!
//! Lowers typed Sable modules into an SSA IR, deciding how every function
//! type is passed at the machine level, then compiles that IR to native code
//! through Cranelift (in-process JIT or object files).

pub mod aot;
pub mod builtin;
pub mod call;
pub mod clif;
pub mod closure;
pub mod context;
pub mod error;
pub mod frame;
pub mod function;
pub mod ir;
pub mod jit;
pub mod layout;
pub mod module;
pub mod settings;
pub mod signature;
pub mod target;

pub use error::CodegenError;
pub use jit::{JitEngine, JitError};
pub use module::{lower_module, ModuleEmitter};
pub use settings::{CodegenSettings, OptLevel};
pub use target::TargetInfo;
