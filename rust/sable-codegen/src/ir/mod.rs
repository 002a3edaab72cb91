//! SSA intermediate representation produced by function lowering.
//!
//! The IR is deliberately close to LLVM's: functions own blocks of
//! instructions, pointers are opaque, and aggregates are first-class values
//! that can be built with `insertvalue` and taken apart with `extractvalue`.
//! [`crate::clif`] translates it to Cranelift for native code generation.

pub mod builder;
pub mod function;
pub mod module;
pub mod print;
pub mod types;

pub use builder::IrBuilder;
pub use function::{
    BinaryOp, Block, FloatPredicate, FuncRef, Function, Inst, InstKind, IntPredicate, Linkage,
    ParamAttr, SigParam, Signature, UnaryOp, Value, ValueDef,
};
pub use module::Module;
pub use types::IrType;
