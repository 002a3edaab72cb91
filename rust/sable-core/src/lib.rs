//! Sable Core
//!
//! Shared front-end data model consumed by the backend: interned source types,
//! the typed AST, the builtin operator table, and diagnostics.

pub mod ast;
pub mod builder;
pub mod builtins;
pub mod diagnostics;
pub mod types;
