//! Errors surfaced by code generation.
//!
//! Internal consistency failures (schema mismatches, undrained explosions) are
//! assertions, not errors: they indicate a bug in an earlier pass.

use sable_core::diagnostics::Diagnostic;
use thiserror::Error;

/// Errors that can occur during code generation.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("target error: {0}")]
    TargetError(String),

    #[error("lowering error: {0}")]
    LoweringError(String),

    #[error("emission error: {0}")]
    EmissionError(String),

    #[error("invalid codegen settings: {0}")]
    SettingsError(#[from] toml::de::Error),

    #[error("module `{module}` uses {} unimplemented feature(s)", diagnostics.len())]
    Unimplemented {
        module: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
