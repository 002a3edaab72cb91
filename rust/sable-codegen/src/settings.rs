//! Codegen settings, loadable from the `[codegen]` table of a project file.

use serde::Deserialize;

use crate::error::CodegenError;

/// Optimisation level for Cranelift compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimisation (fastest compile, slowest code).
    None,
    /// Optimise for execution speed.
    #[default]
    Speed,
    /// Optimise for both speed and code size.
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` flag.
    pub fn as_flag(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Settings controlling lowering and native compilation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodegenSettings {
    pub opt_level: OptLevel,
    /// Optional target triple (e.g. `"x86_64-unknown-linux-gnu"`).
    /// If `None`, the host platform is used.
    pub target: Option<String>,
    /// Largest number of scalars a tuple may decompose into before it is
    /// passed indirectly instead.
    pub max_scalar_explosion: usize,
}

impl Default for CodegenSettings {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Speed,
            target: None,
            max_scalar_explosion: 4,
        }
    }
}

#[derive(Deserialize)]
struct SettingsFile {
    #[serde(default)]
    codegen: CodegenSettings,
}

impl CodegenSettings {
    /// Parse the `[codegen]` table of a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, CodegenError> {
        let file: SettingsFile = toml::from_str(source)?;
        Ok(file.codegen)
    }
}
