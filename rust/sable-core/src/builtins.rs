//! The builtin module's operator table.
//!
//! Declarations in the builtin module are looked up by name. The backend only
//! ever sees the resulting [`BuiltinKind`]; how each kind becomes an
//! instruction is decided in codegen.

use serde::{Deserialize, Serialize};
use strum_macros::{EnumCount, EnumIter, EnumString, IntoStaticStr};

/// Semantic kind of a builtin operator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    EnumIter,
    EnumCount,
    strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinKind {
    // Unary
    Neg,
    Not,

    // Arithmetic and bitwise
    Add,
    And,
    Fdiv,
    Mul,
    Or,
    Sdiv,
    SdivExact,
    Srem,
    Sub,
    Udiv,
    UdivExact,
    Urem,
    Xor,

    // Integer comparisons
    CmpEq,
    CmpNe,
    CmpSle,
    CmpSlt,
    CmpSge,
    CmpSgt,
    CmpUle,
    CmpUlt,
    CmpUge,
    CmpUgt,

    // Float comparisons, ordered then unordered
    FcmpOeq,
    FcmpOgt,
    FcmpOge,
    FcmpOlt,
    FcmpOle,
    FcmpOne,
    FcmpOrd,
    FcmpUeq,
    FcmpUgt,
    FcmpUge,
    FcmpUlt,
    FcmpUle,
    FcmpUne,
    FcmpUno,
}

impl BuiltinKind {
    /// Resolve a builtin-module declaration name.
    pub fn lookup(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Number of operands the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            BuiltinKind::Neg | BuiltinKind::Not => 1,
            _ => 2,
        }
    }
}
