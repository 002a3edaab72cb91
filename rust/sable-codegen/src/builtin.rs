//! Direct lowering of builtin operators to single instructions.

use sable_core::builtins::BuiltinKind;

use crate::ir::{BinaryOp, FloatPredicate, IntPredicate, IrBuilder, UnaryOp, Value};
use crate::layout::Explosion;

/// How a builtin maps onto the instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOp {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Binary op whose variant follows the left operand's type.
    Arith { int: BinaryOp, float: BinaryOp },
    IntCompare(IntPredicate),
    FloatCompare(FloatPredicate),
}

pub fn classify(kind: BuiltinKind) -> BuiltinOp {
    use BuiltinKind as K;
    use BuiltinOp::*;

    match kind {
        K::Neg => Unary(UnaryOp::Neg),
        K::Not => Unary(UnaryOp::Not),

        K::Add => Arith {
            int: BinaryOp::Add,
            float: BinaryOp::FAdd,
        },
        K::Sub => Arith {
            int: BinaryOp::Sub,
            float: BinaryOp::FSub,
        },
        K::Mul => Arith {
            int: BinaryOp::Mul,
            float: BinaryOp::FMul,
        },

        K::And => Binary(BinaryOp::And),
        K::Or => Binary(BinaryOp::Or),
        K::Xor => Binary(BinaryOp::Xor),
        K::Fdiv => Binary(BinaryOp::FDiv),
        K::Sdiv => Binary(BinaryOp::SDiv),
        K::SdivExact => Binary(BinaryOp::SDivExact),
        K::Udiv => Binary(BinaryOp::UDiv),
        K::UdivExact => Binary(BinaryOp::UDivExact),
        K::Srem => Binary(BinaryOp::SRem),
        K::Urem => Binary(BinaryOp::URem),

        K::CmpEq => IntCompare(IntPredicate::Eq),
        K::CmpNe => IntCompare(IntPredicate::Ne),
        K::CmpSle => IntCompare(IntPredicate::Sle),
        K::CmpSlt => IntCompare(IntPredicate::Slt),
        K::CmpSge => IntCompare(IntPredicate::Sge),
        K::CmpSgt => IntCompare(IntPredicate::Sgt),
        K::CmpUle => IntCompare(IntPredicate::Ule),
        K::CmpUlt => IntCompare(IntPredicate::Ult),
        K::CmpUge => IntCompare(IntPredicate::Uge),
        K::CmpUgt => IntCompare(IntPredicate::Ugt),

        K::FcmpOeq => FloatCompare(FloatPredicate::Oeq),
        K::FcmpOgt => FloatCompare(FloatPredicate::Ogt),
        K::FcmpOge => FloatCompare(FloatPredicate::Oge),
        K::FcmpOlt => FloatCompare(FloatPredicate::Olt),
        K::FcmpOle => FloatCompare(FloatPredicate::Ole),
        K::FcmpOne => FloatCompare(FloatPredicate::One),
        K::FcmpOrd => FloatCompare(FloatPredicate::Ord),
        K::FcmpUeq => FloatCompare(FloatPredicate::Ueq),
        K::FcmpUgt => FloatCompare(FloatPredicate::Ugt),
        K::FcmpUge => FloatCompare(FloatPredicate::Uge),
        K::FcmpUlt => FloatCompare(FloatPredicate::Ult),
        K::FcmpUle => FloatCompare(FloatPredicate::Ule),
        K::FcmpUne => FloatCompare(FloatPredicate::Une),
        K::FcmpUno => FloatCompare(FloatPredicate::Uno),
    }
}

/// Emit `kind` over the exploded arguments in `args`, which must hold exactly
/// the operator's operands.
pub fn emit_builtin(b: &mut IrBuilder, kind: BuiltinKind, args: &mut Explosion) -> Value {
    let result = match classify(kind) {
        BuiltinOp::Unary(op) => {
            let arg = args.claim_next();
            let op = match op {
                UnaryOp::Neg if b.value_type(arg).is_float() => UnaryOp::FNeg,
                op => op,
            };
            b.build_unary(op, arg)
        }
        BuiltinOp::Binary(op) => {
            let lhs = args.claim_next();
            let rhs = args.claim_next();
            b.build_binary(op, lhs, rhs)
        }
        BuiltinOp::Arith { int, float } => {
            let lhs = args.claim_next();
            let rhs = args.claim_next();
            let op = if b.value_type(lhs).is_float() { float } else { int };
            b.build_binary(op, lhs, rhs)
        }
        BuiltinOp::IntCompare(pred) => {
            let lhs = args.claim_next();
            let rhs = args.claim_next();
            b.build_icmp(pred, lhs, rhs)
        }
        BuiltinOp::FloatCompare(pred) => {
            let lhs = args.claim_next();
            let rhs = args.claim_next();
            b.build_fcmp(pred, lhs, rhs)
        }
    };
    args.finish();
    result
}
