//! Fixed-width integer operators
//!
//! Registered once per type as `<type>.<op>`, e.g. `i64.add`, `u8.shl`. Arithmetic wraps
//! in two's complement. `div` and `mod` reject a zero divisor and truncate toward zero.
//! Shifts by the type width or more produce 0 (or the sign fill for `shr` on negative
//! signed values); a negative shift count is rejected.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use rand::distributions::uniform::SampleUniform;
use rand::Rng;

use super::context::{OpContext, Scalar};
use super::{OpFn, OpcodeTable};
use crate::error::{Error, Result};
use crate::ir::Signature;
use crate::types::TypeKind;

/// Integer types with a native operator family
pub const INT_KINDS: [TypeKind; 8] = [
    TypeKind::I8,
    TypeKind::I16,
    TypeKind::I32,
    TypeKind::I64,
    TypeKind::U8,
    TypeKind::U16,
    TypeKind::U32,
    TypeKind::U64,
];

/// Operators registered for every integer type
pub const INT_OPS: [&str; 20] = [
    "add", "sub", "mul", "div", "mod", "and", "or", "xor", "bitclear", "shl", "shr", "lt", "gt",
    "lteq", "gteq", "eq", "uneq", "neg", "abs", "rand",
];

/// Primitive integer behaviour shared by the operator bodies
pub trait Int:
    Scalar
    + Ord
    + fmt::Display
    + SampleUniform
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Not<Output = Self>
{
    /// Zero
    const ZERO: Self;
    /// Signedness
    const SIGNED: bool;

    /// Wrapping addition
    fn wrapping_add(self, rhs: Self) -> Self;
    /// Wrapping subtraction
    fn wrapping_sub(self, rhs: Self) -> Self;
    /// Wrapping multiplication
    fn wrapping_mul(self, rhs: Self) -> Self;
    /// Truncating division; `MIN / -1` wraps
    fn wrapping_div(self, rhs: Self) -> Self;
    /// Remainder with the sign of the dividend; `MIN % -1` is 0
    fn wrapping_rem(self, rhs: Self) -> Self;
    /// Wrapping negation
    fn wrapping_neg(self) -> Self;
    /// Left shift; 0 once `n` reaches the width
    fn shl_by(self, n: u32) -> Self;
    /// Arithmetic (signed) or logical (unsigned) right shift, saturating at the width
    fn shr_by(self, n: u32) -> Self;
    /// Lossless widening for range checks and diagnostics
    fn to_i128(self) -> i128;
}

macro_rules! impl_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Int for $ty {
                const ZERO: Self = 0;
                const SIGNED: bool = <$ty>::MIN != 0;

                fn wrapping_add(self, rhs: Self) -> Self {
                    <$ty>::wrapping_add(self, rhs)
                }

                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$ty>::wrapping_sub(self, rhs)
                }

                fn wrapping_mul(self, rhs: Self) -> Self {
                    <$ty>::wrapping_mul(self, rhs)
                }

                fn wrapping_div(self, rhs: Self) -> Self {
                    <$ty>::wrapping_div(self, rhs)
                }

                fn wrapping_rem(self, rhs: Self) -> Self {
                    <$ty>::wrapping_rem(self, rhs)
                }

                fn wrapping_neg(self) -> Self {
                    <$ty>::wrapping_neg(self)
                }

                fn shl_by(self, n: u32) -> Self {
                    self.checked_shl(n).unwrap_or(0)
                }

                fn shr_by(self, n: u32) -> Self {
                    match self.checked_shr(n) {
                        Some(v) => v,
                        None if Self::SIGNED && (self as i128) < 0 => !0,
                        None => 0,
                    }
                }

                fn to_i128(self) -> i128 {
                    self as i128
                }
            }
        )*
    };
}

impl_int!(i8, i16, i32, i64, u8, u16, u32, u64);

fn binary<T: Int>(ctx: &mut OpContext<'_>, f: impl FnOnce(T, T) -> T) -> Result<()> {
    let a = ctx.get::<T>(0)?;
    let b = ctx.get::<T>(1)?;
    ctx.assign_output(0, f(a, b).into_value())
}

fn compare<T: Int>(ctx: &mut OpContext<'_>, f: impl FnOnce(T, T) -> bool) -> Result<()> {
    let a = ctx.get::<T>(0)?;
    let b = ctx.get::<T>(1)?;
    ctx.assign_output(0, f(a, b).into_value())
}

fn unary<T: Int>(ctx: &mut OpContext<'_>, f: impl FnOnce(T) -> T) -> Result<()> {
    let a = ctx.get::<T>(0)?;
    ctx.assign_output(0, f(a).into_value())
}

fn add<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, T::wrapping_add)
}

fn sub<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, T::wrapping_sub)
}

fn mul<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, T::wrapping_mul)
}

fn checked_divisor<T: Int>(ctx: &OpContext<'_>) -> Result<(T, T)> {
    let a = ctx.get::<T>(0)?;
    let b = ctx.get::<T>(1)?;
    if b == T::ZERO {
        return Err(Error::DivisionByZero { op: ctx.name() });
    }
    Ok((a, b))
}

fn div<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    let (a, b) = checked_divisor::<T>(ctx)?;
    ctx.assign_output(0, a.wrapping_div(b).into_value())
}

fn rem<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    let (a, b) = checked_divisor::<T>(ctx)?;
    ctx.assign_output(0, a.wrapping_rem(b).into_value())
}

fn and<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a & b)
}

fn or<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a | b)
}

fn xor<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a ^ b)
}

fn bitclear<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a & !b)
}

fn shift_count<T: Int>(ctx: &OpContext<'_>) -> Result<(T, u32)> {
    let value = ctx.get::<T>(0)?;
    let count = ctx.get::<T>(1)?.to_i128();
    if count < 0 {
        return Err(Error::InvalidArguments {
            op: ctx.name(),
            reason: format!("negative shift count {}", count),
        });
    }
    Ok((value, count.min(u32::MAX as i128) as u32))
}

fn shl<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    let (value, n) = shift_count::<T>(ctx)?;
    ctx.assign_output(0, value.shl_by(n).into_value())
}

fn shr<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    let (value, n) = shift_count::<T>(ctx)?;
    ctx.assign_output(0, value.shr_by(n).into_value())
}

fn lt<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a < b)
}

fn gt<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a > b)
}

fn lteq<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a <= b)
}

fn gteq<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a >= b)
}

fn eq<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a == b)
}

fn uneq<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a != b)
}

fn neg<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    unary::<T>(ctx, T::wrapping_neg)
}

fn abs<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    unary::<T>(ctx, |a| if a < T::ZERO { a.wrapping_neg() } else { a })
}

/// Uniform value in `[min, max)` drawn from the VM's generator at the full width of `T`
fn random<T: Int>(ctx: &mut OpContext<'_>) -> Result<()> {
    let min = ctx.get::<T>(0)?;
    let max = ctx.get::<T>(1)?;
    if min > max {
        return Err(Error::InvalidRange {
            op: ctx.name(),
            min: min.to_i128(),
            max: max.to_i128(),
        });
    }
    let value = if min == max {
        min
    } else {
        ctx.rng().gen_range(min..max)
    };
    ctx.assign_output(0, value.into_value())
}

fn op_for<T: Int>(op: &str) -> Option<OpFn> {
    let func: OpFn = match op {
        "add" => add::<T>,
        "sub" => sub::<T>,
        "mul" => mul::<T>,
        "div" => div::<T>,
        "mod" => rem::<T>,
        "and" => and::<T>,
        "or" => or::<T>,
        "xor" => xor::<T>,
        "bitclear" => bitclear::<T>,
        "shl" => shl::<T>,
        "shr" => shr::<T>,
        "lt" => lt::<T>,
        "gt" => gt::<T>,
        "lteq" => lteq::<T>,
        "gteq" => gteq::<T>,
        "eq" => eq::<T>,
        "uneq" => uneq::<T>,
        "neg" => neg::<T>,
        "abs" => abs::<T>,
        "rand" => random::<T>,
        _ => return None,
    };
    Some(func)
}

/// Operator body for integer type `kind`
pub fn int_op(kind: &TypeKind, op: &str) -> Option<OpFn> {
    match kind {
        TypeKind::I8 => op_for::<i8>(op),
        TypeKind::I16 => op_for::<i16>(op),
        TypeKind::I32 => op_for::<i32>(op),
        TypeKind::I64 => op_for::<i64>(op),
        TypeKind::U8 => op_for::<u8>(op),
        TypeKind::U16 => op_for::<u16>(op),
        TypeKind::U32 => op_for::<u32>(op),
        TypeKind::U64 => op_for::<u64>(op),
        _ => None,
    }
}

fn signature(kind: &TypeKind, op: &str) -> Signature {
    let t = kind.clone();
    match op {
        "lt" | "gt" | "lteq" | "gteq" | "eq" | "uneq" => {
            Signature::new(vec![t.clone(), t], vec![TypeKind::Bool])
        }
        "neg" | "abs" => Signature::new(vec![t.clone()], vec![t]),
        _ => Signature::new(vec![t.clone(), t.clone()], vec![t]),
    }
}

/// Register every integer operator
pub fn register(table: &mut OpcodeTable) {
    for kind in INT_KINDS.iter() {
        for op in INT_OPS {
            if let Some(func) = int_op(kind, op) {
                table.register_fn(format!("{}.{}", kind, op), signature(kind, op), func);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_saturation() {
        assert_eq!(1u8.shl_by(8), 0);
        assert_eq!((-8i32).shr_by(40), -1);
        assert_eq!(8i32.shr_by(40), 0);
        assert_eq!(0x80u8.shr_by(7), 1);
    }

    #[test]
    fn test_division_wraps_at_min() {
        assert_eq!(Int::wrapping_div(i64::MIN, -1), i64::MIN);
        assert_eq!(Int::wrapping_rem(i64::MIN, -1), 0);
        assert_eq!(Int::wrapping_div(-7i64, 2), -3);
        assert_eq!(Int::wrapping_rem(-7i64, 2), -1);
    }

    #[test]
    fn test_every_kind_has_every_op() {
        for kind in INT_KINDS.iter() {
            for op in INT_OPS {
                assert!(int_op(kind, op).is_some(), "{}.{}", kind, op);
            }
        }
        assert!(int_op(&TypeKind::F64, "add").is_none());
    }
}
