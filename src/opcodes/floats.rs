//! f32/f64 operators (IEEE semantics, no trapping)

use std::ops::{Add, Div, Mul, Neg, Sub};

use super::context::{OpContext, Scalar};
use super::{OpFn, OpcodeTable};
use crate::error::Result;
use crate::ir::Signature;
use crate::memory::Value;
use crate::types::TypeKind;

/// Float types with a native operator family
pub const FLOAT_KINDS: [TypeKind; 2] = [TypeKind::F32, TypeKind::F64];

/// Operators registered for every float type
pub const FLOAT_OPS: [&str; 13] = [
    "add", "sub", "mul", "div", "lt", "gt", "lteq", "gteq", "eq", "uneq", "neg", "abs", "sqrt",
];

/// Primitive float behaviour shared by the operator bodies
pub trait Float:
    Scalar
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Absolute value
    fn abs(self) -> Self;
    /// Square root (NaN for negative inputs)
    fn sqrt(self) -> Self;
}

impl Float for f32 {
    fn abs(self) -> Self {
        f32::abs(self)
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
}

impl Float for f64 {
    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

fn binary<T: Float>(ctx: &mut OpContext<'_>, f: impl FnOnce(T, T) -> T) -> Result<()> {
    let a = ctx.get::<T>(0)?;
    let b = ctx.get::<T>(1)?;
    ctx.assign_output(0, f(a, b).into_value())
}

fn compare<T: Float>(ctx: &mut OpContext<'_>, f: impl FnOnce(T, T) -> bool) -> Result<()> {
    let a = ctx.get::<T>(0)?;
    let b = ctx.get::<T>(1)?;
    ctx.assign_output(0, Value::Bool(f(a, b)))
}

fn unary<T: Float>(ctx: &mut OpContext<'_>, f: impl FnOnce(T) -> T) -> Result<()> {
    let a = ctx.get::<T>(0)?;
    ctx.assign_output(0, f(a).into_value())
}

fn add<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a + b)
}

fn sub<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a - b)
}

fn mul<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a * b)
}

fn div<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    binary::<T>(ctx, |a, b| a / b)
}

fn lt<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a < b)
}

fn gt<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a > b)
}

fn lteq<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a <= b)
}

fn gteq<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a >= b)
}

fn eq<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a == b)
}

fn uneq<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    compare::<T>(ctx, |a, b| a != b)
}

fn neg<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    unary::<T>(ctx, |a| -a)
}

fn abs<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    unary::<T>(ctx, T::abs)
}

fn sqrt<T: Float>(ctx: &mut OpContext<'_>) -> Result<()> {
    unary::<T>(ctx, T::sqrt)
}

fn op_for<T: Float>(op: &str) -> Option<OpFn> {
    let func: OpFn = match op {
        "add" => add::<T>,
        "sub" => sub::<T>,
        "mul" => mul::<T>,
        "div" => div::<T>,
        "lt" => lt::<T>,
        "gt" => gt::<T>,
        "lteq" => lteq::<T>,
        "gteq" => gteq::<T>,
        "eq" => eq::<T>,
        "uneq" => uneq::<T>,
        "neg" => neg::<T>,
        "abs" => abs::<T>,
        "sqrt" => sqrt::<T>,
        _ => return None,
    };
    Some(func)
}

/// Operator body for float type `kind`
pub fn float_op(kind: &TypeKind, op: &str) -> Option<OpFn> {
    match kind {
        TypeKind::F32 => op_for::<f32>(op),
        TypeKind::F64 => op_for::<f64>(op),
        _ => None,
    }
}

fn signature(kind: &TypeKind, op: &str) -> Signature {
    let t = kind.clone();
    match op {
        "lt" | "gt" | "lteq" | "gteq" | "eq" | "uneq" => {
            Signature::new(vec![t.clone(), t], vec![TypeKind::Bool])
        }
        "neg" | "abs" | "sqrt" => Signature::new(vec![t.clone()], vec![t]),
        _ => Signature::new(vec![t.clone(), t.clone()], vec![t]),
    }
}

/// Register every float operator
pub fn register(table: &mut OpcodeTable) {
    for kind in FLOAT_KINDS.iter() {
        for op in FLOAT_OPS {
            if let Some(func) = float_op(kind, op) {
                table.register_fn(format!("{}.{}", kind, op), signature(kind, op), func);
            }
        }
    }
}
