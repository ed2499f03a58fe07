//! Identity, type-generic `und.*` operators, booleans and numeric conversions

use super::{floats, ints, OpContext, OpFn, OpcodeTable};
use crate::error::{Error, Result};
use crate::ir::{ParamSpec, Signature};
use crate::memory::Value;
use crate::types::TypeKind;

/// Copies the input bytes to the output unchanged (any type, including structs and arrays)
fn identity(ctx: &mut OpContext<'_>) -> Result<()> {
    let bytes = ctx.input_bytes(0)?;
    ctx.assign_bytes(0, bytes)
}

fn value_eq(ctx: &mut OpContext<'_>) -> Result<()> {
    let equal = ctx.input(0)? == ctx.input(1)?;
    ctx.assign_output(0, Value::Bool(equal))
}

fn value_uneq(ctx: &mut OpContext<'_>) -> Result<()> {
    let equal = ctx.input(0)? == ctx.input(1)?;
    ctx.assign_output(0, Value::Bool(!equal))
}

/// Runs the typed operator `op` chosen by the type of the first input
fn dispatch(ctx: &mut OpContext<'_>, op: &str) -> Result<()> {
    let kind = ctx.input_type(0)?;
    let func = ints::int_op(&kind, op)
        .or_else(|| floats::float_op(&kind, op))
        .or(match op {
            "eq" => Some(value_eq as OpFn),
            "uneq" => Some(value_uneq as OpFn),
            "and" if kind == TypeKind::Bool => Some(bool_and as OpFn),
            "or" if kind == TypeKind::Bool => Some(bool_or as OpFn),
            _ => None,
        })
        .ok_or_else(|| Error::type_mismatch(ctx.name(), format!("an operand supporting {}", op), &kind))?;
    func(ctx)
}

macro_rules! und_ops {
    ($($func:ident => $op:literal),* $(,)?) => {
        $(
            fn $func(ctx: &mut OpContext<'_>) -> Result<()> {
                dispatch(ctx, $op)
            }
        )*

        const UND_OPS: &[(&str, OpFn)] = &[$(($op, $func)),*];
    };
}

und_ops! {
    und_add => "add",
    und_sub => "sub",
    und_mul => "mul",
    und_div => "div",
    und_mod => "mod",
    und_shl => "shl",
    und_shr => "shr",
    und_and => "and",
    und_or => "or",
    und_xor => "xor",
    und_bitclear => "bitclear",
    und_lt => "lt",
    und_gt => "gt",
    und_lteq => "lteq",
    und_gteq => "gteq",
    und_eq => "eq",
    und_uneq => "uneq",
}

fn bool_and(ctx: &mut OpContext<'_>) -> Result<()> {
    let value = ctx.bool(0)? && ctx.bool(1)?;
    ctx.assign_output(0, Value::Bool(value))
}

fn bool_or(ctx: &mut OpContext<'_>) -> Result<()> {
    let value = ctx.bool(0)? || ctx.bool(1)?;
    ctx.assign_output(0, Value::Bool(value))
}

fn bool_not(ctx: &mut OpContext<'_>) -> Result<()> {
    let value = !ctx.bool(0)?;
    ctx.assign_output(0, Value::Bool(value))
}

fn i32_to_i64(ctx: &mut OpContext<'_>) -> Result<()> {
    let v = ctx.i32(0)?;
    ctx.assign_output(0, Value::I64(v as i64))
}

/// Truncates to the low 32 bits
fn i64_to_i32(ctx: &mut OpContext<'_>) -> Result<()> {
    let v = ctx.i64(0)?;
    ctx.assign_output(0, Value::I32(v as i32))
}

fn i64_to_f64(ctx: &mut OpContext<'_>) -> Result<()> {
    let v = ctx.i64(0)?;
    ctx.assign_output(0, Value::F64(v as f64))
}

/// Truncates toward zero, saturating at the i64 range (NaN becomes 0)
fn f64_to_i64(ctx: &mut OpContext<'_>) -> Result<()> {
    let v = ctx.f64(0)?;
    ctx.assign_output(0, Value::I64(v as i64))
}

fn i32_to_f32(ctx: &mut OpContext<'_>) -> Result<()> {
    let v = ctx.i32(0)?;
    ctx.assign_output(0, Value::F32(v as f32))
}

/// Scalar types `und.<op>` can dispatch on; `None` when any type compares
fn operand_types(op: &str) -> Option<Vec<TypeKind>> {
    if matches!(op, "eq" | "uneq") {
        return None;
    }
    let mut candidates = ints::INT_KINDS.to_vec();
    candidates.extend(floats::FLOAT_KINDS.to_vec());
    candidates.push(TypeKind::Bool);
    candidates.retain(|kind| {
        ints::int_op(kind, op).is_some()
            || floats::float_op(kind, op).is_some()
            || (*kind == TypeKind::Bool && matches!(op, "and" | "or"))
    });
    Some(candidates)
}

fn generic(op: &str, outputs: ParamSpec) -> Signature {
    let first = match operand_types(op) {
        Some(types) => ParamSpec::one_of(types),
        None => ParamSpec::any(),
    };
    Signature {
        inputs: vec![first, ParamSpec::same_as_first()],
        outputs: vec![outputs],
    }
}

/// Register identity, und.*, bool.* and conversions
pub fn register(table: &mut OpcodeTable) {
    table.register_fn(
        "identity",
        Signature {
            inputs: vec![ParamSpec::any()],
            outputs: vec![ParamSpec::any()],
        },
        identity,
    );

    for (op, func) in UND_OPS {
        let output = match *op {
            "lt" | "gt" | "lteq" | "gteq" | "eq" | "uneq" => ParamSpec::of(TypeKind::Bool),
            _ => ParamSpec::any(),
        };
        table.register_fn(format!("und.{}", op), generic(op, output), *func);
    }

    let b = TypeKind::Bool;
    let binary = Signature::new(vec![b.clone(), b.clone()], vec![b.clone()]);
    table.register_fn("bool.and", binary.clone(), bool_and);
    table.register_fn("bool.or", binary.clone(), bool_or);
    table.register_fn("bool.eq", binary.clone(), value_eq);
    table.register_fn("bool.uneq", binary, value_uneq);
    table.register_fn("bool.not", Signature::new(vec![b.clone()], vec![b]), bool_not);

    let conversions: [(&str, TypeKind, TypeKind, OpFn); 5] = [
        ("i32.i64", TypeKind::I32, TypeKind::I64, i32_to_i64),
        ("i64.i32", TypeKind::I64, TypeKind::I32, i64_to_i32),
        ("i64.f64", TypeKind::I64, TypeKind::F64, i64_to_f64),
        ("f64.i64", TypeKind::F64, TypeKind::I64, f64_to_i64),
        ("i32.f32", TypeKind::I32, TypeKind::F32, i32_to_f32),
    ];
    for (name, from, to, func) in conversions {
        table.register_fn(name, Signature::new(vec![from], vec![to]), func);
    }
}
