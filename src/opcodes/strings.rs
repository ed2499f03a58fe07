//! String operators

use super::{OpContext, OpcodeTable};
use crate::error::Result;
use crate::ir::Signature;
use crate::memory::{heap, Value};
use crate::types::TypeKind;

/// Byte length of a string, as i32
fn len(ctx: &mut OpContext<'_>) -> Result<()> {
    let handle = ctx.input_handle(0)?;
    let length = heap::object_len(ctx.arena_mut(), handle)?;
    ctx.assign_length(0, length)
}

fn concat(ctx: &mut OpContext<'_>) -> Result<()> {
    let mut joined = ctx.str(0)?;
    joined.push_str(&ctx.str(1)?);
    ctx.assign_output(0, Value::Str(joined))
}

fn eq(ctx: &mut OpContext<'_>) -> Result<()> {
    let equal = ctx.str(0)? == ctx.str(1)?;
    ctx.assign_output(0, Value::Bool(equal))
}

/// Register string operators
pub fn register(table: &mut OpcodeTable) {
    let s = TypeKind::Str;
    table.register_fn("str.len", Signature::new(vec![s.clone()], vec![TypeKind::I32]), len);
    table.register_fn(
        "str.concat",
        Signature::new(vec![s.clone(), s.clone()], vec![s.clone()]),
        concat,
    );
    table.register_fn(
        "str.eq",
        Signature::new(vec![s.clone(), s], vec![TypeKind::Bool]),
        eq,
    );
}
